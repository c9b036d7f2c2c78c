//! Offset pagination query parameters.

use leadhook_webhook::store::Pagination;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// `?offset=&limit=` query parameters for list endpoints.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, JsonSchema, Validate)]
pub struct PaginationParams {
    /// Number of records to skip.
    pub offset: Option<u32>,
    /// Maximum number of records to return (1-1000, default 50).
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<u32>,
}

impl PaginationParams {
    #[inline]
    pub fn new(offset: u32, limit: u32) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(limit),
        }
    }

    /// Returns the pagination offset.
    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// Returns the pagination limit.
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(Pagination::DEFAULT_LIMIT)
    }

    /// Converts into the store pagination, clamping the limit.
    #[inline]
    pub fn into_pagination(self) -> Pagination {
        Pagination::new(self.offset(), self.limit())
    }
}

impl From<PaginationParams> for Pagination {
    #[inline]
    fn from(params: PaginationParams) -> Self {
        params.into_pagination()
    }
}
