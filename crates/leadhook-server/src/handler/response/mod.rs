//! Response types for HTTP handlers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod deliveries;
mod errors;
mod monitors;
mod webhooks;

pub use deliveries::*;
pub use errors::*;
pub use monitors::*;
pub use webhooks::*;

/// Offset-paginated response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[schemars(rename = "{T}sPage")]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items in this page.
    pub items: Vec<T>,
    /// Total number of matching items.
    pub total: u64,
    /// Offset this page starts at.
    pub offset: u32,
    /// Page size that was applied.
    pub limit: u32,
}

impl<T> Page<T> {
    /// Converts a store page, mapping every item.
    pub fn from_store<U>(
        page: leadhook_webhook::store::Page<U>,
        pagination: leadhook_webhook::store::Pagination,
        f: impl FnMut(U) -> T,
    ) -> Self {
        let page = page.map(f);
        Self {
            items: page.items,
            total: page.total,
            offset: pagination.offset,
            limit: pagination.limit,
        }
    }

    /// Returns whether more items exist after this page.
    pub fn has_more(&self) -> bool {
        u64::from(self.offset) + (self.items.len() as u64) < self.total
    }
}
