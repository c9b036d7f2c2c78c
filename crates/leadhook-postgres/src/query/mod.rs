//! Repository traits implemented on [`PgConnection`].
//!
//! [`PgConnection`]: crate::PgConnection
//!
//! # Pagination
//!
//! List queries take a [`Pagination`] with the limit clamped to `1..=1000`.

mod webhook_delivery;
mod webhook_endpoint;
mod webhook_pending_delivery;

use serde::{Deserialize, Serialize};
pub use webhook_delivery::WebhookDeliveryRepository;
pub use webhook_endpoint::WebhookEndpointRepository;
pub use webhook_pending_delivery::WebhookPendingDeliveryRepository;

/// Pagination parameters for database queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of records to return.
    pub limit: i64,
    /// Number of records to skip.
    pub offset: i64,
}

impl Pagination {
    /// Creates a new pagination instance.
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(1, 1000),
            offset: offset.max(0),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(50, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_is_clamped() {
        assert_eq!(
            Pagination::new(0, -5),
            Pagination {
                limit: 1,
                offset: 0
            }
        );
        assert_eq!(Pagination::new(5000, 20).limit, 1000);
        assert_eq!(
            Pagination::default(),
            Pagination {
                limit: 50,
                offset: 0
            }
        );
    }
}
