//! Pending retry model.

use diesel::prelude::*;
use jiff_diesel::Timestamp;
use uuid::Uuid;

use crate::schema::webhook_pending_deliveries;

/// A retry waiting for its backoff step.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = webhook_pending_deliveries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WebhookPendingDelivery {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    /// Payload to resend unchanged.
    pub payload: serde_json::Value,
    /// Backoff index of the attempt to make.
    pub next_attempt_index: i32,
    pub next_attempt_at: Timestamp,
    /// Lease held by the worker that claimed the row.
    pub claimed_until: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Data for arming a retry.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = webhook_pending_deliveries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewWebhookPendingDelivery {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub payload: serde_json::Value,
    pub next_attempt_index: i32,
    pub next_attempt_at: Timestamp,
}
