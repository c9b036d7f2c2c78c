//! Delivery attempt log model.

use diesel::prelude::*;
use jiff_diesel::Timestamp;
use uuid::Uuid;

use crate::schema::webhook_deliveries;

/// One recorded delivery attempt. Rows are never updated.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = webhook_deliveries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    /// Event name, e.g. `lead.status_changed`.
    pub event: String,
    /// The exact payload that was sent.
    pub payload: serde_json::Value,
    /// `None` when no response was received.
    pub status_code: Option<i32>,
    /// Response body, truncated.
    pub response_body: Option<String>,
    pub error: Option<String>,
    /// Index into the backoff schedule, 0 for the initial attempt.
    pub attempt_number: i32,
    pub attempted_at: Timestamp,
    pub duration_ms: i64,
}

/// Data for recording a delivery attempt.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = webhook_deliveries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewWebhookDelivery {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub event: String,
    pub payload: serde_json::Value,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub attempt_number: i32,
    pub attempted_at: Timestamp,
    pub duration_ms: i64,
}

impl WebhookDelivery {
    /// Returns whether the receiver answered with a 2xx status.
    pub fn is_success(&self) -> bool {
        self.status_code
            .is_some_and(|code| (200..300).contains(&code))
    }
}
