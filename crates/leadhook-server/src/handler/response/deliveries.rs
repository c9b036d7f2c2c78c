//! Delivery history response types.

use jiff::Timestamp;
use leadhook_webhook::WebhookEvent;
use leadhook_webhook::store::DeliveryAttempt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Page;

/// One logged delivery attempt.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub delivery_id: Uuid,
    pub webhook_id: Uuid,
    pub event: WebhookEvent,
    /// The exact payload that was sent.
    pub payload: serde_json::Value,
    /// Response status, absent when no response was received.
    pub status_code: Option<u16>,
    /// Response body, truncated.
    pub response_body: Option<String>,
    /// Why the attempt failed.
    pub error: Option<String>,
    /// Position in the retry schedule, 0 for the first attempt.
    pub attempt_number: u32,
    pub attempted_at: Timestamp,
    pub duration_ms: u64,
}

impl Delivery {
    /// Returns whether the receiver answered with a 2xx status.
    pub fn is_success(&self) -> bool {
        self.status_code.is_some_and(|code| (200..300).contains(&code))
    }
}

impl From<DeliveryAttempt> for Delivery {
    fn from(attempt: DeliveryAttempt) -> Self {
        Self {
            delivery_id: attempt.id,
            webhook_id: attempt.endpoint_id,
            event: attempt.event,
            payload: attempt.payload,
            status_code: attempt.status_code,
            response_body: attempt.response_body,
            error: attempt.error,
            attempt_number: attempt.attempt_number,
            attempted_at: attempt.attempted_at,
            duration_ms: attempt.duration_ms,
        }
    }
}

/// Response for listing delivery attempts, newest first.
pub type Deliveries = Page<Delivery>;
