//! Webhook endpoint model.

use diesel::prelude::*;
use jiff_diesel::Timestamp;
use uuid::Uuid;

use crate::schema::webhook_endpoints;

/// A registered webhook receiver.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = webhook_endpoints)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WebhookEndpoint {
    /// Unique endpoint identifier.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Delivery URL.
    pub url: String,
    /// Subscribed event names, e.g. `lead.created`.
    pub events: Vec<String>,
    /// HMAC-SHA256 signing secret, if deliveries are signed.
    pub secret: Option<String>,
    /// Whether the endpoint receives deliveries.
    pub enabled: bool,
    /// Consecutive failed attempts since the last success.
    pub failure_count: i32,
    /// Time of the most recent attempt.
    pub last_triggered_at: Option<Timestamp>,
    /// Status code of the most recent response.
    pub last_status_code: Option<i32>,
    /// Timestamp when this endpoint was created.
    pub created_at: Timestamp,
    /// Timestamp when this endpoint was last modified.
    pub updated_at: Timestamp,
}

/// Data for creating a webhook endpoint.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = webhook_endpoints)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewWebhookEndpoint {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    pub secret: Option<String>,
    pub enabled: bool,
}

/// Changeset for a webhook endpoint.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = webhook_endpoints)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateWebhookEndpoint {
    pub name: Option<String>,
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    /// `Some(None)` clears the secret.
    pub secret: Option<Option<String>>,
    pub enabled: Option<bool>,
    pub failure_count: Option<i32>,
    pub updated_at: Option<Timestamp>,
}

/// Failure counter and enabled flag after a failed attempt was counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Queryable)]
pub struct WebhookFailureState {
    pub failure_count: i32,
    pub enabled: bool,
}

impl WebhookEndpoint {
    /// Returns whether the endpoint subscribes to the named event.
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.events.iter().any(|name| name == event)
    }

    /// Returns whether deliveries are signed.
    pub fn has_secret(&self) -> bool {
        self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

impl NewWebhookEndpoint {
    /// Creates insert data with a fresh time-ordered id.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        events: Vec<String>,
        secret: Option<String>,
        enabled: bool,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            url: url.into(),
            events,
            secret,
            enabled,
        }
    }
}

impl UpdateWebhookEndpoint {
    /// Returns whether the changeset only carries bookkeeping fields.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.url.is_none()
            && self.events.is_none()
            && self.secret.is_none()
            && self.enabled.is_none()
            && self.failure_count.is_none()
    }
}
