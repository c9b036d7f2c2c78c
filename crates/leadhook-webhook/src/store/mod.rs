//! Storage traits for endpoints, delivery attempts and pending retries.
//!
//! The dispatch components only talk to storage through these traits.
//! [`MemoryStore`] implements all of them in process; the server crate
//! provides a Postgres implementation.

mod memory;

use std::time::Duration;

use jiff::Timestamp;
#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use self::memory::MemoryStore;
use crate::{EventPayload, Result, WebhookEvent};

/// A registered webhook target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub events: Vec<WebhookEvent>,
    pub secret: Option<String>,
    pub enabled: bool,
    /// Consecutive failed attempts since the last success or re-enable.
    pub failure_count: u32,
    pub last_triggered_at: Option<Timestamp>,
    pub last_status_code: Option<u16>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Endpoint {
    /// Returns whether the endpoint subscribes to the event.
    #[inline]
    pub fn subscribes_to(&self, event: WebhookEvent) -> bool {
        self.events.contains(&event)
    }

    /// Returns whether deliveries are signed.
    #[inline]
    pub fn has_secret(&self) -> bool {
        self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Validated data for a new endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEndpoint {
    pub name: String,
    pub url: String,
    pub events: Vec<WebhookEvent>,
    pub secret: Option<String>,
    pub enabled: bool,
}

/// Validated partial update of an endpoint.
///
/// `Some(true)` for `enabled` also resets the failure count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub events: Option<Vec<WebhookEvent>>,
    /// `Some(None)` removes the secret.
    pub secret: Option<Option<String>>,
    pub enabled: Option<bool>,
}

impl EndpointUpdate {
    /// Returns whether the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.url.is_none()
            && self.events.is_none()
            && self.secret.is_none()
            && self.enabled.is_none()
    }
}

/// Endpoint state after a failed attempt was counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureRecord {
    pub failure_count: u32,
    pub enabled: bool,
}

/// An immutable record of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub event: WebhookEvent,
    /// The exact payload that was sent.
    pub payload: Value,
    /// `None` when no response was received.
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    /// Index into the backoff schedule, 0 for the initial attempt.
    pub attempt_number: u32,
    pub attempted_at: Timestamp,
    pub duration_ms: u64,
}

/// Data for a new delivery attempt record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeliveryAttempt {
    pub endpoint_id: Uuid,
    pub event: WebhookEvent,
    pub payload: Value,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub attempt_number: u32,
    pub attempted_at: Timestamp,
    pub duration_ms: u64,
}

/// A persisted retry waiting for its next attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDelivery {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub payload: EventPayload,
    pub next_attempt_index: u32,
    pub next_attempt_at: Timestamp,
    /// Lease held by the worker that claimed this delivery.
    pub claimed_until: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Data for a new pending delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPendingDelivery {
    pub endpoint_id: Uuid,
    pub payload: EventPayload,
    pub next_attempt_index: u32,
    pub next_attempt_at: Timestamp,
}

/// Offset pagination for list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct Pagination {
    pub offset: u32,
    pub limit: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 1000;

    /// Creates pagination with the limit clamped to `1..=1000`.
    pub fn new(offset: u32, limit: u32) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_LIMIT)
    }
}

/// One page of results plus the total number of matching rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    /// Maps every item on the page.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

/// Endpoint persistence.
#[async_trait::async_trait]
pub trait EndpointStore: Send + Sync {
    async fn create_endpoint(&self, endpoint: NewEndpoint) -> Result<Endpoint>;

    async fn find_endpoint(&self, endpoint_id: Uuid) -> Result<Option<Endpoint>>;

    /// Lists endpoints oldest first.
    async fn list_endpoints(&self, pagination: Pagination) -> Result<Page<Endpoint>>;

    /// Returns `None` when the endpoint does not exist.
    async fn update_endpoint(
        &self,
        endpoint_id: Uuid,
        update: EndpointUpdate,
    ) -> Result<Option<Endpoint>>;

    /// Deletes the endpoint with its attempts and pending deliveries.
    ///
    /// Returns whether anything was deleted.
    async fn delete_endpoint(&self, endpoint_id: Uuid) -> Result<bool>;

    /// Lists enabled endpoints subscribed to the event.
    async fn list_subscribed(&self, event: WebhookEvent) -> Result<Vec<Endpoint>>;

    /// Resets the failure count and records the last trigger.
    ///
    /// Returns `false` when the endpoint does not exist.
    async fn record_success(
        &self,
        endpoint_id: Uuid,
        status_code: Option<u16>,
        at: Timestamp,
    ) -> Result<bool>;

    /// Atomically increments the failure count, records the last trigger and
    /// disables the endpoint once the count reaches `threshold`.
    ///
    /// Returns `None` when the endpoint does not exist.
    async fn record_failure(
        &self,
        endpoint_id: Uuid,
        status_code: Option<u16>,
        at: Timestamp,
        threshold: u32,
    ) -> Result<Option<FailureRecord>>;

    /// Records the last trigger without touching the failure count.
    async fn touch_endpoint(
        &self,
        endpoint_id: Uuid,
        status_code: Option<u16>,
        at: Timestamp,
    ) -> Result<bool>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Delivery attempt log.
#[async_trait::async_trait]
pub trait DeliveryLogStore: Send + Sync {
    async fn insert_attempt(&self, attempt: NewDeliveryAttempt) -> Result<DeliveryAttempt>;

    /// Lists attempts newest first.
    async fn list_attempts(
        &self,
        endpoint_id: Uuid,
        pagination: Pagination,
    ) -> Result<Page<DeliveryAttempt>>;
}

/// Persisted retries.
#[async_trait::async_trait]
pub trait PendingDeliveryStore: Send + Sync {
    async fn insert_pending(&self, pending: NewPendingDelivery) -> Result<PendingDelivery>;

    /// Claims up to `limit` due deliveries that are not leased.
    ///
    /// The claim sets `claimed_until = now + lease` in one conditional
    /// update, so concurrent workers never receive the same row.
    async fn claim_due(
        &self,
        now: Timestamp,
        lease: Duration,
        limit: u32,
    ) -> Result<Vec<PendingDelivery>>;

    /// Removes a pending delivery once its attempt has been made.
    async fn delete_pending(&self, pending_id: Uuid) -> Result<()>;

    /// Lists pending deliveries for an endpoint, soonest first.
    async fn list_pending(&self, endpoint_id: Uuid) -> Result<Vec<PendingDelivery>>;
}

/// All storage the dispatch components need.
pub trait WebhookStore: EndpointStore + DeliveryLogStore + PendingDeliveryStore {}

impl<T> WebhookStore for T where T: EndpointStore + DeliveryLogStore + PendingDeliveryStore {}
