//! Event payload formatting.
//!
//! Every formatter produces the `{ id, event, timestamp, data }` envelope with
//! a fresh payload id. Payloads are formatted once per logical event and the
//! same value is reused for every retry, so the signed body never changes.

use std::collections::BTreeMap;

use jiff::Timestamp;
#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Result, WebhookEvent};

/// Serializes timestamps as ISO-8601 UTC with millisecond precision.
pub mod millis {
    use jiff::Timestamp;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Formats a timestamp the way it appears on the wire,
    /// e.g. `2026-01-02T03:04:05.678Z`.
    pub fn format(timestamp: &Timestamp) -> String {
        format!(
            "{}.{:03}Z",
            timestamp.strftime("%Y-%m-%dT%H:%M:%S"),
            timestamp.subsec_millisecond().unsigned_abs()
        )
    }

    pub fn serialize<S: Serializer>(timestamp: &Timestamp, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(timestamp))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Timestamp, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }

    /// Same as the parent module for optional timestamps.
    pub mod option {
        use jiff::Timestamp;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            timestamp: &Option<Timestamp>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match timestamp {
                Some(ts) => s.serialize_str(&super::format(ts)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<Timestamp>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| raw.parse().map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// Truncates a timestamp to whole milliseconds.
fn truncate_to_millis(timestamp: Timestamp) -> Timestamp {
    Timestamp::from_millisecond(timestamp.as_millisecond()).unwrap_or(timestamp)
}

/// The JSON envelope POSTed to webhook endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct EventPayload {
    /// Unique payload id, sent as `X-Webhook-ID`.
    pub id: Uuid,
    /// The event that produced this payload.
    pub event: WebhookEvent,
    /// When the payload was formatted.
    #[serde(with = "millis")]
    #[cfg_attr(feature = "schema", schemars(with = "String"))]
    pub timestamp: Timestamp,
    /// Event-specific data.
    pub data: Value,
}

impl EventPayload {
    /// Creates a payload with a fresh id and the current time.
    pub fn new(event: WebhookEvent, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            timestamp: truncate_to_millis(Timestamp::now()),
            data,
        }
    }

    /// Creates the synthetic payload used by manual test sends.
    pub fn test(endpoint_id: Uuid) -> Self {
        Self::new(
            WebhookEvent::Test,
            serde_json::json!({
                "endpointId": endpoint_id,
                "message": "This is a test webhook delivery",
            }),
        )
    }

    /// Serializes the payload into the exact bytes that are sent and signed.
    pub fn to_body(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A lead as it appears in webhook payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    /// Pipeline status, e.g. `new`, `contacted`, `qualified`.
    pub status: String,
    pub source: Option<String>,
    /// Estimated deal value in minor currency units.
    pub value: Option<i64>,
    pub notes: Option<String>,
    #[serde(with = "millis")]
    #[cfg_attr(feature = "schema", schemars(with = "String"))]
    pub created_at: Timestamp,
    #[serde(with = "millis")]
    #[cfg_attr(feature = "schema", schemars(with = "String"))]
    pub updated_at: Timestamp,
}

impl Lead {
    /// Returns the lead's display name.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_owned()
    }
}

/// A contact as it appears in webhook payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_id: Option<Uuid>,
    pub title: Option<String>,
    #[serde(with = "millis")]
    #[cfg_attr(feature = "schema", schemars(with = "String"))]
    pub created_at: Timestamp,
    #[serde(with = "millis")]
    #[cfg_attr(feature = "schema", schemars(with = "String"))]
    pub updated_at: Timestamp,
}

/// An activity logged against a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub lead_id: Uuid,
    /// Activity kind, e.g. `call`, `email`, `meeting`, `note`.
    #[serde(rename = "type")]
    pub kind: String,
    pub description: Option<String>,
    #[serde(with = "millis::option")]
    #[cfg_attr(feature = "schema", schemars(with = "Option<String>"))]
    pub scheduled_at: Option<Timestamp>,
    #[serde(with = "millis")]
    #[cfg_attr(feature = "schema", schemars(with = "String"))]
    pub created_at: Timestamp,
}

/// The previous and current value of a changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

impl FieldChange {
    /// Creates a change from any two serializable values.
    pub fn new(old: impl Serialize, new: impl Serialize) -> Self {
        Self {
            old: to_data(&old),
            new: to_data(&new),
        }
    }
}

/// Changed field name mapped to its old and new value.
pub type FieldChanges = BTreeMap<String, FieldChange>;

/// Entities here only hold strings, numbers and timestamps, so this cannot
/// fail in practice; the fallback keeps formatters infallible.
fn to_data<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

pub fn lead_created(lead: &Lead) -> EventPayload {
    EventPayload::new(WebhookEvent::LeadCreated, to_data(lead))
}

pub fn lead_updated(lead: &Lead, changes: &FieldChanges) -> EventPayload {
    EventPayload::new(
        WebhookEvent::LeadUpdated,
        serde_json::json!({
            "lead": to_data(lead),
            "changes": to_data(changes),
        }),
    )
}

pub fn lead_status_changed(lead: &Lead, previous_status: &str) -> EventPayload {
    EventPayload::new(
        WebhookEvent::LeadStatusChanged,
        serde_json::json!({
            "lead": to_data(lead),
            "previousStatus": previous_status,
            "newStatus": lead.status,
        }),
    )
}

pub fn lead_deleted(lead: &Lead) -> EventPayload {
    EventPayload::new(WebhookEvent::LeadDeleted, to_data(lead))
}

pub fn lead_activity_added(lead: &Lead, activity: &Activity) -> EventPayload {
    EventPayload::new(
        WebhookEvent::LeadActivityAdded,
        serde_json::json!({
            "lead": to_data(lead),
            "activity": to_data(activity),
        }),
    )
}

pub fn contact_created(contact: &Contact) -> EventPayload {
    EventPayload::new(WebhookEvent::ContactCreated, to_data(contact))
}

pub fn contact_updated(contact: &Contact, changes: &FieldChanges) -> EventPayload {
    EventPayload::new(
        WebhookEvent::ContactUpdated,
        serde_json::json!({
            "contact": to_data(contact),
            "changes": to_data(changes),
        }),
    )
}

pub fn contact_deleted(contact: &Contact) -> EventPayload {
    EventPayload::new(WebhookEvent::ContactDeleted, to_data(contact))
}
