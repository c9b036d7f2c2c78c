//! Webhook event type enumeration for endpoint subscriptions.

#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Defines the domain events that can trigger webhook delivery.
///
/// The dotted string form (e.g. `lead.created`) is used on the wire, in the
/// `X-Webhook-Event` header and in storage.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[derive(Serialize, Deserialize)]
#[derive(AsRefStr, Display, EnumIter, EnumString, IntoStaticStr)]
pub enum WebhookEvent {
    // Lead events
    /// A new lead was created
    #[serde(rename = "lead.created")]
    #[strum(serialize = "lead.created")]
    LeadCreated,

    /// A lead's fields were updated
    #[serde(rename = "lead.updated")]
    #[strum(serialize = "lead.updated")]
    LeadUpdated,

    /// A lead moved to a different pipeline status
    #[serde(rename = "lead.status_changed")]
    #[strum(serialize = "lead.status_changed")]
    LeadStatusChanged,

    /// A lead was deleted
    #[serde(rename = "lead.deleted")]
    #[strum(serialize = "lead.deleted")]
    LeadDeleted,

    /// An activity (call, email, note) was logged on a lead
    #[serde(rename = "lead.activity_added")]
    #[strum(serialize = "lead.activity_added")]
    LeadActivityAdded,

    // Contact events
    /// A new contact was created
    #[serde(rename = "contact.created")]
    #[strum(serialize = "contact.created")]
    ContactCreated,

    /// A contact's fields were updated
    #[serde(rename = "contact.updated")]
    #[strum(serialize = "contact.updated")]
    ContactUpdated,

    /// A contact was deleted
    #[serde(rename = "contact.deleted")]
    #[strum(serialize = "contact.deleted")]
    ContactDeleted,

    // Synthetic events
    /// Synthetic event sent by a manual test delivery
    #[serde(rename = "webhook.test")]
    #[strum(serialize = "webhook.test")]
    Test,
}

impl WebhookEvent {
    /// Returns whether endpoints may subscribe to this event.
    ///
    /// The synthetic test event is only ever sent on demand.
    #[inline]
    pub fn is_subscribable(self) -> bool {
        !matches!(self, Self::Test)
    }

    /// Returns all events an endpoint may subscribe to.
    pub fn subscribable() -> impl Iterator<Item = Self> {
        Self::iter().filter(|event| event.is_subscribable())
    }

    /// Returns whether this is a lead lifecycle event.
    #[inline]
    pub fn is_lead_event(self) -> bool {
        self.as_ref().starts_with("lead.")
    }

    /// Returns whether this is a contact lifecycle event.
    #[inline]
    pub fn is_contact_event(self) -> bool {
        self.as_ref().starts_with("contact.")
    }
}
