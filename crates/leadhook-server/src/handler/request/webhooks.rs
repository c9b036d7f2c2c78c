//! Webhook endpoint request types.

use leadhook_webhook::{EndpointChanges, EndpointInput};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// Request payload for registering a webhook endpoint.
#[must_use]
#[derive(Debug, Default, Clone, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebhook {
    /// Human-readable name (1-255 characters).
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// HTTPS URL that receives the payloads.
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
    /// Event names to subscribe to, e.g. `lead.created`.
    #[validate(length(min = 1))]
    pub events: Vec<String>,
    /// Shared secret used to sign deliveries.
    #[validate(length(max = 255))]
    pub secret: Option<String>,
    /// Whether the endpoint receives events (default `true`).
    pub enabled: Option<bool>,
}

impl CreateWebhook {
    /// Converts this request into registry input.
    #[inline]
    pub fn into_input(self) -> EndpointInput {
        EndpointInput {
            name: self.name,
            url: self.url,
            events: self.events,
            secret: self.secret,
            enabled: self.enabled,
        }
    }
}

/// Request payload for a partial endpoint update.
///
/// Send `"secret": null` to stop signing deliveries. Setting `enabled` to
/// `true` also resets the consecutive failure count.
#[must_use]
#[derive(Debug, Default, Clone, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWebhook {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 2048))]
    pub url: Option<String>,
    #[validate(length(min = 1))]
    pub events: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub secret: Option<Option<String>>,
    pub enabled: Option<bool>,
}

impl UpdateWebhook {
    /// Converts this request into registry changes.
    #[inline]
    pub fn into_changes(self) -> EndpointChanges {
        EndpointChanges {
            name: self.name,
            url: self.url,
            events: self.events,
            secret: self.secret,
            enabled: self.enabled,
        }
    }
}

/// Distinguishes an explicit `null` from an absent field.
fn deserialize_present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_requires_events() {
        let request = CreateWebhook {
            name: "CRM sync".to_owned(),
            url: "https://example.com/hook".to_owned(),
            ..Default::default()
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn update_distinguishes_null_secret() {
        let absent: UpdateWebhook = serde_json::from_str(r#"{"name":"x"}"#).unwrap();
        assert_eq!(absent.secret, None);

        let cleared: UpdateWebhook = serde_json::from_str(r#"{"secret":null}"#).unwrap();
        assert_eq!(cleared.secret, Some(None));

        let set: UpdateWebhook = serde_json::from_str(r#"{"secret":"s1"}"#).unwrap();
        assert_eq!(set.into_changes().secret, Some(Some("s1".to_owned())));
    }

    #[test]
    fn create_maps_to_input() {
        let input = CreateWebhook {
            name: "CRM sync".to_owned(),
            url: "https://example.com/hook".to_owned(),
            events: vec!["lead.created".to_owned()],
            secret: Some("s1".to_owned()),
            enabled: None,
        }
        .into_input();

        assert_eq!(input.events, vec!["lead.created".to_owned()]);
        assert_eq!(input.enabled, None);
    }
}
