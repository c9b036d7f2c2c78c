//! Webhook endpoint response types.

use jiff::Timestamp;
use leadhook_webhook::store::Endpoint;
use leadhook_webhook::{DispatchReport, WebhookEvent};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Page;

/// A registered webhook endpoint. The secret itself is never returned.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    /// Unique webhook identifier.
    pub webhook_id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// URL receiving the payloads.
    pub url: String,
    /// Subscribed events.
    pub events: Vec<WebhookEvent>,
    /// Whether deliveries are signed with a shared secret.
    pub has_secret: bool,
    /// Whether the endpoint receives events.
    pub enabled: bool,
    /// Consecutive failed attempts; the endpoint is disabled at 10.
    pub failure_count: u32,
    /// When a delivery was last attempted.
    pub last_triggered_at: Option<Timestamp>,
    /// Status code of the last attempt, absent when no response arrived.
    pub last_status_code: Option<u16>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Endpoint> for Webhook {
    fn from(endpoint: Endpoint) -> Self {
        Self {
            has_secret: endpoint.has_secret(),
            webhook_id: endpoint.id,
            name: endpoint.name,
            url: endpoint.url,
            events: endpoint.events,
            enabled: endpoint.enabled,
            failure_count: endpoint.failure_count,
            last_triggered_at: endpoint.last_triggered_at,
            last_status_code: endpoint.last_status_code,
            created_at: endpoint.created_at,
            updated_at: endpoint.updated_at,
        }
    }
}

/// Response for listing webhook endpoints.
pub type Webhooks = Page<Webhook>;

/// Result of a manual test delivery.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookTestResult {
    pub webhook_id: Uuid,
    /// Whether the endpoint answered with a 2xx status.
    pub success: bool,
    /// Response status, or 0 when no response was received.
    pub status_code: u16,
    /// Why the delivery failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl From<DispatchReport> for WebhookTestResult {
    fn from(report: DispatchReport) -> Self {
        Self {
            webhook_id: report.endpoint_id,
            success: report.success,
            status_code: report.status_code,
            error: report.error,
            duration_ms: report.duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(secret: Option<&str>) -> Endpoint {
        let now = Timestamp::now();
        Endpoint {
            id: Uuid::new_v4(),
            name: "CRM sync".to_owned(),
            url: "https://example.com/hook".to_owned(),
            events: vec![WebhookEvent::LeadCreated],
            secret: secret.map(str::to_owned),
            enabled: true,
            failure_count: 0,
            last_triggered_at: None,
            last_status_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn secret_is_never_serialized() {
        let webhook = Webhook::from(endpoint(Some("s1")));
        assert!(webhook.has_secret);

        let json = serde_json::to_value(&webhook).unwrap();
        assert_eq!(json["hasSecret"], true);
        assert_eq!(json["events"][0], "lead.created");
        assert!(json.get("secret").is_none());
        assert!(!json.to_string().contains("s1"));
    }

    #[test]
    fn empty_secret_is_unsigned() {
        assert!(!Webhook::from(endpoint(Some(""))).has_secret);
        assert!(!Webhook::from(endpoint(None)).has_secret);
    }
}
