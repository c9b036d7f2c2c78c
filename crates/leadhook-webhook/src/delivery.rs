//! Delivery executor: one timed, signed POST per attempt.

use std::error::Error as StdError;
use std::fmt;

use jiff::Timestamp;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, redirect};
#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout_at};

use crate::config::DeliveryConfig;
use crate::safety::UrlGuard;
use crate::store::Endpoint;
use crate::{Error, ErrorKind, EventPayload, Result, TRACING_TARGET_DELIVERY, signature};

/// Header carrying the payload id.
pub const HEADER_ID: &str = "X-Webhook-ID";
/// Header carrying the dotted event name.
pub const HEADER_EVENT: &str = "X-Webhook-Event";
/// Header carrying the send time in Unix seconds.
pub const HEADER_TIMESTAMP: &str = "X-Webhook-Timestamp";
/// Header carrying the `sha256=` body signature.
pub const HEADER_SIGNATURE: &str = "X-Webhook-Signature";

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    /// Whether the endpoint answered with a 2xx status.
    pub success: bool,
    /// HTTP status, or 0 when no response was received.
    pub status_code: u16,
    /// Response body, truncated.
    pub response_body: Option<String>,
    /// Classified failure text.
    pub error: Option<String>,
    /// Wall-clock duration of the attempt.
    pub duration_ms: u64,
}

impl DeliveryOutcome {
    /// An attempt that was refused before any I/O.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code: 0,
            response_body: None,
            error: Some(reason.into()),
            duration_ms: 0,
        }
    }

    /// Returns the status code, or `None` if no response was received.
    #[inline]
    pub fn status(&self) -> Option<u16> {
        (self.status_code != 0).then_some(self.status_code)
    }
}

/// Sends payloads to endpoints and classifies the result.
///
/// `execute` never returns an error. Every failure, including unsafe URLs and
/// transport errors, is reported through [`DeliveryOutcome`].
#[derive(Clone)]
pub struct DeliveryExecutor {
    http: Client,
    guard: UrlGuard,
    config: DeliveryConfig,
}

impl fmt::Debug for DeliveryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryExecutor")
            .field("guard", &self.guard)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DeliveryExecutor {
    /// Creates an executor with a guard derived from the configuration.
    pub fn new(config: DeliveryConfig) -> Result<Self> {
        let guard = UrlGuard::new(config.url_policy());
        Self::with_guard(config, guard)
    }

    /// Creates an executor with a custom guard.
    pub fn with_guard(config: DeliveryConfig, guard: UrlGuard) -> Result<Self> {
        config.validate()?;

        // Redirects could bounce the request to an address the guard never saw.
        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|err| {
                Error::from_source(ErrorKind::Configuration, err)
                    .with_message("failed to build webhook HTTP client")
            })?;

        tracing::debug!(
            target: TRACING_TARGET_DELIVERY,
            timeout_ms = config.timeout().as_millis() as u64,
            max_response_body_bytes = config.max_response_body_bytes,
            "Created delivery executor"
        );

        Ok(Self {
            http,
            guard,
            config,
        })
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn guard(&self) -> &UrlGuard {
        &self.guard
    }

    /// Delivers `payload` to `endpoint`.
    #[tracing::instrument(
        skip_all,
        fields(endpoint_id = %endpoint.id, event = %payload.event, attempt = attempt_number)
    )]
    pub async fn execute(
        &self,
        endpoint: &Endpoint,
        payload: &EventPayload,
        attempt_number: u32,
    ) -> DeliveryOutcome {
        let started_at = Instant::now();
        let deadline = started_at + self.config.timeout();

        let verdict = self.guard.check_resolved_until(&endpoint.url, deadline).await;
        if !verdict.valid {
            tracing::warn!(
                target: TRACING_TARGET_DELIVERY,
                reason = verdict.reason(),
                "Webhook URL rejected, skipping delivery"
            );
            let mut outcome = DeliveryOutcome::rejected(verdict.reason());
            outcome.duration_ms = elapsed_ms(started_at);
            return outcome;
        }

        let body = match payload.to_body() {
            Ok(body) => body,
            Err(err) => {
                let mut outcome = DeliveryOutcome::rejected(format!("request failed: {err}"));
                outcome.duration_ms = elapsed_ms(started_at);
                return outcome;
            }
        };

        let mut request = self
            .http
            .post(&endpoint.url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(HEADER_ID, payload.id.to_string())
            .header(HEADER_EVENT, payload.event.as_ref())
            .header(HEADER_TIMESTAMP, Timestamp::now().as_second().to_string());

        if let Some(secret) = endpoint.secret.as_deref().filter(|s| !s.is_empty()) {
            match signature::sign(secret, &body) {
                Ok(value) => request = request.header(HEADER_SIGNATURE, value),
                Err(err) => {
                    let mut outcome = DeliveryOutcome::rejected(format!("request failed: {err}"));
                    outcome.duration_ms = elapsed_ms(started_at);
                    return outcome;
                }
            }
        }

        tracing::debug!(
            target: TRACING_TARGET_DELIVERY,
            url = %endpoint.url,
            signed = endpoint.has_secret(),
            body_bytes = body.len(),
            "Delivering webhook"
        );

        let sent = timeout_at(deadline, request.body(body).send()).await;

        let mut response = match sent {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                let error = classify_transport_error(&err);
                let duration_ms = elapsed_ms(started_at);
                tracing::warn!(
                    target: TRACING_TARGET_DELIVERY,
                    error = %error,
                    duration_ms,
                    "Webhook delivery failed"
                );
                return DeliveryOutcome {
                    success: false,
                    status_code: 0,
                    response_body: None,
                    error: Some(error),
                    duration_ms,
                };
            }
            Err(_elapsed) => {
                let duration_ms = elapsed_ms(started_at);
                tracing::warn!(
                    target: TRACING_TARGET_DELIVERY,
                    duration_ms,
                    "Webhook delivery timed out"
                );
                return DeliveryOutcome {
                    success: false,
                    status_code: 0,
                    response_body: None,
                    error: Some("timeout".to_owned()),
                    duration_ms,
                };
            }
        };

        let status = response.status();
        let status_code = status.as_u16();
        let success = status.is_success();

        // The body shares the attempt deadline; a slow body keeps what arrived.
        let mut buffer = Vec::new();
        let limit = self.config.max_response_body_bytes;
        let _ = timeout_at(deadline, read_limited(&mut response, &mut buffer, limit)).await;
        drop(response);

        let response_body = Some(truncate_body(buffer, limit)).filter(|b| !b.is_empty());
        let duration_ms = elapsed_ms(started_at);

        if success {
            tracing::info!(
                target: TRACING_TARGET_DELIVERY,
                status_code,
                duration_ms,
                "Webhook delivered"
            );
        } else {
            tracing::warn!(
                target: TRACING_TARGET_DELIVERY,
                status_code,
                duration_ms,
                "Webhook endpoint rejected delivery"
            );
        }

        DeliveryOutcome {
            success,
            status_code,
            response_body,
            error: (!success).then(|| format!("HTTP {status_code}")),
            duration_ms,
        }
    }
}

fn elapsed_ms(started_at: Instant) -> u64 {
    u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Reads body chunks into `buffer` until `limit` bytes are held.
async fn read_limited(response: &mut reqwest::Response, buffer: &mut Vec<u8>, limit: usize) {
    while buffer.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(limit - buffer.len());
                buffer.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(
                    target: TRACING_TARGET_DELIVERY,
                    error = %err,
                    "Failed to read webhook response body"
                );
                break;
            }
        }
    }
}

/// Cuts `bytes` to at most `max` bytes, ending on a UTF-8 boundary.
pub fn truncate_body(mut bytes: Vec<u8>, max: usize) -> String {
    bytes.truncate(max);
    match String::from_utf8(bytes) {
        Ok(text) => text,
        // Only the last character was cut in half.
        Err(err) if err.utf8_error().error_len().is_none() => {
            let valid = err.utf8_error().valid_up_to();
            let mut bytes = err.into_bytes();
            bytes.truncate(valid);
            String::from_utf8(bytes).unwrap_or_default()
        }
        Err(err) => {
            let mut text = String::from_utf8_lossy(err.as_bytes()).into_owned();
            let mut end = text.len().min(max);
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
            text
        }
    }
}

/// Maps a transport error to the text recorded on the attempt.
fn classify_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "timeout".to_owned()
    } else if err.is_connect() {
        format!("connection failed: {}", error_chain(err))
    } else {
        format!("request failed: {}", error_chain(err))
    }
}

/// Joins an error with its sources.
fn error_chain(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::safety::{DnsFailurePolicy, UrlPolicy};
    use crate::test_support::{HangingResolver, MockReceiver, endpoint_at};
    use crate::{WebhookEvent, payload};

    fn executor(config: DeliveryConfig) -> DeliveryExecutor {
        DeliveryExecutor::new(config.with_insecure_targets(true)).unwrap()
    }

    #[tokio::test]
    async fn success_is_2xx_and_signed() {
        let receiver = MockReceiver::start(200).await;
        let mut endpoint = endpoint_at(&receiver.url, &[WebhookEvent::LeadCreated]);
        endpoint.secret = Some("s1".into());

        let payload = payload::lead_created(&payload::tests::ada());
        let outcome = executor(DeliveryConfig::default())
            .execute(&endpoint, &payload, 0)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.status_code, 200);
        assert!(outcome.error.is_none());

        let received = receiver.received().await;
        assert_eq!(received.len(), 1);
        let request = &received[0];
        let header = |name: &str| {
            request
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };

        assert_eq!(header("content-type").as_deref(), Some("application/json"));
        assert_eq!(header("user-agent").as_deref(), Some("LeadHook/1.0"));
        assert_eq!(header("x-webhook-id"), Some(payload.id.to_string()));
        assert_eq!(header("x-webhook-event").as_deref(), Some("lead.created"));
        assert!(header("x-webhook-timestamp").unwrap().parse::<i64>().is_ok());

        let signature = header("x-webhook-signature").unwrap();
        assert!(signature::verify(&request.body, &signature, "s1"));
        assert_eq!(request.body, payload.to_body().unwrap());
    }

    #[tokio::test]
    async fn unsigned_without_secret() {
        let receiver = MockReceiver::start(204).await;
        let endpoint = endpoint_at(&receiver.url, &[WebhookEvent::LeadCreated]);

        let payload = payload::lead_created(&payload::tests::ada());
        let outcome = executor(DeliveryConfig::default())
            .execute(&endpoint, &payload, 0)
            .await;

        assert!(outcome.success);
        assert!(outcome.response_body.is_none());
        let received = receiver.received().await;
        assert!(received[0].headers.get("x-webhook-signature").is_none());
    }

    #[tokio::test]
    async fn non_2xx_preserves_status() {
        for status in [500, 404] {
            let receiver = MockReceiver::start(status).await;
            let endpoint = endpoint_at(&receiver.url, &[WebhookEvent::LeadCreated]);

            let payload = payload::lead_created(&payload::tests::ada());
            let outcome = executor(DeliveryConfig::default())
                .execute(&endpoint, &payload, 0)
                .await;

            assert!(!outcome.success);
            assert_eq!(outcome.status_code, status);
            assert_eq!(outcome.error, Some(format!("HTTP {status}")));
            assert_eq!(outcome.response_body.as_deref(), Some("mock response"));
        }
    }

    #[tokio::test]
    async fn body_is_truncated() {
        let receiver = MockReceiver::start(200).await;
        receiver.set_body("x".repeat(20_000)).await;
        let endpoint = endpoint_at(&receiver.url, &[WebhookEvent::LeadCreated]);

        let config = DeliveryConfig::default().with_max_response_body_bytes(100);
        let payload = payload::lead_created(&payload::tests::ada());
        let outcome = executor(config).execute(&endpoint, &payload, 0).await;

        assert_eq!(outcome.response_body.map(|b| b.len()), Some(100));
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let receiver = MockReceiver::start(200).await;
        receiver.set_delay(Duration::from_secs(10)).await;
        let endpoint = endpoint_at(&receiver.url, &[WebhookEvent::LeadCreated]);

        let config = DeliveryConfig::default().with_timeout_secs(1);
        let payload = payload::lead_created(&payload::tests::ada());
        let outcome = executor(config).execute(&endpoint, &payload, 0).await;

        assert!(!outcome.success);
        assert_eq!(outcome.status_code, 0);
        assert_eq!(outcome.error.as_deref(), Some("timeout"));
        assert!(outcome.duration_ms >= 1000);
    }

    #[tokio::test]
    async fn refused_connection_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = endpoint_at(&format!("http://{addr}/hook"), &[WebhookEvent::LeadCreated]);
        let payload = payload::lead_created(&payload::tests::ada());
        let outcome = executor(DeliveryConfig::default())
            .execute(&endpoint, &payload, 0)
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.status(), None);
        assert!(outcome.error.unwrap().starts_with("connection failed: "));
    }

    #[tokio::test]
    async fn unsafe_url_is_skipped_without_io() {
        let receiver = MockReceiver::start(200).await;
        let endpoint = endpoint_at(&receiver.url, &[WebhookEvent::LeadCreated]);

        let guard = UrlGuard::new(UrlPolicy::strict());
        let executor = DeliveryExecutor::with_guard(DeliveryConfig::default(), guard).unwrap();
        let payload = payload::lead_created(&payload::tests::ada());
        let outcome = executor.execute(&endpoint, &payload, 0).await;

        assert!(!outcome.success);
        assert_eq!(outcome.status_code, 0);
        assert_eq!(outcome.error.as_deref(), Some("only https URLs are allowed"));
        assert!(receiver.received().await.is_empty());
    }

    #[tokio::test]
    async fn hanging_lookup_stays_within_attempt_timeout() {
        let endpoint = endpoint_at("https://slow.example.com/hook", &[WebhookEvent::LeadCreated]);
        let payload = payload::lead_created(&payload::tests::ada());
        let config = DeliveryConfig::default().with_timeout_secs(1);

        let closed = UrlGuard::with_resolver(
            UrlPolicy::strict().with_dns_failure(DnsFailurePolicy::FailClosed),
            Arc::new(HangingResolver),
        );
        let executor = DeliveryExecutor::with_guard(config.clone(), closed).unwrap();
        let outcome = executor.execute(&endpoint, &payload, 0).await;
        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("DNS lookup failed: lookup timed out")
        );
        assert!(outcome.duration_ms >= 1000 && outcome.duration_ms < 5000);

        let open = UrlGuard::with_resolver(UrlPolicy::strict(), Arc::new(HangingResolver));
        let executor = DeliveryExecutor::with_guard(config, open).unwrap();
        let outcome = executor.execute(&endpoint, &payload, 0).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("timeout"));
        assert!(outcome.duration_ms < 5000);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // "é" is two bytes; cutting at 3 would split the second one.
        let text = truncate_body("éé".as_bytes().to_vec(), 3);
        assert_eq!(text, "é");

        let text = truncate_body(b"plain".to_vec(), 100);
        assert_eq!(text, "plain");

        let text = truncate_body(vec![0xff, 0xfe, b'a'], 2);
        assert!(text.len() <= 2);
    }
}
