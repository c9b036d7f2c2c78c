//! Consecutive failure counting and auto-disable.

use std::sync::Arc;

use jiff::Timestamp;
use uuid::Uuid;

use crate::delivery::DeliveryOutcome;
use crate::store::EndpointStore;
use crate::{Result, TRACING_TARGET_TRACKER};

/// Consecutive failures after which an endpoint is disabled.
pub const DISABLE_THRESHOLD: u32 = 10;

/// Endpoint state after an outcome was recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerVerdict {
    pub failure_count: u32,
    /// Whether the endpoint is disabled after this attempt.
    pub disabled: bool,
}

/// Feeds delivery outcomes into the endpoint's failure counter.
#[derive(Clone)]
pub struct FailureTracker {
    store: Arc<dyn EndpointStore>,
    threshold: u32,
}

impl FailureTracker {
    pub fn new(store: Arc<dyn EndpointStore>) -> Self {
        Self {
            store,
            threshold: DISABLE_THRESHOLD,
        }
    }

    /// Overrides the disable threshold.
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Records one attempt.
    ///
    /// A missing endpoint (deleted mid-flight) yields the default verdict.
    pub async fn record(&self, endpoint_id: Uuid, outcome: &DeliveryOutcome) -> Result<TrackerVerdict> {
        let now = Timestamp::now();

        if outcome.success {
            self.store
                .record_success(endpoint_id, outcome.status(), now)
                .await?;
            return Ok(TrackerVerdict::default());
        }

        let Some(record) = self
            .store
            .record_failure(endpoint_id, outcome.status(), now, self.threshold)
            .await?
        else {
            tracing::debug!(
                target: TRACING_TARGET_TRACKER,
                endpoint_id = %endpoint_id,
                "Endpoint vanished before failure was recorded"
            );
            return Ok(TrackerVerdict::default());
        };

        let verdict = TrackerVerdict {
            failure_count: record.failure_count,
            disabled: !record.enabled,
        };

        if verdict.disabled && record.failure_count == self.threshold {
            tracing::warn!(
                target: TRACING_TARGET_TRACKER,
                endpoint_id = %endpoint_id,
                failure_count = record.failure_count,
                "Webhook endpoint disabled after consecutive failures"
            );
        } else {
            tracing::debug!(
                target: TRACING_TARGET_TRACKER,
                endpoint_id = %endpoint_id,
                failure_count = record.failure_count,
                "Recorded webhook failure"
            );
        }

        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WebhookEvent;
    use crate::store::{MemoryStore, NewEndpoint};

    async fn setup() -> (MemoryStore, FailureTracker, Uuid) {
        let store = MemoryStore::new();
        let endpoint = store
            .create_endpoint(NewEndpoint {
                name: "Flaky".into(),
                url: "https://flaky.example.com/".into(),
                events: vec![WebhookEvent::LeadCreated],
                secret: None,
                enabled: true,
            })
            .await
            .unwrap();
        let tracker = FailureTracker::new(Arc::new(store.clone()));
        (store, tracker, endpoint.id)
    }

    fn failed(status_code: u16) -> DeliveryOutcome {
        DeliveryOutcome {
            success: false,
            status_code,
            response_body: None,
            error: Some(format!("HTTP {status_code}")),
            duration_ms: 5,
        }
    }

    fn succeeded() -> DeliveryOutcome {
        DeliveryOutcome {
            success: true,
            status_code: 200,
            response_body: None,
            error: None,
            duration_ms: 5,
        }
    }

    #[tokio::test]
    async fn nine_failures_keep_enabled_tenth_disables() {
        let (store, tracker, id) = setup().await;

        for n in 1..=9 {
            let verdict = tracker.record(id, &failed(500)).await.unwrap();
            assert_eq!(verdict.failure_count, n);
            assert!(!verdict.disabled);
        }
        assert!(store.find_endpoint(id).await.unwrap().unwrap().enabled);

        let verdict = tracker.record(id, &failed(500)).await.unwrap();
        assert_eq!(verdict.failure_count, 10);
        assert!(verdict.disabled);

        let endpoint = store.find_endpoint(id).await.unwrap().unwrap();
        assert!(!endpoint.enabled);
        assert_eq!(endpoint.last_status_code, Some(500));
    }

    #[tokio::test]
    async fn success_resets_count() {
        let (store, tracker, id) = setup().await;

        for _ in 0..3 {
            tracker.record(id, &failed(0)).await.unwrap();
        }
        let endpoint = store.find_endpoint(id).await.unwrap().unwrap();
        assert_eq!(endpoint.failure_count, 3);
        assert_eq!(endpoint.last_status_code, None);

        let verdict = tracker.record(id, &succeeded()).await.unwrap();
        assert_eq!(verdict, TrackerVerdict::default());

        let endpoint = store.find_endpoint(id).await.unwrap().unwrap();
        assert_eq!(endpoint.failure_count, 0);
        assert_eq!(endpoint.last_status_code, Some(200));
        assert!(endpoint.last_triggered_at.is_some());
    }

    #[tokio::test]
    async fn missing_endpoint_yields_default_verdict() {
        let (_, tracker, _) = setup().await;
        let verdict = tracker.record(Uuid::now_v7(), &failed(500)).await.unwrap();
        assert_eq!(verdict, TrackerVerdict::default());
    }
}
