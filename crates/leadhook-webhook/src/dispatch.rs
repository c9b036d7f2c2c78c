//! Dispatch orchestration: fan-out, attempt logging, tracking and retries.

use std::sync::Arc;

use futures::future::join_all;
use jiff::Timestamp;
#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delivery::{DeliveryExecutor, DeliveryOutcome};
use crate::payload::millis;
use crate::retry::RetryScheduler;
use crate::store::{Endpoint, NewDeliveryAttempt, PendingDelivery, WebhookStore};
use crate::tracker::{FailureTracker, TrackerVerdict};
use crate::{Error, EventPayload, Result, TRACING_TARGET_DISPATCH};

/// Per-endpoint result of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub endpoint_id: Uuid,
    pub success: bool,
    /// HTTP status, or 0 when no response was received.
    pub status_code: u16,
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Whether the endpoint is disabled after this attempt.
    pub disabled: bool,
    /// When the next retry is due, if one was armed.
    #[serde(with = "millis::option")]
    #[cfg_attr(feature = "schema", schemars(with = "Option<String>"))]
    pub retry_at: Option<Timestamp>,
    /// Bookkeeping failures for this endpoint (attempt log, tracker, retry).
    pub storage_error: Option<String>,
}

impl DispatchReport {
    fn new(endpoint_id: Uuid, outcome: &DeliveryOutcome) -> Self {
        Self {
            endpoint_id,
            success: outcome.success,
            status_code: outcome.status_code,
            error: outcome.error.clone(),
            duration_ms: outcome.duration_ms,
            disabled: false,
            retry_at: None,
            storage_error: None,
        }
    }

    fn push_storage_error(&mut self, err: &Error) {
        let text = err.to_string();
        self.storage_error = Some(match self.storage_error.take() {
            Some(prev) => format!("{prev}; {text}"),
            None => text,
        });
    }
}

/// What became of a claimed pending delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redelivery {
    /// The attempt ran and its follow-up, if any, was persisted.
    Delivered(DispatchReport),
    /// The endpoint was deleted or disabled meanwhile.
    Dropped,
    /// Storage failed before the retry chain could advance.
    ///
    /// The pending row must be kept so it is claimed again once its lease
    /// expires.
    Deferred,
}

impl Redelivery {
    /// Returns whether the pending row can be removed.
    #[inline]
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Deferred)
    }
}

/// Delivers events to every subscribed endpoint.
///
/// Cloning is cheap; clones share the store and HTTP client.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn WebhookStore>,
    executor: DeliveryExecutor,
    tracker: FailureTracker,
    scheduler: RetryScheduler,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn WebhookStore>, executor: DeliveryExecutor) -> Self {
        let tracker = FailureTracker::new(store.clone());
        let scheduler = RetryScheduler::new(store.clone());
        Self {
            store,
            executor,
            tracker,
            scheduler,
        }
    }

    /// Replaces the failure tracker.
    pub fn with_tracker(mut self, tracker: FailureTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Returns the backing store.
    pub fn store(&self) -> Arc<dyn WebhookStore> {
        self.store.clone()
    }

    pub fn executor(&self) -> &DeliveryExecutor {
        &self.executor
    }

    /// Delivers `payload` to all enabled endpoints subscribed to its event.
    ///
    /// Endpoints are handled concurrently and in isolation: a failure for one
    /// never prevents delivery to or logging for another.
    #[tracing::instrument(skip_all, fields(event = %payload.event, payload_id = %payload.id))]
    pub async fn dispatch(&self, payload: &EventPayload) -> Vec<DispatchReport> {
        let endpoints = match self.store.list_subscribed(payload.event).await {
            Ok(endpoints) => endpoints,
            Err(err) => {
                tracing::error!(
                    target: TRACING_TARGET_DISPATCH,
                    error = %err,
                    "Failed to load subscribed endpoints"
                );
                return Vec::new();
            }
        };

        if endpoints.is_empty() {
            tracing::debug!(
                target: TRACING_TARGET_DISPATCH,
                "No endpoints subscribed to event"
            );
            return Vec::new();
        }

        let reports = join_all(
            endpoints
                .iter()
                .map(|endpoint| self.deliver_and_track(endpoint, payload, 0)),
        )
        .await
        .into_iter()
        .map(|(report, _)| report)
        .collect::<Vec<_>>();

        let delivered = reports.iter().filter(|r| r.success).count();
        tracing::info!(
            target: TRACING_TARGET_DISPATCH,
            endpoints = reports.len(),
            delivered,
            failed = reports.len() - delivered,
            "Dispatched webhook event"
        );

        reports
    }

    /// Sends a synthetic `webhook.test` payload to one endpoint.
    ///
    /// The attempt is logged and the endpoint's last trigger is updated, but
    /// the failure counter and retries are left alone.
    #[tracing::instrument(skip_all, fields(endpoint_id = %endpoint_id))]
    pub async fn send_test(&self, endpoint_id: Uuid) -> Result<DispatchReport> {
        let endpoint = self
            .store
            .find_endpoint(endpoint_id)
            .await?
            .ok_or_else(|| Error::not_found("webhook endpoint not found"))?;

        let payload = EventPayload::test(endpoint.id);
        let attempted_at = Timestamp::now();
        let outcome = self.executor.execute(&endpoint, &payload, 0).await;

        let mut report = DispatchReport::new(endpoint.id, &outcome);
        report.disabled = !endpoint.enabled;

        if let Err(err) = self
            .log_attempt(&endpoint, &payload, &outcome, 0, attempted_at)
            .await
        {
            report.push_storage_error(&err);
        }
        if let Err(err) = self
            .store
            .touch_endpoint(endpoint.id, outcome.status(), Timestamp::now())
            .await
        {
            tracing::error!(
                target: TRACING_TARGET_DISPATCH,
                error = %err,
                "Failed to update endpoint after test delivery"
            );
            report.push_storage_error(&err);
        }

        tracing::info!(
            target: TRACING_TARGET_DISPATCH,
            success = outcome.success,
            status_code = outcome.status_code,
            "Sent test webhook"
        );

        Ok(report)
    }

    /// Re-attempts a pending delivery claimed by the retry worker.
    #[tracing::instrument(
        skip_all,
        fields(endpoint_id = %pending.endpoint_id, attempt = pending.next_attempt_index)
    )]
    pub async fn redeliver(&self, pending: &PendingDelivery) -> Redelivery {
        let endpoint = match self.store.find_endpoint(pending.endpoint_id).await {
            Ok(Some(endpoint)) => endpoint,
            Ok(None) => {
                tracing::debug!(
                    target: TRACING_TARGET_DISPATCH,
                    "Endpoint deleted, dropping retry"
                );
                return Redelivery::Dropped;
            }
            Err(err) => {
                tracing::error!(
                    target: TRACING_TARGET_DISPATCH,
                    error = %err,
                    "Failed to load endpoint for retry"
                );
                return Redelivery::Deferred;
            }
        };

        if !endpoint.enabled {
            tracing::debug!(
                target: TRACING_TARGET_DISPATCH,
                "Endpoint disabled, dropping retry"
            );
            return Redelivery::Dropped;
        }

        let (report, rearmed) = self
            .deliver_and_track(&endpoint, &pending.payload, pending.next_attempt_index)
            .await;

        if rearmed {
            Redelivery::Delivered(report)
        } else {
            Redelivery::Deferred
        }
    }

    /// Executes, logs, tracks and re-arms one attempt.
    ///
    /// The flag is `false` when a needed retry could not be persisted.
    async fn deliver_and_track(
        &self,
        endpoint: &Endpoint,
        payload: &EventPayload,
        attempt_number: u32,
    ) -> (DispatchReport, bool) {
        let attempted_at = Timestamp::now();
        let outcome = self
            .executor
            .execute(endpoint, payload, attempt_number)
            .await;
        let mut report = DispatchReport::new(endpoint.id, &outcome);

        if let Err(err) = self
            .log_attempt(endpoint, payload, &outcome, attempt_number, attempted_at)
            .await
        {
            report.push_storage_error(&err);
        }

        let verdict = match self.tracker.record(endpoint.id, &outcome).await {
            Ok(verdict) => verdict,
            Err(err) => {
                tracing::error!(
                    target: TRACING_TARGET_DISPATCH,
                    endpoint_id = %endpoint.id,
                    error = %err,
                    "Failed to record delivery outcome"
                );
                report.push_storage_error(&err);
                TrackerVerdict::default()
            }
        };
        report.disabled = verdict.disabled;

        if outcome.success || verdict.disabled {
            return (report, true);
        }

        match self
            .scheduler
            .arm(endpoint.id, payload, attempt_number)
            .await
        {
            Ok(pending) => {
                report.retry_at = pending.map(|p| p.next_attempt_at);
                (report, true)
            }
            Err(err) => {
                tracing::error!(
                    target: TRACING_TARGET_DISPATCH,
                    endpoint_id = %endpoint.id,
                    error = %err,
                    "Failed to schedule webhook retry"
                );
                report.push_storage_error(&err);
                (report, false)
            }
        }
    }

    async fn log_attempt(
        &self,
        endpoint: &Endpoint,
        payload: &EventPayload,
        outcome: &DeliveryOutcome,
        attempt_number: u32,
        attempted_at: Timestamp,
    ) -> Result<()> {
        let attempt = NewDeliveryAttempt {
            endpoint_id: endpoint.id,
            event: payload.event,
            payload: serde_json::to_value(payload)?,
            status_code: outcome.status(),
            response_body: outcome.response_body.clone(),
            error: outcome.error.clone(),
            attempt_number,
            attempted_at,
            duration_ms: outcome.duration_ms,
        };

        self.store.insert_attempt(attempt).await.map_err(|err| {
            tracing::error!(
                target: TRACING_TARGET_DISPATCH,
                endpoint_id = %endpoint.id,
                error = %err,
                "Failed to log delivery attempt"
            );
            err
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeliveryConfig;
    use crate::retry::RetryWorker;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use crate::store::{
        DeliveryAttempt, DeliveryLogStore, EndpointStore, EndpointUpdate, FailureRecord,
        MemoryStore, NewEndpoint, NewPendingDelivery, Page, Pagination, PendingDeliveryStore,
    };
    use crate::test_support::MockReceiver;
    use crate::{RetryConfig, WebhookEvent, payload, signature};

    fn dispatcher(store: &MemoryStore) -> Dispatcher {
        let config = DeliveryConfig::default().with_insecure_targets(true);
        let executor = DeliveryExecutor::new(config).unwrap();
        Dispatcher::new(Arc::new(store.clone()), executor)
    }

    async fn register(
        store: &MemoryStore,
        url: &str,
        events: &[WebhookEvent],
        secret: Option<&str>,
    ) -> Endpoint {
        store
            .create_endpoint(NewEndpoint {
                name: "Receiver".into(),
                url: url.into(),
                events: events.to_vec(),
                secret: secret.map(str::to_owned),
                enabled: true,
            })
            .await
            .unwrap()
    }

    /// Makes every pending delivery of the endpoint due now.
    async fn make_due(store: &MemoryStore, endpoint_id: Uuid) -> usize {
        let pending = store.list_pending(endpoint_id).await.unwrap();
        for p in &pending {
            store.delete_pending(p.id).await.unwrap();
            store
                .insert_pending(NewPendingDelivery {
                    endpoint_id,
                    payload: p.payload.clone(),
                    next_attempt_index: p.next_attempt_index,
                    next_attempt_at: Timestamp::now(),
                })
                .await
                .unwrap();
        }
        pending.len()
    }

    /// Store that fails selected operations until told otherwise.
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_find: Arc<AtomicBool>,
        fail_insert_pending: Arc<AtomicBool>,
    }

    fn outage() -> Error {
        Error::storage("connection reset")
    }

    #[async_trait::async_trait]
    impl EndpointStore for FlakyStore {
        async fn create_endpoint(&self, endpoint: NewEndpoint) -> Result<Endpoint> {
            self.inner.create_endpoint(endpoint).await
        }

        async fn find_endpoint(&self, endpoint_id: Uuid) -> Result<Option<Endpoint>> {
            if self.fail_find.swap(false, Ordering::SeqCst) {
                return Err(outage());
            }
            self.inner.find_endpoint(endpoint_id).await
        }

        async fn list_endpoints(&self, pagination: Pagination) -> Result<Page<Endpoint>> {
            self.inner.list_endpoints(pagination).await
        }

        async fn update_endpoint(
            &self,
            endpoint_id: Uuid,
            update: EndpointUpdate,
        ) -> Result<Option<Endpoint>> {
            self.inner.update_endpoint(endpoint_id, update).await
        }

        async fn delete_endpoint(&self, endpoint_id: Uuid) -> Result<bool> {
            self.inner.delete_endpoint(endpoint_id).await
        }

        async fn list_subscribed(&self, event: WebhookEvent) -> Result<Vec<Endpoint>> {
            self.inner.list_subscribed(event).await
        }

        async fn record_success(
            &self,
            endpoint_id: Uuid,
            status_code: Option<u16>,
            at: Timestamp,
        ) -> Result<bool> {
            self.inner.record_success(endpoint_id, status_code, at).await
        }

        async fn record_failure(
            &self,
            endpoint_id: Uuid,
            status_code: Option<u16>,
            at: Timestamp,
            threshold: u32,
        ) -> Result<Option<FailureRecord>> {
            self.inner
                .record_failure(endpoint_id, status_code, at, threshold)
                .await
        }

        async fn touch_endpoint(
            &self,
            endpoint_id: Uuid,
            status_code: Option<u16>,
            at: Timestamp,
        ) -> Result<bool> {
            self.inner.touch_endpoint(endpoint_id, status_code, at).await
        }
    }

    #[async_trait::async_trait]
    impl DeliveryLogStore for FlakyStore {
        async fn insert_attempt(&self, attempt: NewDeliveryAttempt) -> Result<DeliveryAttempt> {
            self.inner.insert_attempt(attempt).await
        }

        async fn list_attempts(
            &self,
            endpoint_id: Uuid,
            pagination: Pagination,
        ) -> Result<Page<DeliveryAttempt>> {
            self.inner.list_attempts(endpoint_id, pagination).await
        }
    }

    #[async_trait::async_trait]
    impl PendingDeliveryStore for FlakyStore {
        async fn insert_pending(&self, pending: NewPendingDelivery) -> Result<PendingDelivery> {
            if self.fail_insert_pending.swap(false, Ordering::SeqCst) {
                return Err(outage());
            }
            self.inner.insert_pending(pending).await
        }

        async fn claim_due(
            &self,
            now: Timestamp,
            lease: Duration,
            limit: u32,
        ) -> Result<Vec<PendingDelivery>> {
            self.inner.claim_due(now, lease, limit).await
        }

        async fn delete_pending(&self, pending_id: Uuid) -> Result<()> {
            self.inner.delete_pending(pending_id).await
        }

        async fn list_pending(&self, endpoint_id: Uuid) -> Result<Vec<PendingDelivery>> {
            self.inner.list_pending(endpoint_id).await
        }
    }

    /// Worker whose claims expire immediately, so kept rows are reclaimable.
    fn short_lease_worker(store: &FlakyStore) -> RetryWorker {
        let config = DeliveryConfig::default().with_insecure_targets(true);
        let executor = DeliveryExecutor::new(config).unwrap();
        let dispatcher = Dispatcher::new(Arc::new(store.clone()), executor);
        let retry = RetryConfig {
            lease_secs: 0,
            ..Default::default()
        };
        RetryWorker::new(dispatcher, retry)
    }

    async fn due_retry(store: &MemoryStore, endpoint_id: Uuid, index: u32) -> PendingDelivery {
        store
            .insert_pending(NewPendingDelivery {
                endpoint_id,
                payload: payload::lead_created(&payload::tests::ada()),
                next_attempt_index: index,
                next_attempt_at: Timestamp::now(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn ada_lovelace_is_delivered_once_and_signed() {
        let receiver = MockReceiver::start(200).await;
        let store = MemoryStore::new();
        let endpoint =
            register(&store, &receiver.url, &[WebhookEvent::LeadCreated], Some("s1")).await;

        let lead = payload::tests::ada();
        assert_eq!(lead.full_name(), "Ada Lovelace");
        let payload = payload::lead_created(&lead);
        let reports = dispatcher(&store).dispatch(&payload).await;

        assert_eq!(reports.len(), 1);
        assert!(reports[0].success);
        assert!(reports[0].retry_at.is_none());

        let page = store
            .list_attempts(endpoint.id, Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].status_code, Some(200));
        assert_eq!(page.items[0].attempt_number, 0);

        let received = receiver.received().await;
        assert_eq!(received.len(), 1);
        let header = received[0]
            .headers
            .get("x-webhook-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(signature::verify(&received[0].body, header, "s1"));

        let sent: EventPayload = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(sent.data["firstName"], "Ada");
        assert_eq!(sent.data["lastName"], "Lovelace");

        let endpoint = store.find_endpoint(endpoint.id).await.unwrap().unwrap();
        assert_eq!(endpoint.failure_count, 0);
        assert!(store.list_pending(endpoint.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_enabled_subscribers_receive() {
        let receiver = MockReceiver::start(200).await;
        let store = MemoryStore::new();
        register(&store, &receiver.url, &[WebhookEvent::LeadDeleted], None).await;
        let paused = register(&store, &receiver.url, &[WebhookEvent::LeadCreated], None).await;
        store
            .update_endpoint(
                paused.id,
                crate::store::EndpointUpdate {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let payload = payload::lead_created(&payload::tests::ada());
        let reports = dispatcher(&store).dispatch(&payload).await;

        assert!(reports.is_empty());
        assert!(receiver.received().await.is_empty());
    }

    #[tokio::test]
    async fn one_failing_endpoint_does_not_affect_another() {
        let ok = MockReceiver::start(200).await;
        let broken = MockReceiver::start(503).await;
        let store = MemoryStore::new();
        let good = register(&store, &ok.url, &[WebhookEvent::ContactCreated], None).await;
        let bad = register(&store, &broken.url, &[WebhookEvent::ContactCreated], None).await;

        let contact = crate::Contact {
            id: Uuid::now_v7(),
            first_name: "Charles".into(),
            last_name: "Babbage".into(),
            email: None,
            phone: None,
            company_id: None,
            title: None,
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        };
        let reports = dispatcher(&store)
            .dispatch(&payload::contact_created(&contact))
            .await;
        assert_eq!(reports.len(), 2);

        let good_report = reports.iter().find(|r| r.endpoint_id == good.id).unwrap();
        let bad_report = reports.iter().find(|r| r.endpoint_id == bad.id).unwrap();
        assert!(good_report.success);
        assert!(!bad_report.success);
        assert_eq!(bad_report.status_code, 503);
        assert!(bad_report.retry_at.is_some());

        assert_eq!(store.list_pending(good.id).await.unwrap().len(), 0);
        assert_eq!(store.list_pending(bad.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn nine_500s_then_a_tenth_disables() {
        let receiver = MockReceiver::start(500).await;
        let store = MemoryStore::new();
        let endpoint = register(&store, &receiver.url, &[WebhookEvent::LeadUpdated], None).await;
        let dispatcher = dispatcher(&store);

        let changes = payload::FieldChanges::new();
        for n in 1..=9u32 {
            let payload = payload::lead_updated(&payload::tests::ada(), &changes);
            let reports = dispatcher.dispatch(&payload).await;
            assert_eq!(reports.len(), 1);
            assert!(!reports[0].disabled);
            assert!(reports[0].retry_at.is_some());

            let current = store.find_endpoint(endpoint.id).await.unwrap().unwrap();
            assert_eq!(current.failure_count, n);
        }

        let current = store.find_endpoint(endpoint.id).await.unwrap().unwrap();
        assert!(current.enabled);
        let pending_before = store.list_pending(endpoint.id).await.unwrap().len();
        assert_eq!(pending_before, 9);

        let payload = payload::lead_updated(&payload::tests::ada(), &changes);
        let reports = dispatcher.dispatch(&payload).await;
        assert!(reports[0].disabled);
        assert!(reports[0].retry_at.is_none());

        let current = store.find_endpoint(endpoint.id).await.unwrap().unwrap();
        assert_eq!(current.failure_count, 10);
        assert!(!current.enabled);

        let pending_after = store.list_pending(endpoint.id).await.unwrap();
        assert_eq!(pending_after.len(), pending_before);
        assert!(pending_after.iter().all(|p| p.payload.id != payload.id));

        // Retries armed before the endpoint was disabled are dropped.
        make_due(&store, endpoint.id).await;
        let worker = RetryWorker::new(dispatcher.clone(), RetryConfig::default());
        assert_eq!(worker.poll_once().await.unwrap(), 9);
        assert!(store.list_pending(endpoint.id).await.unwrap().is_empty());
        assert_eq!(receiver.received().await.len(), 10);
    }

    #[tokio::test]
    async fn retry_reuses_payload_and_advances() {
        let receiver = MockReceiver::start(500).await;
        let store = MemoryStore::new();
        let endpoint =
            register(&store, &receiver.url, &[WebhookEvent::LeadCreated], Some("s1")).await;
        let dispatcher = dispatcher(&store);

        let payload = payload::lead_created(&payload::tests::ada());
        dispatcher.dispatch(&payload).await;

        receiver.set_status(200).await;
        assert_eq!(make_due(&store, endpoint.id).await, 1);
        let worker = RetryWorker::new(dispatcher.clone(), RetryConfig::default());
        assert_eq!(worker.poll_once().await.unwrap(), 1);

        let received = receiver.received().await;
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].body, received[1].body);

        let page = store
            .list_attempts(endpoint.id, Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        // Newest first.
        assert_eq!(page.items[0].attempt_number, 1);
        assert_eq!(page.items[0].status_code, Some(200));
        assert_eq!(page.items[1].attempt_number, 0);

        let endpoint = store.find_endpoint(endpoint.id).await.unwrap().unwrap();
        assert_eq!(endpoint.failure_count, 0);
        assert!(store.list_pending(endpoint.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_test_does_not_track_or_retry() {
        let receiver = MockReceiver::start(500).await;
        let store = MemoryStore::new();
        let endpoint = register(&store, &receiver.url, &[WebhookEvent::LeadCreated], None).await;

        let report = dispatcher(&store).send_test(endpoint.id).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.status_code, 500);
        assert!(report.retry_at.is_none());

        let current = store.find_endpoint(endpoint.id).await.unwrap().unwrap();
        assert_eq!(current.failure_count, 0);
        assert_eq!(current.last_status_code, Some(500));
        assert!(current.last_triggered_at.is_some());
        assert!(store.list_pending(endpoint.id).await.unwrap().is_empty());

        let page = store
            .list_attempts(endpoint.id, Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.items[0].event, WebhookEvent::Test);

        let missing = dispatcher(&store).send_test(Uuid::now_v7()).await;
        assert_eq!(missing.unwrap_err().kind, crate::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn retry_survives_endpoint_lookup_failure() {
        let receiver = MockReceiver::start(200).await;
        let store = FlakyStore::default();
        let endpoint = register(
            &store.inner,
            &receiver.url,
            &[WebhookEvent::LeadCreated],
            None,
        )
        .await;
        let pending = due_retry(&store.inner, endpoint.id, 2).await;
        let worker = short_lease_worker(&store);

        store.fail_find.store(true, Ordering::SeqCst);
        assert_eq!(worker.poll_once().await.unwrap(), 1);

        let kept = store.inner.list_pending(endpoint.id).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, pending.id);
        assert!(receiver.received().await.is_empty());

        // Reclaimed once the lease has expired.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(worker.poll_once().await.unwrap(), 1);

        assert_eq!(receiver.received().await.len(), 1);
        assert!(store.inner.list_pending(endpoint.id).await.unwrap().is_empty());
        let page = store
            .inner
            .list_attempts(endpoint.id, Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].attempt_number, 2);
    }

    #[tokio::test]
    async fn retry_survives_failure_to_arm_next_step() {
        let receiver = MockReceiver::start(500).await;
        let store = FlakyStore::default();
        let endpoint = register(
            &store.inner,
            &receiver.url,
            &[WebhookEvent::LeadCreated],
            None,
        )
        .await;
        let pending = due_retry(&store.inner, endpoint.id, 1).await;
        let worker = short_lease_worker(&store);

        store.fail_insert_pending.store(true, Ordering::SeqCst);
        assert_eq!(worker.poll_once().await.unwrap(), 1);

        // The attempt ran but the chain did not advance, so the row stays.
        assert_eq!(receiver.received().await.len(), 1);
        let kept = store.inner.list_pending(endpoint.id).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, pending.id);
        assert_eq!(kept[0].next_attempt_index, 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(worker.poll_once().await.unwrap(), 1);

        let next = store.inner.list_pending(endpoint.id).await.unwrap();
        assert_eq!(next.len(), 1);
        assert_ne!(next[0].id, pending.id);
        assert_eq!(next[0].next_attempt_index, 2);
    }

    #[tokio::test]
    async fn redeliver_classifies_outcomes() {
        let receiver = MockReceiver::start(200).await;
        let store = FlakyStore::default();
        let endpoint = register(
            &store.inner,
            &receiver.url,
            &[WebhookEvent::LeadCreated],
            None,
        )
        .await;
        let pending = due_retry(&store.inner, endpoint.id, 1).await;
        let config = DeliveryConfig::default().with_insecure_targets(true);
        let dispatcher = Dispatcher::new(
            Arc::new(store.clone()),
            DeliveryExecutor::new(config).unwrap(),
        );

        store.fail_find.store(true, Ordering::SeqCst);
        let deferred = dispatcher.redeliver(&pending).await;
        assert_eq!(deferred, Redelivery::Deferred);
        assert!(!deferred.is_settled());

        let delivered = dispatcher.redeliver(&pending).await;
        assert!(matches!(&delivered, Redelivery::Delivered(report) if report.success));
        assert!(delivered.is_settled());

        store.inner.delete_endpoint(endpoint.id).await.unwrap();
        assert_eq!(dispatcher.redeliver(&pending).await, Redelivery::Dropped);
    }
}
