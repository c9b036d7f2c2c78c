//! Retry scheduling over persisted pending deliveries.
//!
//! Failed attempts are re-armed as [`PendingDelivery`] rows due at the next
//! backoff step. [`RetryWorker`] polls for due rows, claims them under a
//! lease and hands them back to the [`Dispatcher`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use jiff::{SignedDuration, Timestamp};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::RetryConfig;
use crate::dispatch::Dispatcher;
use crate::store::{NewPendingDelivery, PendingDelivery, PendingDeliveryStore};
use crate::{Error, ErrorKind, EventPayload, Result, TRACING_TARGET_RETRY};

/// Delay before each attempt, indexed by attempt number.
///
/// Index 0 is the initial dispatch, followed by retries after 1 minute,
/// 5 minutes, 30 minutes, 2 hours and 24 hours.
pub const BACKOFF_SCHEDULE_MS: [u64; 6] = [0, 60_000, 300_000, 1_800_000, 7_200_000, 86_400_000];

/// Returns the attempt index that follows `completed`, if any.
pub fn next_attempt(completed: u32) -> Option<u32> {
    let next = completed.checked_add(1)?;
    ((next as usize) < BACKOFF_SCHEDULE_MS.len()).then_some(next)
}

/// Returns the delay before attempt `index`.
pub fn backoff_delay(index: u32) -> Option<Duration> {
    BACKOFF_SCHEDULE_MS
        .get(index as usize)
        .map(|ms| Duration::from_millis(*ms))
}

/// Persists the next attempt of a failed delivery.
#[derive(Clone)]
pub struct RetryScheduler {
    store: Arc<dyn PendingDeliveryStore>,
}

impl RetryScheduler {
    pub fn new(store: Arc<dyn PendingDeliveryStore>) -> Self {
        Self { store }
    }

    /// Arms the attempt after `completed_attempt`.
    ///
    /// Returns `None` once the backoff schedule is exhausted.
    pub async fn arm(
        &self,
        endpoint_id: Uuid,
        payload: &EventPayload,
        completed_attempt: u32,
    ) -> Result<Option<PendingDelivery>> {
        let Some(next_index) = next_attempt(completed_attempt) else {
            tracing::info!(
                target: TRACING_TARGET_RETRY,
                endpoint_id = %endpoint_id,
                payload_id = %payload.id,
                attempts = completed_attempt + 1,
                "Retry schedule exhausted, giving up"
            );
            return Ok(None);
        };

        let delay = backoff_delay(next_index).unwrap_or_default();
        let next_attempt_at = after(Timestamp::now(), delay)?;

        let pending = self
            .store
            .insert_pending(NewPendingDelivery {
                endpoint_id,
                payload: payload.clone(),
                next_attempt_index: next_index,
                next_attempt_at,
            })
            .await?;

        tracing::debug!(
            target: TRACING_TARGET_RETRY,
            endpoint_id = %endpoint_id,
            payload_id = %payload.id,
            next_attempt_index = next_index,
            next_attempt_at = %next_attempt_at,
            "Armed webhook retry"
        );

        Ok(Some(pending))
    }
}

fn after(now: Timestamp, delay: Duration) -> Result<Timestamp> {
    let delay = SignedDuration::try_from(delay).map_err(|err| {
        Error::from_source(ErrorKind::InternalError, err).with_message("retry delay out of range")
    })?;
    now.checked_add(delay).map_err(|err| {
        Error::from_source(ErrorKind::InternalError, err)
            .with_message("retry time out of range")
    })
}

/// Background worker that delivers due retries.
pub struct RetryWorker {
    dispatcher: Dispatcher,
    store: Arc<dyn PendingDeliveryStore>,
    config: RetryConfig,
}

impl RetryWorker {
    /// Creates a worker polling the dispatcher's store.
    pub fn new(dispatcher: Dispatcher, config: RetryConfig) -> Self {
        let store: Arc<dyn PendingDeliveryStore> = dispatcher.store();
        Self {
            dispatcher,
            store,
            config,
        }
    }

    /// Runs the worker until cancelled.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        tracing::info!(
            target: TRACING_TARGET_RETRY,
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            lease_secs = self.config.lease_secs,
            "Starting retry worker"
        );

        let result = self.run_inner(cancel).await;

        match &result {
            Ok(()) => {
                tracing::info!(
                    target: TRACING_TARGET_RETRY,
                    "Retry worker stopped"
                );
            }
            Err(err) => {
                tracing::error!(
                    target: TRACING_TARGET_RETRY,
                    error = %err,
                    "Retry worker failed"
                );
            }
        }

        result
    }

    async fn run_inner(&self, cancel: CancellationToken) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(
                        target: TRACING_TARGET_RETRY,
                        "Retry worker shutdown requested"
                    );
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = self.poll_once().await {
                        tracing::error!(
                            target: TRACING_TARGET_RETRY,
                            error = %err,
                            "Failed to poll pending deliveries"
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Claims and delivers one batch of due retries.
    ///
    /// Returns the number of deliveries claimed.
    pub async fn poll_once(&self) -> Result<usize> {
        let claimed = self
            .store
            .claim_due(Timestamp::now(), self.config.lease(), self.config.batch_size)
            .await?;

        if claimed.is_empty() {
            return Ok(0);
        }

        tracing::debug!(
            target: TRACING_TARGET_RETRY,
            count = claimed.len(),
            "Claimed due webhook retries"
        );

        let count = claimed.len();
        join_all(claimed.iter().map(|pending| self.complete(pending))).await;
        Ok(count)
    }

    async fn complete(&self, pending: &PendingDelivery) {
        let redelivery = self.dispatcher.redeliver(pending).await;
        if !redelivery.is_settled() {
            tracing::warn!(
                target: TRACING_TARGET_RETRY,
                pending_id = %pending.id,
                claimed_until = ?pending.claimed_until,
                "Keeping pending delivery until its lease expires"
            );
            return;
        }

        // A failed delete leaves the lease to expire, which means one
        // duplicate attempt at worst.
        if let Err(err) = self.store.delete_pending(pending.id).await {
            tracing::error!(
                target: TRACING_TARGET_RETRY,
                pending_id = %pending.id,
                error = %err,
                "Failed to remove completed pending delivery"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WebhookEvent;
    use crate::store::{EndpointStore, MemoryStore, NewEndpoint};

    #[test]
    fn backoff_table_is_exact() {
        assert_eq!(
            BACKOFF_SCHEDULE_MS,
            [0, 60_000, 300_000, 1_800_000, 7_200_000, 86_400_000]
        );
        assert_eq!(backoff_delay(1), Some(Duration::from_secs(60)));
        assert_eq!(backoff_delay(5), Some(Duration::from_secs(86_400)));
        assert_eq!(backoff_delay(6), None);
    }

    #[test]
    fn next_attempt_stops_at_table_end() {
        assert_eq!(next_attempt(0), Some(1));
        assert_eq!(next_attempt(4), Some(5));
        assert_eq!(next_attempt(5), None);
        assert_eq!(next_attempt(u32::MAX), None);
    }

    #[tokio::test]
    async fn arm_persists_next_step() {
        let store = MemoryStore::new();
        let endpoint = store
            .create_endpoint(NewEndpoint {
                name: "Retry target".into(),
                url: "https://hooks.example.com/".into(),
                events: vec![WebhookEvent::LeadDeleted],
                secret: None,
                enabled: true,
            })
            .await
            .unwrap();
        let scheduler = RetryScheduler::new(Arc::new(store.clone()));
        let payload = EventPayload::test(endpoint.id);

        let before = Timestamp::now();
        let pending = scheduler.arm(endpoint.id, &payload, 0).await.unwrap().unwrap();
        assert_eq!(pending.next_attempt_index, 1);
        assert_eq!(pending.payload, payload);

        let wait = pending.next_attempt_at.duration_since(before);
        assert!(wait >= SignedDuration::from_secs(60));
        assert!(wait < SignedDuration::from_secs(70));

        let none = scheduler.arm(endpoint.id, &payload, 5).await.unwrap();
        assert!(none.is_none());
        assert_eq!(store.list_pending(endpoint.id).await.unwrap().len(), 1);
    }
}
