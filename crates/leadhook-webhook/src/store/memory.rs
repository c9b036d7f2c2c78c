//! In-process implementation of the storage traits.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    DeliveryAttempt, DeliveryLogStore, Endpoint, EndpointStore, EndpointUpdate, FailureRecord,
    NewDeliveryAttempt, NewEndpoint, NewPendingDelivery, Page, Pagination, PendingDelivery,
    PendingDeliveryStore,
};
use crate::{Error, ErrorKind, Result, WebhookEvent};

#[derive(Debug, Default)]
struct Tables {
    // UUIDv7 keys keep creation order.
    endpoints: BTreeMap<Uuid, Endpoint>,
    attempts: Vec<DeliveryAttempt>,
    pending: BTreeMap<Uuid, PendingDelivery>,
}

/// Mutex-guarded in-memory store.
///
/// Every operation holds the lock for its whole read-modify-write, which makes
/// failure counting and pending claims atomic. Cloning shares the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T: Clone>(items: &[T], pagination: Pagination) -> Page<T> {
    let items_page = items
        .iter()
        .skip(pagination.offset as usize)
        .take(pagination.limit as usize)
        .cloned()
        .collect();

    Page {
        items: items_page,
        total: items.len() as u64,
    }
}

#[async_trait::async_trait]
impl EndpointStore for MemoryStore {
    async fn create_endpoint(&self, new: NewEndpoint) -> Result<Endpoint> {
        let now = Timestamp::now();
        let endpoint = Endpoint {
            id: Uuid::now_v7(),
            name: new.name,
            url: new.url,
            events: new.events,
            secret: new.secret,
            enabled: new.enabled,
            failure_count: 0,
            last_triggered_at: None,
            last_status_code: None,
            created_at: now,
            updated_at: now,
        };

        let mut tables = self.tables.lock().await;
        tables.endpoints.insert(endpoint.id, endpoint.clone());
        Ok(endpoint)
    }

    async fn find_endpoint(&self, endpoint_id: Uuid) -> Result<Option<Endpoint>> {
        let tables = self.tables.lock().await;
        Ok(tables.endpoints.get(&endpoint_id).cloned())
    }

    async fn list_endpoints(&self, pagination: Pagination) -> Result<Page<Endpoint>> {
        let tables = self.tables.lock().await;
        let all: Vec<_> = tables.endpoints.values().cloned().collect();
        Ok(paginate(&all, pagination))
    }

    async fn update_endpoint(
        &self,
        endpoint_id: Uuid,
        update: EndpointUpdate,
    ) -> Result<Option<Endpoint>> {
        let mut tables = self.tables.lock().await;
        let Some(endpoint) = tables.endpoints.get_mut(&endpoint_id) else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            endpoint.name = name;
        }
        if let Some(url) = update.url {
            endpoint.url = url;
        }
        if let Some(events) = update.events {
            endpoint.events = events;
        }
        if let Some(secret) = update.secret {
            endpoint.secret = secret;
        }
        if let Some(enabled) = update.enabled {
            endpoint.enabled = enabled;
            if enabled {
                endpoint.failure_count = 0;
            }
        }
        endpoint.updated_at = Timestamp::now();

        Ok(Some(endpoint.clone()))
    }

    async fn delete_endpoint(&self, endpoint_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if tables.endpoints.remove(&endpoint_id).is_none() {
            return Ok(false);
        }

        tables.attempts.retain(|a| a.endpoint_id != endpoint_id);
        tables.pending.retain(|_, p| p.endpoint_id != endpoint_id);
        Ok(true)
    }

    async fn list_subscribed(&self, event: WebhookEvent) -> Result<Vec<Endpoint>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .endpoints
            .values()
            .filter(|e| e.enabled && e.subscribes_to(event))
            .cloned()
            .collect())
    }

    async fn record_success(
        &self,
        endpoint_id: Uuid,
        status_code: Option<u16>,
        at: Timestamp,
    ) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let Some(endpoint) = tables.endpoints.get_mut(&endpoint_id) else {
            return Ok(false);
        };

        endpoint.failure_count = 0;
        endpoint.last_triggered_at = Some(at);
        endpoint.last_status_code = status_code;
        endpoint.updated_at = at;
        Ok(true)
    }

    async fn record_failure(
        &self,
        endpoint_id: Uuid,
        status_code: Option<u16>,
        at: Timestamp,
        threshold: u32,
    ) -> Result<Option<FailureRecord>> {
        let mut tables = self.tables.lock().await;
        let Some(endpoint) = tables.endpoints.get_mut(&endpoint_id) else {
            return Ok(None);
        };

        endpoint.failure_count = endpoint.failure_count.saturating_add(1);
        endpoint.last_triggered_at = Some(at);
        endpoint.last_status_code = status_code;
        endpoint.updated_at = at;
        if endpoint.failure_count >= threshold {
            endpoint.enabled = false;
        }

        Ok(Some(FailureRecord {
            failure_count: endpoint.failure_count,
            enabled: endpoint.enabled,
        }))
    }

    async fn touch_endpoint(
        &self,
        endpoint_id: Uuid,
        status_code: Option<u16>,
        at: Timestamp,
    ) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let Some(endpoint) = tables.endpoints.get_mut(&endpoint_id) else {
            return Ok(false);
        };

        endpoint.last_triggered_at = Some(at);
        endpoint.last_status_code = status_code;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl DeliveryLogStore for MemoryStore {
    async fn insert_attempt(&self, new: NewDeliveryAttempt) -> Result<DeliveryAttempt> {
        let mut tables = self.tables.lock().await;
        if !tables.endpoints.contains_key(&new.endpoint_id) {
            return Err(Error::not_found("webhook endpoint not found"));
        }

        let attempt = DeliveryAttempt {
            id: Uuid::now_v7(),
            endpoint_id: new.endpoint_id,
            event: new.event,
            payload: new.payload,
            status_code: new.status_code,
            response_body: new.response_body,
            error: new.error,
            attempt_number: new.attempt_number,
            attempted_at: new.attempted_at,
            duration_ms: new.duration_ms,
        };

        tables.attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn list_attempts(
        &self,
        endpoint_id: Uuid,
        pagination: Pagination,
    ) -> Result<Page<DeliveryAttempt>> {
        let tables = self.tables.lock().await;
        let mut matching: Vec<_> = tables
            .attempts
            .iter()
            .filter(|a| a.endpoint_id == endpoint_id)
            .cloned()
            .collect();
        // Newest first; ids break ties between attempts in the same instant.
        matching.sort_by(|a, b| {
            b.attempted_at
                .cmp(&a.attempted_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(paginate(&matching, pagination))
    }
}

#[async_trait::async_trait]
impl PendingDeliveryStore for MemoryStore {
    async fn insert_pending(&self, new: NewPendingDelivery) -> Result<PendingDelivery> {
        let mut tables = self.tables.lock().await;
        if !tables.endpoints.contains_key(&new.endpoint_id) {
            return Err(Error::not_found("webhook endpoint not found"));
        }

        let pending = PendingDelivery {
            id: Uuid::now_v7(),
            endpoint_id: new.endpoint_id,
            payload: new.payload,
            next_attempt_index: new.next_attempt_index,
            next_attempt_at: new.next_attempt_at,
            claimed_until: None,
            created_at: Timestamp::now(),
        };

        tables.pending.insert(pending.id, pending.clone());
        Ok(pending)
    }

    async fn claim_due(
        &self,
        now: Timestamp,
        lease: Duration,
        limit: u32,
    ) -> Result<Vec<PendingDelivery>> {
        let lease_until = now.checked_add(lease).map_err(|err| {
            Error::new(ErrorKind::InternalError)
                .with_message("claim lease overflows timestamp range")
                .with_source(err)
        })?;

        let mut tables = self.tables.lock().await;
        let mut due: Vec<_> = tables
            .pending
            .values()
            .filter(|p| p.next_attempt_at <= now)
            .filter(|p| p.claimed_until.is_none_or(|until| until < now))
            .map(|p| (p.next_attempt_at, p.id))
            .collect();
        due.sort();
        due.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            if let Some(pending) = tables.pending.get_mut(&id) {
                pending.claimed_until = Some(lease_until);
                claimed.push(pending.clone());
            }
        }

        Ok(claimed)
    }

    async fn delete_pending(&self, pending_id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.pending.remove(&pending_id);
        Ok(())
    }

    async fn list_pending(&self, endpoint_id: Uuid) -> Result<Vec<PendingDelivery>> {
        let tables = self.tables.lock().await;
        let mut pending: Vec<_> = tables
            .pending
            .values()
            .filter(|p| p.endpoint_id == endpoint_id)
            .cloned()
            .collect();
        pending.sort_by_key(|p| p.next_attempt_at);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventPayload;

    fn new_endpoint() -> NewEndpoint {
        NewEndpoint {
            name: "CRM sync".into(),
            url: "https://hooks.example.com/crm".into(),
            events: vec![WebhookEvent::LeadCreated],
            secret: None,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn failure_counting_disables_at_threshold() {
        let store = MemoryStore::new();
        let endpoint = store.create_endpoint(new_endpoint()).await.unwrap();
        let now = Timestamp::now();

        for expected in 1..=2 {
            let record = store
                .record_failure(endpoint.id, Some(500), now, 3)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(record.failure_count, expected);
            assert!(record.enabled);
        }

        let record = store
            .record_failure(endpoint.id, None, now, 3)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.failure_count, 3);
        assert!(!record.enabled);

        let missing = store
            .record_failure(Uuid::now_v7(), None, now, 3)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn concurrent_failures_are_all_counted() {
        let store = MemoryStore::new();
        let endpoint = store.create_endpoint(new_endpoint()).await.unwrap();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .record_failure(endpoint.id, Some(502), Timestamp::now(), 100)
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let endpoint = store.find_endpoint(endpoint.id).await.unwrap().unwrap();
        assert_eq!(endpoint.failure_count, 20);
    }

    #[tokio::test]
    async fn re_enable_resets_failure_count() {
        let store = MemoryStore::new();
        let endpoint = store.create_endpoint(new_endpoint()).await.unwrap();
        store
            .record_failure(endpoint.id, Some(500), Timestamp::now(), 1)
            .await
            .unwrap();

        let update = EndpointUpdate {
            enabled: Some(true),
            ..Default::default()
        };
        let endpoint = store
            .update_endpoint(endpoint.id, update)
            .await
            .unwrap()
            .unwrap();
        assert!(endpoint.enabled);
        assert_eq!(endpoint.failure_count, 0);
    }

    #[tokio::test]
    async fn claims_are_exclusive_until_lease_expires() {
        let store = MemoryStore::new();
        let endpoint = store.create_endpoint(new_endpoint()).await.unwrap();
        let now = Timestamp::now();

        store
            .insert_pending(NewPendingDelivery {
                endpoint_id: endpoint.id,
                payload: EventPayload::test(endpoint.id),
                next_attempt_index: 1,
                next_attempt_at: now,
            })
            .await
            .unwrap();

        let lease = Duration::from_secs(300);
        let first = store.claim_due(now, lease, 10).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = store.claim_due(now, lease, 10).await.unwrap();
        assert!(second.is_empty());

        let later = now.checked_add(Duration::from_secs(301)).unwrap();
        let third = store.claim_due(later, lease, 10).await.unwrap();
        assert_eq!(third.len(), 1);
    }

    #[tokio::test]
    async fn future_deliveries_are_not_claimed() {
        let store = MemoryStore::new();
        let endpoint = store.create_endpoint(new_endpoint()).await.unwrap();
        let now = Timestamp::now();

        store
            .insert_pending(NewPendingDelivery {
                endpoint_id: endpoint.id,
                payload: EventPayload::test(endpoint.id),
                next_attempt_index: 1,
                next_attempt_at: now.checked_add(Duration::from_secs(60)).unwrap(),
            })
            .await
            .unwrap();

        let claimed = store
            .claim_due(now, Duration::from_secs(300), 10)
            .await
            .unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn delete_cascades() {
        let store = MemoryStore::new();
        let endpoint = store.create_endpoint(new_endpoint()).await.unwrap();
        let payload = EventPayload::test(endpoint.id);

        store
            .insert_attempt(NewDeliveryAttempt {
                endpoint_id: endpoint.id,
                event: payload.event,
                payload: serde_json::to_value(&payload).unwrap(),
                status_code: Some(200),
                response_body: None,
                error: None,
                attempt_number: 0,
                attempted_at: Timestamp::now(),
                duration_ms: 12,
            })
            .await
            .unwrap();
        store
            .insert_pending(NewPendingDelivery {
                endpoint_id: endpoint.id,
                payload,
                next_attempt_index: 1,
                next_attempt_at: Timestamp::now(),
            })
            .await
            .unwrap();

        assert!(store.delete_endpoint(endpoint.id).await.unwrap());
        assert!(!store.delete_endpoint(endpoint.id).await.unwrap());

        let page = store
            .list_attempts(endpoint.id, Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(store.list_pending(endpoint.id).await.unwrap().is_empty());
    }
}
