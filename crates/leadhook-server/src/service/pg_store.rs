//! Postgres-backed implementation of the webhook store traits.

use std::str::FromStr;
use std::time::Duration;

use jiff::Timestamp;
use leadhook_postgres::model::{
    NewWebhookDelivery, NewWebhookEndpoint, NewWebhookPendingDelivery, UpdateWebhookEndpoint,
    WebhookDelivery, WebhookEndpoint, WebhookPendingDelivery,
};
use leadhook_postgres::query::{
    Pagination as PgPagination, WebhookDeliveryRepository, WebhookEndpointRepository,
    WebhookPendingDeliveryRepository,
};
use leadhook_postgres::{PgClient, PgConn, PgError};
use leadhook_webhook::store::{
    DeliveryAttempt, DeliveryLogStore, Endpoint, EndpointStore, EndpointUpdate, FailureRecord,
    NewDeliveryAttempt, NewEndpoint, NewPendingDelivery, Page, Pagination, PendingDelivery,
    PendingDeliveryStore,
};
use leadhook_webhook::{Error, ErrorKind, Result, WebhookEvent};
use uuid::Uuid;

/// Tracing target for the Postgres store adapter.
const TRACING_TARGET: &str = "leadhook_server::service::pg_store";

/// Webhook storage on top of a [`PgClient`] connection pool.
#[derive(Clone)]
pub struct PgWebhookStore {
    client: PgClient,
}

impl PgWebhookStore {
    pub fn new(client: PgClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &PgClient {
        &self.client
    }

    async fn connection(&self) -> Result<PgConn> {
        self.client.get_connection().await.map_err(storage_error)
    }
}

impl std::fmt::Debug for PgWebhookStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgWebhookStore")
            .field("pool", &self.client.pool_status())
            .finish()
    }
}

/// Maps a database error onto the core error kinds.
///
/// A foreign key violation means the referenced endpoint is gone.
fn storage_error(err: PgError) -> Error {
    if err.is_foreign_key_violation() {
        return Error::not_found("webhook endpoint not found").with_source(err);
    }
    Error::from_source(ErrorKind::Storage, err).with_message("database operation failed")
}

fn to_pg_pagination(pagination: Pagination) -> PgPagination {
    PgPagination::new(i64::from(pagination.limit), i64::from(pagination.offset))
}

fn status_to_db(status_code: Option<u16>) -> Option<i32> {
    status_code.map(i32::from)
}

fn status_from_db(status_code: Option<i32>) -> Option<u16> {
    status_code.and_then(|code| u16::try_from(code).ok())
}

fn count_from_db(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}

fn event_names(events: &[WebhookEvent]) -> Vec<String> {
    events.iter().map(ToString::to_string).collect()
}

fn endpoint_from_model(model: WebhookEndpoint) -> Endpoint {
    let events = model
        .events
        .iter()
        .filter_map(|name| match WebhookEvent::from_str(name) {
            Ok(event) => Some(event),
            Err(_) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    endpoint_id = %model.id,
                    event = %name,
                    "Ignoring unknown stored event name"
                );
                None
            }
        })
        .collect();

    Endpoint {
        id: model.id,
        name: model.name,
        url: model.url,
        events,
        secret: model.secret,
        enabled: model.enabled,
        failure_count: u32::try_from(model.failure_count).unwrap_or(0),
        last_triggered_at: model.last_triggered_at.map(Into::into),
        last_status_code: status_from_db(model.last_status_code),
        created_at: model.created_at.into(),
        updated_at: model.updated_at.into(),
    }
}

fn update_to_model(update: EndpointUpdate) -> UpdateWebhookEndpoint {
    // Re-enabling gives the endpoint a fresh failure budget.
    let failure_count = (update.enabled == Some(true)).then_some(0);

    UpdateWebhookEndpoint {
        name: update.name,
        url: update.url,
        events: update.events.as_deref().map(event_names),
        secret: update.secret,
        enabled: update.enabled,
        failure_count,
        ..Default::default()
    }
}

fn attempt_from_model(model: WebhookDelivery) -> Result<DeliveryAttempt> {
    let event = WebhookEvent::from_str(&model.event).map_err(|_| {
        Error::new(ErrorKind::Serialization)
            .with_message(format!("unknown event name '{}' in delivery log", model.event))
    })?;

    Ok(DeliveryAttempt {
        id: model.id,
        endpoint_id: model.endpoint_id,
        event,
        payload: model.payload,
        status_code: status_from_db(model.status_code),
        response_body: model.response_body,
        error: model.error,
        attempt_number: u32::try_from(model.attempt_number).unwrap_or(0),
        attempted_at: model.attempted_at.into(),
        duration_ms: u64::try_from(model.duration_ms).unwrap_or(0),
    })
}

fn attempt_to_model(attempt: NewDeliveryAttempt) -> NewWebhookDelivery {
    NewWebhookDelivery {
        id: Uuid::now_v7(),
        endpoint_id: attempt.endpoint_id,
        event: attempt.event.to_string(),
        payload: attempt.payload,
        status_code: status_to_db(attempt.status_code),
        response_body: attempt.response_body,
        error: attempt.error,
        attempt_number: i32::try_from(attempt.attempt_number).unwrap_or(i32::MAX),
        attempted_at: attempt.attempted_at.into(),
        duration_ms: i64::try_from(attempt.duration_ms).unwrap_or(i64::MAX),
    }
}

fn pending_from_model(model: WebhookPendingDelivery) -> Result<PendingDelivery> {
    Ok(PendingDelivery {
        id: model.id,
        endpoint_id: model.endpoint_id,
        payload: serde_json::from_value(model.payload)?,
        next_attempt_index: u32::try_from(model.next_attempt_index).unwrap_or(0),
        next_attempt_at: model.next_attempt_at.into(),
        claimed_until: model.claimed_until.map(Into::into),
        created_at: model.created_at.into(),
    })
}

fn pending_to_model(pending: NewPendingDelivery) -> Result<NewWebhookPendingDelivery> {
    Ok(NewWebhookPendingDelivery {
        id: Uuid::now_v7(),
        endpoint_id: pending.endpoint_id,
        payload: serde_json::to_value(&pending.payload)?,
        next_attempt_index: i32::try_from(pending.next_attempt_index).unwrap_or(i32::MAX),
        next_attempt_at: pending.next_attempt_at.into(),
    })
}

#[async_trait::async_trait]
impl EndpointStore for PgWebhookStore {
    async fn create_endpoint(&self, endpoint: NewEndpoint) -> Result<Endpoint> {
        let mut conn = self.connection().await?;
        let new_endpoint = NewWebhookEndpoint::new(
            endpoint.name,
            endpoint.url,
            event_names(&endpoint.events),
            endpoint.secret,
            endpoint.enabled,
        );

        let model = conn
            .create_webhook_endpoint(new_endpoint)
            .await
            .map_err(storage_error)?;
        Ok(endpoint_from_model(model))
    }

    async fn find_endpoint(&self, endpoint_id: Uuid) -> Result<Option<Endpoint>> {
        let mut conn = self.connection().await?;
        let model = conn
            .find_webhook_endpoint_by_id(endpoint_id)
            .await
            .map_err(storage_error)?;
        Ok(model.map(endpoint_from_model))
    }

    async fn list_endpoints(&self, pagination: Pagination) -> Result<Page<Endpoint>> {
        let mut conn = self.connection().await?;
        let models = conn
            .list_webhook_endpoints(to_pg_pagination(pagination))
            .await
            .map_err(storage_error)?;
        let total = conn.count_webhook_endpoints().await.map_err(storage_error)?;

        Ok(Page {
            items: models.into_iter().map(endpoint_from_model).collect(),
            total: count_from_db(total),
        })
    }

    async fn update_endpoint(
        &self,
        endpoint_id: Uuid,
        update: EndpointUpdate,
    ) -> Result<Option<Endpoint>> {
        let mut conn = self.connection().await?;
        let model = conn
            .update_webhook_endpoint(endpoint_id, update_to_model(update))
            .await
            .map_err(storage_error)?;
        Ok(model.map(endpoint_from_model))
    }

    async fn delete_endpoint(&self, endpoint_id: Uuid) -> Result<bool> {
        let mut conn = self.connection().await?;
        conn.delete_webhook_endpoint(endpoint_id)
            .await
            .map_err(storage_error)
    }

    async fn list_subscribed(&self, event: WebhookEvent) -> Result<Vec<Endpoint>> {
        let mut conn = self.connection().await?;
        let name: &'static str = event.into();
        let models = conn
            .list_subscribed_webhook_endpoints(name)
            .await
            .map_err(storage_error)?;
        Ok(models.into_iter().map(endpoint_from_model).collect())
    }

    async fn record_success(
        &self,
        endpoint_id: Uuid,
        status_code: Option<u16>,
        at: Timestamp,
    ) -> Result<bool> {
        let mut conn = self.connection().await?;
        conn.record_webhook_success(endpoint_id, status_to_db(status_code), at)
            .await
            .map_err(storage_error)
    }

    async fn record_failure(
        &self,
        endpoint_id: Uuid,
        status_code: Option<u16>,
        at: Timestamp,
        threshold: u32,
    ) -> Result<Option<FailureRecord>> {
        let mut conn = self.connection().await?;
        let threshold = i32::try_from(threshold).unwrap_or(i32::MAX);
        let state = conn
            .record_webhook_failure(endpoint_id, status_to_db(status_code), at, threshold)
            .await
            .map_err(storage_error)?;

        Ok(state.map(|state| FailureRecord {
            failure_count: u32::try_from(state.failure_count).unwrap_or(0),
            enabled: state.enabled,
        }))
    }

    async fn touch_endpoint(
        &self,
        endpoint_id: Uuid,
        status_code: Option<u16>,
        at: Timestamp,
    ) -> Result<bool> {
        let mut conn = self.connection().await?;
        conn.touch_webhook_endpoint(endpoint_id, status_to_db(status_code), at)
            .await
            .map_err(storage_error)
    }

    async fn ping(&self) -> Result<()> {
        self.client.ping().await.map_err(storage_error)
    }
}

#[async_trait::async_trait]
impl DeliveryLogStore for PgWebhookStore {
    async fn insert_attempt(&self, attempt: NewDeliveryAttempt) -> Result<DeliveryAttempt> {
        let mut conn = self.connection().await?;
        let model = conn
            .create_webhook_delivery(attempt_to_model(attempt))
            .await
            .map_err(storage_error)?;
        attempt_from_model(model)
    }

    async fn list_attempts(
        &self,
        endpoint_id: Uuid,
        pagination: Pagination,
    ) -> Result<Page<DeliveryAttempt>> {
        let mut conn = self.connection().await?;
        let models = conn
            .list_webhook_deliveries(endpoint_id, to_pg_pagination(pagination))
            .await
            .map_err(storage_error)?;
        let total = conn
            .count_webhook_deliveries(endpoint_id)
            .await
            .map_err(storage_error)?;

        Ok(Page {
            items: models
                .into_iter()
                .map(attempt_from_model)
                .collect::<Result<Vec<_>>>()?,
            total: count_from_db(total),
        })
    }
}

#[async_trait::async_trait]
impl PendingDeliveryStore for PgWebhookStore {
    async fn insert_pending(&self, pending: NewPendingDelivery) -> Result<PendingDelivery> {
        let new_pending = pending_to_model(pending)?;
        let mut conn = self.connection().await?;
        let model = conn
            .create_pending_delivery(new_pending)
            .await
            .map_err(storage_error)?;
        pending_from_model(model)
    }

    async fn claim_due(
        &self,
        now: Timestamp,
        lease: Duration,
        limit: u32,
    ) -> Result<Vec<PendingDelivery>> {
        let lease_until = now.checked_add(lease).map_err(|err| {
            Error::from_source(ErrorKind::Configuration, err)
                .with_message("retry lease is out of range")
        })?;

        let mut conn = self.connection().await?;
        let models = conn
            .claim_due_pending_deliveries(now, lease_until, i64::from(limit))
            .await
            .map_err(storage_error)?;

        let mut claimed = Vec::with_capacity(models.len());
        for model in models {
            let pending_id = model.id;
            match pending_from_model(model) {
                Ok(pending) => claimed.push(pending),
                Err(err) => {
                    // An unreadable payload can never be delivered; drop it.
                    tracing::error!(
                        target: TRACING_TARGET,
                        pending_id = %pending_id,
                        error = %err,
                        "Discarding pending delivery with unreadable payload"
                    );
                    conn.delete_pending_delivery(pending_id)
                        .await
                        .map_err(storage_error)?;
                }
            }
        }

        Ok(claimed)
    }

    async fn delete_pending(&self, pending_id: Uuid) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.delete_pending_delivery(pending_id)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn list_pending(&self, endpoint_id: Uuid) -> Result<Vec<PendingDelivery>> {
        let mut conn = self.connection().await?;
        let models = conn
            .list_pending_deliveries(endpoint_id)
            .await
            .map_err(storage_error)?;
        models.into_iter().map(pending_from_model).collect()
    }
}

#[cfg(test)]
mod tests {
    use leadhook_webhook::EventPayload;
    use leadhook_webhook::store::WebhookStore;

    use super::*;

    fn endpoint_model(events: Vec<&str>) -> WebhookEndpoint {
        let now = Timestamp::now();
        WebhookEndpoint {
            id: Uuid::now_v7(),
            name: "CRM sync".to_owned(),
            url: "https://hooks.example.com/crm".to_owned(),
            events: events.into_iter().map(str::to_owned).collect(),
            secret: Some("s1".to_owned()),
            enabled: true,
            failure_count: 3,
            last_triggered_at: Some(now.into()),
            last_status_code: Some(500),
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn endpoint_conversion_skips_unknown_events() {
        let endpoint = endpoint_from_model(endpoint_model(vec!["lead.created", "lead.merged"]));
        assert_eq!(endpoint.events, vec![WebhookEvent::LeadCreated]);
        assert_eq!(endpoint.failure_count, 3);
        assert_eq!(endpoint.last_status_code, Some(500));
    }

    #[test]
    fn re_enabling_resets_failure_count() {
        let update = update_to_model(EndpointUpdate {
            enabled: Some(true),
            ..Default::default()
        });
        assert_eq!(update.failure_count, Some(0));

        let update = update_to_model(EndpointUpdate {
            enabled: Some(false),
            events: Some(vec![WebhookEvent::ContactDeleted]),
            ..Default::default()
        });
        assert_eq!(update.failure_count, None);
        assert_eq!(update.events, Some(vec!["contact.deleted".to_owned()]));
    }

    #[test]
    fn missing_status_is_stored_as_null() {
        assert_eq!(status_to_db(None), None);
        assert_eq!(status_to_db(Some(404)), Some(404));
        assert_eq!(status_from_db(Some(-1)), None);
    }

    #[test]
    fn pending_payload_round_trips_through_json() {
        let payload = EventPayload::test(Uuid::now_v7());
        let model = pending_to_model(NewPendingDelivery {
            endpoint_id: Uuid::now_v7(),
            payload: payload.clone(),
            next_attempt_index: 2,
            next_attempt_at: Timestamp::now(),
        })
        .unwrap();

        let stored = WebhookPendingDelivery {
            id: model.id,
            endpoint_id: model.endpoint_id,
            payload: model.payload,
            next_attempt_index: model.next_attempt_index,
            next_attempt_at: model.next_attempt_at,
            claimed_until: None,
            created_at: Timestamp::now().into(),
        };
        let pending = pending_from_model(stored).unwrap();
        assert_eq!(pending.payload, payload);
        assert_eq!(pending.next_attempt_index, 2);
    }

    #[test]
    fn unknown_delivery_event_is_a_serialization_error() {
        let delivery = WebhookDelivery {
            id: Uuid::now_v7(),
            endpoint_id: Uuid::now_v7(),
            event: "lead.merged".to_owned(),
            payload: serde_json::json!({}),
            status_code: None,
            response_body: None,
            error: Some("timeout".to_owned()),
            attempt_number: 0,
            attempted_at: Timestamp::now().into(),
            duration_ms: 10,
        };
        let err = attempt_from_model(delivery).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Serialization);
    }

    /// Runs against a real database when `POSTGRES_URL` is set.
    #[tokio::test]
    #[ignore = "requires a Postgres database in POSTGRES_URL"]
    async fn postgres_store_round_trip() -> anyhow::Result<()> {
        use leadhook_postgres::{PgClientExt, PgConfig};

        let url = std::env::var("POSTGRES_URL")?;
        let client = PgConfig::new(url).build()?;
        client.run_pending_migrations().await?;
        let store: std::sync::Arc<dyn WebhookStore> =
            std::sync::Arc::new(PgWebhookStore::new(client));

        let endpoint = store
            .create_endpoint(NewEndpoint {
                name: "CRM sync".to_owned(),
                url: "https://hooks.example.com/crm".to_owned(),
                events: vec![WebhookEvent::LeadCreated],
                secret: Some("s1".to_owned()),
                enabled: true,
            })
            .await?;

        let record = store
            .record_failure(endpoint.id, Some(500), Timestamp::now(), 10)
            .await?
            .ok_or_else(|| anyhow::anyhow!("endpoint vanished"))?;
        assert_eq!(record.failure_count, 1);
        assert!(record.enabled);

        assert!(store.delete_endpoint(endpoint.id).await?);
        assert!(store.find_endpoint(endpoint.id).await?.is_none());
        Ok(())
    }
}
