//! Webhook endpoint repository.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
use uuid::Uuid;

use super::Pagination;
use crate::model::{
    NewWebhookEndpoint, UpdateWebhookEndpoint, WebhookEndpoint, WebhookFailureState,
};
use crate::{PgConnection, PgError, PgResult, TRACING_TARGET_QUERY, schema};

/// Repository for webhook endpoint operations.
pub trait WebhookEndpointRepository {
    /// Creates a new webhook endpoint.
    fn create_webhook_endpoint(
        &mut self,
        new_endpoint: NewWebhookEndpoint,
    ) -> impl Future<Output = PgResult<WebhookEndpoint>> + Send;

    /// Finds a webhook endpoint by ID.
    fn find_webhook_endpoint_by_id(
        &mut self,
        endpoint_id: Uuid,
    ) -> impl Future<Output = PgResult<Option<WebhookEndpoint>>> + Send;

    /// Lists endpoints, oldest first.
    fn list_webhook_endpoints(
        &mut self,
        pagination: Pagination,
    ) -> impl Future<Output = PgResult<Vec<WebhookEndpoint>>> + Send;

    /// Counts all endpoints.
    fn count_webhook_endpoints(&mut self) -> impl Future<Output = PgResult<i64>> + Send;

    /// Lists enabled endpoints subscribed to the named event.
    fn list_subscribed_webhook_endpoints(
        &mut self,
        event: &str,
    ) -> impl Future<Output = PgResult<Vec<WebhookEndpoint>>> + Send;

    /// Applies a changeset. Returns `None` if the endpoint does not exist.
    fn update_webhook_endpoint(
        &mut self,
        endpoint_id: Uuid,
        changes: UpdateWebhookEndpoint,
    ) -> impl Future<Output = PgResult<Option<WebhookEndpoint>>> + Send;

    /// Deletes an endpoint; deliveries and pending retries cascade.
    ///
    /// Returns whether a row was deleted.
    fn delete_webhook_endpoint(
        &mut self,
        endpoint_id: Uuid,
    ) -> impl Future<Output = PgResult<bool>> + Send;

    /// Resets the failure count and records the attempt.
    fn record_webhook_success(
        &mut self,
        endpoint_id: Uuid,
        status_code: Option<i32>,
        at: Timestamp,
    ) -> impl Future<Output = PgResult<bool>> + Send;

    /// Increments the failure count and disables the endpoint once it
    /// reaches `threshold`, in a single statement.
    fn record_webhook_failure(
        &mut self,
        endpoint_id: Uuid,
        status_code: Option<i32>,
        at: Timestamp,
        threshold: i32,
    ) -> impl Future<Output = PgResult<Option<WebhookFailureState>>> + Send;

    /// Records the attempt without touching the failure count.
    fn touch_webhook_endpoint(
        &mut self,
        endpoint_id: Uuid,
        status_code: Option<i32>,
        at: Timestamp,
    ) -> impl Future<Output = PgResult<bool>> + Send;
}

impl WebhookEndpointRepository for PgConnection {
    async fn create_webhook_endpoint(
        &mut self,
        new_endpoint: NewWebhookEndpoint,
    ) -> PgResult<WebhookEndpoint> {
        use schema::webhook_endpoints;

        let endpoint = diesel::insert_into(webhook_endpoints::table)
            .values(&new_endpoint)
            .returning(WebhookEndpoint::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)?;

        Ok(endpoint)
    }

    async fn find_webhook_endpoint_by_id(
        &mut self,
        endpoint_id: Uuid,
    ) -> PgResult<Option<WebhookEndpoint>> {
        use schema::webhook_endpoints::dsl::*;

        let endpoint = webhook_endpoints
            .filter(id.eq(endpoint_id))
            .select(WebhookEndpoint::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)?;

        Ok(endpoint)
    }

    async fn list_webhook_endpoints(
        &mut self,
        pagination: Pagination,
    ) -> PgResult<Vec<WebhookEndpoint>> {
        use schema::webhook_endpoints::dsl::*;

        let endpoints = webhook_endpoints
            .order((created_at.asc(), id.asc()))
            .limit(pagination.limit)
            .offset(pagination.offset)
            .select(WebhookEndpoint::as_select())
            .load(self)
            .await
            .map_err(PgError::from)?;

        Ok(endpoints)
    }

    async fn count_webhook_endpoints(&mut self) -> PgResult<i64> {
        use schema::webhook_endpoints::dsl::*;

        let count = webhook_endpoints
            .count()
            .get_result(self)
            .await
            .map_err(PgError::from)?;

        Ok(count)
    }

    async fn list_subscribed_webhook_endpoints(
        &mut self,
        event: &str,
    ) -> PgResult<Vec<WebhookEndpoint>> {
        use schema::webhook_endpoints::dsl::*;

        let endpoints = webhook_endpoints
            .filter(enabled.eq(true))
            .filter(events.contains(vec![event.to_owned()]))
            .order((created_at.asc(), id.asc()))
            .select(WebhookEndpoint::as_select())
            .load(self)
            .await
            .map_err(PgError::from)?;

        Ok(endpoints)
    }

    async fn update_webhook_endpoint(
        &mut self,
        endpoint_id: Uuid,
        mut changes: UpdateWebhookEndpoint,
    ) -> PgResult<Option<WebhookEndpoint>> {
        use schema::webhook_endpoints::dsl::*;

        if changes.is_empty() {
            return self.find_webhook_endpoint_by_id(endpoint_id).await;
        }

        changes.updated_at = Some(jiff_diesel::Timestamp::from(Timestamp::now()));

        let endpoint = diesel::update(webhook_endpoints)
            .filter(id.eq(endpoint_id))
            .set(&changes)
            .returning(WebhookEndpoint::as_returning())
            .get_result(self)
            .await
            .optional()
            .map_err(PgError::from)?;

        Ok(endpoint)
    }

    async fn delete_webhook_endpoint(&mut self, endpoint_id: Uuid) -> PgResult<bool> {
        use schema::webhook_endpoints::dsl::*;

        let deleted = diesel::delete(webhook_endpoints)
            .filter(id.eq(endpoint_id))
            .execute(self)
            .await
            .map_err(PgError::from)?;

        Ok(deleted > 0)
    }

    async fn record_webhook_success(
        &mut self,
        endpoint_id: Uuid,
        status_code: Option<i32>,
        at: Timestamp,
    ) -> PgResult<bool> {
        use schema::webhook_endpoints::dsl::*;

        let at = jiff_diesel::Timestamp::from(at);
        let updated = diesel::update(webhook_endpoints)
            .filter(id.eq(endpoint_id))
            .set((
                failure_count.eq(0),
                last_triggered_at.eq(Some(at)),
                last_status_code.eq(status_code),
                updated_at.eq(at),
            ))
            .execute(self)
            .await
            .map_err(PgError::from)?;

        Ok(updated > 0)
    }

    async fn record_webhook_failure(
        &mut self,
        endpoint_id: Uuid,
        status_code: Option<i32>,
        at: Timestamp,
        threshold: i32,
    ) -> PgResult<Option<WebhookFailureState>> {
        let at = jiff_diesel::Timestamp::from(at);

        // SET expressions read the pre-update row, so `failure_count + 1`
        // is the new count on both sides.
        let state = {
            use schema::webhook_endpoints::dsl::*;

            diesel::update(webhook_endpoints)
                .filter(id.eq(endpoint_id))
                .set((
                    failure_count.eq(failure_count + 1),
                    enabled.eq(enabled.and((failure_count + 1).lt(threshold))),
                    last_triggered_at.eq(Some(at)),
                    last_status_code.eq(status_code),
                    updated_at.eq(at),
                ))
                .returning((failure_count, enabled))
                .get_result::<WebhookFailureState>(self)
                .await
                .optional()
                .map_err(PgError::from)?
        };

        if let Some(state) = state
            && !state.enabled
            && state.failure_count == threshold
        {
            tracing::debug!(
                target: TRACING_TARGET_QUERY,
                endpoint_id = %endpoint_id,
                failure_count = state.failure_count,
                "Failure threshold reached, endpoint disabled"
            );
        }

        Ok(state)
    }

    async fn touch_webhook_endpoint(
        &mut self,
        endpoint_id: Uuid,
        status_code: Option<i32>,
        at: Timestamp,
    ) -> PgResult<bool> {
        use schema::webhook_endpoints::dsl::*;

        let updated = diesel::update(webhook_endpoints)
            .filter(id.eq(endpoint_id))
            .set((
                last_triggered_at.eq(Some(jiff_diesel::Timestamp::from(at))),
                last_status_code.eq(status_code),
            ))
            .execute(self)
            .await
            .map_err(PgError::from)?;

        Ok(updated > 0)
    }
}
