//! Pending retry repository.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
use uuid::Uuid;

use crate::model::{NewWebhookPendingDelivery, WebhookPendingDelivery};
use crate::{PgConnection, PgError, PgResult, TRACING_TARGET_QUERY, schema};

/// Repository for persisted retries.
pub trait WebhookPendingDeliveryRepository {
    /// Arms a retry.
    fn create_pending_delivery(
        &mut self,
        new_pending: NewWebhookPendingDelivery,
    ) -> impl Future<Output = PgResult<WebhookPendingDelivery>> + Send;

    /// Leases up to `limit` due, unleased rows until `lease_until`.
    ///
    /// Rows locked by a concurrent claim are skipped, so two workers never
    /// receive the same row.
    fn claim_due_pending_deliveries(
        &mut self,
        now: Timestamp,
        lease_until: Timestamp,
        limit: i64,
    ) -> impl Future<Output = PgResult<Vec<WebhookPendingDelivery>>> + Send;

    /// Removes a pending delivery. Returns whether a row was deleted.
    fn delete_pending_delivery(
        &mut self,
        pending_id: Uuid,
    ) -> impl Future<Output = PgResult<bool>> + Send;

    /// Lists pending deliveries for an endpoint, soonest first.
    fn list_pending_deliveries(
        &mut self,
        endpoint_id: Uuid,
    ) -> impl Future<Output = PgResult<Vec<WebhookPendingDelivery>>> + Send;
}

impl WebhookPendingDeliveryRepository for PgConnection {
    async fn create_pending_delivery(
        &mut self,
        new_pending: NewWebhookPendingDelivery,
    ) -> PgResult<WebhookPendingDelivery> {
        use schema::webhook_pending_deliveries;

        let pending = diesel::insert_into(webhook_pending_deliveries::table)
            .values(&new_pending)
            .returning(WebhookPendingDelivery::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)?;

        Ok(pending)
    }

    async fn claim_due_pending_deliveries(
        &mut self,
        now: Timestamp,
        lease_until: Timestamp,
        limit: i64,
    ) -> PgResult<Vec<WebhookPendingDelivery>> {
        use schema::webhook_pending_deliveries::dsl::*;

        let now = jiff_diesel::Timestamp::from(now);
        // The subselect targets the same table as the UPDATE, so it must be
        // aliased for diesel to accept it.
        let due_rows = diesel::alias!(schema::webhook_pending_deliveries as due_rows);
        let due = due_rows
            .filter(due_rows.field(next_attempt_at).le(now))
            .filter(
                due_rows
                    .field(claimed_until)
                    .is_null()
                    .or(due_rows.field(claimed_until).lt(now)),
            )
            .order(due_rows.field(next_attempt_at).asc())
            .limit(limit)
            .select(due_rows.field(id))
            .for_update()
            .skip_locked();

        let claimed = diesel::update(webhook_pending_deliveries)
            .filter(id.eq_any(due))
            .set(claimed_until.eq(Some(jiff_diesel::Timestamp::from(lease_until))))
            .returning(WebhookPendingDelivery::as_returning())
            .get_results(self)
            .await
            .map_err(PgError::from)?;

        if !claimed.is_empty() {
            tracing::trace!(
                target: TRACING_TARGET_QUERY,
                count = claimed.len(),
                "Claimed pending deliveries"
            );
        }

        Ok(claimed)
    }

    async fn delete_pending_delivery(&mut self, pending_id: Uuid) -> PgResult<bool> {
        use schema::webhook_pending_deliveries::dsl::*;

        let deleted = diesel::delete(webhook_pending_deliveries)
            .filter(id.eq(pending_id))
            .execute(self)
            .await
            .map_err(PgError::from)?;

        Ok(deleted > 0)
    }

    async fn list_pending_deliveries(
        &mut self,
        target_endpoint_id: Uuid,
    ) -> PgResult<Vec<WebhookPendingDelivery>> {
        use schema::webhook_pending_deliveries::dsl::*;

        let pending = webhook_pending_deliveries
            .filter(endpoint_id.eq(target_endpoint_id))
            .order((next_attempt_at.asc(), id.asc()))
            .select(WebhookPendingDelivery::as_select())
            .load(self)
            .await
            .map_err(PgError::from)?;

        Ok(pending)
    }
}
