//! Delivery attempt log repository.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use super::Pagination;
use crate::model::{NewWebhookDelivery, WebhookDelivery};
use crate::{PgConnection, PgError, PgResult, schema};

/// Repository for the append-only delivery log.
pub trait WebhookDeliveryRepository {
    /// Records a delivery attempt.
    fn create_webhook_delivery(
        &mut self,
        new_delivery: NewWebhookDelivery,
    ) -> impl Future<Output = PgResult<WebhookDelivery>> + Send;

    /// Lists attempts for an endpoint, newest first.
    fn list_webhook_deliveries(
        &mut self,
        endpoint_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = PgResult<Vec<WebhookDelivery>>> + Send;

    /// Counts attempts for an endpoint.
    fn count_webhook_deliveries(
        &mut self,
        endpoint_id: Uuid,
    ) -> impl Future<Output = PgResult<i64>> + Send;
}

impl WebhookDeliveryRepository for PgConnection {
    async fn create_webhook_delivery(
        &mut self,
        new_delivery: NewWebhookDelivery,
    ) -> PgResult<WebhookDelivery> {
        use schema::webhook_deliveries;

        let delivery = diesel::insert_into(webhook_deliveries::table)
            .values(&new_delivery)
            .returning(WebhookDelivery::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)?;

        Ok(delivery)
    }

    async fn list_webhook_deliveries(
        &mut self,
        target_endpoint_id: Uuid,
        pagination: Pagination,
    ) -> PgResult<Vec<WebhookDelivery>> {
        use schema::webhook_deliveries::dsl::*;

        let deliveries = webhook_deliveries
            .filter(endpoint_id.eq(target_endpoint_id))
            .order((attempted_at.desc(), id.desc()))
            .limit(pagination.limit)
            .offset(pagination.offset)
            .select(WebhookDelivery::as_select())
            .load(self)
            .await
            .map_err(PgError::from)?;

        Ok(deliveries)
    }

    async fn count_webhook_deliveries(&mut self, target_endpoint_id: Uuid) -> PgResult<i64> {
        use schema::webhook_deliveries::dsl::*;

        let count = webhook_deliveries
            .filter(endpoint_id.eq(target_endpoint_id))
            .count()
            .get_result(self)
            .await
            .map_err(PgError::from)?;

        Ok(count)
    }
}
