//! Delivery history handlers.

use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::State;
use leadhook_webhook::EndpointRegistry;
use validator::Validate;

use crate::extract::{Json, Path, Query};
use crate::handler::Result;
use crate::handler::request::{PaginationParams, WebhookPathParams};
use crate::handler::response::{Deliveries, Delivery, ErrorResponse};
use crate::service::ServiceState;

/// Tracing target for delivery history operations.
const TRACING_TARGET: &str = "leadhook_server::handler::deliveries";

/// Lists logged delivery attempts for one endpoint, newest first.
#[tracing::instrument(skip_all, fields(webhook_id = %path_params.webhook_id))]
async fn list_deliveries(
    State(registry): State<EndpointRegistry>,
    Path(path_params): Path<WebhookPathParams>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Deliveries>> {
    params.validate()?;
    let pagination = params.into_pagination();

    let page = registry
        .list_attempts(path_params.webhook_id, pagination)
        .await?;

    tracing::debug!(
        target: TRACING_TARGET,
        delivery_count = page.items.len(),
        total = page.total,
        "Listed deliveries"
    );

    Ok(Json(Deliveries::from_store(page, pagination, Delivery::from)))
}

fn list_deliveries_docs(op: TransformOperation) -> TransformOperation {
    op.summary("List deliveries")
        .description(
            "Returns every logged attempt for the endpoint, including retries and test \
             sends, newest first.",
        )
        .response::<200, Json<Deliveries>>()
        .response::<400, Json<ErrorResponse>>()
        .response::<404, Json<ErrorResponse>>()
}

/// Returns routes for delivery history.
pub fn routes() -> ApiRouter<ServiceState> {
    use aide::axum::routing::*;

    ApiRouter::new()
        .api_route(
            "/webhooks/{webhookId}/deliveries/",
            get_with(list_deliveries, list_deliveries_docs),
        )
        .with_path_items(|item| item.tag("Deliveries"))
}
