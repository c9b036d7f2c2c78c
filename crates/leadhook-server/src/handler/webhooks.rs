//! Webhook endpoint management handlers.

use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::State;
use axum::http::StatusCode;
use leadhook_webhook::{Dispatcher, EndpointRegistry};
use validator::Validate;

use crate::extract::{Json, Path, Query, ValidateJson};
use crate::handler::request::{CreateWebhook, PaginationParams, UpdateWebhook, WebhookPathParams};
use crate::handler::response::{ErrorResponse, Webhook, WebhookTestResult, Webhooks};
use crate::handler::Result;
use crate::service::ServiceState;

/// Tracing target for webhook operations.
const TRACING_TARGET: &str = "leadhook_server::handler::webhooks";

/// Registers a new webhook endpoint.
#[tracing::instrument(skip_all)]
async fn create_webhook(
    State(registry): State<EndpointRegistry>,
    ValidateJson(request): ValidateJson<CreateWebhook>,
) -> Result<(StatusCode, Json<Webhook>)> {
    tracing::debug!(
        target: TRACING_TARGET,
        events = request.events.len(),
        "Creating webhook"
    );

    let endpoint = registry.create(request.into_input()).await?;

    tracing::info!(
        target: TRACING_TARGET,
        webhook_id = %endpoint.id,
        "Webhook created"
    );

    Ok((StatusCode::CREATED, Json(endpoint.into())))
}

fn create_webhook_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Create webhook")
        .description(
            "Registers an endpoint for one or more events. The URL must be HTTPS and must \
             not resolve to a private, loopback or link-local address.",
        )
        .response::<201, Json<Webhook>>()
        .response::<400, Json<ErrorResponse>>()
}

/// Lists webhook endpoints.
#[tracing::instrument(skip_all)]
async fn list_webhooks(
    State(registry): State<EndpointRegistry>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Webhooks>> {
    params.validate()?;
    let pagination = params.into_pagination();

    let page = registry.list(pagination).await?;

    tracing::debug!(
        target: TRACING_TARGET,
        webhook_count = page.items.len(),
        total = page.total,
        "Listed webhooks"
    );

    Ok(Json(Webhooks::from_store(page, pagination, Webhook::from)))
}

fn list_webhooks_docs(op: TransformOperation) -> TransformOperation {
    op.summary("List webhooks")
        .description("Returns registered endpoints, oldest first.")
        .response::<200, Json<Webhooks>>()
        .response::<400, Json<ErrorResponse>>()
}

/// Returns one webhook endpoint.
#[tracing::instrument(skip_all, fields(webhook_id = %path_params.webhook_id))]
async fn read_webhook(
    State(registry): State<EndpointRegistry>,
    Path(path_params): Path<WebhookPathParams>,
) -> Result<Json<Webhook>> {
    let endpoint = registry.get(path_params.webhook_id).await?;
    Ok(Json(endpoint.into()))
}

fn read_webhook_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Get webhook")
        .description("Returns a single endpoint. The signing secret is never returned.")
        .response::<200, Json<Webhook>>()
        .response::<404, Json<ErrorResponse>>()
}

/// Applies a partial update to a webhook endpoint.
#[tracing::instrument(skip_all, fields(webhook_id = %path_params.webhook_id))]
async fn update_webhook(
    State(registry): State<EndpointRegistry>,
    Path(path_params): Path<WebhookPathParams>,
    ValidateJson(request): ValidateJson<UpdateWebhook>,
) -> Result<Json<Webhook>> {
    tracing::debug!(target: TRACING_TARGET, "Updating webhook");

    let endpoint = registry
        .update(path_params.webhook_id, request.into_changes())
        .await?;

    tracing::info!(
        target: TRACING_TARGET,
        enabled = endpoint.enabled,
        failure_count = endpoint.failure_count,
        "Webhook updated"
    );

    Ok(Json(endpoint.into()))
}

fn update_webhook_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Update webhook")
        .description(
            "Updates only the fields present in the body. Send `secret: null` to remove \
             the signing secret. Re-enabling an endpoint resets its failure count.",
        )
        .response::<200, Json<Webhook>>()
        .response::<400, Json<ErrorResponse>>()
        .response::<404, Json<ErrorResponse>>()
}

/// Deletes a webhook endpoint with its delivery history.
#[tracing::instrument(skip_all, fields(webhook_id = %path_params.webhook_id))]
async fn delete_webhook(
    State(registry): State<EndpointRegistry>,
    Path(path_params): Path<WebhookPathParams>,
) -> Result<StatusCode> {
    registry.delete(path_params.webhook_id).await?;

    tracing::info!(target: TRACING_TARGET, "Webhook deleted");

    Ok(StatusCode::NO_CONTENT)
}

fn delete_webhook_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Delete webhook")
        .description("Removes the endpoint, its delivery history and any pending retries.")
        .response::<204, ()>()
        .response::<404, Json<ErrorResponse>>()
}

/// Sends a signed `webhook.test` event to the endpoint.
#[tracing::instrument(skip_all, fields(webhook_id = %path_params.webhook_id))]
async fn test_webhook(
    State(dispatcher): State<Dispatcher>,
    Path(path_params): Path<WebhookPathParams>,
) -> Result<Json<WebhookTestResult>> {
    let report = dispatcher.send_test(path_params.webhook_id).await?;

    tracing::info!(
        target: TRACING_TARGET,
        success = report.success,
        status_code = report.status_code,
        duration_ms = report.duration_ms,
        "Test webhook sent"
    );

    Ok(Json(report.into()))
}

fn test_webhook_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Send test webhook")
        .description(
            "Delivers a synthetic `webhook.test` event once, without retries. The attempt \
             is recorded in the delivery history but does not count towards auto-disable.",
        )
        .response::<200, Json<WebhookTestResult>>()
        .response::<404, Json<ErrorResponse>>()
}

/// Returns routes for webhook endpoint management.
pub fn routes() -> ApiRouter<ServiceState> {
    use aide::axum::routing::*;

    ApiRouter::new()
        .api_route(
            "/webhooks/",
            post_with(create_webhook, create_webhook_docs)
                .get_with(list_webhooks, list_webhooks_docs),
        )
        .api_route(
            "/webhooks/{webhookId}/",
            get_with(read_webhook, read_webhook_docs)
                .patch_with(update_webhook, update_webhook_docs)
                .delete_with(delete_webhook, delete_webhook_docs),
        )
        .api_route(
            "/webhooks/{webhookId}/test/",
            post_with(test_webhook, test_webhook_docs),
        )
        .with_path_items(|item| item.tag("Webhooks"))
}
