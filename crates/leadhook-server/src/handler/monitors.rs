//! Health check handlers.

use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::State;
use axum::http::StatusCode;
use leadhook_webhook::Dispatcher;

use crate::extract::Json;
use crate::handler::response::MonitorStatus;
use crate::service::ServiceState;

/// Tracing target for monitor operations.
const TRACING_TARGET: &str = "leadhook_server::handler::monitors";

/// Reports liveness and whether the webhook store answers.
#[tracing::instrument(skip_all)]
async fn health_status(State(dispatcher): State<Dispatcher>) -> (StatusCode, Json<MonitorStatus>) {
    let store_reachable = match dispatcher.store().ping().await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(
                target: TRACING_TARGET,
                error = %err,
                "Webhook store is unreachable"
            );
            false
        }
    };

    let status = MonitorStatus::new(store_reachable);
    let status_code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    tracing::debug!(
        target: TRACING_TARGET,
        store_reachable,
        status_code = status_code.as_u16(),
        "Health status prepared"
    );

    (status_code, Json(status))
}

fn health_status_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Health status")
        .description("Returns 200 while the webhook store is reachable and 503 otherwise.")
        .response::<200, Json<MonitorStatus>>()
        .response::<503, Json<MonitorStatus>>()
}

/// Returns routes for health monitoring.
pub fn routes() -> ApiRouter<ServiceState> {
    use aide::axum::routing::*;

    ApiRouter::new()
        .api_route("/health/", get_with(health_status, health_status_docs))
        .with_path_items(|item| item.tag("Health"))
}
