//! Request IDs, trace spans and per-request timing logs.

use std::time::Instant;

use axum::Router;
use axum::extract::Request;
use axum::http::header::{self, HeaderName};
use axum::middleware::{Next, from_fn};
use axum::response::Response;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;

use super::TRACING_TARGET_REQUEST;

/// Header carrying the per-request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Extension trait for `axum::`[`Router`] to apply observability middleware.
pub trait RouterObservabilityExt<S> {
    /// Generates and propagates `x-request-id`, opens a trace span per
    /// request and redacts credential headers from logs.
    fn with_observability(self) -> Self;

    /// Logs method, path, status and latency of every request.
    fn with_request_logging(self) -> Self;
}

impl<S> RouterObservabilityExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_observability(self) -> Self {
        self.layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        .layer(SetSensitiveRequestHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
        ]))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            MakeRequestUuid,
        ))
    }

    fn with_request_logging(self) -> Self {
        self.layer(from_fn(log_request))
    }
}

async fn log_request(request: Request, next: Next) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let response = next.run(request).await;
    let duration = start_time.elapsed();

    tracing::debug!(
        target: TRACING_TARGET_REQUEST,
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = duration.as_millis() as u64,
        request_id = ?request_id,
        "request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use axum::routing::get;
    use axum_test::TestServer;

    use super::*;

    #[tokio::test]
    async fn responses_carry_a_request_id() -> anyhow::Result<()> {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .with_request_logging()
            .with_observability();
        let server = TestServer::new(app)?;

        let response = server.get("/").await;
        response.assert_status_ok();
        assert!(response.maybe_header(REQUEST_ID_HEADER).is_some());
        Ok(())
    }

    #[tokio::test]
    async fn incoming_request_ids_are_kept() -> anyhow::Result<()> {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .with_observability();
        let server = TestServer::new(app)?;

        let response = server
            .get("/")
            .add_header(REQUEST_ID_HEADER, "lead-42")
            .await;
        assert_eq!(response.header(REQUEST_ID_HEADER), "lead-42");
        Ok(())
    }
}
