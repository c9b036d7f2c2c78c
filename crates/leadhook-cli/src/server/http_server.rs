//! HTTP server startup.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::lifecycle::serve_with_shutdown;
use super::{ServerError, ServerResult, shutdown_signal};
use crate::TRACING_TARGET_SERVER_STARTUP;
use crate::config::ServerConfig;

/// Binds the configured address and serves `app` until a shutdown signal
/// arrives or `shutdown` is cancelled.
///
/// `shutdown` is cancelled once a signal is received, so other tasks
/// sharing the token stop together with the server.
pub async fn serve(
    app: Router,
    server_config: &ServerConfig,
    shutdown: CancellationToken,
) -> ServerResult<()> {
    let server_addr = server_config.server_addr();

    let listener = match TcpListener::bind(server_addr).await {
        Ok(listener) => {
            tracing::info!(
                target: TRACING_TARGET_SERVER_STARTUP,
                addr = %server_addr,
                "Successfully bound to address"
            );
            listener
        }
        Err(err) => {
            tracing::error!(
                target: TRACING_TARGET_SERVER_STARTUP,
                addr = %server_addr,
                error = %err,
                "Failed to bind to address"
            );
            return Err(ServerError::bind_error(&server_addr.to_string(), err));
        }
    };

    let signal = async move {
        tokio::select! {
            () = shutdown_signal() => {}
            () = shutdown.cancelled() => {}
        }
        shutdown.cancel();
    };

    serve_with_shutdown(server_config, || async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
    })
    .await
    .map_err(ServerError::Runtime)
}
