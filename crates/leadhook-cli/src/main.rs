#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod server;
mod worker;

use std::process;

use anyhow::Context;
use axum::Router;
use leadhook_server::handler::routes;
use leadhook_server::middleware::{RouterObservabilityExt, RouterOpenApiExt, RouterRecoveryExt};
use leadhook_server::service::ServiceState;
use tokio_util::sync::CancellationToken;

use crate::config::{Cli, MiddlewareConfig};

// Tracing target constants
pub const TRACING_TARGET_SERVER_STARTUP: &str = "leadhook_cli::server::startup";
pub const TRACING_TARGET_SERVER_SHUTDOWN: &str = "leadhook_cli::server::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "leadhook_cli::config";
pub const TRACING_TARGET_WORKER: &str = "leadhook_cli::worker";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            "application terminated successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = %error,
            "application terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();
    Cli::init_tracing();
    cli.log();
    cli.validate()?;

    let state = ServiceState::from_config(&cli.service)
        .await
        .context("failed to create service state")?;
    let router = create_router(state.clone(), &cli.middleware);

    let shutdown = CancellationToken::new();
    let worker = worker::spawn(&state, cli.retry.clone(), shutdown.child_token())
        .context("failed to start retry worker")?;

    let served = server::serve(router, &cli.server, shutdown.clone()).await;

    shutdown.cancel();
    worker::join(worker, cli.server.shutdown_timeout()).await;

    if let Err(err) = &served {
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error_code = err.error_code(),
            recoverable = err.is_recoverable(),
            suggestion = ?err.suggestion(),
            "HTTP server failed"
        );
    }

    served?;
    Ok(())
}

/// Creates the router with all middleware layers applied.
///
/// Middleware is applied in reverse order (last added = outermost):
/// 1. Recovery (outermost) - catches panics and enforces timeouts
/// 2. Observability - request IDs, trace spans and request logs
/// 3. Routes (innermost) - admin handlers and the OpenAPI document
fn create_router(state: ServiceState, middleware: &MiddlewareConfig) -> Router {
    routes()
        .with_open_api(&middleware.openapi)
        .with_state(state)
        .with_request_logging()
        .with_observability()
        .with_recovery(&middleware.recovery)
}
