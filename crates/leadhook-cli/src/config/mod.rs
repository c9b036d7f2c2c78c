//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── server: ServerConfig          # Host, port, shutdown
//! ├── middleware: MiddlewareConfig  # OpenAPI paths, request timeout
//! ├── service: ServiceConfig        # Postgres, outbound delivery
//! └── retry: RetryConfig            # Retry worker polling
//! ```
//!
//! All configuration can be provided via CLI arguments or environment variables.
//!
//! ```bash
//! leadhook --postgres-url "postgresql://..." --port 8080
//!
//! POSTGRES_URL="postgresql://..." PORT=8080 leadhook
//! ```

mod middleware;
mod server;

use std::process;

use anyhow::Context;
use clap::Parser;
use leadhook_server::service::ServiceConfig;
use leadhook_webhook::RetryConfig;
pub use middleware::MiddlewareConfig;
use serde::{Deserialize, Serialize};
pub use server::ServerConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_SERVER_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "leadhook")]
#[command(about = "LeadHook webhook admin API and retry worker")]
#[command(version)]
pub struct Cli {
    /// Server network and lifecycle configuration.
    #[clap(flatten)]
    pub server: ServerConfig,

    /// HTTP middleware configuration (OpenAPI, timeouts).
    #[clap(flatten)]
    pub middleware: MiddlewareConfig,

    /// Storage and outbound delivery configuration.
    #[clap(flatten)]
    pub service: ServiceConfig,

    /// Retry worker configuration.
    #[clap(flatten)]
    pub retry: RetryConfig,
}

impl Cli {
    /// Loads `.env` (if enabled) and parses CLI arguments.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Loads environment variables from .env file if the dotenv feature is enabled.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing with `RUST_LOG` filtering, `info` by default.
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    fn log_build_info() {
        tracing::debug!(
            target: TRACING_TARGET_SERVER_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.server
            .validate()
            .context("invalid server configuration")?;
        self.middleware
            .validate()
            .context("invalid middleware configuration")?;
        self.service
            .validate()
            .context("invalid service configuration")?;
        self.retry
            .validate()
            .context("invalid retry worker configuration")?;
        Ok(())
    }

    /// Logs configuration without secrets.
    pub fn log(&self) {
        Self::log_build_info();
        self.server.log();
        self.middleware.log();

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            database = %self.service.postgres.database_url_masked(),
            postgres_max_connections = self.service.postgres.postgres_max_connections,
            postgres_connection_timeout_secs = ?self.service.postgres.postgres_connection_timeout_secs,
            postgres_idle_timeout_secs = ?self.service.postgres.postgres_idle_timeout_secs,
            "Database configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            timeout_secs = self.service.delivery.timeout_secs,
            user_agent = %self.service.delivery.user_agent,
            max_response_body_bytes = self.service.delivery.max_response_body_bytes,
            allow_insecure_targets = self.service.delivery.allow_insecure_targets,
            dns_fail_closed = self.service.delivery.dns_fail_closed,
            "Delivery configuration"
        );

        if self.service.delivery.allow_insecure_targets {
            tracing::warn!(
                target: TRACING_TARGET_CONFIG,
                "Insecure webhook targets are allowed; do not use this in production"
            );
        }

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            poll_interval_ms = self.retry.poll_interval_ms,
            batch_size = self.retry.batch_size,
            lease_secs = self.retry.lease_secs,
            "Retry worker configuration"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}
