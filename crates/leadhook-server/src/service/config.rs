//! [`ServiceState`] configuration.
//!
//! [`ServiceState`]: crate::service::ServiceState

#[cfg(feature = "config")]
use clap::Args;
use leadhook_postgres::{PgClient, PgClientExt, PgConfig};
use leadhook_webhook::DeliveryConfig;
use serde::{Deserialize, Serialize};

use crate::service::{Error, Result};

/// Tracing target for service configuration.
const TRACING_TARGET: &str = "leadhook_server::service::config";

/// Storage and outbound delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct ServiceConfig {
    #[cfg_attr(feature = "config", command(flatten))]
    pub postgres: PgConfig,

    #[cfg_attr(feature = "config", command(flatten))]
    pub delivery: DeliveryConfig,
}

impl ServiceConfig {
    pub fn new(postgres: PgConfig, delivery: DeliveryConfig) -> Self {
        Self { postgres, delivery }
    }

    /// Validates every group.
    pub fn validate(&self) -> Result<()> {
        self.postgres.validate()?;
        self.delivery.validate()?;
        Ok(())
    }

    /// Connects to Postgres and applies pending migrations.
    pub async fn connect_postgres(&self) -> Result<PgClient> {
        let client = self.postgres.clone().build().map_err(|e| {
            Error::external("postgres", "Failed to create database client").with_source(e)
        })?;

        client.ping().await.map_err(|e| {
            Error::external("postgres", "Database is not reachable").with_source(e)
        })?;

        let migrations = client.run_pending_migrations().await.map_err(|e| {
            Error::internal("postgres", "Failed to apply database migrations").with_source(e)
        })?;

        tracing::info!(
            target: TRACING_TARGET,
            database = %self.postgres.database_url_masked(),
            applied_migrations = migrations.processed_versions.len(),
            "Connected to Postgres"
        );

        Ok(client)
    }
}
