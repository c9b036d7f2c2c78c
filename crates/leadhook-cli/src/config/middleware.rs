//! Middleware configuration for the HTTP server.
//!
//! ```bash
//! leadhook --request-timeout 60 --open-api-json /openapi.json
//! ```

use clap::Args;
use leadhook_server::middleware::{OpenApiConfig, RecoveryConfig};
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET_CONFIG;

/// Middleware configuration combining OpenAPI and recovery settings.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Paths of the OpenAPI document and the Scalar UI.
    #[clap(flatten)]
    pub openapi: OpenApiConfig,

    /// Request timeout and panic recovery.
    #[clap(flatten)]
    pub recovery: RecoveryConfig,
}

impl MiddlewareConfig {
    pub fn validate(&self) -> leadhook_server::Result<()> {
        self.recovery.validate()
    }

    /// Logs middleware configuration at info level.
    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            openapi_path = %self.openapi.open_api_json,
            scalar_path = %self.openapi.scalar_ui,
            "OpenAPI configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            request_timeout_secs = self.recovery.request_timeout,
            "Recovery configuration"
        );
    }
}
