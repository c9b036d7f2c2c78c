//! Health check response types.

use jiff::Timestamp;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Overall service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

/// Health check response.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub status: ServiceStatus,
    /// Whether the webhook store answered the ping.
    pub store_reachable: bool,
    pub checked_at: Timestamp,
    /// Application version.
    pub version: String,
}

impl MonitorStatus {
    pub fn new(store_reachable: bool) -> Self {
        let status = if store_reachable {
            ServiceStatus::Healthy
        } else {
            ServiceStatus::Unhealthy
        };

        Self {
            status,
            store_reachable,
            checked_at: Timestamp::now(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }

    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}
