//! Delivery and retry configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::safety::{DnsFailurePolicy, UrlPolicy};
use crate::{Error, ErrorKind, Result};

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Upper bound for the per-attempt timeout.
pub const MAX_TIMEOUT_SECS: u64 = 120;
/// Default number of response body bytes kept per attempt.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 10_000;
/// Default `User-Agent` for outbound requests.
pub const DEFAULT_USER_AGENT: &str = "LeadHook/1.0";

/// Outbound delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct DeliveryConfig {
    /// Per-attempt timeout in seconds (0 means default, capped at 120)
    #[cfg_attr(
        feature = "config",
        arg(long = "webhook-timeout-secs", env = "WEBHOOK_TIMEOUT_SECS", default_value = "30")
    )]
    pub timeout_secs: u64,

    /// User-Agent header sent with every delivery
    #[cfg_attr(
        feature = "config",
        arg(long = "webhook-user-agent", env = "WEBHOOK_USER_AGENT", default_value = DEFAULT_USER_AGENT)
    )]
    pub user_agent: String,

    /// Maximum number of response body bytes stored per attempt
    #[cfg_attr(
        feature = "config",
        arg(
            long = "webhook-max-response-bytes",
            env = "WEBHOOK_MAX_RESPONSE_BYTES",
            default_value = "10000"
        )
    )]
    pub max_response_body_bytes: usize,

    /// Allow plain http and private targets (development only)
    #[cfg_attr(
        feature = "config",
        arg(
            long = "webhook-allow-insecure-targets",
            env = "WEBHOOK_ALLOW_INSECURE_TARGETS",
            default_value = "false"
        )
    )]
    pub allow_insecure_targets: bool,

    /// Reject deliveries whose host cannot be resolved
    #[cfg_attr(
        feature = "config",
        arg(
            long = "webhook-dns-fail-closed",
            env = "WEBHOOK_DNS_FAIL_CLOSED",
            default_value = "false"
        )
    )]
    pub dns_fail_closed: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            allow_insecure_targets: false,
            dns_fail_closed: false,
        }
    }
}

impl DeliveryConfig {
    /// Returns the effective per-attempt timeout.
    ///
    /// Zero falls back to the default and anything above the cap is clamped.
    pub fn timeout(&self) -> Duration {
        let secs = match self.timeout_secs {
            0 => DEFAULT_TIMEOUT_SECS,
            secs => secs.min(MAX_TIMEOUT_SECS),
        };
        Duration::from_secs(secs)
    }

    /// Returns the URL policy these settings describe.
    pub fn url_policy(&self) -> UrlPolicy {
        let dns_failure = if self.dns_fail_closed {
            DnsFailurePolicy::FailClosed
        } else {
            DnsFailurePolicy::FailOpen
        };

        UrlPolicy {
            allow_insecure_targets: self.allow_insecure_targets,
            dns_failure,
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_response_body_bytes(mut self, bytes: usize) -> Self {
        self.max_response_body_bytes = bytes;
        self
    }

    pub fn with_insecure_targets(mut self, allow: bool) -> Self {
        self.allow_insecure_targets = allow;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.user_agent.trim().is_empty() {
            return Err(Error::new(ErrorKind::Configuration)
                .with_message("webhook user agent cannot be empty"));
        }
        if self.max_response_body_bytes == 0 {
            return Err(Error::new(ErrorKind::Configuration)
                .with_message("webhook max response bytes must be greater than 0"));
        }
        Ok(())
    }
}

/// Retry worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct RetryConfig {
    /// How often the worker polls for due deliveries, in milliseconds
    #[cfg_attr(
        feature = "config",
        arg(long = "retry-poll-interval-ms", env = "RETRY_POLL_INTERVAL_MS", default_value = "5000")
    )]
    pub poll_interval_ms: u64,

    /// Maximum deliveries claimed per poll
    #[cfg_attr(
        feature = "config",
        arg(long = "retry-batch-size", env = "RETRY_BATCH_SIZE", default_value = "32")
    )]
    pub batch_size: u32,

    /// How long a claim is held before another worker may take it, in seconds
    #[cfg_attr(
        feature = "config",
        arg(long = "retry-lease-secs", env = "RETRY_LEASE_SECS", default_value = "300")
    )]
    pub lease_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            batch_size: 32,
            lease_secs: 300,
        }
    }
}

impl RetryConfig {
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[inline]
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::new(ErrorKind::Configuration)
                .with_message("retry poll interval must be greater than 0"));
        }
        if !(1..=1000).contains(&self.batch_size) {
            return Err(Error::new(ErrorKind::Configuration)
                .with_message("retry batch size must be between 1 and 1000"));
        }
        // A lease shorter than the longest possible attempt lets two workers
        // send the same delivery.
        if self.lease_secs <= MAX_TIMEOUT_SECS {
            return Err(Error::new(ErrorKind::Configuration).with_message(format!(
                "retry lease must be longer than {MAX_TIMEOUT_SECS} seconds"
            )));
        }
        Ok(())
    }
}
