#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod error;
mod event;

pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod emitter;
pub mod payload;
pub mod registry;
pub mod retry;
pub mod safety;
pub mod signature;
pub mod store;
pub mod tracker;

#[cfg(test)]
mod test_support;

pub use config::{DeliveryConfig, RetryConfig};
pub use delivery::{DeliveryExecutor, DeliveryOutcome};
pub use dispatch::{DispatchReport, Dispatcher, Redelivery};
pub use emitter::WebhookEmitter;
pub use error::{BoxedError, Error, ErrorKind, Result};
pub use event::WebhookEvent;
pub use payload::{Activity, Contact, EventPayload, FieldChange, FieldChanges, Lead};
pub use registry::{EndpointChanges, EndpointInput, EndpointRegistry};
pub use retry::{BACKOFF_SCHEDULE_MS, RetryScheduler, RetryWorker, next_attempt};
pub use safety::{DnsFailurePolicy, DnsResolver, UrlGuard, UrlPolicy, UrlVerdict, check_url};
pub use tracker::{DISABLE_THRESHOLD, FailureTracker, TrackerVerdict};

/// Tracing target for outbound delivery.
pub const TRACING_TARGET_DELIVERY: &str = "leadhook_webhook::delivery";

/// Tracing target for dispatch orchestration.
pub const TRACING_TARGET_DISPATCH: &str = "leadhook_webhook::dispatch";

/// Tracing target for the event emitter.
pub const TRACING_TARGET_EMITTER: &str = "leadhook_webhook::emitter";

/// Tracing target for endpoint registration.
pub const TRACING_TARGET_REGISTRY: &str = "leadhook_webhook::registry";

/// Tracing target for retry scheduling and the retry worker.
pub const TRACING_TARGET_RETRY: &str = "leadhook_webhook::retry";

/// Tracing target for URL safety checks.
pub const TRACING_TARGET_SAFETY: &str = "leadhook_webhook::safety";

/// Tracing target for failure tracking.
pub const TRACING_TARGET_TRACKER: &str = "leadhook_webhook::tracker";
