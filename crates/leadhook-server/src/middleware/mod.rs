//! Middleware for `axum::Router` and HTTP request processing.
//!
//! - Observability (request IDs, trace spans, request logs)
//! - Recovery (panics, timeouts, service errors)
//! - OpenAPI document and reference UI
//!
//! ```rust,no_run
//! use axum::Router;
//! use leadhook_server::middleware::{RouterObservabilityExt, RouterRecoveryExt};
//!
//! let app: Router = Router::new()
//!     .with_default_recovery()
//!     .with_request_logging()
//!     .with_observability();
//! ```

mod observability;
mod recovery;
mod specification;

pub use observability::{REQUEST_ID_HEADER, RouterObservabilityExt};
pub use recovery::{RecoveryConfig, RouterRecoveryExt};
pub use specification::{OpenApiConfig, RouterOpenApiExt};

// Tracing target constants for consistent logging.
pub const TRACING_TARGET_REQUEST: &str = "leadhook_server::middleware::request";
pub const TRACING_TARGET_ERROR: &str = "leadhook_server::middleware::recovery::error";
pub const TRACING_TARGET_PANIC: &str = "leadhook_server::middleware::recovery::panic";
