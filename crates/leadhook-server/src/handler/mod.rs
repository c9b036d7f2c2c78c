//! All `aide::axum::`[`ApiRouter`]s with related `axum::`[`Handler`]s.
//!
//! ```rust,no_run
//! use leadhook_server::handler::routes;
//! use leadhook_server::middleware::{OpenApiConfig, RouterOpenApiExt};
//! use leadhook_server::service::ServiceState;
//! use leadhook_webhook::DeliveryConfig;
//!
//! # fn example() -> anyhow::Result<()> {
//! let state = ServiceState::in_memory(&DeliveryConfig::default())?;
//! let app: axum::Router = routes()
//!     .with_open_api(&OpenApiConfig::default())
//!     .with_state(state);
//! # Ok(())
//! # }
//! ```
//!
//! [`ApiRouter`]: aide::axum::ApiRouter
//! [`Handler`]: axum::handler::Handler

mod deliveries;
mod error;
mod monitors;
pub mod request;
pub mod response;
mod webhooks;

use aide::axum::ApiRouter;
use axum::response::{IntoResponse, Response};

pub use crate::handler::error::{Error, ErrorKind, Result};
use crate::service::ServiceState;

#[inline]
async fn handler() -> Response {
    ErrorKind::NotFound.into_response()
}

/// Returns an [`ApiRouter`] with every admin route and a JSON 404 fallback.
pub fn routes() -> ApiRouter<ServiceState> {
    ApiRouter::new()
        .merge(webhooks::routes())
        .merge(deliveries::routes())
        .merge(monitors::routes())
        .fallback(handler)
}
