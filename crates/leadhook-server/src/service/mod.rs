//! Application state, configuration and the Postgres store adapter.

mod config;
mod pg_store;
mod state;

pub use crate::service::config::ServiceConfig;
pub use crate::service::pg_store::PgWebhookStore;
pub use crate::service::state::ServiceState;
pub use crate::{Error, Result};
