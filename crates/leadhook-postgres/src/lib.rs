#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Embeds all migrations into the final binary.
pub(crate) const MIGRATIONS: diesel_migrations::EmbeddedMigrations =
    diesel_migrations::embed_migrations!("./migrations");

// Tracing target constants for consistent logging.

/// Tracing target for client-related operations.
///
/// Use this target for logging client initialization, configuration, and lifecycle events.
pub const TRACING_TARGET_CLIENT: &str = "leadhook_postgres::client";

/// Tracing target for database query operations.
pub const TRACING_TARGET_QUERY: &str = "leadhook_postgres::queries";

/// Tracing target for database migration operations.
///
/// Use this target for logging migration application and migration status checks.
pub const TRACING_TARGET_MIGRATION: &str = "leadhook_postgres::migrations";

/// Tracing target for database connection operations.
///
/// Use this target for logging connection establishment, pool management, and connection errors.
pub const TRACING_TARGET_CONNECTION: &str = "leadhook_postgres::connection";

mod client;
mod error;
pub mod model;
pub mod query;
mod schema;

pub use diesel_async::AsyncPgConnection as PgConnection;

pub use crate::client::migrate;
pub use crate::client::{
    ConnectionPool, MigrationResult, MigrationStatus, PgClient, PgClientExt, PgConfig, PgConn,
    PgPoolStatus, PooledConnection, get_applied_migrations, get_migration_status,
    run_pending_migrations, verify_schema_integrity,
};
pub use crate::error::{BoxError, PgError, PgResult};
