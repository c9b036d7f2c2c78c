//! Hooks run around [`run_pending_migrations`].
//!
//! [`run_pending_migrations`]: super::run_pending_migrations

use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::PoolableConnection;

use crate::{PgError, PgResult, TRACING_TARGET_MIGRATION};

/// Called before a connection is used to run migrations.
///
/// Refuses to migrate over a broken connection.
pub async fn pre_migrate(conn: &mut AsyncPgConnection) -> PgResult<()> {
    let is_broken = conn.is_broken();

    tracing::debug!(
        target: TRACING_TARGET_MIGRATION,
        hook = "pre_migrate",
        is_broken,
        "Preparing to run database migrations"
    );

    if is_broken {
        return Err(PgError::Migration(
            "connection is broken before migrations".into(),
        ));
    }

    Ok(())
}

/// Called after a connection has been used to run migrations.
pub async fn post_migrate(conn: &mut AsyncPgConnection) -> PgResult<()> {
    let is_broken = conn.is_broken();

    tracing::debug!(
        target: TRACING_TARGET_MIGRATION,
        hook = "post_migrate",
        is_broken,
        "Database migrations finished"
    );

    if is_broken {
        tracing::error!(
            target: TRACING_TARGET_MIGRATION,
            hook = "post_migrate",
            "Connection is broken after migrations, possible migration failure"
        );
    }

    Ok(())
}
