use std::ops::DerefMut;
use std::time::Instant;

use diesel_async::AsyncPgConnection;
use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_migrations::MigrationHarness;
use tokio::task::spawn_blocking;

use super::{MigrationResult, custom_hooks, get_migration_status};
use crate::{MIGRATIONS, PgClient, PgError, PgResult, TRACING_TARGET_MIGRATION};

/// Runs all pending migrations on the database.
///
/// Safe to call on every startup; an up-to-date schema is a no-op.
#[tracing::instrument(skip(pg), target = TRACING_TARGET_MIGRATION)]
pub async fn run_pending_migrations(pg: &PgClient) -> PgResult<MigrationResult> {
    let start_time = Instant::now();
    let mut conn = pg.get_pooled_connection().await?;
    let initial_status = get_migration_status(&mut conn).await?;

    if initial_status.is_up_to_date() {
        tracing::info!(
            target: TRACING_TARGET_MIGRATION,
            applied = initial_status.applied_migrations(),
            "Database schema is up to date"
        );
        return Ok(MigrationResult::success(start_time.elapsed(), vec![]));
    }

    tracing::info!(
        target: TRACING_TARGET_MIGRATION,
        pending_migrations = initial_status.pending_migrations(),
        next = initial_status.next_pending_version().unwrap_or_default(),
        "Applying pending migrations"
    );

    run_pre_migrate_hook(&mut conn).await?;

    // The migration harness is synchronous.
    let mut conn: AsyncConnectionWrapper<_> = conn.into();
    let results = spawn_blocking(move || {
        let versions = conn.run_pending_migrations(MIGRATIONS).map(|versions| {
            versions
                .into_iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
        });
        (versions, conn)
    })
    .await;

    let duration = start_time.elapsed();
    let (results, mut conn) = results.map_err(|err| {
        tracing::error!(
            target: TRACING_TARGET_MIGRATION,
            duration = ?duration,
            error = %err,
            "Migration task panicked"
        );
        PgError::Migration(err.into())
    })?;

    run_post_migrate_hook(conn.deref_mut()).await?;
    let versions = results.map_err(|err| {
        tracing::error!(
            target: TRACING_TARGET_MIGRATION,
            duration = ?duration,
            error = %err,
            "Database migration failed"
        );
        PgError::Migration(err)
    })?;

    tracing::info!(
        target: TRACING_TARGET_MIGRATION,
        duration = ?duration,
        migrations_count = versions.len(),
        "Database migrations applied"
    );

    Ok(MigrationResult::success(duration, versions))
}

async fn run_pre_migrate_hook(conn: &mut AsyncPgConnection) -> PgResult<()> {
    if let Err(e) = custom_hooks::pre_migrate(conn).await {
        tracing::error!(target: TRACING_TARGET_MIGRATION, error = %e, "Pre-migration hook failed");
        return Err(PgError::Migration(
            format!("Pre-migration hook failed: {}", e).into(),
        ));
    };

    Ok(())
}

async fn run_post_migrate_hook(conn: &mut AsyncPgConnection) -> PgResult<()> {
    if let Err(e) = custom_hooks::post_migrate(conn).await {
        tracing::error!(target: TRACING_TARGET_MIGRATION, error = %e, "Post-migration hook failed");
        return Err(PgError::Migration(
            format!("Post-migration hook failed: {}", e).into(),
        ));
    };

    Ok(())
}
