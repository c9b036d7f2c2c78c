use diesel::migration::MigrationSource;
use diesel::pg::Pg;
use diesel::sql_query;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use super::MigrationStatus;
use crate::{MIGRATIONS, PgError, PgResult, TRACING_TARGET_MIGRATION};

const SCHEMA_TABLES: [&str; 3] = [
    "webhook_endpoints",
    "webhook_deliveries",
    "webhook_pending_deliveries",
];

#[derive(diesel::QueryableByName)]
struct ExistsResult {
    #[diesel(sql_type = diesel::sql_types::Bool)]
    exists: bool,
}

/// Returns the versions of all migrations compiled into the binary, sorted.
pub fn embedded_versions() -> PgResult<Vec<String>> {
    let migrations = MigrationSource::<Pg>::migrations(&MIGRATIONS).map_err(PgError::Migration)?;
    let mut versions: Vec<String> = migrations
        .iter()
        .map(|migration| migration.name().version().to_string())
        .collect();
    versions.sort();
    Ok(versions)
}

/// Compares applied migrations with the embedded ones.
#[tracing::instrument(skip(conn), target = TRACING_TARGET_MIGRATION)]
pub async fn get_migration_status(conn: &mut AsyncPgConnection) -> PgResult<MigrationStatus> {
    let applied_versions = get_applied_migrations(conn).await?;
    let pending_versions: Vec<String> = embedded_versions()?
        .into_iter()
        .filter(|version| !applied_versions.contains(version))
        .collect();

    let status = MigrationStatus::new(applied_versions, pending_versions);

    tracing::debug!(
        target: TRACING_TARGET_MIGRATION,
        applied_count = status.applied_migrations(),
        pending_count = status.pending_migrations(),
        "Migration status retrieved"
    );

    Ok(status)
}

/// Checks that migrations are fully applied and every table exists.
#[tracing::instrument(skip(conn), target = TRACING_TARGET_MIGRATION)]
pub async fn verify_schema_integrity(conn: &mut AsyncPgConnection) -> PgResult<()> {
    let status = get_migration_status(conn).await?;
    if !status.is_up_to_date() {
        return Err(PgError::Migration(
            format!("{} migrations pending", status.pending_migrations()).into(),
        ));
    }

    for table in SCHEMA_TABLES {
        if !table_exists(conn, table).await? {
            tracing::warn!(target: TRACING_TARGET_MIGRATION, table, "Schema table is missing");
            return Err(PgError::Migration(
                format!("table {table} does not exist").into(),
            ));
        }
    }

    tracing::debug!(target: TRACING_TARGET_MIGRATION, "Database schema integrity verified");
    Ok(())
}

/// Gets applied migration versions, empty on a fresh database.
#[tracing::instrument(skip(conn), target = TRACING_TARGET_MIGRATION)]
pub async fn get_applied_migrations(conn: &mut AsyncPgConnection) -> PgResult<Vec<String>> {
    #[derive(diesel::QueryableByName)]
    struct MigrationVersion {
        #[diesel(sql_type = diesel::sql_types::Text)]
        version: String,
    }

    if !table_exists(conn, "__diesel_schema_migrations").await? {
        return Ok(Vec::new());
    }

    let versions = sql_query("SELECT version FROM __diesel_schema_migrations ORDER BY version")
        .get_results::<MigrationVersion>(conn)
        .await
        .map_err(|e| PgError::Migration(format!("Failed to get applied migrations: {}", e).into()))?
        .into_iter()
        .map(|row| row.version)
        .collect();

    Ok(versions)
}

async fn table_exists(conn: &mut AsyncPgConnection, table: &str) -> PgResult<bool> {
    let result = sql_query(
        "SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_name = $1
         ) AS exists",
    )
    .bind::<diesel::sql_types::Text, _>(table)
    .get_result::<ExistsResult>(conn)
    .await
    .map_err(PgError::from)?;

    Ok(result.exists)
}
