//! Migration methods on [`PgClient`].

use super::{
    MigrationResult, MigrationStatus, get_migration_status, run_pending_migrations,
    verify_schema_integrity,
};
use crate::{PgClient, PgResult};

/// Extension trait adding migration management to [`PgClient`].
pub trait PgClientExt {
    /// Applies all pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if any migration fails to apply or if there are
    /// connectivity issues with the database.
    fn run_pending_migrations(&self) -> impl Future<Output = PgResult<MigrationResult>> + Send;

    /// Gets the applied and pending migration versions.
    fn get_migration_status(&self) -> impl Future<Output = PgResult<MigrationStatus>> + Send;

    /// Verifies that the schema is fully migrated.
    fn verify_schema_integrity(&self) -> impl Future<Output = PgResult<()>> + Send;
}

impl PgClientExt for PgClient {
    async fn run_pending_migrations(&self) -> PgResult<MigrationResult> {
        run_pending_migrations(self).await
    }

    async fn get_migration_status(&self) -> PgResult<MigrationStatus> {
        let mut conn = self.get_connection().await?;
        get_migration_status(&mut conn).await
    }

    async fn verify_schema_integrity(&self) -> PgResult<()> {
        let mut conn = self.get_connection().await?;
        verify_schema_integrity(&mut conn).await
    }
}
