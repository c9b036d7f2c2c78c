//! Migration status and result types.

use std::time::Duration;

/// Applied and pending migration versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Applied migration versions in chronological order
    pub applied_versions: Vec<String>,
    /// Embedded migration versions not yet applied
    pub pending_versions: Vec<String>,
}

impl MigrationStatus {
    /// Creates a new migration status.
    pub fn new(
        applied_versions: impl Into<Vec<String>>,
        pending_versions: impl Into<Vec<String>>,
    ) -> Self {
        Self {
            applied_versions: applied_versions.into(),
            pending_versions: pending_versions.into(),
        }
    }

    /// Returns the last applied migration version, if any.
    pub fn last_applied_version(&self) -> Option<&str> {
        self.applied_versions.last().map(|s| s.as_str())
    }

    /// Returns the next pending migration version, if any.
    pub fn next_pending_version(&self) -> Option<&str> {
        self.pending_versions.first().map(|s| s.as_str())
    }

    #[inline]
    pub fn applied_migrations(&self) -> usize {
        self.applied_versions.len()
    }

    #[inline]
    pub fn pending_migrations(&self) -> usize {
        self.pending_versions.len()
    }

    /// Returns true if all embedded migrations have been applied.
    #[inline]
    pub fn is_up_to_date(&self) -> bool {
        self.pending_versions.is_empty()
    }
}

/// Outcome of a migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationResult {
    /// Total duration of the migration operation
    pub duration: Duration,
    /// Migration versions that were applied
    pub processed_versions: Vec<String>,
}

impl MigrationResult {
    /// Creates a successful migration result.
    pub fn success(duration: Duration, processed_versions: Vec<String>) -> Self {
        Self {
            duration,
            processed_versions,
        }
    }

    /// Returns whether nothing had to be applied.
    pub fn is_no_op(&self) -> bool {
        self.processed_versions.is_empty()
    }

    /// Returns the last applied migration version, if any.
    pub fn last_processed_version(&self) -> Option<&str> {
        self.processed_versions.last().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_status() {
        let status = MigrationStatus::new(
            vec!["20251001000000".to_string()],
            vec!["20251101000000".to_string()],
        );

        assert!(!status.is_up_to_date());
        assert_eq!(status.last_applied_version(), Some("20251001000000"));
        assert_eq!(status.next_pending_version(), Some("20251101000000"));
    }

    #[test]
    fn test_migration_status_up_to_date() {
        let status = MigrationStatus::new(vec!["20251001000000".to_string()], vec![]);
        assert!(status.is_up_to_date());
        assert_eq!(status.next_pending_version(), None);
    }

    #[test]
    fn test_migration_result() {
        let noop = MigrationResult::success(Duration::from_millis(5), vec![]);
        assert!(noop.is_no_op());

        let applied =
            MigrationResult::success(Duration::from_millis(50), vec!["20251001000000".into()]);
        assert!(!applied.is_no_op());
        assert_eq!(applied.last_processed_version(), Some("20251001000000"));
    }
}
