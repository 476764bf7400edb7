use std::path::{Path, PathBuf};

use orchestrator_core::{EngineError, Result};
use orchestrator_database::SqliteStore;

/// Copies the store file into `backups/` before a migration runs, so
/// a failed migration can be recovered from manually even though the
/// migration itself rolls back cleanly inside its own transaction.
pub struct Migrator<'a> {
    store: &'a SqliteStore,
    db_path: PathBuf,
    backups_dir: PathBuf,
}

impl<'a> Migrator<'a> {
    pub fn new(store: &'a SqliteStore, db_path: impl Into<PathBuf>, backups_dir: impl Into<PathBuf>) -> Self {
        Self { store, db_path: db_path.into(), backups_dir: backups_dir.into() }
    }

    /// Back up the current store file, then apply any pending forward
    /// migrations. `sqlx::migrate!` itself wraps each migration in a
    /// transaction and rolls back automatically on failure; the
    /// backup is the belt-and-suspenders recovery path for the rare
    /// case where the store file is left in a state later opens
    /// cannot recognize at all.
    pub async fn migrate(&self) -> Result<()> {
        self.backup_if_present()?;
        self.store.migrate().await
    }

    fn backup_if_present(&self) -> Result<()> {
        if !self.db_path.exists() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.backups_dir)
            .map_err(|e| EngineError::WorkspaceError(format!("failed to prepare backups directory: {e}")))?;

        let backup_path = self.backups_dir.join(backup_file_name(&self.db_path));
        std::fs::copy(&self.db_path, &backup_path)
            .map_err(|e| EngineError::WorkspaceError(format!("failed to back up store before migration: {e}")))?;

        tracing::info!(backup = %backup_path.display(), "store backed up before migration");
        Ok(())
    }
}

fn backup_file_name(db_path: &Path) -> String {
    let stem = db_path.file_stem().and_then(|s| s.to_str()).unwrap_or("tasks");
    let ext = db_path.extension().and_then(|s| s.to_str()).unwrap_or("db");
    let timestamp = current_timestamp_suffix();
    format!("{stem}-{timestamp}.{ext}")
}

/// Seconds since the epoch, used only to make backup filenames unique
/// and sortable. Not a wall-clock measurement the engine reasons
/// about, so `SystemTime` (not `chrono::Utc::now`) is fine here.
fn current_timestamp_suffix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn backup_file_name_preserves_stem_and_extension() {
        let name = backup_file_name(Path::new("/workspace/.task-orchestrator/tasks.db"));
        assert!(name.starts_with("tasks-"));
        assert!(name.ends_with(".db"));
    }

    #[tokio::test]
    async fn migrate_skips_backup_when_no_existing_file() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        let migrator = Migrator::new(&store, dir.path().join("missing.db"), dir.path().join("backups"));
        migrator.migrate().await.unwrap();
        assert!(!dir.path().join("backups").exists());
    }

    #[tokio::test]
    async fn migrate_backs_up_existing_store_file() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("tasks.db");
        std::fs::write(&db_path, b"not a real sqlite file, just needs to exist").unwrap();

        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        let migrator = Migrator::new(&store, &db_path, dir.path().join("backups"));
        migrator.migrate().await.unwrap();

        let backups: Vec<_> = std::fs::read_dir(dir.path().join("backups")).unwrap().collect();
        assert_eq!(backups.len(), 1);
    }
}
