use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{ExtensionError, Result};
use crate::ledger::ExtensionRecord;

/// Seam to the host's schema migrator.
///
/// The engine tracks which scripts have been applied per extension; what
/// "applying" means belongs to the persistence layer behind this trait.
/// Rollback is deliberately absent: migrations are tracked but never
/// reversed (see `LifecycleManager::uninstall`).
#[async_trait]
pub trait MigrationRunner: Send + Sync {
    /// Apply the given pending scripts in order. A failure must identify
    /// the script so the caller can surface it.
    async fn apply(&self, extension_id: &str, scripts: &[PathBuf]) -> Result<()>;
}

/// Default runner: verifies each script is readable and records nothing
/// else. Hosts with a real schema layer substitute their own runner.
pub struct RecordingMigrationRunner;

#[async_trait]
impl MigrationRunner for RecordingMigrationRunner {
    async fn apply(&self, extension_id: &str, scripts: &[PathBuf]) -> Result<()> {
        for script in scripts {
            fs::read(script)
                .await
                .map_err(|e| ExtensionError::MigrationFailure {
                    id: extension_id.to_string(),
                    script: script
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| script.display().to_string()),
                    reason: e.to_string(),
                })?;
            debug!("Applied migration {}", script.display());
        }

        if !scripts.is_empty() {
            info!(
                "Applied {} migration(s) for extension '{extension_id}'",
                scripts.len()
            );
        }
        Ok(())
    }
}

/// Migration scripts under `migrations/` that the record has not yet
/// applied, in filename order.
pub async fn pending_migrations(
    extension_dir: &Path,
    record: &ExtensionRecord,
) -> Result<Vec<PathBuf>> {
    let migrations_dir = extension_dir.join("migrations");
    if !migrations_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut scripts = Vec::new();
    let mut entries = fs::read_dir(&migrations_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !record.applied_migrations.iter().any(|m| *m == name) {
            scripts.push(entry.path());
        }
    }

    scripts.sort();
    Ok(scripts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ExtensionType;
    use tempfile::TempDir;

    fn record_with_applied(applied: &[&str]) -> ExtensionRecord {
        ExtensionRecord {
            identifier: "ext-a".to_string(),
            name: "ext-a".to_string(),
            description: None,
            version: "1.0.0".to_string(),
            author: None,
            types: vec![ExtensionType::Plugin],
            enabled: true,
            applied_migrations: applied.iter().map(|s| s.to_string()).collect(),
            language_overrides: None,
            settings: None,
        }
    }

    #[tokio::test]
    async fn pending_migrations_skips_applied_and_sorts() {
        let temp = TempDir::new().unwrap();
        let migrations = temp.path().join("migrations");
        fs::create_dir_all(&migrations).await.unwrap();
        fs::write(migrations.join("002_add_column.sql"), "alter").await.unwrap();
        fs::write(migrations.join("001_create_table.sql"), "create").await.unwrap();
        fs::write(migrations.join("003_index.sql"), "index").await.unwrap();

        let record = record_with_applied(&["001_create_table.sql"]);
        let pending = pending_migrations(temp.path(), &record).await.unwrap();

        let names: Vec<_> = pending
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["002_add_column.sql", "003_index.sql"]);
    }

    #[tokio::test]
    async fn no_migrations_directory_means_nothing_pending() {
        let temp = TempDir::new().unwrap();
        let record = record_with_applied(&[]);
        assert!(pending_migrations(temp.path(), &record).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recording_runner_fails_on_unreadable_script() {
        let runner = RecordingMigrationRunner;
        let err = runner
            .apply("ext-a", &[PathBuf::from("/nonexistent/001.sql")])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExtensionError::MigrationFailure { ref script, .. } if script == "001.sql"
        ));
    }
}
