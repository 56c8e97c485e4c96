use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::archive::{create_archive, extract_archive, locate_package_root};
use crate::binder::ArtifactBinder;
use crate::descriptor::{validate_extension_id, ExtensionDescriptor, ExtensionType};
use crate::error::{ExtensionError, Result};
use crate::ledger::{ExtensionRecord, JsonLedger, LedgerStore};
use crate::migrate::{pending_migrations, MigrationRunner, RecordingMigrationRunner};
use crate::overlay::{OverlayResolver, OverrideOwnership};
use crate::paths::HostPaths;
use crate::publisher::{ArtifactKind, ArtifactPublisher};
use crate::registry::ExtensionRegistry;

/// Result of importing an extension archive.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub extension_id: String,
    pub is_update: bool,
    pub message: String,
}

/// Result of exporting an extension's live source tree.
#[derive(Debug, Clone)]
pub struct ExportedArchive {
    pub path: PathBuf,
    pub sha256: String,
}

/// One row of the administrative listing: everything on disk, whether or
/// not the ledger knows it.
#[derive(Debug, Clone)]
pub struct ExtensionStatus {
    pub id: String,
    pub name: String,
    pub version: String,
    pub enabled: bool,
    /// Whether a ledger record exists for this extension.
    pub installed: bool,
}

/// Orchestrates the extension lifecycle:
/// `Unknown → Discovered → Enabled ⇄ Disabled → Uninstalled`.
///
/// The engine performs no internal locking: the host is expected to
/// serialize administrative operations (one operator, one request at a
/// time). Concurrently enabling the same extension from two processes is
/// unsafe: both could pass the overlay conflict check before either
/// writes. Multi-process deployments should wrap each lifecycle call in
/// an advisory lock keyed by extension id, or one lock over the whole
/// extensions directory.
pub struct LifecycleManager {
    paths: HostPaths,
    ledger: Box<dyn LedgerStore>,
    registry: ExtensionRegistry,
    publisher: ArtifactPublisher,
    overlay: OverlayResolver,
    migrator: Box<dyn MigrationRunner>,
}

/// Kinds published unconditionally, in their fixed order. Theme and the
/// language overlay follow, gated on the descriptor's types.
const BASE_KINDS: [ArtifactKind; 4] = [
    ArtifactKind::Assets,
    ArtifactKind::Views,
    ArtifactKind::Config,
    ArtifactKind::Components,
];

impl LifecycleManager {
    /// Create a manager over the default file-backed ledger stored in the
    /// extensions root.
    pub async fn new(paths: HostPaths) -> Result<Self> {
        let ledger = JsonLedger::new(paths.extensions_root()).await?;
        Ok(Self::with_ledger(paths, Box::new(ledger)))
    }

    pub fn with_ledger(paths: HostPaths, ledger: Box<dyn LedgerStore>) -> Self {
        Self {
            registry: ExtensionRegistry::new(paths.clone()),
            publisher: ArtifactPublisher::new(paths.clone()),
            overlay: OverlayResolver::new(paths.clone()),
            migrator: Box::new(RecordingMigrationRunner),
            paths,
            ledger,
        }
    }

    pub fn with_migration_runner(mut self, migrator: Box<dyn MigrationRunner>) -> Self {
        self.migrator = migrator;
        self
    }

    pub fn paths(&self) -> &HostPaths {
        &self.paths
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ExtensionRegistry {
        &mut self.registry
    }

    pub fn publisher(&self) -> &ArtifactPublisher {
        &self.publisher
    }

    pub async fn record(&self, id: &str) -> Result<Option<ExtensionRecord>> {
        self.ledger.get(id).await
    }

    /// Host startup sequence: discover enabled extensions, run their
    /// registration hooks, then boot them.
    pub async fn startup(&mut self) -> Result<()> {
        self.registry.discover(self.ledger.as_ref()).await?;
        self.registry.register_all();
        self.registry.boot_all();
        Ok(())
    }

    /// Enable an extension: upsert its ledger record, run pending
    /// migrations, publish its artifacts in fixed order, and activate it.
    ///
    /// Any translation-overlay conflict rolls the whole operation back
    /// (record disabled again, every published kind retracted in reverse)
    /// and surfaces as [`ExtensionError::OverrideConflicts`] naming every
    /// blocking extension.
    pub async fn enable(&mut self, id: &str) -> Result<()> {
        validate_extension_id(id)?;

        let extension_dir = self.paths.extension_dir(id);
        if !extension_dir.is_dir() {
            return Err(ExtensionError::NotFound(id.to_string()));
        }

        let descriptor = ExtensionDescriptor::load(&extension_dir)
            .await
            .map_err(|e| invalid_metadata(id, e))?;

        let mut record = match self.ledger.get(id).await? {
            Some(mut existing) => {
                existing.refresh_from(&descriptor);
                existing.enabled = true;
                existing
            }
            None => ExtensionRecord::from_descriptor(&descriptor, true),
        };
        self.ledger.upsert(record.clone()).await?;

        // Migration failure is fatal: the record stays enabled but no
        // publish step runs.
        let pending = pending_migrations(&extension_dir, &record).await?;
        if !pending.is_empty() {
            self.migrator.apply(id, &pending).await?;
            for script in &pending {
                if let Some(name) = script.file_name() {
                    record
                        .applied_migrations
                        .push(name.to_string_lossy().to_string());
                }
            }
            self.ledger.upsert(record.clone()).await?;
        }

        let mut published: Vec<ArtifactKind> = Vec::new();
        for kind in BASE_KINDS {
            self.publisher.publish(kind, id, &extension_dir).await?;
            published.push(kind);
        }

        if descriptor.has_type(ExtensionType::Theme) {
            self.publisher
                .publish(ArtifactKind::Theme, id, &extension_dir)
                .await?;
            published.push(ArtifactKind::Theme);
        }

        if descriptor.has_type(ExtensionType::LanguagePack) {
            let lang_dir = extension_dir.join("lang");
            let ownership = OverrideOwnership::from_records(&self.ledger.list().await?, id);

            let report = self
                .overlay
                .publish(id, &lang_dir, &ownership, self.registry.translator_mut())
                .await?;

            if !report.is_clean() {
                record.enabled = false;
                self.ledger.upsert(record).await?;
                self.rollback_published(id, &published).await;

                return Err(ExtensionError::OverrideConflicts {
                    id: id.to_string(),
                    conflicts: report.conflicts,
                });
            }

            if !report.written_overrides.is_empty() {
                record.language_overrides = Some(report.written_overrides);
                self.ledger.upsert(record).await?;
            }
        }

        self.registry.activate(descriptor, extension_dir);
        self.registry.register_all();

        info!("Extension '{id}' enabled");
        Ok(())
    }

    /// Disable an extension: run its disable hook while artifacts still
    /// exist, flip the record, then retract every artifact kind.
    ///
    /// Safely repeatable: a missing record is a no-op and every unpublish
    /// step tolerates already-absent targets.
    pub async fn disable(&mut self, id: &str) -> Result<()> {
        let Some(mut record) = self.ledger.get(id).await? else {
            return Ok(());
        };

        // The hook may assume its artifacts are still published.
        self.registry.notify_disable(id);
        self.registry.deactivate(id);

        record.enabled = false;
        self.ledger.upsert(record.clone()).await?;

        let extension_dir = self.paths.extension_dir(id);
        for kind in BASE_KINDS {
            self.publisher.unpublish(kind, id).await?;
        }
        self.publisher.unpublish(ArtifactKind::Theme, id).await?;

        let tracked = record.owned_overrides().to_vec();
        self.overlay
            .unpublish(
                id,
                &extension_dir.join("lang"),
                &tracked,
                self.registry.translator_mut(),
            )
            .await?;

        if record.language_overrides.is_some() {
            record.language_overrides = None;
            self.ledger.upsert(record).await?;
        }

        info!("Extension '{id}' disabled");
        Ok(())
    }

    /// Disable, then destroy: delete the extension's source directory and
    /// its ledger record. Irreversible; callers must confirm first.
    ///
    /// Applied schema migrations are not rolled back; reversing them is
    /// unsupported and they are only logged here.
    pub async fn uninstall(&mut self, id: &str) -> Result<()> {
        self.disable(id).await?;

        if let Some(record) = self.ledger.get(id).await? {
            if !record.applied_migrations.is_empty() {
                warn!(
                    "Extension '{id}' leaves {} applied migration(s) in place; \
                     migration rollback is not supported",
                    record.applied_migrations.len()
                );
            }
        }

        let extension_dir = self.paths.extension_dir(id);
        if extension_dir.is_dir() {
            tokio::fs::remove_dir_all(&extension_dir)
                .await
                .map_err(|e| ExtensionError::io_op("remove extension directory", &extension_dir, e))?;
        }

        self.ledger.remove(id).await?;

        info!("Extension '{id}' uninstalled");
        Ok(())
    }

    /// Import an extension from a `.tar.gz` archive.
    ///
    /// The archive is extracted into an isolated temporary directory that
    /// is cleaned up on success and failure alike. The descriptor may sit
    /// at the archive root or in exactly one wrapper directory. An id
    /// already present on disk makes this an update: the old copy is
    /// fully uninstalled first. Files are copied, not moved, to stay safe
    /// across filesystem boundaries.
    pub async fn import(&mut self, archive_path: &Path, auto_enable: bool) -> Result<ImportOutcome> {
        // Dropped on every exit path, which deletes the extraction dir.
        let temp = tempfile::tempdir()?;

        extract_archive(archive_path, temp.path()).await?;

        let package_root =
            locate_package_root(temp.path()).ok_or_else(|| ExtensionError::InvalidPackage {
                reason: "extension.json not found in archive".to_string(),
            })?;

        let descriptor = ExtensionDescriptor::load(&package_root)
            .await
            .map_err(|e| ExtensionError::InvalidPackage {
                reason: format!("invalid extension.json: {e}"),
            })?;

        let target = self.paths.extension_dir(&descriptor.id);
        let is_update = target.is_dir();

        if is_update {
            info!("Extension '{}' already exists, updating", descriptor.id);
            self.uninstall(&descriptor.id).await?;
        }

        ArtifactBinder::new().copy_dir(&package_root, &target).await?;

        if auto_enable {
            self.enable(&descriptor.id).await?;
        }

        let message = if is_update {
            "Extension updated successfully"
        } else {
            "Extension imported successfully"
        };

        Ok(ImportOutcome {
            extension_id: descriptor.id,
            is_update,
            message: message.to_string(),
        })
    }

    /// Stream the extension's live source tree into a timestamped
    /// `.tar.gz` and return its path and SHA-256 digest.
    pub async fn export(&self, id: &str, output_dir: Option<&Path>) -> Result<ExportedArchive> {
        validate_extension_id(id)?;

        let extension_dir = self.paths.extension_dir(id);
        if !extension_dir.is_dir() {
            return Err(ExtensionError::NotFound(id.to_string()));
        }

        let filename = format!("{id}-{}.tar.gz", Utc::now().format("%Y-%m-%d-%H%M%S"));
        let path = output_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.paths.exports_root())
            .join(filename);

        let sha256 = create_archive(&extension_dir, &path).await?;
        Ok(ExportedArchive { path, sha256 })
    }

    /// Everything in the extensions root with a readable descriptor,
    /// joined against the ledger.
    pub async fn list_status(&self) -> Result<Vec<ExtensionStatus>> {
        let root = self.paths.extensions_root();
        let mut statuses = Vec::new();

        if !root.is_dir() {
            return Ok(statuses);
        }

        let mut entries = tokio::fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }

            let Ok(descriptor) = ExtensionDescriptor::load(entry.path()).await else {
                continue;
            };

            let record = self.ledger.get(&descriptor.id).await?;
            statuses.push(ExtensionStatus {
                enabled: record.as_ref().map(|r| r.enabled).unwrap_or(false),
                installed: record.is_some(),
                id: descriptor.id,
                name: descriptor.name,
                version: descriptor.version,
            });
        }

        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(statuses)
    }

    /// Retract already-published kinds in reverse order. Failures are
    /// logged, not raised: the conflict that triggered the rollback is
    /// the error the caller needs to see.
    async fn rollback_published(&mut self, id: &str, published: &[ArtifactKind]) {
        for kind in published.iter().rev() {
            if let Err(e) = self.publisher.unpublish(*kind, id).await {
                warn!("Rollback of {kind} for '{id}' failed: {e}");
            }
        }
    }
}

fn invalid_metadata(id: &str, error: ExtensionError) -> ExtensionError {
    match error {
        e @ ExtensionError::InvalidExtensionId(_) => e,
        ExtensionError::InvalidDescriptorFile { source, .. } => ExtensionError::InvalidMetadata {
            id: id.to_string(),
            reason: source.to_string(),
        },
        ExtensionError::IoOperation { source, .. }
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            ExtensionError::InvalidMetadata {
                id: id.to_string(),
                reason: "extension.json not found".to_string(),
            }
        }
        e => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DESCRIPTOR_FILE;
    use sha2::{Digest, Sha256};
    use tempfile::TempDir;
    use tokio::fs;

    async fn manager() -> (TempDir, LifecycleManager) {
        let temp = TempDir::new().unwrap();
        let paths = HostPaths::new(temp.path());
        let manager = LifecycleManager::new(paths).await.unwrap();
        (temp, manager)
    }

    async fn seed_descriptor(manager: &LifecycleManager, id: &str, descriptor: &str) -> PathBuf {
        let dir = manager.paths().extension_dir(id);
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(dir.join(DESCRIPTOR_FILE), descriptor).await.unwrap();
        dir
    }

    async fn seed_plugin(manager: &LifecycleManager, id: &str) -> PathBuf {
        seed_descriptor(
            manager,
            id,
            &format!(r#"{{"id": "{id}", "types": ["plugin"]}}"#),
        )
        .await
    }

    async fn seed_langpack(manager: &LifecycleManager, id: &str, name: &str, override_content: &str) {
        let dir = seed_descriptor(
            manager,
            id,
            &format!(r#"{{"id": "{id}", "name": "{name}", "types": ["language-pack"]}}"#),
        )
        .await;
        fs::create_dir_all(dir.join("lang/overrides/en")).await.unwrap();
        fs::write(dir.join("lang/overrides/en/activity.json"), override_content)
            .await
            .unwrap();
    }

    async fn seed_host_locale(manager: &LifecycleManager) {
        let en = manager.paths().locale_dir("en");
        fs::create_dir_all(&en).await.unwrap();
        fs::write(
            en.join("activity.json"),
            r#"{"auth": {"fail": "Login failed", "success": "Welcome"}}"#,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn enable_plugin_publishes_assets_only() {
        let (_temp, mut manager) = manager().await;
        let dir = seed_plugin(&manager, "ext-a").await;
        fs::create_dir_all(dir.join("public")).await.unwrap();
        fs::write(dir.join("public/style.css"), "body {}").await.unwrap();

        manager.enable("ext-a").await.unwrap();

        let record = manager.record("ext-a").await.unwrap().unwrap();
        assert!(record.enabled);
        assert!(record.language_overrides.is_none());

        let published = manager.paths().assets_target("ext-a").join("style.css");
        assert_eq!(fs::read_to_string(&published).await.unwrap(), "body {}");
        assert!(!manager.paths().theme_target("ext-a").exists());
        assert!(manager.registry().is_active("ext-a"));
    }

    #[tokio::test]
    async fn enable_rejects_missing_or_invalid_extensions() {
        let (_temp, mut manager) = manager().await;

        let err = manager.enable("ghost").await.unwrap_err();
        assert!(matches!(err, ExtensionError::NotFound(_)));

        // Directory present but no descriptor.
        fs::create_dir_all(manager.paths().extension_dir("bare"))
            .await
            .unwrap();
        let err = manager.enable("bare").await.unwrap_err();
        assert!(matches!(err, ExtensionError::InvalidMetadata { .. }));

        seed_descriptor(&manager, "broken", "{not json").await;
        let err = manager.enable("broken").await.unwrap_err();
        assert!(matches!(err, ExtensionError::InvalidMetadata { .. }));
    }

    #[tokio::test]
    async fn disable_is_idempotent() {
        let (_temp, mut manager) = manager().await;
        let dir = seed_plugin(&manager, "ext-a").await;
        fs::create_dir_all(dir.join("public")).await.unwrap();
        fs::write(dir.join("public/style.css"), "body {}").await.unwrap();

        manager.enable("ext-a").await.unwrap();
        manager.disable("ext-a").await.unwrap();
        // Second disable: no error, same end state.
        manager.disable("ext-a").await.unwrap();

        let record = manager.record("ext-a").await.unwrap().unwrap();
        assert!(!record.enabled);
        assert!(!manager.paths().assets_target("ext-a").exists());

        // Disabling something the ledger has never seen is a no-op.
        manager.disable("never-enabled").await.unwrap();
    }

    #[tokio::test]
    async fn enable_disable_roundtrip_leaves_no_published_artifacts() {
        let (_temp, mut manager) = manager().await;
        let dir = seed_descriptor(
            &manager,
            "full-ext",
            r#"{"id": "full-ext", "types": ["plugin", "theme"]}"#,
        )
        .await;

        for (subdir, file) in [
            ("public", "style.css"),
            ("views", "page.html"),
            ("admin/pages", "Example.html"),
            ("theme", "theme.css"),
        ] {
            fs::create_dir_all(dir.join(subdir)).await.unwrap();
            fs::write(dir.join(subdir).join(file), "content").await.unwrap();
        }

        manager.enable("full-ext").await.unwrap();

        assert!(manager.paths().assets_target("full-ext").exists());
        assert!(manager.paths().views_target("full-ext").exists());
        assert!(manager
            .paths()
            .components_target("admin", "pages", "full-ext")
            .exists());
        assert!(manager.paths().theme_target("full-ext").exists());

        manager.disable("full-ext").await.unwrap();

        assert!(!manager.paths().assets_target("full-ext").exists());
        assert!(!manager.paths().views_target("full-ext").exists());
        assert!(!manager
            .paths()
            .components_target("admin", "pages", "full-ext")
            .exists());
        assert!(!manager.paths().theme_target("full-ext").exists());
        // The extension's own source tree is untouched.
        assert!(dir.join("public/style.css").exists());
        assert!(dir.join("theme/theme.css").exists());
    }

    #[tokio::test]
    async fn second_langpack_conflicts_and_rolls_back() {
        let (_temp, mut manager) = manager().await;
        seed_host_locale(&manager).await;
        seed_langpack(
            &manager,
            "german-langpack",
            "German Language Pack",
            r#"{"auth": {"fail": "Anmeldung fehlgeschlagen"}}"#,
        )
        .await;
        seed_langpack(
            &manager,
            "pirate-langpack",
            "Pirate Language Pack",
            r#"{"auth": {"fail": "Arr, ye failed!"}}"#,
        )
        .await;

        manager.enable("german-langpack").await.unwrap();
        let german = manager.record("german-langpack").await.unwrap().unwrap();
        assert_eq!(
            german.language_overrides.as_deref(),
            Some(&["en/activity.json".to_string()][..])
        );

        let err = manager.enable("pirate-langpack").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'en/activity.json' is already overridden by 'German Language Pack'"));

        let pirate = manager.record("pirate-langpack").await.unwrap().unwrap();
        assert!(!pirate.enabled);
        assert!(pirate.owned_overrides().is_empty());
        assert!(!manager.registry().is_active("pirate-langpack"));

        // The winner's merge is still in place.
        let target = manager.paths().locale_dir("en").join("activity.json");
        let merged: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&target).await.unwrap()).unwrap();
        assert_eq!(merged["auth"]["fail"], "Anmeldung fehlgeschlagen");
        assert_eq!(merged["auth"]["success"], "Welcome");
    }

    #[tokio::test]
    async fn langpack_disable_restores_original_byte_for_byte() {
        let (_temp, mut manager) = manager().await;
        seed_host_locale(&manager).await;
        seed_langpack(
            &manager,
            "german-langpack",
            "German Language Pack",
            r#"{"auth": {"fail": "Anmeldung fehlgeschlagen"}}"#,
        )
        .await;

        let target = manager.paths().locale_dir("en").join("activity.json");
        let original_digest = format!("{:x}", Sha256::digest(&fs::read(&target).await.unwrap()));

        manager.enable("german-langpack").await.unwrap();
        manager.disable("german-langpack").await.unwrap();

        let restored_digest = format!("{:x}", Sha256::digest(&fs::read(&target).await.unwrap()));
        assert_eq!(restored_digest, original_digest);

        let record = manager.record("german-langpack").await.unwrap().unwrap();
        assert!(record.language_overrides.is_none());
    }

    #[tokio::test]
    async fn enable_tracks_migrations_once() {
        let (_temp, mut manager) = manager().await;
        let dir = seed_plugin(&manager, "ext-a").await;
        fs::create_dir_all(dir.join("migrations")).await.unwrap();
        fs::write(dir.join("migrations/001_create.sql"), "create").await.unwrap();
        fs::write(dir.join("migrations/002_alter.sql"), "alter").await.unwrap();

        manager.enable("ext-a").await.unwrap();
        let record = manager.record("ext-a").await.unwrap().unwrap();
        assert_eq!(
            record.applied_migrations,
            vec!["001_create.sql", "002_alter.sql"]
        );

        // Re-enable: nothing pending, nothing duplicated.
        manager.enable("ext-a").await.unwrap();
        let record = manager.record("ext-a").await.unwrap().unwrap();
        assert_eq!(record.applied_migrations.len(), 2);
    }

    #[tokio::test]
    async fn uninstall_removes_sources_and_record() {
        let (_temp, mut manager) = manager().await;
        let dir = seed_plugin(&manager, "ext-a").await;
        fs::create_dir_all(dir.join("public")).await.unwrap();
        fs::write(dir.join("public/style.css"), "body {}").await.unwrap();

        manager.enable("ext-a").await.unwrap();
        manager.uninstall("ext-a").await.unwrap();

        assert!(!dir.exists());
        assert!(manager.record("ext-a").await.unwrap().is_none());
        assert!(!manager.paths().assets_target("ext-a").exists());
    }

    #[tokio::test]
    async fn import_installs_and_updates() {
        let (_temp, mut manager) = manager().await;

        // Build an archive out-of-tree.
        let staging = TempDir::new().unwrap();
        let tree = staging.path().join("ext-a");
        fs::create_dir_all(tree.join("public")).await.unwrap();
        fs::write(
            tree.join(DESCRIPTOR_FILE),
            r#"{"id": "ext-a", "version": "1.0.0"}"#,
        )
        .await
        .unwrap();
        fs::write(tree.join("public/style.css"), "v1").await.unwrap();
        let archive = staging.path().join("ext-a.tar.gz");
        create_archive(&tree, &archive).await.unwrap();

        let outcome = manager.import(&archive, true).await.unwrap();
        assert!(!outcome.is_update);
        assert_eq!(outcome.extension_id, "ext-a");

        let record = manager.record("ext-a").await.unwrap().unwrap();
        assert!(record.enabled);
        assert!(manager.paths().assets_target("ext-a").exists());

        // Same id again: the old copy is uninstalled first.
        fs::write(tree.join("public/style.css"), "v2").await.unwrap();
        fs::write(
            tree.join(DESCRIPTOR_FILE),
            r#"{"id": "ext-a", "version": "2.0.0"}"#,
        )
        .await
        .unwrap();
        create_archive(&tree, &archive).await.unwrap();

        let outcome = manager.import(&archive, true).await.unwrap();
        assert!(outcome.is_update);

        let record = manager.record("ext-a").await.unwrap().unwrap();
        assert_eq!(record.version, "2.0.0");
        assert_eq!(
            fs::read_to_string(manager.paths().extension_dir("ext-a").join("public/style.css"))
                .await
                .unwrap(),
            "v2"
        );
    }

    #[tokio::test]
    async fn import_with_wrapper_directory_finds_descriptor() {
        let (_temp, mut manager) = manager().await;

        let staging = TempDir::new().unwrap();
        // The tree that gets archived contains a single wrapper dir.
        let outer = staging.path().join("release");
        let inner = outer.join("ext-b-1.0.0");
        fs::create_dir_all(&inner).await.unwrap();
        fs::write(inner.join(DESCRIPTOR_FILE), r#"{"id": "ext-b"}"#)
            .await
            .unwrap();
        let archive = staging.path().join("ext-b.tar.gz");
        create_archive(&outer, &archive).await.unwrap();

        let outcome = manager.import(&archive, false).await.unwrap();
        assert_eq!(outcome.extension_id, "ext-b");
        assert!(manager
            .paths()
            .extension_dir("ext-b")
            .join(DESCRIPTOR_FILE)
            .exists());
        // Not enabled without the flag.
        assert!(manager.record("ext-b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn import_without_descriptor_is_invalid_package() {
        let (_temp, mut manager) = manager().await;

        let staging = TempDir::new().unwrap();
        let tree = staging.path().join("not-an-extension");
        fs::create_dir_all(tree.join("docs")).await.unwrap();
        fs::write(tree.join("docs/README.md"), "hello").await.unwrap();
        let archive = staging.path().join("bad.tar.gz");
        create_archive(&tree, &archive).await.unwrap();

        let err = manager.import(&archive, false).await.unwrap_err();
        assert!(matches!(err, ExtensionError::InvalidPackage { .. }));
    }

    #[tokio::test]
    async fn export_then_import_roundtrips() {
        let (_temp, mut manager) = manager().await;
        let dir = seed_plugin(&manager, "ext-a").await;
        fs::create_dir_all(dir.join("public")).await.unwrap();
        fs::write(dir.join("public/style.css"), "body {}").await.unwrap();

        let staging = TempDir::new().unwrap();
        let exported = manager.export("ext-a", Some(staging.path())).await.unwrap();
        assert!(exported.path.exists());
        assert_eq!(exported.sha256.len(), 64);

        manager.uninstall("ext-a").await.unwrap();
        assert!(!dir.exists());

        let outcome = manager.import(&exported.path, false).await.unwrap();
        assert!(!outcome.is_update);
        assert_eq!(
            fs::read_to_string(dir.join("public/style.css")).await.unwrap(),
            "body {}"
        );
    }

    #[tokio::test]
    async fn export_missing_extension_is_not_found() {
        let (_temp, manager) = manager().await;
        let err = manager.export("ghost", None).await.unwrap_err();
        assert!(matches!(err, ExtensionError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_status_joins_disk_and_ledger() {
        let (_temp, mut manager) = manager().await;
        seed_plugin(&manager, "ext-enabled").await;
        seed_plugin(&manager, "ext-never-enabled").await;

        manager.enable("ext-enabled").await.unwrap();

        let statuses = manager.list_status().await.unwrap();
        assert_eq!(statuses.len(), 2);

        let enabled = statuses.iter().find(|s| s.id == "ext-enabled").unwrap();
        assert!(enabled.enabled);
        assert!(enabled.installed);

        let dormant = statuses.iter().find(|s| s.id == "ext-never-enabled").unwrap();
        assert!(!dormant.enabled);
        assert!(!dormant.installed);
    }

    #[tokio::test]
    async fn startup_discovers_registers_and_boots() {
        let (_temp, mut manager) = manager().await;
        let dir = seed_plugin(&manager, "ext-a").await;
        fs::create_dir_all(dir.join("lang/en")).await.unwrap();

        manager.enable("ext-a").await.unwrap();

        // Fresh process over the same host root.
        let paths = manager.paths().clone();
        drop(manager);
        let mut manager = LifecycleManager::new(paths).await.unwrap();
        manager.startup().await.unwrap();

        assert!(manager.registry().is_active("ext-a"));
        assert!(manager.registry().translator().has_namespace("ext-a"));
    }
}
