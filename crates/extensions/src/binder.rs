use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{ExtensionError, Result};

/// How a single publish step projects a source tree into the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStrategy {
    /// Recursive copy of the source directory.
    Copy,
    /// Create-or-replace link from target to source.
    Link,
    /// Load the source and merge it into a runtime namespace; no
    /// filesystem artifact is produced.
    MergeWrite,
}

/// One publish step. Ephemeral: recomputed from the extension's directory
/// layout on every publish/unpublish call, never persisted.
#[derive(Debug, Clone)]
pub struct ArtifactBinding {
    pub source: PathBuf,
    pub target: PathBuf,
    pub strategy: BindStrategy,
}

/// Link implementation for the current platform.
///
/// `Symlink` uses real symbolic links. `TrackedCopy` is the fallback for
/// platforms without reliable symlink primitives: the source is copied and
/// the target is recorded in a managed-paths manifest next to the target's
/// parent directory, so unpublish can still identify extension-owned trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    Symlink,
    TrackedCopy,
}

impl LinkMode {
    pub fn for_platform() -> Self {
        if cfg!(unix) {
            LinkMode::Symlink
        } else {
            LinkMode::TrackedCopy
        }
    }
}

/// Name of the manifest recording tracked-copy targets, one per parent
/// directory of managed targets.
const MANAGED_MANIFEST: &str = ".managed-paths.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ManagedPaths {
    paths: Vec<String>,
}

/// Primitive filesystem operations shared by every publish strategy.
#[derive(Debug, Clone)]
pub struct ArtifactBinder {
    mode: LinkMode,
}

impl Default for ArtifactBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactBinder {
    pub fn new() -> Self {
        Self {
            mode: LinkMode::for_platform(),
        }
    }

    pub fn with_link_mode(mode: LinkMode) -> Self {
        Self { mode }
    }

    pub fn link_mode(&self) -> LinkMode {
        self.mode
    }

    /// Recursively copy `source` into `target`, creating parents as needed.
    pub async fn copy_dir(&self, source: &Path, target: &Path) -> Result<()> {
        fs::create_dir_all(target)
            .await
            .map_err(|e| ExtensionError::io_op("create directory", target, e))?;

        let mut pending = vec![(source.to_path_buf(), target.to_path_buf())];

        while let Some((src, dst)) = pending.pop() {
            let mut entries = fs::read_dir(&src)
                .await
                .map_err(|e| ExtensionError::io_op("read directory", &src, e))?;

            while let Some(entry) = entries.next_entry().await? {
                let src_path = entry.path();
                let dst_path = dst.join(entry.file_name());
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    fs::create_dir_all(&dst_path)
                        .await
                        .map_err(|e| ExtensionError::io_op("create directory", &dst_path, e))?;
                    pending.push((src_path, dst_path));
                } else if file_type.is_file() {
                    fs::copy(&src_path, &dst_path)
                        .await
                        .map_err(|e| ExtensionError::io_op("copy file", &src_path, e))?;
                }
                // Symlinks inside extension sources are not followed.
            }
        }

        Ok(())
    }

    /// Create-or-replace a link at `target` pointing at `source`. Any
    /// existing link or directory at `target` is removed first.
    pub async fn bind_link(&self, source: &Path, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ExtensionError::io_op("create directory", parent, e))?;
        }

        self.remove_target(target).await?;

        match self.mode {
            LinkMode::Symlink => {
                symlink_dir(source, target)
                    .await
                    .map_err(|e| ExtensionError::io_op("create link", target, e))?;
            }
            LinkMode::TrackedCopy => {
                self.copy_dir(source, target).await?;
                self.record_managed(target).await?;
            }
        }

        debug!("Bound {} -> {}", target.display(), source.display());
        Ok(())
    }

    /// Remove whatever is published at `target`: a link is unlinked, a
    /// directory is deleted recursively. An absent target is a no-op.
    pub async fn unbind(&self, target: &Path) -> Result<()> {
        self.remove_target(target).await?;

        if self.mode == LinkMode::TrackedCopy {
            self.forget_managed(target).await?;
        }

        debug!("Unbound {}", target.display());
        Ok(())
    }

    /// Recursively delete a directory; absent targets are a no-op.
    pub async fn remove_dir(&self, target: &Path) -> Result<()> {
        match fs::remove_dir_all(target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ExtensionError::io_op("remove directory", target, e)),
        }
    }

    /// Platform-tolerant check that `target` is a binding of `source`.
    ///
    /// Symlink introspection is unreliable on some platforms, so this also
    /// compares canonicalized paths and consults the managed-paths
    /// manifest for tracked copies.
    pub async fn points_into(&self, target: &Path, source: &Path) -> bool {
        if let Ok(dest) = fs::read_link(target).await {
            if dest == source {
                return true;
            }
        }

        if let (Ok(a), Ok(b)) = (fs::canonicalize(target).await, fs::canonicalize(source).await) {
            if a == b {
                return true;
            }
        }

        if self.mode == LinkMode::TrackedCopy {
            return self.is_managed(target).await;
        }

        false
    }

    /// Whether `dir` exists and contains at least one entry.
    pub async fn dir_has_entries(dir: &Path) -> bool {
        match fs::read_dir(dir).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
            Err(_) => false,
        }
    }

    fn manifest_path(target: &Path) -> Option<PathBuf> {
        target.parent().map(|p| p.join(MANAGED_MANIFEST))
    }

    async fn read_manifest(path: &Path) -> ManagedPaths {
        match fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Managed-paths manifest at {} is corrupt: {e}", path.display());
                ManagedPaths::default()
            }),
            Err(_) => ManagedPaths::default(),
        }
    }

    async fn record_managed(&self, target: &Path) -> Result<()> {
        let Some(manifest_path) = Self::manifest_path(target) else {
            return Ok(());
        };

        let mut manifest = Self::read_manifest(&manifest_path).await;
        let entry = target.to_string_lossy().to_string();
        if !manifest.paths.contains(&entry) {
            manifest.paths.push(entry);
            manifest.paths.sort();
            fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
                .await
                .map_err(|e| ExtensionError::io_op("write managed manifest", &manifest_path, e))?;
        }
        Ok(())
    }

    async fn forget_managed(&self, target: &Path) -> Result<()> {
        let Some(manifest_path) = Self::manifest_path(target) else {
            return Ok(());
        };
        if !manifest_path.exists() {
            return Ok(());
        }

        let mut manifest = Self::read_manifest(&manifest_path).await;
        let entry = target.to_string_lossy().to_string();
        if let Some(pos) = manifest.paths.iter().position(|p| *p == entry) {
            manifest.paths.remove(pos);
            fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
                .await
                .map_err(|e| ExtensionError::io_op("write managed manifest", &manifest_path, e))?;
        }
        Ok(())
    }

    async fn is_managed(&self, target: &Path) -> bool {
        let Some(manifest_path) = Self::manifest_path(target) else {
            return false;
        };
        let manifest = Self::read_manifest(&manifest_path).await;
        manifest.paths.iter().any(|p| Path::new(p) == target)
    }

    async fn remove_target(&self, target: &Path) -> Result<()> {
        match fs::symlink_metadata(target).await {
            Ok(metadata) => {
                if metadata.file_type().is_symlink() {
                    if fs::remove_file(target).await.is_err() {
                        fs::remove_dir(target)
                            .await
                            .map_err(|e| ExtensionError::io_op("remove link", target, e))?;
                    }
                } else if metadata.is_dir() {
                    fs::remove_dir_all(target)
                        .await
                        .map_err(|e| ExtensionError::io_op("remove directory", target, e))?;
                } else {
                    fs::remove_file(target)
                        .await
                        .map_err(|e| ExtensionError::io_op("remove file", target, e))?;
                }
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ExtensionError::io_op("inspect target", target, e)),
        }
    }
}

#[cfg(unix)]
async fn symlink_dir(source: &Path, target: &Path) -> std::io::Result<()> {
    fs::symlink(source, target).await
}

#[cfg(windows)]
async fn symlink_dir(source: &Path, target: &Path) -> std::io::Result<()> {
    fs::symlink_dir(source, target).await
}

#[cfg(not(any(unix, windows)))]
async fn symlink_dir(_source: &Path, _target: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn seed_tree(root: &Path) {
        fs::create_dir_all(root.join("nested")).await.unwrap();
        fs::write(root.join("style.css"), "body {}").await.unwrap();
        fs::write(root.join("nested/app.js"), "init()").await.unwrap();
    }

    #[tokio::test]
    async fn copy_dir_copies_recursively() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        let target = temp.path().join("dst");
        seed_tree(&source).await;

        let binder = ArtifactBinder::new();
        binder.copy_dir(&source, &target).await.unwrap();

        assert_eq!(
            fs::read_to_string(target.join("style.css")).await.unwrap(),
            "body {}"
        );
        assert_eq!(
            fs::read_to_string(target.join("nested/app.js")).await.unwrap(),
            "init()"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn bind_and_unbind_symlink() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        let target = temp.path().join("published").join("ext-a");
        seed_tree(&source).await;

        let binder = ArtifactBinder::with_link_mode(LinkMode::Symlink);
        binder.bind_link(&source, &target).await.unwrap();

        assert!(binder.points_into(&target, &source).await);
        assert_eq!(
            fs::read_to_string(target.join("style.css")).await.unwrap(),
            "body {}"
        );

        binder.unbind(&target).await.unwrap();
        assert!(fs::symlink_metadata(&target).await.is_err());
        // Source untouched.
        assert!(source.join("style.css").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn bind_link_replaces_stale_directory() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        let target = temp.path().join("published").join("ext-a");
        seed_tree(&source).await;

        // A stale real directory occupies the target.
        fs::create_dir_all(&target).await.unwrap();
        fs::write(target.join("stale.txt"), "old").await.unwrap();

        let binder = ArtifactBinder::with_link_mode(LinkMode::Symlink);
        binder.bind_link(&source, &target).await.unwrap();

        assert!(binder.points_into(&target, &source).await);
        assert!(!target.join("stale.txt").exists());
    }

    #[tokio::test]
    async fn tracked_copy_mode_manages_targets() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        let target = temp.path().join("published").join("ext-a");
        seed_tree(&source).await;

        let binder = ArtifactBinder::with_link_mode(LinkMode::TrackedCopy);
        binder.bind_link(&source, &target).await.unwrap();

        assert!(binder.points_into(&target, &source).await);
        assert!(binder.is_managed(&target).await);
        assert_eq!(
            fs::read_to_string(target.join("style.css")).await.unwrap(),
            "body {}"
        );

        binder.unbind(&target).await.unwrap();
        assert!(!target.exists());
        assert!(!binder.is_managed(&target).await);
    }

    #[tokio::test]
    async fn unbind_missing_target_is_a_noop() {
        let temp = TempDir::new().unwrap();
        let binder = ArtifactBinder::new();

        binder.unbind(&temp.path().join("never-existed")).await.unwrap();
        binder.remove_dir(&temp.path().join("also-missing")).await.unwrap();
    }

    #[tokio::test]
    async fn dir_has_entries_reports_content() {
        let temp = TempDir::new().unwrap();
        let empty = temp.path().join("empty");
        fs::create_dir_all(&empty).await.unwrap();

        assert!(!ArtifactBinder::dir_has_entries(&empty).await);
        assert!(!ArtifactBinder::dir_has_entries(&temp.path().join("missing")).await);

        fs::write(empty.join("f.txt"), "x").await.unwrap();
        assert!(ArtifactBinder::dir_has_entries(&empty).await);
    }
}
