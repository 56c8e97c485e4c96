use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ExtensionError, Result};

/// Extract a `.tar.gz` extension package into `dest`.
///
/// The destination is expected to be an isolated temporary directory; the
/// archive's own directory structure is preserved beneath it.
pub async fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();

    run_blocking(move || {
        let file = std::fs::File::open(&archive).map_err(|e| ExtensionError::InvalidPackage {
            reason: format!("failed to open archive '{}': {e}", archive.display()),
        })?;

        tar::Archive::new(GzDecoder::new(file))
            .unpack(&dest)
            .map_err(|e| ExtensionError::InvalidPackage {
                reason: format!("failed to extract archive: {e}"),
            })?;

        Ok(())
    })
    .await
}

/// Walk `src_dir` and stream its files into a `.tar.gz` at `dest_file`,
/// paths relative to `src_dir`. Returns the SHA-256 digest of the
/// produced archive.
pub async fn create_archive(src_dir: &Path, dest_file: &Path) -> Result<String> {
    let src_dir = src_dir.to_path_buf();
    let dest_file = dest_file.to_path_buf();

    run_blocking(move || {
        if let Some(parent) = dest_file.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ExtensionError::io_op("create directory", parent, e))?;
        }

        let file = std::fs::File::create(&dest_file)
            .map_err(|e| ExtensionError::io_op("create archive", &dest_file, e))?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for entry in WalkDir::new(&src_dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| ExtensionError::InvalidPackage {
                reason: format!("failed to walk '{}': {e}", src_dir.display()),
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&src_dir)
                .map_err(|e| ExtensionError::InvalidPackage {
                    reason: format!("path outside archive root: {e}"),
                })?;

            builder
                .append_path_with_name(entry.path(), relative)
                .map_err(|e| ExtensionError::io_op("append to archive", entry.path(), e))?;
        }

        builder
            .into_inner()
            .and_then(|encoder| encoder.finish())
            .map_err(|e| ExtensionError::io_op("finish archive", &dest_file, e))?;

        let bytes = std::fs::read(&dest_file)
            .map_err(|e| ExtensionError::io_op("read archive", &dest_file, e))?;
        let digest = format!("{:x}", Sha256::digest(&bytes));

        debug!(
            "Created archive {} ({} bytes, sha256 {digest})",
            dest_file.display(),
            bytes.len()
        );
        Ok(digest)
    })
    .await
}

/// Locate the extension root inside an extracted archive: the descriptor
/// sits either at the extraction root or in exactly one immediate
/// subdirectory (first match wins).
pub fn locate_package_root(extracted: &Path) -> Option<PathBuf> {
    let descriptor = extracted.join(crate::descriptor::DESCRIPTOR_FILE);
    if descriptor.is_file() {
        return Some(extracted.to_path_buf());
    }

    let mut subdirs: Vec<PathBuf> = std::fs::read_dir(extracted)
        .ok()?
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.path())
        .collect();
    subdirs.sort();

    subdirs
        .into_iter()
        .find(|dir| dir.join(crate::descriptor::DESCRIPTOR_FILE).is_file())
}

async fn run_blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ExtensionError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::fs;

    async fn seed_extension_tree(root: &Path) {
        fs::create_dir_all(root.join("public")).await.unwrap();
        fs::write(root.join("extension.json"), r#"{"id": "ext-a"}"#)
            .await
            .unwrap();
        fs::write(root.join("public/style.css"), "body {}").await.unwrap();
    }

    #[tokio::test]
    async fn archive_roundtrip_preserves_tree() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("ext-a");
        seed_extension_tree(&source).await;

        let archive = temp.path().join("ext-a.tar.gz");
        let digest = create_archive(&source, &archive).await.unwrap();
        assert_eq!(digest.len(), 64);

        let extracted = temp.path().join("out");
        extract_archive(&archive, &extracted).await.unwrap();

        assert_eq!(
            fs::read_to_string(extracted.join("extension.json")).await.unwrap(),
            r#"{"id": "ext-a"}"#
        );
        assert_eq!(
            fs::read_to_string(extracted.join("public/style.css")).await.unwrap(),
            "body {}"
        );
    }

    #[tokio::test]
    async fn digest_matches_archive_bytes() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("ext-a");
        seed_extension_tree(&source).await;

        let archive = temp.path().join("ext-a.tar.gz");
        let digest = create_archive(&source, &archive).await.unwrap();

        let bytes = fs::read(&archive).await.unwrap();
        assert_eq!(digest, format!("{:x}", Sha256::digest(&bytes)));
    }

    #[tokio::test]
    async fn extract_missing_archive_is_invalid_package() {
        let temp = TempDir::new().unwrap();
        let err = extract_archive(&temp.path().join("missing.tar.gz"), temp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtensionError::InvalidPackage { .. }));
    }

    #[tokio::test]
    async fn locate_package_root_finds_wrapper_directory() {
        let temp = TempDir::new().unwrap();

        // Descriptor at root.
        seed_extension_tree(temp.path()).await;
        assert_eq!(locate_package_root(temp.path()).unwrap(), temp.path());

        // Descriptor in a wrapper subdirectory.
        let wrapped = TempDir::new().unwrap();
        let inner = wrapped.path().join("ext-a-1.0.0");
        seed_extension_tree(&inner).await;
        assert_eq!(locate_package_root(wrapped.path()).unwrap(), inner);

        // No descriptor anywhere.
        let empty = TempDir::new().unwrap();
        fs::create_dir_all(empty.path().join("docs")).await.unwrap();
        assert!(locate_package_root(empty.path()).is_none());
    }
}
