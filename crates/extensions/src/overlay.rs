use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use tracing::{debug, info};

use crate::binder::ArtifactBinder;
use crate::error::Result;
use crate::ledger::ExtensionRecord;
use crate::paths::HostPaths;

/// A translation override another enabled extension already owns.
///
/// Produced transiently during the conflict-detection pass of `enable`;
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideConflict {
    /// `"locale/filename"` key of the contested override.
    pub override_key: String,
    pub blocking_extension_id: String,
    pub blocking_extension_name: String,
}

/// One override file an extension wants to apply, resolved against the
/// host's catalog layout.
#[derive(Debug, Clone)]
pub struct CandidateOverride {
    pub key: String,
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Snapshot of which enabled extension owns which override keys, taken
/// from the ledger before any write.
#[derive(Debug, Clone)]
pub struct OverrideOwnership {
    pub extension_id: String,
    pub extension_name: String,
    pub keys: Vec<String>,
}

impl OverrideOwnership {
    /// Build the ownership snapshot from ledger records: enabled
    /// extensions with tracked overrides, excluding the extension
    /// currently being enabled.
    pub fn from_records(records: &[ExtensionRecord], exclude_id: &str) -> Vec<Self> {
        records
            .iter()
            .filter(|r| r.enabled && r.identifier != exclude_id)
            .filter(|r| !r.owned_overrides().is_empty())
            .map(|r| Self {
                extension_id: r.identifier.clone(),
                extension_name: r.name.clone(),
                keys: r.owned_overrides().to_vec(),
            })
            .collect()
    }
}

/// Pure conflict detection: which candidates collide with overrides
/// already owned by another enabled extension.
///
/// Evaluated entirely before any write; the commit phase runs only when
/// this returns empty.
pub fn detect_conflicts(
    candidates: &[CandidateOverride],
    ownership: &[OverrideOwnership],
) -> Vec<OverrideConflict> {
    candidates
        .iter()
        .filter_map(|candidate| {
            ownership
                .iter()
                .find(|owner| owner.keys.iter().any(|key| *key == candidate.key))
                .map(|owner| OverrideConflict {
                    override_key: candidate.key.clone(),
                    blocking_extension_id: owner.extension_id.clone(),
                    blocking_extension_name: owner.extension_name.clone(),
                })
        })
        .collect()
}

/// Deep merge of translation documents: override keys take precedence,
/// objects merge recursively, everything else is replaced.
pub fn merge_overrides(original: &mut Value, overlay: Value) {
    match (original, overlay) {
        (Value::Object(original), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match original.get_mut(&key) {
                    Some(slot) => merge_overrides(slot, value),
                    None => {
                        original.insert(key, value);
                    }
                }
            }
        }
        (slot, overlay) => *slot = overlay,
    }
}

/// Outcome of publishing an extension's `lang/` tree.
#[derive(Debug, Default)]
pub struct OverlayReport {
    pub conflicts: Vec<OverrideConflict>,
    /// `"locale/filename"` keys written, to be tracked in the ledger.
    pub written_overrides: Vec<String>,
    /// Locales bound wholesale because the host did not have them.
    pub linked_locales: Vec<String>,
}

impl OverlayReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Table of per-extension translation namespaces the host's translator
/// consults for `extension-id::file.key` lookups.
#[derive(Debug, Default)]
pub struct Translator {
    namespaces: BTreeMap<String, PathBuf>,
}

impl Translator {
    pub fn add_namespace(&mut self, extension_id: &str, lang_dir: impl Into<PathBuf>) {
        self.namespaces
            .insert(extension_id.to_string(), lang_dir.into());
    }

    pub fn remove_namespace(&mut self, extension_id: &str) -> bool {
        self.namespaces.remove(extension_id).is_some()
    }

    pub fn has_namespace(&self, extension_id: &str) -> bool {
        self.namespaces.contains_key(extension_id)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.namespaces.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }

    /// Resolve a namespaced translation key of the form
    /// `extension-id::file.dotted.path` against a locale.
    pub async fn resolve(&self, locale: &str, key: &str) -> Option<String> {
        let (namespace, rest) = key.split_once("::")?;
        let lang_dir = self.namespaces.get(namespace)?;

        let mut segments = rest.split('.');
        let file = segments.next()?;

        let path = lang_dir.join(locale).join(format!("{file}.json"));
        let content = fs::read_to_string(&path).await.ok()?;
        let mut value: Value = serde_json::from_str(&content).ok()?;

        for segment in segments {
            value = value.get_mut(segment)?.take();
        }

        value.as_str().map(|s| s.to_string())
    }
}

/// Publishes and retracts the three translation overlay modes under an
/// extension's `lang/` directory: new-locale links, conflict-checked
/// override merges, and namespaced catalogs.
pub struct OverlayResolver {
    binder: ArtifactBinder,
    paths: HostPaths,
}

/// Directory under `lang/` holding override trees.
const OVERRIDES_DIR: &str = "overrides";

impl OverlayResolver {
    pub fn new(paths: HostPaths) -> Self {
        Self {
            binder: ArtifactBinder::new(),
            paths,
        }
    }

    pub fn with_binder(paths: HostPaths, binder: ArtifactBinder) -> Self {
        Self { binder, paths }
    }

    /// Publish an extension's `lang/` tree.
    ///
    /// Two-phase: every override candidate is checked against the
    /// ownership snapshot first; if any conflict exists nothing at all is
    /// written and the full conflict set is reported. On a clean pass the
    /// overrides are committed, missing locales are linked, and the
    /// extension's namespace is registered.
    pub async fn publish(
        &self,
        extension_id: &str,
        lang_dir: &Path,
        ownership: &[OverrideOwnership],
        translator: &mut Translator,
    ) -> Result<OverlayReport> {
        let mut report = OverlayReport::default();

        if !lang_dir.is_dir() {
            return Ok(report);
        }

        let candidates = self
            .collect_candidates(lang_dir.join(OVERRIDES_DIR).as_path())
            .await?;

        report.conflicts = detect_conflicts(&candidates, ownership);
        if !report.is_clean() {
            info!(
                "Overlay publish for '{extension_id}' blocked by {} conflict(s)",
                report.conflicts.len()
            );
            return Ok(report);
        }

        report.written_overrides = self.commit_overrides(extension_id, &candidates).await?;

        let mut entries = fs::read_dir(lang_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let locale = entry.file_name().to_string_lossy().to_string();
            if locale == OVERRIDES_DIR {
                continue;
            }

            let host_locale = self.paths.locale_dir(&locale);
            if !host_locale.is_dir() {
                // New locale: bind wholesale, no merge, no conflict possible.
                self.binder.bind_link(&entry.path(), &host_locale).await?;
                report.linked_locales.push(locale);
            }
            // Locales the host already has stay namespaced-only.
        }

        translator.add_namespace(extension_id, lang_dir);

        Ok(report)
    }

    /// Retract an extension's overlay: restore only the override keys it
    /// owns, unlink locales it introduced, drop its namespace.
    pub async fn unpublish(
        &self,
        extension_id: &str,
        lang_dir: &Path,
        tracked_overrides: &[String],
        translator: &mut Translator,
    ) -> Result<()> {
        translator.remove_namespace(extension_id);

        if !lang_dir.is_dir() {
            return Ok(());
        }

        let mut entries = fs::read_dir(lang_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let locale = entry.file_name().to_string_lossy().to_string();

            if locale == OVERRIDES_DIR {
                self.restore_overrides(extension_id, &entry.path(), tracked_overrides)
                    .await?;
                continue;
            }

            let host_locale = self.paths.locale_dir(&locale);
            if self.binder.points_into(&host_locale, &entry.path()).await {
                self.binder.unbind(&host_locale).await?;
                debug!("Removed locale link for '{locale}'");
            }
        }

        Ok(())
    }

    /// Scan `overrides/<locale>/<file>` candidates whose target locale
    /// exists in the host. Locales the host does not have are skipped;
    /// they cannot override anything.
    async fn collect_candidates(&self, overrides_dir: &Path) -> Result<Vec<CandidateOverride>> {
        let mut candidates = Vec::new();

        if !overrides_dir.is_dir() {
            return Ok(candidates);
        }

        let mut locales = fs::read_dir(overrides_dir).await?;
        while let Some(locale_entry) = locales.next_entry().await? {
            if !locale_entry.file_type().await?.is_dir() {
                continue;
            }
            let locale = locale_entry.file_name().to_string_lossy().to_string();
            let target_locale_dir = self.paths.locale_dir(&locale);
            if !target_locale_dir.is_dir() {
                continue;
            }

            let mut files = fs::read_dir(locale_entry.path()).await?;
            while let Some(file_entry) = files.next_entry().await? {
                if !file_entry.file_type().await?.is_file() {
                    continue;
                }
                let filename = file_entry.file_name().to_string_lossy().to_string();
                candidates.push(CandidateOverride {
                    key: format!("{locale}/{filename}"),
                    source: file_entry.path(),
                    target: target_locale_dir.join(&filename),
                });
            }
        }

        candidates.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(candidates)
    }

    /// Phase 2: write every candidate. Only reached when phase 1 found no
    /// conflicts.
    async fn commit_overrides(
        &self,
        extension_id: &str,
        candidates: &[CandidateOverride],
    ) -> Result<Vec<String>> {
        let mut written = Vec::new();

        for candidate in candidates {
            if candidate.target.exists() {
                let backup = backup_path(&candidate.target, extension_id);

                // First-write semantics: keep the oldest original.
                if !backup.exists() {
                    fs::copy(&candidate.target, &backup).await?;
                }

                let original_content = fs::read_to_string(&candidate.target).await?;
                let override_content = fs::read_to_string(&candidate.source).await?;

                let mut merged: Value = serde_json::from_str(&original_content)?;
                merge_overrides(&mut merged, serde_json::from_str(&override_content)?);

                fs::write(&candidate.target, serde_json::to_string_pretty(&merged)?).await?;
            } else {
                fs::copy(&candidate.source, &candidate.target).await?;
            }

            written.push(candidate.key.clone());
        }

        Ok(written)
    }

    async fn restore_overrides(
        &self,
        extension_id: &str,
        overrides_dir: &Path,
        tracked: &[String],
    ) -> Result<()> {
        if tracked.is_empty() {
            return Ok(());
        }

        let mut locales = fs::read_dir(overrides_dir).await?;
        while let Some(locale_entry) = locales.next_entry().await? {
            if !locale_entry.file_type().await?.is_dir() {
                continue;
            }
            let locale = locale_entry.file_name().to_string_lossy().to_string();
            let target_locale_dir = self.paths.locale_dir(&locale);
            if !target_locale_dir.is_dir() {
                continue;
            }

            let mut files = fs::read_dir(locale_entry.path()).await?;
            while let Some(file_entry) = files.next_entry().await? {
                let filename = file_entry.file_name().to_string_lossy().to_string();
                let key = format!("{locale}/{filename}");

                // Selective restore: never touch keys this extension
                // does not own.
                if !tracked.iter().any(|k| *k == key) {
                    continue;
                }

                let target = target_locale_dir.join(&filename);
                let backup = backup_path(&target, extension_id);

                if backup.exists() {
                    fs::copy(&backup, &target).await?;
                    fs::remove_file(&backup).await?;
                } else if target.exists() {
                    // No original existed before the override.
                    fs::remove_file(&target).await?;
                }
            }
        }

        Ok(())
    }
}

fn backup_path(target: &Path, extension_id: &str) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".backup-before-{extension_id}"));
    target.with_file_name(name)
}
