use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::descriptor::{validate_extension_id, ExtensionDescriptor, ExtensionType};
use crate::error::{ExtensionError, Result};

/// Persisted state of an extension that has been enabled at least once.
///
/// Created on first successful `enable`, updated on every enable/disable,
/// deleted on uninstall. `language_overrides` for any two records must be
/// disjoint at all times; the overlay resolver relies on this to attribute
/// conflicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionRecord {
    pub identifier: String,
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub author: Option<String>,
    pub types: Vec<ExtensionType>,
    pub enabled: bool,
    #[serde(default)]
    pub applied_migrations: Vec<String>,
    /// `"locale/file"` keys this extension currently owns, or `None` when
    /// it owns nothing.
    #[serde(default)]
    pub language_overrides: Option<Vec<String>>,
    /// Opaque per-extension settings blob, owned by the host UI.
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
}

impl ExtensionRecord {
    /// Fresh record for a descriptor, with no migration or override history.
    pub fn from_descriptor(descriptor: &ExtensionDescriptor, enabled: bool) -> Self {
        Self {
            identifier: descriptor.id.clone(),
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            version: descriptor.version.clone(),
            author: descriptor.author.clone(),
            types: descriptor.types.clone(),
            enabled,
            applied_migrations: Vec::new(),
            language_overrides: None,
            settings: None,
        }
    }

    /// Refresh the descriptor-derived fields while keeping the state the
    /// ledger is authoritative for (migrations, overrides, settings).
    pub fn refresh_from(&mut self, descriptor: &ExtensionDescriptor) {
        self.name = descriptor.name.clone();
        self.description = descriptor.description.clone();
        self.version = descriptor.version.clone();
        self.author = descriptor.author.clone();
        self.types = descriptor.types.clone();
    }

    pub fn has_type(&self, ty: ExtensionType) -> bool {
        self.types.contains(&ty)
    }

    pub fn owned_overrides(&self) -> &[String] {
        self.language_overrides.as_deref().unwrap_or(&[])
    }
}

/// Persistence seam for extension records.
///
/// The engine only depends on this trait; [`JsonLedger`] is the file-backed
/// implementation the host uses by default.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<ExtensionRecord>>;

    async fn list(&self) -> Result<Vec<ExtensionRecord>>;

    /// Insert or replace a record keyed by its identifier.
    async fn upsert(&mut self, record: ExtensionRecord) -> Result<()>;

    /// Delete a record. Returns whether one existed.
    async fn remove(&mut self, id: &str) -> Result<bool>;

    async fn is_enabled(&self, id: &str) -> Result<bool> {
        Ok(self.get(id).await?.map(|r| r.enabled).unwrap_or(false))
    }
}

/// On-disk shape of the ledger file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerFile {
    records: HashMap<String, ExtensionRecord>,
    last_updated: DateTime<Utc>,
    version: String,
}

impl Default for LedgerFile {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            last_updated: Utc::now(),
            version: "1.0".to_string(),
        }
    }
}

/// JSON-file-backed ledger with atomic-ish backup semantics: the previous
/// ledger is copied aside before every write, and a corrupt primary falls
/// back to the backup on load.
pub struct JsonLedger {
    ledger_path: PathBuf,
    backup_path: PathBuf,
    data: LedgerFile,
}

impl JsonLedger {
    /// Open (or create) the ledger stored in `dir/ledger.json`.
    pub async fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;

        let mut ledger = Self {
            ledger_path: dir.join("ledger.json"),
            backup_path: dir.join("ledger.json.backup"),
            data: LedgerFile::default(),
        };

        ledger.load().await?;
        Ok(ledger)
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    async fn load(&mut self) -> Result<()> {
        if !self.ledger_path.exists() {
            info!("No existing extension ledger found, starting empty");
            return Ok(());
        }

        match fs::read_to_string(&self.ledger_path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(data) => {
                    self.data = data;
                    debug!("Loaded extension ledger with {} records", self.data.records.len());
                }
                Err(e) => {
                    warn!("Extension ledger is corrupt ({e}), checking backup");
                    self.load_backup(e.to_string()).await?;
                }
            },
            Err(_) => {
                warn!("Failed to read extension ledger, checking backup");
                self.load_backup("unreadable ledger file".to_string()).await?;
            }
        }
        Ok(())
    }

    async fn load_backup(&mut self, reason: String) -> Result<()> {
        if !self.backup_path.exists() {
            return Err(ExtensionError::CorruptedLedger(reason));
        }

        let content = fs::read_to_string(&self.backup_path).await?;
        self.data = serde_json::from_str(&content)
            .map_err(|e| ExtensionError::CorruptedLedger(e.to_string()))?;
        info!("Restored extension ledger from backup");
        Ok(())
    }

    async fn save(&mut self) -> Result<()> {
        self.data.last_updated = Utc::now();

        let content = serde_json::to_string_pretty(&self.data)?;

        if self.ledger_path.exists() {
            if let Err(e) = fs::copy(&self.ledger_path, &self.backup_path).await {
                warn!("Failed to back up extension ledger: {e}");
            }
        }

        fs::write(&self.ledger_path, content).await?;
        debug!("Extension ledger saved");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for JsonLedger {
    async fn get(&self, id: &str) -> Result<Option<ExtensionRecord>> {
        validate_extension_id(id)?;
        Ok(self.data.records.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<ExtensionRecord>> {
        let mut records: Vec<_> = self.data.records.values().cloned().collect();
        records.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(records)
    }

    async fn upsert(&mut self, record: ExtensionRecord) -> Result<()> {
        validate_extension_id(&record.identifier)?;
        self.data.records.insert(record.identifier.clone(), record);
        self.save().await
    }

    async fn remove(&mut self, id: &str) -> Result<bool> {
        validate_extension_id(id)?;
        let removed = self.data.records.remove(id).is_some();
        if removed {
            self.save().await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, enabled: bool) -> ExtensionRecord {
        ExtensionRecord {
            identifier: id.to_string(),
            name: id.to_string(),
            description: None,
            version: "1.0.0".to_string(),
            author: None,
            types: vec![ExtensionType::Plugin],
            enabled,
            applied_migrations: Vec::new(),
            language_overrides: None,
            settings: None,
        }
    }

    #[tokio::test]
    async fn upsert_and_get_roundtrip() {
        let temp = TempDir::new().unwrap();
        let mut ledger = JsonLedger::new(temp.path()).await.unwrap();

        ledger.upsert(record("ext-a", true)).await.unwrap();

        let found = ledger.get("ext-a").await.unwrap().unwrap();
        assert!(found.enabled);
        assert!(ledger.is_enabled("ext-a").await.unwrap());
        assert!(!ledger.is_enabled("missing").await.unwrap());
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let temp = TempDir::new().unwrap();

        {
            let mut ledger = JsonLedger::new(temp.path()).await.unwrap();
            ledger.upsert(record("ext-a", true)).await.unwrap();
            ledger.upsert(record("ext-b", false)).await.unwrap();
        }

        let ledger = JsonLedger::new(temp.path()).await.unwrap();
        let records = ledger.list().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identifier, "ext-a");
        assert_eq!(records[1].identifier, "ext-b");
    }

    #[tokio::test]
    async fn corrupt_primary_falls_back_to_backup() {
        let temp = TempDir::new().unwrap();

        {
            let mut ledger = JsonLedger::new(temp.path()).await.unwrap();
            ledger.upsert(record("ext-a", true)).await.unwrap();
            // Second write so a backup of the first exists.
            ledger.upsert(record("ext-b", true)).await.unwrap();
        }

        fs::write(temp.path().join("ledger.json"), "{broken")
            .await
            .unwrap();

        let ledger = JsonLedger::new(temp.path()).await.unwrap();
        assert!(ledger.get("ext-a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let temp = TempDir::new().unwrap();
        let mut ledger = JsonLedger::new(temp.path()).await.unwrap();

        ledger.upsert(record("ext-a", true)).await.unwrap();
        assert!(ledger.remove("ext-a").await.unwrap());
        assert!(!ledger.remove("ext-a").await.unwrap());
        assert!(ledger.get("ext-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_invalid_identifier() {
        let temp = TempDir::new().unwrap();
        let mut ledger = JsonLedger::new(temp.path()).await.unwrap();

        let err = ledger.upsert(record("../escape", true)).await.unwrap_err();
        assert!(matches!(err, ExtensionError::InvalidExtensionId(_)));
    }
}
