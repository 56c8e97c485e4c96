use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ExtensionError, Result};

/// Filename of the manifest every extension package carries at its root.
pub const DESCRIPTOR_FILE: &str = "extension.json";

/// What an extension contributes to the host.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExtensionType {
    Plugin,
    Theme,
    LanguagePack,
}

impl ExtensionType {
    pub fn label(&self) -> &'static str {
        match self {
            ExtensionType::Plugin => "Plugin",
            ExtensionType::Theme => "Theme",
            ExtensionType::LanguagePack => "Language Pack",
        }
    }
}

/// Immutable manifest read from `extension.json` at the extension root.
///
/// Re-read from disk on every discovery pass; never persisted verbatim.
/// The ledger keeps its own [`crate::ledger::ExtensionRecord`] copy of the
/// fields it needs.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExtensionDescriptor {
    pub id: String,
    pub name: String,
    pub version: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub types: Vec<ExtensionType>,
    /// Name of the entry-point controller, resolved through the hook
    /// factory map. Packs without code leave this unset.
    pub entry_point: Option<String>,
}

/// Raw serde shape of `extension.json`. Everything except `id` is optional
/// on disk; [`ExtensionDescriptor::finalize`] applies the defaults.
#[derive(Deserialize, Debug)]
struct RawDescriptor {
    id: String,
    name: Option<String>,
    version: Option<String>,
    author: Option<String>,
    description: Option<String>,
    types: Option<Vec<ExtensionType>>,
    entry_point: Option<String>,
}

impl ExtensionDescriptor {
    /// Load and validate the descriptor from an extension directory.
    pub async fn load(extension_dir: impl AsRef<Path>) -> Result<Self> {
        let path = extension_dir.as_ref().join(DESCRIPTOR_FILE);
        Self::read_from(&path).await
    }

    /// Read and validate a descriptor file at an explicit path.
    pub async fn read_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ExtensionError::io_op("read descriptor", path, e))?;

        let raw: RawDescriptor =
            serde_json::from_str(&content).map_err(|source| ExtensionError::InvalidDescriptorFile {
                path: path.to_path_buf(),
                source,
            })?;

        Self::finalize(raw)
    }

    fn finalize(raw: RawDescriptor) -> Result<Self> {
        validate_extension_id(&raw.id)?;

        Ok(Self {
            name: raw.name.unwrap_or_else(|| raw.id.clone()),
            version: raw.version.unwrap_or_else(|| "1.0.0".to_string()),
            author: raw.author,
            description: raw.description,
            types: raw.types.unwrap_or_else(|| vec![ExtensionType::Plugin]),
            entry_point: raw.entry_point,
            id: raw.id,
        })
    }

    pub fn has_type(&self, ty: ExtensionType) -> bool {
        self.types.contains(&ty)
    }
}

/// Extension ids double as directory and namespace names, so they must be
/// safe to embed in paths: kebab-case, no separators, no traversal.
pub fn validate_extension_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(ExtensionError::InvalidExtensionId(
            "id cannot be empty".to_string(),
        ));
    }

    if id.len() > 255 {
        return Err(ExtensionError::InvalidExtensionId("id too long".to_string()));
    }

    if id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(ExtensionError::InvalidExtensionId(format!(
            "'{id}' contains path characters"
        )));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ExtensionError::InvalidExtensionId(format!(
            "'{id}' is not kebab-case"
        )));
    }

    Ok(())
}
