use thiserror::Error;

use crate::overlay::OverrideConflict;
use crate::publisher::ArtifactKind;

#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("Extension '{0}' not found")]
    NotFound(String),

    #[error("Invalid metadata for extension '{id}': {reason}")]
    InvalidMetadata { id: String, reason: String },

    #[error("Invalid descriptor at '{path}': {source}")]
    InvalidDescriptorFile {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },

    #[error("Migration '{script}' failed for extension '{id}': {reason}")]
    MigrationFailure {
        id: String,
        script: String,
        reason: String,
    },

    #[error("Failed to publish {kind} for extension '{id}': {source}")]
    PublishFailure {
        id: String,
        kind: ArtifactKind,
        #[source]
        source: Box<ExtensionError>,
    },

    #[error(
        "Language pack conflict detected for extension '{id}': {}. \
         Disable the conflicting extension(s) first before enabling this extension.",
        format_conflicts(.conflicts)
    )]
    OverrideConflicts {
        id: String,
        conflicts: Vec<OverrideConflict>,
    },

    #[error("Invalid package: {reason}")]
    InvalidPackage { reason: String },

    #[error("Invalid extension id: {0}")]
    InvalidExtensionId(String),

    #[error("Corrupted ledger: {0}")]
    CorruptedLedger(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO operation '{operation}' failed on path '{path}': {source}")]
    IoOperation {
        operation: String,
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExtensionError>;

fn format_conflicts(conflicts: &[OverrideConflict]) -> String {
    conflicts
        .iter()
        .map(|c| {
            format!(
                "'{}' is already overridden by '{}'",
                c.override_key, c.blocking_extension_name
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl ExtensionError {
    pub(crate) fn io_op(
        operation: impl Into<String>,
        path: impl Into<std::path::PathBuf>,
        source: std::io::Error,
    ) -> Self {
        ExtensionError::IoOperation {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Conflicts are an expected outcome of `enable`, not a fault; the
    /// caller is expected to resolve them by disabling the blocker.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ExtensionError::OverrideConflicts { .. })
    }

    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ExtensionError::NotFound(_)
                | ExtensionError::InvalidMetadata { .. }
                | ExtensionError::InvalidExtensionId(_)
                | ExtensionError::InvalidPackage { .. }
                | ExtensionError::OverrideConflicts { .. }
        )
    }
}
