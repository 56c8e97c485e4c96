use std::path::{Path, PathBuf};

use crate::error::{ExtensionError, Result};

/// Host surfaces extensions may contribute UI components to.
pub const SURFACES: [&str; 3] = ["admin", "app", "server"];

/// Component kinds recognised under each surface directory.
pub const COMPONENT_KINDS: [&str; 3] = ["pages", "resources", "widgets"];

/// Layout of the host's runtime namespaces.
///
/// Everything the engine touches hangs off a single host root:
///
/// ```text
/// <root>/extensions/<id>/          extension sources + ledger.json
/// <root>/public/extensions/<id>/   published static assets
/// <root>/resources/views/extensions/<id>
/// <root>/app/<surface>/<kind>/extensions/<id>
/// <root>/resources/themes/<id>
/// <root>/lang/<locale>/            host translation catalogs
/// <root>/storage/exports/          exported archives
/// ```
#[derive(Debug, Clone)]
pub struct HostPaths {
    root: PathBuf,
}

impl HostPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// OS-specific default host root.
    ///
    /// Returns an error if the system directories cannot be determined.
    pub fn default_root() -> Result<PathBuf> {
        use directories::ProjectDirs;

        let project_dirs = ProjectDirs::from("com", "atrium", "atrium").ok_or_else(|| {
            ExtensionError::ConfigError(
                "Could not determine system directories for current user/OS".to_string(),
            )
        })?;

        Ok(project_dirs.data_local_dir().to_path_buf())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extensions_root(&self) -> PathBuf {
        self.root.join("extensions")
    }

    pub fn extension_dir(&self, id: &str) -> PathBuf {
        self.extensions_root().join(id)
    }

    pub fn assets_target(&self, id: &str) -> PathBuf {
        self.root.join("public").join("extensions").join(id)
    }

    pub fn views_target(&self, id: &str) -> PathBuf {
        self.root
            .join("resources")
            .join("views")
            .join("extensions")
            .join(id)
    }

    pub fn components_target(&self, surface: &str, kind: &str, id: &str) -> PathBuf {
        self.root
            .join("app")
            .join(surface)
            .join(kind)
            .join("extensions")
            .join(id)
    }

    pub fn theme_target(&self, id: &str) -> PathBuf {
        self.root.join("resources").join("themes").join(id)
    }

    pub fn lang_root(&self) -> PathBuf {
        self.root.join("lang")
    }

    pub fn locale_dir(&self, locale: &str) -> PathBuf {
        self.lang_root().join(locale)
    }

    pub fn exports_root(&self) -> PathBuf {
        self.root.join("storage").join("exports")
    }
}
