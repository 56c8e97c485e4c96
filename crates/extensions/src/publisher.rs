use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde_json::Value;
use tokio::fs;
use tracing::debug;

use crate::binder::{ArtifactBinder, ArtifactBinding, BindStrategy};
use crate::error::{ExtensionError, Result};
use crate::paths::{HostPaths, COMPONENT_KINDS, SURFACES};

/// The artifact kinds an extension can contribute, published in the fixed
/// order assets → views → config → components → theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Assets,
    Views,
    Components,
    Theme,
    Config,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Assets => "assets",
            ArtifactKind::Views => "views",
            ArtifactKind::Components => "components",
            ArtifactKind::Theme => "theme",
            ArtifactKind::Config => "config",
        };
        f.write_str(name)
    }
}

/// Runtime configuration namespaces contributed by extensions, keyed by
/// extension id. Config is never written to the host's filesystem; it
/// lives here for the host to read through.
#[derive(Debug, Default)]
pub struct RuntimeConfig {
    entries: BTreeMap<String, Value>,
}

impl RuntimeConfig {
    pub fn namespace(&self, extension_id: &str) -> Option<&Value> {
        self.entries.get(extension_id)
    }

    pub fn set(&mut self, extension_id: &str, value: Value) {
        self.entries.insert(extension_id.to_string(), value);
    }

    pub fn remove(&mut self, extension_id: &str) -> bool {
        self.entries.remove(extension_id).is_some()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Maps artifact kinds to publish/unpublish sequences built from
/// [`ArtifactBinder`] primitives.
pub struct ArtifactPublisher {
    binder: ArtifactBinder,
    paths: HostPaths,
    config: RuntimeConfig,
}

impl ArtifactPublisher {
    pub fn new(paths: HostPaths) -> Self {
        Self {
            binder: ArtifactBinder::new(),
            paths,
            config: RuntimeConfig::default(),
        }
    }

    pub fn with_binder(paths: HostPaths, binder: ArtifactBinder) -> Self {
        Self {
            binder,
            paths,
            config: RuntimeConfig::default(),
        }
    }

    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The publish steps a kind expands to for a given extension,
    /// recomputed from the directory layout on every call.
    pub fn bindings_for(
        &self,
        kind: ArtifactKind,
        extension_id: &str,
        extension_dir: &Path,
    ) -> Vec<ArtifactBinding> {
        match kind {
            ArtifactKind::Assets => vec![ArtifactBinding {
                source: extension_dir.join("public"),
                target: self.paths.assets_target(extension_id),
                strategy: BindStrategy::Copy,
            }],
            ArtifactKind::Views => vec![ArtifactBinding {
                source: extension_dir.join("views"),
                target: self.paths.views_target(extension_id),
                strategy: BindStrategy::Link,
            }],
            ArtifactKind::Components => {
                let mut bindings = Vec::new();
                for surface in SURFACES {
                    for component_kind in COMPONENT_KINDS {
                        bindings.push(ArtifactBinding {
                            source: extension_dir.join(surface).join(component_kind),
                            target: self
                                .paths
                                .components_target(surface, component_kind, extension_id),
                            strategy: BindStrategy::Link,
                        });
                    }
                }
                bindings
            }
            ArtifactKind::Theme => vec![ArtifactBinding {
                source: extension_dir.join("theme"),
                target: self.paths.theme_target(extension_id),
                strategy: BindStrategy::Link,
            }],
            ArtifactKind::Config => {
                let config_file = extension_dir
                    .join("config")
                    .join(format!("{extension_id}.json"));
                vec![ArtifactBinding {
                    target: config_file.clone(),
                    source: config_file,
                    strategy: BindStrategy::MergeWrite,
                }]
            }
        }
    }

    /// Publish one artifact kind. A kind whose source does not exist or
    /// is empty is skipped: the extension simply does not use that
    /// capability.
    pub async fn publish(
        &mut self,
        kind: ArtifactKind,
        extension_id: &str,
        extension_dir: &Path,
    ) -> Result<()> {
        for binding in self.bindings_for(kind, extension_id, extension_dir) {
            match binding.strategy {
                BindStrategy::Copy | BindStrategy::Link => {
                    if !ArtifactBinder::dir_has_entries(&binding.source).await {
                        continue;
                    }

                    let result = match binding.strategy {
                        BindStrategy::Copy => {
                            self.binder.copy_dir(&binding.source, &binding.target).await
                        }
                        _ => self.binder.bind_link(&binding.source, &binding.target).await,
                    };

                    result.map_err(|e| ExtensionError::PublishFailure {
                        id: extension_id.to_string(),
                        kind,
                        source: Box::new(e),
                    })?;
                }
                BindStrategy::MergeWrite => {
                    if !binding.source.is_file() {
                        continue;
                    }

                    let content = fs::read_to_string(&binding.source).await.map_err(|e| {
                        ExtensionError::PublishFailure {
                            id: extension_id.to_string(),
                            kind,
                            source: Box::new(ExtensionError::io_op(
                                "read config",
                                &binding.source,
                                e,
                            )),
                        }
                    })?;
                    let value: Value =
                        serde_json::from_str(&content).map_err(|e| ExtensionError::PublishFailure {
                            id: extension_id.to_string(),
                            kind,
                            source: Box::new(ExtensionError::Json(e)),
                        })?;

                    self.config.set(extension_id, value);
                }
            }
        }

        debug!("Published {kind} for '{extension_id}'");
        Ok(())
    }

    /// Retract one artifact kind. Already-absent targets are successful
    /// no-ops, so unpublish is safely repeatable.
    pub async fn unpublish(&mut self, kind: ArtifactKind, extension_id: &str) -> Result<()> {
        match kind {
            ArtifactKind::Assets => {
                self.binder
                    .remove_dir(&self.paths.assets_target(extension_id))
                    .await?;
            }
            ArtifactKind::Views => {
                self.binder
                    .unbind(&self.paths.views_target(extension_id))
                    .await?;
            }
            ArtifactKind::Components => {
                for surface in SURFACES {
                    for component_kind in COMPONENT_KINDS {
                        self.binder
                            .unbind(&self.paths.components_target(
                                surface,
                                component_kind,
                                extension_id,
                            ))
                            .await?;
                    }
                }
            }
            ArtifactKind::Theme => {
                self.binder
                    .unbind(&self.paths.theme_target(extension_id))
                    .await?;
            }
            ArtifactKind::Config => {
                self.config.remove(extension_id);
            }
        }

        debug!("Unpublished {kind} for '{extension_id}'");
        Ok(())
    }
}
