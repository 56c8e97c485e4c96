//! Atrium Extensions - extension lifecycle and artifact publishing engine
//!
//! This crate manages the lifecycle of self-contained extension packages
//! for the Atrium host: discovering packages on disk, tracking their
//! enabled/disabled state in a persisted ledger, and reversibly projecting
//! their contents (static assets, UI components, configuration, themes,
//! translation overlays) into the host's runtime namespaces.
//!
//! # Features
//!
//! - **Lifecycle**: enable, disable, uninstall, import and export with a
//!   persisted state ledger
//! - **Artifact Publishing**: per-kind publish/unpublish strategies (copy,
//!   link, merge-write) built on small filesystem primitives
//! - **Overlay Conflicts**: two-phase translation-override conflict
//!   detection with atomic rollback - two extensions can never silently
//!   clobber the same override
//! - **Capability Registry**: navigation items, user-menu items, render
//!   hooks and permission grants, attributed per extension
//!
//! # Examples
//!
//! ```rust,no_run
//! use atrium_extensions::{HostPaths, LifecycleManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let paths = HostPaths::new("/srv/atrium");
//! let mut manager = LifecycleManager::new(paths).await?;
//!
//! // Host startup: discover -> register -> boot.
//! manager.startup().await?;
//!
//! // Administrative operations.
//! manager.enable("dark-theme").await?;
//! let outcome = manager.import("downloads/pack.tar.gz".as_ref(), true).await?;
//! println!("Imported: {} (update: {})", outcome.extension_id, outcome.is_update);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod binder;
pub mod descriptor;
pub mod error;
pub mod hook;
pub mod ledger;
pub mod manager;
pub mod migrate;
pub mod overlay;
pub mod paths;
pub mod publisher;
pub mod registry;

// Re-export commonly used types
pub use binder::{ArtifactBinder, ArtifactBinding, BindStrategy, LinkMode};
pub use descriptor::{ExtensionDescriptor, ExtensionType, DESCRIPTOR_FILE};
pub use error::{ExtensionError, Result};
pub use hook::{ExtensionHook, HookFactory, NoopHook};
pub use ledger::{ExtensionRecord, JsonLedger, LedgerStore};
pub use manager::{ExportedArchive, ExtensionStatus, ImportOutcome, LifecycleManager};
pub use migrate::{MigrationRunner, RecordingMigrationRunner};
pub use overlay::{
    detect_conflicts, merge_overrides, OverlayReport, OverlayResolver, OverrideConflict,
    OverrideOwnership, Translator,
};
pub use paths::HostPaths;
pub use publisher::{ArtifactKind, ArtifactPublisher, RuntimeConfig};
pub use registry::{
    CapabilityScope, Contributed, ExtensionRegistry, NavigationItem, PermissionGrant, RenderHook,
    Surface, UserMenuItem,
};
