use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::descriptor::ExtensionDescriptor;
use crate::error::Result;
use crate::hook::{ExtensionHook, HookFactory, NoopHook};
use crate::ledger::LedgerStore;
use crate::overlay::Translator;
use crate::paths::HostPaths;

/// Host surface a capability is contributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Surface {
    Admin,
    App,
    Server,
}

impl Surface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Admin => "admin",
            Surface::App => "app",
            Surface::Server => "server",
        }
    }
}

/// Navigation entry contributed to one or more host surfaces.
///
/// The app surface has navigation disabled, so it is stripped on
/// registration.
#[derive(Debug, Clone)]
pub struct NavigationItem {
    pub label: String,
    pub url: String,
    pub icon: Option<String>,
    pub sort: i32,
    pub group: Option<String>,
    pub surfaces: Vec<Surface>,
}

impl NavigationItem {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            icon: None,
            sort: 999,
            group: None,
            surfaces: Vec::new(),
        }
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn sort(mut self, sort: i32) -> Self {
        self.sort = sort;
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn on(mut self, surface: Surface) -> Self {
        if !self.surfaces.contains(&surface) {
            self.surfaces.push(surface);
        }
        self
    }
}

/// User-menu entry contributed to one or more host surfaces.
#[derive(Debug, Clone)]
pub struct UserMenuItem {
    pub label: String,
    pub url: String,
    pub icon: Option<String>,
    pub surfaces: Vec<Surface>,
}

impl UserMenuItem {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            icon: None,
            surfaces: Vec::new(),
        }
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn on(mut self, surface: Surface) -> Self {
        if !self.surfaces.contains(&surface) {
            self.surfaces.push(surface);
        }
        self
    }
}

/// View rendered at a named hook location.
#[derive(Debug, Clone)]
pub struct RenderHook {
    pub view: String,
}

/// Actions an extension grants on a host model.
#[derive(Debug, Clone)]
pub struct PermissionGrant {
    pub actions: Vec<String>,
}

/// A capability item together with the extension that contributed it, so
/// items can be attributed and bulk-unregistered.
#[derive(Debug, Clone)]
pub struct Contributed<T> {
    pub extension_id: String,
    pub item: T,
}

#[derive(Default)]
struct CapabilityTables {
    permissions: BTreeMap<String, Contributed<PermissionGrant>>,
    navigation: BTreeMap<String, Contributed<NavigationItem>>,
    user_menu: BTreeMap<String, Contributed<UserMenuItem>>,
    render_hooks: BTreeMap<String, Vec<Contributed<RenderHook>>>,
}

impl CapabilityTables {
    fn drop_contributions(&mut self, extension_id: &str) {
        self.permissions.retain(|_, c| c.extension_id != extension_id);
        self.navigation.retain(|_, c| c.extension_id != extension_id);
        self.user_menu.retain(|_, c| c.extension_id != extension_id);
        for hooks in self.render_hooks.values_mut() {
            hooks.retain(|c| c.extension_id != extension_id);
        }
        self.render_hooks.retain(|_, hooks| !hooks.is_empty());
    }
}

/// Mutable registration target handed to an extension's `register` hook;
/// stamps every contribution with the registering extension's id.
pub struct CapabilityScope<'a> {
    extension_id: &'a str,
    tables: &'a mut CapabilityTables,
}

impl CapabilityScope<'_> {
    pub fn extension_id(&self) -> &str {
        self.extension_id
    }

    pub fn grant_permissions(&mut self, model: impl Into<String>, actions: Vec<String>) {
        self.tables.permissions.insert(
            model.into(),
            Contributed {
                extension_id: self.extension_id.to_string(),
                item: PermissionGrant { actions },
            },
        );
    }

    pub fn navigation_item(&mut self, item_id: impl Into<String>, mut item: NavigationItem) {
        // Navigation is disabled on the app surface.
        item.surfaces.retain(|s| *s != Surface::App);
        self.tables.navigation.insert(
            item_id.into(),
            Contributed {
                extension_id: self.extension_id.to_string(),
                item,
            },
        );
    }

    pub fn user_menu_item(&mut self, item_id: impl Into<String>, item: UserMenuItem) {
        self.tables.user_menu.insert(
            item_id.into(),
            Contributed {
                extension_id: self.extension_id.to_string(),
                item,
            },
        );
    }

    pub fn render_hook(&mut self, location: impl Into<String>, view: impl Into<String>) {
        self.tables
            .render_hooks
            .entry(location.into())
            .or_default()
            .push(Contributed {
                extension_id: self.extension_id.to_string(),
                item: RenderHook { view: view.into() },
            });
    }
}

struct ActiveExtension {
    descriptor: ExtensionDescriptor,
    path: PathBuf,
    hook: Box<dyn ExtensionHook>,
    registered: bool,
}

/// In-memory catalog of extensions that are both present on disk and
/// enabled in the ledger, plus the capabilities they contribute.
///
/// Built explicitly by the host's startup path via
/// `discover → register_all → boot_all`; never ambient state.
pub struct ExtensionRegistry {
    paths: HostPaths,
    factories: HashMap<String, HookFactory>,
    active: BTreeMap<String, ActiveExtension>,
    tables: CapabilityTables,
    translator: Translator,
    discovered: bool,
}

impl ExtensionRegistry {
    pub fn new(paths: HostPaths) -> Self {
        Self {
            paths,
            factories: HashMap::new(),
            active: BTreeMap::new(),
            tables: CapabilityTables::default(),
            translator: Translator::default(),
            discovered: false,
        }
    }

    /// Map an entry-point name to a controller factory. Populated by the
    /// host at startup, before discovery.
    pub fn register_entry_point<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn ExtensionHook> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Scan the extensions root and load every enabled extension into the
    /// active set. Safe to call multiple times; only the first call scans.
    pub async fn discover(&mut self, ledger: &dyn LedgerStore) -> Result<()> {
        if self.discovered {
            return Ok(());
        }

        let root = self.paths.extensions_root();
        if !root.is_dir() {
            fs::create_dir_all(&root).await?;
            self.discovered = true;
            return Ok(());
        }

        let mut entries = fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            self.load_extension(&entry.path(), ledger).await;
        }

        self.discovered = true;
        info!("Discovered {} enabled extension(s)", self.active.len());
        Ok(())
    }

    /// Load a single extension directory into the active set if its
    /// descriptor parses and the ledger marks it enabled. Invalid or
    /// disabled extensions are skipped silently; discovery never
    /// auto-enables.
    pub async fn load_extension(&mut self, path: &Path, ledger: &dyn LedgerStore) -> bool {
        let descriptor = match ExtensionDescriptor::load(path).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                debug!("Skipping '{}': {e}", path.display());
                return false;
            }
        };

        match ledger.is_enabled(&descriptor.id).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!("Ledger lookup failed for '{}': {e}", descriptor.id);
                return false;
            }
        }

        self.activate(descriptor, path.to_path_buf());
        true
    }

    /// Instantiate the extension's controller and place it in the active
    /// set. Unknown entry points get an inert controller.
    pub fn activate(&mut self, descriptor: ExtensionDescriptor, path: PathBuf) {
        let hook = descriptor
            .entry_point
            .as_deref()
            .and_then(|name| self.factories.get(name))
            .map(|factory| factory())
            .unwrap_or_else(|| Box::new(NoopHook));

        debug!("Activated extension '{}'", descriptor.id);
        self.active.insert(
            descriptor.id.clone(),
            ActiveExtension {
                descriptor,
                path,
                hook,
                registered: false,
            },
        );
    }

    /// Run the `register` hook of every active extension that has not
    /// registered yet. Idempotent per extension: capability items are
    /// never double-registered.
    pub fn register_all(&mut self) {
        for (id, ext) in self.active.iter_mut() {
            if ext.registered {
                continue;
            }

            let mut scope = CapabilityScope {
                extension_id: id,
                tables: &mut self.tables,
            };
            ext.hook.register(&mut scope);
            ext.registered = true;
        }
    }

    /// Bind each active extension's translation namespace, then run its
    /// `boot` hook. Invoked once after registration.
    pub fn boot_all(&mut self) {
        for (id, ext) in self.active.iter() {
            let lang_dir = ext.path.join("lang");
            if lang_dir.is_dir() {
                self.translator.add_namespace(id, lang_dir);
            }
            ext.hook.boot();
        }
    }

    /// Run an extension's `disable` hook, if it is active. Published
    /// artifacts must still exist when this is called.
    pub fn notify_disable(&self, id: &str) {
        if let Some(ext) = self.active.get(id) {
            ext.hook.disable();
        }
    }

    /// Drop an extension from the active set and bulk-unregister all its
    /// capability contributions and its translation namespace.
    pub fn deactivate(&mut self, id: &str) -> bool {
        let removed = self.active.remove(id).is_some();
        if removed {
            self.tables.drop_contributions(id);
            self.translator.remove_namespace(id);
            debug!("Deactivated extension '{id}'");
        }
        removed
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.contains_key(id)
    }

    pub fn active_ids(&self) -> Vec<&str> {
        self.active.keys().map(|k| k.as_str()).collect()
    }

    pub fn descriptor(&self, id: &str) -> Option<&ExtensionDescriptor> {
        self.active.get(id).map(|ext| &ext.descriptor)
    }

    pub fn extension_path(&self, id: &str) -> Option<&Path> {
        self.active.get(id).map(|ext| ext.path.as_path())
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub fn translator_mut(&mut self) -> &mut Translator {
        &mut self.translator
    }

    // Capability views. Each returns (stable item id, contribution).

    pub fn navigation_items(&self) -> impl Iterator<Item = (&str, &Contributed<NavigationItem>)> {
        self.tables.navigation.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn navigation_items_for(
        &self,
        extension_id: &str,
    ) -> impl Iterator<Item = (&str, &NavigationItem)> {
        let extension_id = extension_id.to_string();
        self.tables
            .navigation
            .iter()
            .filter(move |(_, c)| c.extension_id == extension_id)
            .map(|(k, c)| (k.as_str(), &c.item))
    }

    pub fn user_menu_items(&self) -> impl Iterator<Item = (&str, &Contributed<UserMenuItem>)> {
        self.tables.user_menu.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn user_menu_items_for(
        &self,
        extension_id: &str,
    ) -> impl Iterator<Item = (&str, &UserMenuItem)> {
        let extension_id = extension_id.to_string();
        self.tables
            .user_menu
            .iter()
            .filter(move |(_, c)| c.extension_id == extension_id)
            .map(|(k, c)| (k.as_str(), &c.item))
    }

    pub fn render_hooks(&self, location: &str) -> &[Contributed<RenderHook>] {
        self.tables
            .render_hooks
            .get(location)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn permissions(&self) -> impl Iterator<Item = (&str, &Contributed<PermissionGrant>)> {
        self.tables.permissions.iter().map(|(k, v)| (k.as_str(), v))
    }
}
