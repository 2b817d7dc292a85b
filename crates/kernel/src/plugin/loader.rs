//! Plugin loader - maps plugin code into the running process.
//!
//! Loading a plugin asks its [`PluginModule`](super::PluginModule) to bind
//! hooks, installs those bindings in the broker and calls `initialize`.
//! Required plugins load first. Loading is idempotent.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use semver::Version;
use tracing::{debug, info, warn};

use super::dependency::resolve_load_order;
use super::error::PluginError;
use super::module::ModuleCatalog;
use super::registry::{Plugin, PluginRegistry, merge};
use super::status::PluginStore;
use super::version;
use crate::hook::{Hook, HookBindings, HookBroker, HookContext, HookOutput};

/// Version of the running kernel, without pre-release tags.
pub fn kernel_version() -> Version {
    version::parse_lenient(env!("CARGO_PKG_VERSION"))
        .map(|v| Version::new(v.major, v.minor, v.patch))
        .unwrap_or_else(|_| Version::new(0, 0, 0))
}

pub struct PluginLoader {
    registry: PluginRegistry,
    store: Arc<dyn PluginStore>,
    catalog: ModuleCatalog,
    broker: Arc<HookBroker>,
    loaded: RwLock<HashSet<String>>,
    /// Held while loading and while a transition unloads a plugin, so a load
    /// never binds hooks from a plugin state read before the transition.
    load_lock: tokio::sync::Mutex<()>,
    kernel_version: Version,
}

impl PluginLoader {
    pub fn new(
        registry: PluginRegistry,
        store: Arc<dyn PluginStore>,
        catalog: ModuleCatalog,
        broker: Arc<HookBroker>,
    ) -> Self {
        Self {
            registry,
            store,
            catalog,
            broker,
            loaded: RwLock::new(HashSet::new()),
            load_lock: tokio::sync::Mutex::new(()),
            kernel_version: kernel_version(),
        }
    }

    pub fn with_kernel_version(mut self, version: Version) -> Self {
        self.kernel_version = version;
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn PluginStore> {
        &self.store
    }

    pub fn broker(&self) -> &Arc<HookBroker> {
        &self.broker
    }

    pub fn kernel_version(&self) -> &Version {
        &self.kernel_version
    }

    /// Every plugin on disk or installed, keyed by name.
    pub async fn get_plugins(&self) -> Result<BTreeMap<String, Plugin>, PluginError> {
        let discovered = self.registry.scan();
        let records = self.store.all().await?;
        Ok(merge(discovered, records, |name| self.is_loaded(name)))
    }

    /// One plugin by name; `NotFound` when it is neither on disk nor installed.
    pub async fn get_plugin(&self, name: &str) -> Result<Plugin, PluginError> {
        let found = self
            .registry
            .discover(name)
            .map_err(|e| PluginError::InvalidManifest {
                plugin: name.to_string(),
                details: format!("{e:#}"),
            })?;
        let record = self.store.get(name).await?;

        if found.is_none() && record.is_none() {
            return Err(PluginError::not_found(name));
        }

        Ok(Plugin {
            name: name.to_string(),
            info: found.as_ref().map(|f| f.info.clone()),
            dir: found.as_ref().map(|f| f.dir.clone()),
            modified: found.and_then(|f| f.modified),
            record,
            loaded: self.is_loaded(name),
        })
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.read().contains(name)
    }

    /// Names of all loaded plugins, sorted.
    pub fn loaded_plugins(&self) -> Vec<String> {
        let mut names: Vec<_> = self.loaded.read().iter().cloned().collect();
        names.sort();
        names
    }

    /// Check that a plugin's code can be mapped in, regardless of its status.
    ///
    /// Requires the manifest, a compiled module whose bindings cover every
    /// declared hook, and a kernel that meets the minimum version.
    pub fn check_code(&self, plugin: &Plugin) -> Result<(), PluginError> {
        self.bindings_for(plugin).map(|_| ())
    }

    /// Why a plugin cannot be loaded right now, if anything stops it.
    pub fn load_blocker(&self, plugin: &Plugin, plugins: &BTreeMap<String, Plugin>) -> Option<String> {
        if !plugin.is_installed() {
            return Some("it is not installed".to_string());
        }
        if !plugin.is_active() {
            return Some("it is not active".to_string());
        }
        if let Err(e) = self.check_code(plugin) {
            return Some(blocker_message(e));
        }
        if plugin.has_new_version() {
            return Some(format!(
                "version {} must be upgraded to {} first",
                plugin.installed_version().unwrap_or("?"),
                plugin.available_version().unwrap_or("?")
            ));
        }
        for dep in plugin.required_plugins() {
            match plugins.get(dep) {
                Some(p) if p.has_files() && p.is_active() => {}
                Some(p) if p.has_files() => {
                    return Some(format!("required plugin '{dep}' is not active"));
                }
                _ => return Some(format!("required plugin '{dep}' is missing")),
            }
        }
        None
    }

    /// Load a plugin and the plugins it requires.
    ///
    /// Returns `Ok(true)` when the plugin is loaded afterwards. When the
    /// plugin cannot load, `force` turns the skip into a `Loader` error.
    /// A dependency cycle is always an error.
    pub async fn load(&self, name: &str, force: bool) -> Result<bool, PluginError> {
        if self.is_loaded(name) {
            return Ok(true);
        }
        let _guard = self.load_lock.lock().await;
        let plugins = self.get_plugins().await?;
        self.load_from(&plugins, name, force, &mut Vec::new())
    }

    /// Load every installed, active plugin in dependency order.
    ///
    /// Plugins that cannot load are logged and skipped. Returns the names
    /// loaded by this call.
    pub async fn load_plugins(&self) -> Result<Vec<String>, PluginError> {
        let _guard = self.load_lock.lock().await;
        let plugins = self.get_plugins().await?;

        let candidates: BTreeMap<String, _> = plugins
            .values()
            .filter(|p| p.is_active())
            .filter_map(|p| p.info.clone().map(|info| (p.name.clone(), info)))
            .collect();

        let order = match resolve_load_order(&candidates) {
            Ok(order) => order,
            Err(e) => {
                warn!(error = %e, "cannot order plugins, loading alphabetically");
                candidates.keys().cloned().collect()
            }
        };

        let mut newly_loaded = Vec::new();
        for name in order {
            if self.is_loaded(&name) {
                continue;
            }
            match self.load_from(&plugins, &name, false, &mut Vec::new()) {
                Ok(true) => newly_loaded.push(name),
                Ok(false) => {}
                Err(e) => warn!(plugin = %name, error = %e, "failed to load plugin, skipping"),
            }
        }

        info!(count = newly_loaded.len(), "loaded plugins");
        Ok(newly_loaded)
    }

    /// Block loads until the guard is dropped.
    ///
    /// Transitions that make a plugin unloadable persist and unload under
    /// this guard.
    pub async fn lock_loads(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.load_lock.lock().await
    }

    /// Drop a plugin's hooks. Returns whether it was loaded.
    pub fn unload(&self, name: &str) -> bool {
        self.broker.unbind(name);
        let was_loaded = self.loaded.write().remove(name);
        if was_loaded {
            info!(plugin = %name, "unloaded plugin");
        }
        was_loaded
    }

    /// Call a plugin's lifecycle hook.
    ///
    /// Loaded plugins go through the broker. Plugins that are not loaded
    /// (being installed, upgraded, or active but unloadable) are called
    /// through temporary bindings from their module.
    pub fn call_hook(
        &self,
        plugin: &Plugin,
        hook: Hook,
        ctx: &HookContext,
    ) -> Result<HookOutput, PluginError> {
        if self.is_loaded(&plugin.name) {
            return self
                .broker
                .call_hook(&plugin.name, hook, ctx)
                .map_err(|e| PluginError::from_hook(&plugin.name, hook, e));
        }

        let bindings = self.bindings_for(plugin)?;
        let Some(callback) = bindings.hooks.get(&hook).cloned() else {
            debug!(plugin = %plugin.name, hook = %hook, "hook not bound, skipping");
            return Ok(None);
        };
        debug!(plugin = %plugin.name, hook = %hook, "calling hook on unloaded plugin");
        callback(ctx).map_err(|e| PluginError::from_hook(&plugin.name, hook, e))
    }

    /// Whether a plugin implements a lifecycle hook.
    pub fn has_hook(&self, plugin: &Plugin, hook: Hook) -> bool {
        if self.is_loaded(&plugin.name) {
            return self.broker.get_hook(&plugin.name, hook);
        }
        self.bindings_for(plugin)
            .is_ok_and(|b| b.hooks.contains_key(&hook))
    }

    fn load_from(
        &self,
        plugins: &BTreeMap<String, Plugin>,
        name: &str,
        force: bool,
        waiting: &mut Vec<String>,
    ) -> Result<bool, PluginError> {
        if self.is_loaded(name) {
            return Ok(true);
        }

        if waiting.iter().any(|w| w == name) {
            let mut chain = waiting.clone();
            chain.push(name.to_string());
            return Err(PluginError::loader(
                name,
                format!("circular dependency: {}", chain.join(" -> ")),
            ));
        }

        let Some(plugin) = plugins.get(name) else {
            if force {
                return Err(PluginError::not_found(name));
            }
            return Ok(false);
        };

        if let Some(reason) = self.load_blocker(plugin, plugins) {
            if force {
                return Err(PluginError::loader(name, reason));
            }
            debug!(plugin = %name, reason = %reason, "plugin cannot load, skipping");
            return Ok(false);
        }

        waiting.push(name.to_string());
        for dep in plugin.required_plugins() {
            let dep_loaded = self.load_from(plugins, dep, force, waiting);
            match dep_loaded {
                Ok(true) => {}
                Ok(false) => {
                    waiting.pop();
                    debug!(plugin = %name, dependency = %dep, "required plugin not loaded, skipping");
                    return Ok(false);
                }
                Err(e) => {
                    waiting.pop();
                    return Err(match e {
                        cycle @ PluginError::Loader { .. } => cycle,
                        other => PluginError::loader(
                            name,
                            format!("required plugin '{dep}' could not be loaded: {other}"),
                        ),
                    });
                }
            }
        }
        waiting.pop();

        self.bootstrap(plugin)?;
        Ok(true)
    }

    fn bootstrap(&self, plugin: &Plugin) -> Result<(), PluginError> {
        let bindings = self.bindings_for(plugin)?;
        let weight = plugin.info.as_ref().map_or(0, |i| i.hooks.weight);

        self.broker.bind(bindings, weight);
        self.loaded.write().insert(plugin.name.clone());

        let ctx = HookContext::empty(&plugin.name);
        if let Err(e) = self.broker.call_hook(&plugin.name, Hook::Initialize, &ctx) {
            self.unload(&plugin.name);
            return Err(PluginError::loader(
                &plugin.name,
                format!("initialize hook failed: {e}"),
            ));
        }

        info!(
            plugin = %plugin.name,
            version = plugin.installed_version().unwrap_or("?"),
            weight,
            "loaded plugin"
        );
        Ok(())
    }

    /// Ask the plugin's module for its bindings and verify them against the
    /// manifest.
    fn bindings_for(&self, plugin: &Plugin) -> Result<HookBindings, PluginError> {
        let Some(info) = plugin.info.as_ref() else {
            return Err(PluginError::loader(
                &plugin.name,
                "its files are missing from the plugins directory",
            ));
        };

        if !plugin.meets_minimum_version(&self.kernel_version) {
            return Err(PluginError::loader(
                &plugin.name,
                format!(
                    "it requires kernel version {} or newer (running {})",
                    info.minimum_kernel_version.as_deref().unwrap_or("?"),
                    self.kernel_version
                ),
            ));
        }

        let Some(module) = self.catalog.get(&plugin.name) else {
            return Err(PluginError::loader(
                &plugin.name,
                "no plugin code is registered under this name",
            ));
        };

        let mut bindings = HookBindings::new(&plugin.name);
        module
            .register(&mut bindings)
            .map_err(|e| PluginError::loader(&plugin.name, format!("{e:#}")))?;

        let unbound: Vec<&str> = info
            .hooks
            .implements
            .iter()
            .map(String::as_str)
            .filter(|h| !bindings.is_bound(h))
            .collect();
        if !unbound.is_empty() {
            return Err(PluginError::loader(
                &plugin.name,
                format!("it declares hooks it does not implement: {}", unbound.join(", ")),
            ));
        }

        Ok(bindings)
    }
}

fn blocker_message(e: PluginError) -> String {
    match e {
        PluginError::Loader { message, .. } => message,
        other => other.to_string(),
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("plugins_dir", &self.registry.plugins_dir())
            .field("catalog", &self.catalog)
            .field("loaded", &self.loaded_plugins())
            .field("kernel_version", &self.kernel_version.to_string())
            .finish()
    }
}
