//! Compiled-in plugin code.
//!
//! A plugin directory carries the manifest; the code behind it is a
//! [`PluginModule`] registered in the [`ModuleCatalog`] under the same name.
//! Loading a plugin asks its module to register hook callbacks.

use std::collections::HashMap;
use std::sync::Arc;

use crate::hook::HookBindings;

/// Code for one plugin.
pub trait PluginModule: Send + Sync {
    /// Machine name; must match the plugin directory.
    fn name(&self) -> &str;

    /// Register lifecycle hooks and event subscribers.
    fn register(&self, bindings: &mut HookBindings) -> anyhow::Result<()>;
}

/// All plugin modules compiled into this binary.
#[derive(Clone, Default)]
pub struct ModuleCatalog {
    modules: HashMap<String, Arc<dyn PluginModule>>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, replacing any with the same name.
    pub fn register(&mut self, module: Arc<dyn PluginModule>) {
        self.modules.insert(module.name().to_string(), module);
    }

    pub fn with(mut self, module: impl PluginModule + 'static) -> Self {
        self.register(Arc::new(module));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PluginModule>> {
        self.modules.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.modules.keys().collect();
        names.sort();
        f.debug_struct("ModuleCatalog").field("modules", &names).finish()
    }
}
