//! Vitrine test utilities.
//!
//! Helpers for integration testing: temporary plugin directories, manifest
//! builders, plugin modules that record their hook calls, and a kernel
//! wired to in-memory stores.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tempfile::TempDir;
use uuid::Uuid;

use vitrine_kernel::hook::{Event, Hook, HookBindings, HookContext, HookError, UserContext};
use vitrine_kernel::plugin::{MemoryPluginStore, ModuleCatalog, PluginModule};
use vitrine_kernel::state::{Kernel, KernelParts};
use vitrine_kernel::tagging::MemoryTagStore;

/// An authenticated user with a fresh id.
pub fn test_user() -> UserContext {
    UserContext::authenticated(Uuid::now_v7(), vec!["tag records".to_string()])
}

/// A plugins directory that is removed when dropped.
pub struct TestPluginDir {
    dir: TempDir,
}

impl TestPluginDir {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `{name}/{name}.info.toml` with the given contents.
    pub fn write_manifest(&self, name: &str, contents: &str) -> anyhow::Result<()> {
        let plugin_dir = self.dir.path().join(name);
        std::fs::create_dir_all(&plugin_dir)?;
        std::fs::write(plugin_dir.join(format!("{name}.info.toml")), contents)?;
        Ok(())
    }

    pub fn add(&self, manifest: &TestManifest) -> anyhow::Result<()> {
        self.write_manifest(&manifest.name, &manifest.to_toml())
    }

    /// Delete a plugin's files, as if it had been removed from disk.
    pub fn remove(&self, name: &str) -> anyhow::Result<()> {
        std::fs::remove_dir_all(self.dir.path().join(name))?;
        Ok(())
    }
}

/// Builder for plugin manifests.
#[derive(Debug, Clone)]
pub struct TestManifest {
    pub name: String,
    pub version: String,
    pub requires: Vec<String>,
    pub hooks: Vec<String>,
    pub weight: i32,
    pub minimum_kernel_version: Option<String>,
}

impl TestManifest {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            requires: Vec::new(),
            hooks: Vec::new(),
            weight: 0,
            minimum_kernel_version: None,
        }
    }

    pub fn requires(mut self, plugins: &[&str]) -> Self {
        self.requires = plugins.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn hooks(mut self, hooks: &[&str]) -> Self {
        self.hooks = hooks.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    pub fn minimum_kernel_version(mut self, version: &str) -> Self {
        self.minimum_kernel_version = Some(version.to_string());
        self
    }

    pub fn to_toml(&self) -> String {
        let list = |items: &[String]| {
            items
                .iter()
                .map(|s| format!("\"{s}\""))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut out = format!(
            "name = \"{}\"\nversion = \"{}\"\ndescription = \"Test plugin {}\"\nrequired_plugins = [{}]\n",
            self.name,
            self.version,
            self.name,
            list(&self.requires)
        );
        if let Some(min) = &self.minimum_kernel_version {
            out.push_str(&format!("minimum_kernel_version = \"{min}\"\n"));
        }
        out.push_str(&format!(
            "\n[hooks]\nimplements = [{}]\nweight = {}\n",
            list(&self.hooks),
            self.weight
        ));
        out
    }
}

/// Shared log of hook calls, as `"plugin:hook"` strings.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// A plugin module that records every hook call.
///
/// Hooks can be made to fail or to return a value after the module has been
/// registered, since the switches are shared with the bound callbacks.
#[derive(Clone)]
pub struct RecordingModule {
    name: String,
    hooks: Vec<Hook>,
    events: Vec<Event>,
    log: CallLog,
    failing: Arc<Mutex<HashMap<Hook, HookError>>>,
    outputs: Arc<Mutex<HashMap<Hook, JsonValue>>>,
    payloads: Arc<Mutex<Vec<(String, JsonValue)>>>,
}

impl RecordingModule {
    /// A module binding the given lifecycle hooks, logging into `log`.
    pub fn new(name: &str, hooks: &[Hook], log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            hooks: hooks.to_vec(),
            events: Vec::new(),
            log: log.clone(),
            failing: Arc::default(),
            outputs: Arc::default(),
            payloads: Arc::default(),
        }
    }

    /// Also subscribe to these events.
    pub fn with_events(mut self, events: &[Event]) -> Self {
        self.events = events.to_vec();
        self
    }

    pub fn fail(&self, hook: Hook, error: HookError) {
        self.failing.lock().insert(hook, error);
    }

    pub fn succeed(&self, hook: Hook) {
        self.failing.lock().remove(&hook);
    }

    pub fn respond(&self, hook: Hook, output: JsonValue) {
        self.outputs.lock().insert(hook, output);
    }

    /// Arguments each hook and event was called with, in call order.
    pub fn payloads(&self) -> Vec<(String, JsonValue)> {
        self.payloads.lock().clone()
    }
}

impl PluginModule for RecordingModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, bindings: &mut HookBindings) -> anyhow::Result<()> {
        for &hook in &self.hooks {
            let plugin = self.name.clone();
            let log = self.log.clone();
            let failing = self.failing.clone();
            let outputs = self.outputs.clone();
            let payloads = self.payloads.clone();
            bindings.on(hook, move |ctx: &HookContext| {
                log.lock().push(format!("{plugin}:{hook}"));
                payloads.lock().push((hook.to_string(), ctx.args.clone()));
                if let Some(err) = failing.lock().get(&hook) {
                    return Err(err.clone());
                }
                Ok(outputs.lock().get(&hook).cloned())
            });
        }

        for &event in &self.events {
            let plugin = self.name.clone();
            let log = self.log.clone();
            let payloads = self.payloads.clone();
            bindings.subscribe(event, move |ctx: &HookContext| {
                log.lock().push(format!("{plugin}:{event}"));
                payloads.lock().push((event.to_string(), ctx.args.clone()));
                Ok(None)
            });
        }

        Ok(())
    }
}

/// A kernel over in-memory stores, plus handles to inspect them.
pub struct TestKernel {
    pub kernel: Kernel,
    pub plugin_store: Arc<MemoryPluginStore>,
    pub tag_store: Arc<MemoryTagStore>,
}

impl TestKernel {
    pub fn new(plugins_dir: &Path, modules: Vec<RecordingModule>) -> Self {
        let mut catalog = ModuleCatalog::new();
        for module in modules {
            catalog.register(Arc::new(module));
        }
        Self::with_catalog(plugins_dir, catalog)
    }

    pub fn with_catalog(plugins_dir: &Path, catalog: ModuleCatalog) -> Self {
        let plugin_store = Arc::new(MemoryPluginStore::new());
        let tag_store = Arc::new(MemoryTagStore::new());
        let kernel = Kernel::from_parts(KernelParts {
            plugins_dir: plugins_dir.to_path_buf(),
            plugin_store: plugin_store.clone(),
            tag_store: tag_store.clone(),
            catalog,
            tag_delimiter: ",".to_string(),
        });
        Self {
            kernel,
            plugin_store,
            tag_store,
        }
    }
}

/// Names of plugins, in order, from a log filtered to one hook.
pub fn calls_to(log: &CallLog, hook: &str) -> Vec<String> {
    let suffix = format!(":{hook}");
    log.lock()
        .iter()
        .filter_map(|entry| entry.strip_suffix(&suffix).map(str::to_string))
        .collect()
}

/// Distinct plugin names that appear in a log.
pub fn plugins_called(log: &CallLog) -> HashSet<String> {
    log.lock()
        .iter()
        .filter_map(|entry| entry.split_once(':').map(|(p, _)| p.to_string()))
        .collect()
}
