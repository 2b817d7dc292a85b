//! Plugin lifecycle - install, activate, deactivate, upgrade, uninstall.
//!
//! Every transition checks its preconditions before touching anything, runs
//! the plugin's hook, and only then persists. A failing hook therefore leaves
//! the stored state as it was. Transitions for one plugin are serialized by a
//! per-plugin lock, and the store's revision check turns a race with another
//! process into a `Conflict` instead of a lost update.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info};

use super::dependency::{Unmet, unmet_dependencies};
use super::error::PluginError;
use super::loader::PluginLoader;
use super::registry::Plugin;
use super::status::{PluginOptions, PluginRecord, PluginStore};
use crate::hook::{Hook, HookContext, HookOutput};

/// Result of an upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The installed version is already current.
    UpToDate { version: String },
    Upgraded { from: String, to: String },
}

/// Result of an uninstall request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallOutcome {
    /// Nothing was changed; the caller must confirm. Carries the plugin's
    /// `uninstall_message` output, if any.
    NeedsConfirmation { message: Option<String> },
    Uninstalled,
}

pub struct LifecycleManager {
    loader: Arc<PluginLoader>,
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl LifecycleManager {
    pub fn new(loader: Arc<PluginLoader>) -> Self {
        Self {
            loader,
            locks: DashMap::new(),
        }
    }

    pub fn loader(&self) -> &Arc<PluginLoader> {
        &self.loader
    }

    fn store(&self) -> &Arc<dyn PluginStore> {
        self.loader.store()
    }

    fn lock_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.entry(name.to_string()).or_default().clone()
    }

    /// Install a plugin from its directory.
    ///
    /// The plugin ends up installed and active at its manifest version.
    /// Loading it is left to the caller.
    pub async fn install(&self, name: &str) -> Result<PluginRecord, PluginError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let plugin = self.loader.get_plugin(name).await?;
        if plugin.is_installed() {
            return Err(PluginError::AlreadyInState {
                plugin: name.to_string(),
                state: "installed",
            });
        }
        let Some(version) = plugin.available_version().map(str::to_string) else {
            return Err(PluginError::not_found(name));
        };

        self.check_dependencies(&plugin, "installed").await?;
        self.loader.check_code(&plugin)?;

        self.loader
            .call_hook(&plugin, Hook::Install, &HookContext::empty(name))?;

        let record = self
            .store()
            .insert(name, &version, true)
            .await?
            .ok_or_else(|| PluginError::conflict(name))?;

        info!(plugin = %name, version = %version, "installed plugin");
        Ok(record)
    }

    /// Mark an installed plugin active.
    ///
    /// Does not load the plugin. A later load never re-runs `activate`.
    pub async fn activate(&self, name: &str) -> Result<PluginRecord, PluginError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let plugin = self.loader.get_plugin(name).await?;
        let record = installed_record(&plugin)?;
        if record.active {
            return Err(PluginError::AlreadyInState {
                plugin: name.to_string(),
                state: "active",
            });
        }

        self.check_dependencies(&plugin, "activated").await?;

        if self.loader.has_hook(&plugin, Hook::Activate) {
            self.loader
                .call_hook(&plugin, Hook::Activate, &HookContext::empty(name))?;
        }

        let updated = self
            .store()
            .update(name, record.revision, &record.version, true)
            .await?
            .ok_or_else(|| PluginError::conflict(name))?;

        info!(plugin = %name, "activated plugin");
        Ok(updated)
    }

    /// Mark an installed plugin inactive and unload it.
    ///
    /// Returns `false` when the plugin was already inactive, in which case
    /// the `deactivate` hook is not called.
    pub async fn deactivate(&self, name: &str) -> Result<bool, PluginError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let plugin = self.loader.get_plugin(name).await?;
        let record = installed_record(&plugin)?;
        if !record.active {
            debug!(plugin = %name, "plugin already inactive");
            return Ok(false);
        }

        if self.loader.has_hook(&plugin, Hook::Deactivate) {
            self.loader
                .call_hook(&plugin, Hook::Deactivate, &HookContext::empty(name))?;
        }

        let _loads = self.loader.lock_loads().await;
        self.store()
            .update(name, record.revision, &record.version, false)
            .await?
            .ok_or_else(|| PluginError::conflict(name))?;
        self.loader.unload(name);

        info!(plugin = %name, "deactivated plugin");
        Ok(true)
    }

    /// Bring the installed version up to the version on disk.
    pub async fn upgrade(&self, name: &str) -> Result<UpgradeOutcome, PluginError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let plugin = self.loader.get_plugin(name).await?;
        let record = installed_record(&plugin)?;
        if !plugin.has_new_version() {
            return Ok(UpgradeOutcome::UpToDate {
                version: record.version.clone(),
            });
        }
        self.loader.check_code(&plugin)?;

        let from = record.version.clone();
        let to = plugin.available_version().unwrap_or(&from).to_string();

        let ctx = HookContext::new(name, json!({ "old_version": from, "new_version": to }));
        self.loader.call_hook(&plugin, Hook::Upgrade, &ctx)?;

        self.store()
            .update(name, record.revision, &to, record.active)
            .await?
            .ok_or_else(|| PluginError::conflict(name))?;

        info!(plugin = %name, from = %from, to = %to, "upgraded plugin");
        Ok(UpgradeOutcome::Upgraded { from, to })
    }

    /// Uninstall a plugin, removing its record and options.
    ///
    /// Without `confirm` nothing changes and the confirmation prompt is
    /// returned instead.
    pub async fn uninstall(&self, name: &str, confirm: bool) -> Result<UninstallOutcome, PluginError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let plugin = self.loader.get_plugin(name).await?;
        let record = installed_record(&plugin)?;

        if !confirm {
            let message = if self.loader.has_hook(&plugin, Hook::UninstallMessage) {
                let output = self.loader.call_hook(
                    &plugin,
                    Hook::UninstallMessage,
                    &HookContext::empty(name),
                )?;
                render_output(output)
            } else {
                None
            };
            return Ok(UninstallOutcome::NeedsConfirmation { message });
        }

        if self.loader.has_hook(&plugin, Hook::Uninstall) {
            self.loader
                .call_hook(&plugin, Hook::Uninstall, &HookContext::empty(name))?;
        }

        let _loads = self.loader.lock_loads().await;
        if !self.store().delete(name, record.revision).await? {
            return Err(PluginError::conflict(name));
        }
        self.loader.unload(name);

        info!(plugin = %name, "uninstalled plugin");
        Ok(UninstallOutcome::Uninstalled)
    }

    /// Submit configuration values to a plugin's `config` hook.
    ///
    /// An object returned by the hook is merged into the stored options and
    /// handed back. A validation failure stores nothing.
    pub async fn configure(
        &self,
        name: &str,
        submission: &PluginOptions,
    ) -> Result<PluginOptions, PluginError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let plugin = self.loader.get_plugin(name).await?;
        installed_record(&plugin)?;
        self.require_config_hooks(&plugin)?;

        let ctx = HookContext::new(name, json!({ "post": submission }));
        let output = self.loader.call_hook(&plugin, Hook::Config, &ctx)?;

        let options = options_from_output(output);
        if !options.is_empty() {
            self.store().set_options(name, &options).await?;
        }

        info!(plugin = %name, options = options.len(), "configured plugin");
        Ok(options)
    }

    /// Render a plugin's configuration form with its current options.
    pub async fn config_form(&self, name: &str) -> Result<Option<String>, PluginError> {
        let plugin = self.loader.get_plugin(name).await?;
        installed_record(&plugin)?;
        self.require_config_hooks(&plugin)?;

        let options = self.store().options(name).await?;
        let ctx = HookContext::new(name, json!({ "options": options }));
        let output = self.loader.call_hook(&plugin, Hook::ConfigForm, &ctx)?;
        Ok(render_output(output))
    }

    /// Stored configuration values for a plugin.
    pub async fn options(&self, name: &str) -> Result<PluginOptions, PluginError> {
        Ok(self.store().options(name).await?)
    }

    fn require_config_hooks(&self, plugin: &Plugin) -> Result<(), PluginError> {
        if self.loader.has_hook(plugin, Hook::ConfigForm) && self.loader.has_hook(plugin, Hook::Config) {
            return Ok(());
        }
        Err(PluginError::installer(
            &plugin.name,
            format!(
                "error in configuring plugin named \"{}\". Missing config and/or config_form hook(s).",
                plugin.display_name()
            ),
        ))
    }

    /// Every required plugin must be installed, active and loaded.
    async fn check_dependencies(&self, plugin: &Plugin, action: &'static str) -> Result<(), PluginError> {
        let mut status = HashMap::new();
        for dep in plugin.required_plugins() {
            let unmet = match self.loader.get_plugin(dep).await {
                Ok(p) if !p.has_files() => Some(Unmet::Missing),
                Ok(p) if !p.is_installed() => Some(Unmet::NotInstalled),
                Ok(p) if !p.is_active() => Some(Unmet::Inactive),
                Ok(p) if !p.loaded => Some(Unmet::NotLoaded),
                Ok(_) => None,
                Err(PluginError::NotFound { .. } | PluginError::InvalidManifest { .. }) => {
                    Some(Unmet::Missing)
                }
                Err(e) => return Err(e),
            };
            status.insert(dep.as_str(), unmet);
        }

        let missing = unmet_dependencies(plugin.required_plugins(), |dep| {
            status.get(dep).copied().flatten()
        });
        if missing.is_empty() {
            return Ok(());
        }

        Err(PluginError::DependencyUnmet {
            plugin: plugin.name.clone(),
            action,
            missing,
        })
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("loader", &self.loader)
            .finish()
    }
}

fn installed_record(plugin: &Plugin) -> Result<&PluginRecord, PluginError> {
    plugin
        .record
        .as_ref()
        .ok_or_else(|| PluginError::not_installed(&plugin.name))
}

/// Text for hooks that produce something to show (messages, forms).
fn render_output(output: HookOutput) -> Option<String> {
    match output? {
        JsonValue::Null => None,
        JsonValue::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

/// Options returned from a `config` hook as a JSON object.
fn options_from_output(output: HookOutput) -> PluginOptions {
    let Some(JsonValue::Object(map)) = output else {
        return PluginOptions::new();
    };
    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                JsonValue::String(text) => text,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect()
}
