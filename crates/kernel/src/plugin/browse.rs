//! Grouped plugin listing for administrators.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use semver::Version;

use super::error::PluginError;
use super::loader::PluginLoader;
use super::registry::Plugin;

/// How long a freshly uploaded plugin counts as new.
const NEW_PLUGIN_WINDOW_HOURS: i64 = 24;

/// Plugins grouped by status, each group sorted case-insensitively.
///
/// Every plugin is in exactly one of active, inactive or uninstalled; it may
/// also appear in needs-attention or new.
#[derive(Debug, Clone, Default)]
pub struct PluginListing {
    pub active: Vec<Plugin>,
    pub inactive: Vec<Plugin>,
    pub uninstalled: Vec<Plugin>,
    /// Kernel too old, upgrade pending, or a required plugin not loaded.
    pub needs_attention: Vec<Plugin>,
    /// Uploaded in the last day and not yet installed.
    pub new: Vec<Plugin>,
}

impl PluginListing {
    pub fn total(&self) -> usize {
        self.active.len() + self.inactive.len() + self.uninstalled.len()
    }
}

/// Build the grouped listing from the current registry and store.
pub async fn browse(loader: &PluginLoader, now: DateTime<Utc>) -> Result<PluginListing, PluginError> {
    let plugins = loader.get_plugins().await?;
    Ok(group(&plugins, loader.kernel_version(), now))
}

fn group(plugins: &BTreeMap<String, Plugin>, kernel: &Version, now: DateTime<Utc>) -> PluginListing {
    let mut sorted: Vec<&Plugin> = plugins.values().collect();
    sorted.sort_by_key(|p| (p.name.to_lowercase(), p.name.clone()));

    let mut listing = PluginListing::default();
    for plugin in sorted {
        let attention = needs_attention(plugin, plugins, kernel);
        if attention {
            listing.needs_attention.push(plugin.clone());
        }

        let recent = plugin
            .modified
            .is_some_and(|m| now - m < Duration::hours(NEW_PLUGIN_WINDOW_HOURS));
        if recent && !attention && !plugin.is_installed() {
            listing.new.push(plugin.clone());
        }

        match (plugin.is_installed(), plugin.is_active()) {
            (true, true) => listing.active.push(plugin.clone()),
            (true, false) => listing.inactive.push(plugin.clone()),
            (false, _) => listing.uninstalled.push(plugin.clone()),
        }
    }
    listing
}

fn needs_attention(plugin: &Plugin, plugins: &BTreeMap<String, Plugin>, kernel: &Version) -> bool {
    if !plugin.meets_minimum_version(kernel) || plugin.has_new_version() {
        return true;
    }
    plugin
        .required_plugins()
        .iter()
        .any(|dep| !plugins.get(dep).is_some_and(|p| p.loaded))
}
