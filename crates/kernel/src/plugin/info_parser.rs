//! Parser for plugin `.info.toml` manifest files.
//!
//! Each plugin directory holds a `{name}.info.toml` file that declares:
//! - name, display name, version, description, author and link
//! - required and optional plugins
//! - the minimum kernel version the plugin runs on
//! - hooks (which lifecycle hooks and events the plugin implements)

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::version;
use crate::hook::{Hook, KNOWN_HOOKS};

/// Plugin metadata parsed from `.info.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginInfo {
    /// Plugin machine name (must match directory and file names).
    pub name: String,

    /// Human-readable name; falls back to `name`.
    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Version available on disk (e.g., "1.2" or "1.2.0").
    pub version: String,

    #[serde(default)]
    pub author: Option<String>,

    #[serde(default)]
    pub link: Option<String>,

    /// Plugins that must be installed, active and loaded first.
    #[serde(default)]
    pub required_plugins: Vec<String>,

    /// Plugins this one integrates with when present.
    #[serde(default)]
    pub optional_plugins: Vec<String>,

    /// Oldest kernel version this plugin supports.
    #[serde(default)]
    pub minimum_kernel_version: Option<String>,

    #[serde(default)]
    pub hooks: HookConfig,
}

/// Which hooks a plugin implements.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookConfig {
    /// Hook and event names, e.g. `["install", "config", "tag_item"]`.
    #[serde(default)]
    pub implements: Vec<String>,

    /// Ordering among event subscribers (lower runs first, default 0).
    #[serde(default)]
    pub weight: i32,
}

impl PluginInfo {
    /// Parse a plugin info file from the given path.
    pub fn parse(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plugin info file: {}", path.display()))?;

        Self::parse_str(&content, path)
    }

    /// Parse plugin info from a TOML string.
    pub fn parse_str(content: &str, path: &Path) -> Result<Self> {
        let info: PluginInfo = toml::from_str(content)
            .with_context(|| format!("failed to parse plugin info TOML at {}", path.display()))?;

        info.validate(path)?;
        Ok(info)
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Whether the manifest declares a lifecycle hook.
    pub fn declares(&self, hook: Hook) -> bool {
        self.hooks.implements.iter().any(|h| h == hook.as_str())
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("plugin info at {} has empty 'name' field", path.display());
        }

        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            anyhow::bail!(
                "plugin name '{}' at {} may only contain letters, digits, '_' and '-'",
                self.name,
                path.display()
            );
        }

        if self.version.is_empty() {
            anyhow::bail!(
                "plugin '{}' at {} has empty 'version' field",
                self.name,
                path.display()
            );
        }

        version::parse_lenient(&self.version).with_context(|| {
            format!(
                "plugin '{}' has invalid version '{}'",
                self.name, self.version
            )
        })?;

        if let Some(min) = &self.minimum_kernel_version {
            version::parse_lenient(min).with_context(|| {
                format!(
                    "plugin '{}' has invalid minimum_kernel_version '{}'",
                    self.name, min
                )
            })?;
        }

        if self.required_plugins.contains(&self.name) {
            anyhow::bail!("plugin '{}' cannot require itself", self.name);
        }

        for hook in &self.hooks.implements {
            if !KNOWN_HOOKS.contains(&hook.as_str()) {
                anyhow::bail!(
                    "plugin '{}' declares unknown hook '{}'. Known hooks: {}",
                    self.name,
                    hook,
                    KNOWN_HOOKS.join(", ")
                );
            }
        }

        Ok(())
    }
}
