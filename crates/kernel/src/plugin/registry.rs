//! Plugin discovery and the merged plugin view.
//!
//! The registry scans the plugins directory for manifests. A [`Plugin`]
//! combines what is on disk with what is persisted, so a plugin can be
//! present but not installed, or installed with its files gone.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::info_parser::PluginInfo;
use super::status::PluginRecord;
use super::version;

/// A plugin manifest found on disk.
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub info: PluginInfo,
    pub dir: PathBuf,
    /// Last modification of the plugin directory.
    pub modified: Option<DateTime<Utc>>,
}

/// One plugin as seen by the kernel.
#[derive(Debug, Clone)]
pub struct Plugin {
    /// Directory name.
    pub name: String,
    /// Manifest, when the plugin's files are present.
    pub info: Option<PluginInfo>,
    pub dir: Option<PathBuf>,
    pub modified: Option<DateTime<Utc>>,
    /// Persisted status, when installed.
    pub record: Option<PluginRecord>,
    pub loaded: bool,
}

impl Plugin {
    pub fn display_name(&self) -> &str {
        self.info
            .as_ref()
            .map(PluginInfo::display_name)
            .unwrap_or(&self.name)
    }

    pub fn has_files(&self) -> bool {
        self.info.is_some()
    }

    pub fn is_installed(&self) -> bool {
        self.record.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.record.as_ref().is_some_and(|r| r.active)
    }

    pub fn installed_version(&self) -> Option<&str> {
        self.record.as_ref().map(|r| r.version.as_str())
    }

    /// Version of the files on disk.
    pub fn available_version(&self) -> Option<&str> {
        self.info.as_ref().map(|i| i.version.as_str())
    }

    /// Installed and the files on disk are a newer version.
    pub fn has_new_version(&self) -> bool {
        match (self.available_version(), self.installed_version()) {
            (Some(available), Some(installed)) => version::is_newer(available, installed),
            _ => false,
        }
    }

    pub fn required_plugins(&self) -> &[String] {
        self.info
            .as_ref()
            .map(|i| i.required_plugins.as_slice())
            .unwrap_or_default()
    }

    pub fn meets_minimum_version(&self, kernel: &semver::Version) -> bool {
        match self.info.as_ref().and_then(|i| i.minimum_kernel_version.as_deref()) {
            Some(min) => version::meets_minimum(kernel, min),
            None => true,
        }
    }
}

/// Scans a plugins directory for `{name}/{name}.info.toml` manifests.
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    plugins_dir: PathBuf,
}

impl PluginRegistry {
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
        }
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Discover every plugin on disk.
    ///
    /// Directories without a manifest, or with one that fails to parse, are
    /// logged and skipped.
    pub fn scan(&self) -> BTreeMap<String, DiscoveredPlugin> {
        let mut discovered = BTreeMap::new();

        if !self.plugins_dir.exists() {
            info!(
                plugins_dir = %self.plugins_dir.display(),
                "plugins directory does not exist, nothing to discover"
            );
            return discovered;
        }

        let entries = match std::fs::read_dir(&self.plugins_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "failed to read plugins directory");
                return discovered;
            }
        };

        for entry in entries.filter_map(|e| e.ok()).filter(|e| e.path().is_dir()) {
            let dir = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(dir = %dir.display(), "plugin directory name is not UTF-8, skipping");
                continue;
            };

            match read_manifest(&name, &dir) {
                Ok(Some(found)) => {
                    discovered.insert(name, found);
                }
                Ok(None) => {
                    debug!(dir = %dir.display(), "no manifest found, skipping");
                }
                Err(e) => {
                    warn!(plugin = %name, error = %e, "failed to read plugin manifest, skipping");
                }
            }
        }

        discovered
    }

    /// Read one plugin's manifest. `Ok(None)` when the plugin has no files.
    pub fn discover(&self, name: &str) -> Result<Option<DiscoveredPlugin>> {
        let dir = self.plugins_dir.join(name);
        if !dir.is_dir() {
            return Ok(None);
        }
        read_manifest(name, &dir)
    }
}

fn read_manifest(name: &str, dir: &Path) -> Result<Option<DiscoveredPlugin>> {
    let info_path = dir.join(format!("{name}.info.toml"));
    if !info_path.exists() {
        return Ok(None);
    }

    let info = PluginInfo::parse(&info_path)?;
    if info.name != name {
        anyhow::bail!(
            "manifest at {} declares name '{}' which does not match its directory",
            info_path.display(),
            info.name
        );
    }

    let modified = match std::fs::metadata(dir).and_then(|m| m.modified()) {
        Ok(time) => Some(DateTime::<Utc>::from(time)),
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "plugin directory has no modification time");
            None
        }
    };

    Ok(Some(DiscoveredPlugin {
        info,
        dir: dir.to_path_buf(),
        modified,
    }))
}

/// Merge discovered manifests with persisted records, keyed by name.
pub fn merge(
    discovered: BTreeMap<String, DiscoveredPlugin>,
    records: Vec<PluginRecord>,
    is_loaded: impl Fn(&str) -> bool,
) -> BTreeMap<String, Plugin> {
    let mut plugins: BTreeMap<String, Plugin> = discovered
        .into_iter()
        .map(|(name, found)| {
            let plugin = Plugin {
                loaded: is_loaded(&name),
                name: name.clone(),
                info: Some(found.info),
                dir: Some(found.dir),
                modified: found.modified,
                record: None,
            };
            (name, plugin)
        })
        .collect();

    for record in records {
        let name = record.name.clone();
        plugins
            .entry(name.clone())
            .or_insert_with(|| Plugin {
                loaded: is_loaded(&name),
                name,
                info: None,
                dir: None,
                modified: None,
                record: None,
            })
            .record = Some(record);
    }

    plugins
}
