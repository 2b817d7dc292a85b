//! Plugin status tracking.
//!
//! A plugin is installed when it has a `plugin_status` row; the row records
//! the installed version and whether the plugin is active. Every write bumps
//! `revision`, and updates only apply when the caller saw the current
//! revision, so two racing transitions cannot both commit.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::FromRow;

/// A row from the `plugin_status` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PluginRecord {
    pub name: String,
    pub version: String,
    pub active: bool,
    pub revision: i64,
    pub installed_at: i64,
    pub updated_at: i64,
}

/// Persisted plugin configuration values.
pub type PluginOptions = BTreeMap<String, String>;

#[async_trait]
pub trait PluginStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<PluginRecord>>;

    /// All installed plugins ordered by name.
    async fn all(&self) -> Result<Vec<PluginRecord>>;

    /// Insert a new record. Returns `None` if the plugin is already installed.
    async fn insert(&self, name: &str, version: &str, active: bool) -> Result<Option<PluginRecord>>;

    /// Update version and active flag if the stored revision still matches.
    ///
    /// Returns `None` when the record is gone or was changed concurrently.
    async fn update(
        &self,
        name: &str,
        expected_revision: i64,
        version: &str,
        active: bool,
    ) -> Result<Option<PluginRecord>>;

    /// Delete the record and its options if the revision matches.
    async fn delete(&self, name: &str, expected_revision: i64) -> Result<bool>;

    async fn options(&self, name: &str) -> Result<PluginOptions>;

    /// Merge options into the plugin's stored configuration.
    async fn set_options(&self, name: &str, options: &PluginOptions) -> Result<()>;
}

#[derive(Debug, Default)]
struct StatusTables {
    records: BTreeMap<String, PluginRecord>,
    options: BTreeMap<String, PluginOptions>,
}

/// In-memory plugin store.
#[derive(Debug, Default)]
pub struct MemoryPluginStore {
    tables: RwLock<StatusTables>,
}

impl MemoryPluginStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PluginStore for MemoryPluginStore {
    async fn get(&self, name: &str) -> Result<Option<PluginRecord>> {
        Ok(self.tables.read().records.get(name).cloned())
    }

    async fn all(&self) -> Result<Vec<PluginRecord>> {
        Ok(self.tables.read().records.values().cloned().collect())
    }

    async fn insert(&self, name: &str, version: &str, active: bool) -> Result<Option<PluginRecord>> {
        let mut tables = self.tables.write();
        if tables.records.contains_key(name) {
            return Ok(None);
        }
        let now = chrono::Utc::now().timestamp();
        let record = PluginRecord {
            name: name.to_string(),
            version: version.to_string(),
            active,
            revision: 1,
            installed_at: now,
            updated_at: now,
        };
        tables.records.insert(name.to_string(), record.clone());
        Ok(Some(record))
    }

    async fn update(
        &self,
        name: &str,
        expected_revision: i64,
        version: &str,
        active: bool,
    ) -> Result<Option<PluginRecord>> {
        let mut tables = self.tables.write();
        let Some(record) = tables.records.get_mut(name) else {
            return Ok(None);
        };
        if record.revision != expected_revision {
            return Ok(None);
        }
        record.version = version.to_string();
        record.active = active;
        record.revision += 1;
        record.updated_at = chrono::Utc::now().timestamp();
        Ok(Some(record.clone()))
    }

    async fn delete(&self, name: &str, expected_revision: i64) -> Result<bool> {
        let mut tables = self.tables.write();
        match tables.records.get(name) {
            Some(record) if record.revision == expected_revision => {
                tables.records.remove(name);
                tables.options.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn options(&self, name: &str) -> Result<PluginOptions> {
        Ok(self
            .tables
            .read()
            .options
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_options(&self, name: &str, options: &PluginOptions) -> Result<()> {
        let mut tables = self.tables.write();
        if !tables.records.contains_key(name) {
            anyhow::bail!("cannot store options for plugin '{name}' which is not installed");
        }
        let stored = tables.options.entry(name.to_string()).or_default();
        stored.extend(options.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}
