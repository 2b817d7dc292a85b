//! Kernel state shared by every command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::hook::HookBroker;
use crate::plugin::{
    LifecycleManager, ModuleCatalog, PgPluginStore, PluginLoader, PluginRegistry, PluginStore,
    builtin,
};
use crate::tagging::{PgTagStore, TagStore, TaggingEngine};

/// Shared kernel state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

struct KernelInner {
    /// Hook broker shared by the loader and the tagging engine.
    broker: Arc<HookBroker>,

    loader: Arc<PluginLoader>,

    lifecycle: LifecycleManager,

    tagging: TaggingEngine,
}

/// Everything needed to assemble a [`Kernel`] without a database.
pub struct KernelParts {
    pub plugins_dir: PathBuf,
    pub plugin_store: Arc<dyn PluginStore>,
    pub tag_store: Arc<dyn TagStore>,
    pub catalog: ModuleCatalog,
    pub tag_delimiter: String,
}

impl Kernel {
    /// Connect to PostgreSQL, apply the schema and wire the built-in plugins.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = db::create_pool(config)
            .await
            .context("failed to create database pool")?;
        if !db::check_health(&pool).await {
            anyhow::bail!("database did not answer a health check");
        }

        db::ensure_schema(&pool)
            .await
            .context("failed to prepare database schema")?;

        Ok(Self::from_parts(KernelParts {
            plugins_dir: config.plugins_dir.clone(),
            plugin_store: Arc::new(PgPluginStore::new(pool.clone())),
            tag_store: Arc::new(PgTagStore::new(pool)),
            catalog: builtin::catalog(),
            tag_delimiter: config.tag_delimiter.clone(),
        }))
    }

    pub fn from_parts(parts: KernelParts) -> Self {
        let broker = Arc::new(HookBroker::new());
        let loader = Arc::new(PluginLoader::new(
            PluginRegistry::new(parts.plugins_dir),
            parts.plugin_store,
            parts.catalog,
            broker.clone(),
        ));
        let lifecycle = LifecycleManager::new(loader.clone());
        let tagging =
            TaggingEngine::new(parts.tag_store, broker.clone()).with_delimiter(parts.tag_delimiter);

        Self {
            inner: Arc::new(KernelInner {
                broker,
                loader,
                lifecycle,
                tagging,
            }),
        }
    }

    /// Load every installed, active plugin.
    pub async fn start(&self) -> Result<()> {
        let loaded = self
            .inner
            .loader
            .load_plugins()
            .await
            .context("failed to load plugins")?;

        info!(plugins = ?loaded, "kernel started");
        Ok(())
    }

    pub fn broker(&self) -> &Arc<HookBroker> {
        &self.inner.broker
    }

    pub fn loader(&self) -> &Arc<PluginLoader> {
        &self.inner.loader
    }

    pub fn plugins(&self) -> &LifecycleManager {
        &self.inner.lifecycle
    }

    pub fn tagging(&self) -> &TaggingEngine {
        &self.inner.tagging
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("loader", &self.inner.loader)
            .field("tagging", &self.inner.tagging)
            .finish()
    }
}
