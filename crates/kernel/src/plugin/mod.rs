//! Plugin system for Vitrine.
//!
//! This module handles:
//! - Parsing plugin metadata from `.info.toml` files
//! - Discovering plugins and merging them with their persisted status
//! - Loading plugin code in dependency order
//! - The install / activate / deactivate / upgrade / uninstall lifecycle

mod browse;
pub mod builtin;
pub mod cli;
mod dependency;
mod error;
mod info_parser;
mod lifecycle;
mod loader;
mod module;
mod pg_store;
mod registry;
mod status;
pub mod version;

pub use browse::{PluginListing, browse};
pub use dependency::{Unmet, resolve_load_order, unmet_dependencies};
pub use error::{ErrorCategory, PluginError};
pub use info_parser::{HookConfig, PluginInfo};
pub use lifecycle::{LifecycleManager, UninstallOutcome, UpgradeOutcome};
pub use loader::{PluginLoader, kernel_version};
pub use module::{ModuleCatalog, PluginModule};
pub use pg_store::PgPluginStore;
pub use registry::{DiscoveredPlugin, Plugin, PluginRegistry};
pub use status::{MemoryPluginStore, PluginOptions, PluginRecord, PluginStore};
