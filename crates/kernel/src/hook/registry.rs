//! Hook names and the bindings a plugin module produces when loaded.
//!
//! Names are resolved once, when a manifest is parsed or a module binds its
//! callbacks, never by building strings at call time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::broker::HookFn;
use super::context::{HookContext, HookError, HookOutput};
use crate::tagging::RecordKind;

/// Lifecycle hooks addressed to a single plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hook {
    Install,
    Uninstall,
    UninstallMessage,
    Activate,
    Deactivate,
    Upgrade,
    ConfigForm,
    Config,
    Initialize,
}

impl Hook {
    pub const ALL: [Hook; 9] = [
        Hook::Install,
        Hook::Uninstall,
        Hook::UninstallMessage,
        Hook::Activate,
        Hook::Deactivate,
        Hook::Upgrade,
        Hook::ConfigForm,
        Hook::Config,
        Hook::Initialize,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Hook::Install => "install",
            Hook::Uninstall => "uninstall",
            Hook::UninstallMessage => "uninstall_message",
            Hook::Activate => "activate",
            Hook::Deactivate => "deactivate",
            Hook::Upgrade => "upgrade",
            Hook::ConfigForm => "config_form",
            Hook::Config => "config",
            Hook::Initialize => "initialize",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.as_str() == name)
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broadcast events, keyed by the record kind they concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Tags were added to a record.
    Tag(RecordKind),
    /// Tags were removed from a record.
    Untag(RecordKind),
}

impl Event {
    pub fn name(self) -> &'static str {
        match self {
            Event::Tag(RecordKind::Item) => "tag_item",
            Event::Tag(RecordKind::Collection) => "tag_collection",
            Event::Tag(RecordKind::Exhibit) => "tag_exhibit",
            Event::Untag(RecordKind::Item) => "untag_item",
            Event::Untag(RecordKind::Collection) => "untag_collection",
            Event::Untag(RecordKind::Exhibit) => "untag_exhibit",
        }
    }

    /// Every event the kernel can raise.
    pub fn all() -> impl Iterator<Item = Event> {
        RecordKind::ALL
            .into_iter()
            .flat_map(|kind| [Event::Tag(kind), Event::Untag(kind)])
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::all().find(|e| e.name() == name)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hook and event names a manifest may declare.
pub const KNOWN_HOOKS: &[&str] = &[
    // Lifecycle
    "install",
    "uninstall",
    "uninstall_message",
    "activate",
    "deactivate",
    "upgrade",
    // Configuration
    "config_form",
    "config",
    // Load
    "initialize",
    // Tagging events
    "tag_item",
    "untag_item",
    "tag_collection",
    "untag_collection",
    "tag_exhibit",
    "untag_exhibit",
];

/// Callbacks a plugin module binds while it is being loaded.
pub struct HookBindings {
    plugin: String,
    pub(crate) hooks: HashMap<Hook, HookFn>,
    pub(crate) events: Vec<(Event, HookFn)>,
}

impl HookBindings {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            hooks: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Bind a lifecycle hook. Binding the same hook twice keeps the last callback.
    pub fn on<F>(&mut self, hook: Hook, callback: F) -> &mut Self
    where
        F: Fn(&HookContext) -> Result<HookOutput, HookError> + Send + Sync + 'static,
    {
        self.hooks.insert(hook, Arc::new(callback));
        self
    }

    /// Subscribe to a broadcast event.
    pub fn subscribe<F>(&mut self, event: Event, callback: F) -> &mut Self
    where
        F: Fn(&HookContext) -> Result<HookOutput, HookError> + Send + Sync + 'static,
    {
        self.events.push((event, Arc::new(callback)));
        self
    }

    /// Whether a hook or event of this name has been bound.
    pub fn is_bound(&self, name: &str) -> bool {
        Hook::parse(name).is_some_and(|h| self.hooks.contains_key(&h))
            || self.events.iter().any(|(e, _)| e.name() == name)
    }
}

impl fmt::Debug for HookBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hooks: Vec<_> = self.hooks.keys().map(|h| h.as_str()).collect();
        hooks.sort_unstable();
        f.debug_struct("HookBindings")
            .field("plugin", &self.plugin)
            .field("hooks", &hooks)
            .field(
                "events",
                &self.events.iter().map(|(e, _)| e.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
