//! Hook system for plugin extension points.
//!
//! Hooks are named extension points a plugin binds when its code is loaded.
//! Lifecycle hooks (`install`, `upgrade`, ...) are addressed to one plugin;
//! events (`tag_item`, `untag_collection`, ...) are broadcast to every
//! subscriber in weight order (lower = called first).

mod broker;
mod context;
mod registry;

pub use broker::{HookBroker, HookFn};
pub use context::{HookContext, HookError, HookOutput, UserContext};
pub use registry::{Event, Hook, HookBindings, KNOWN_HOOKS};
