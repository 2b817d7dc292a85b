//! Hook broker - routes lifecycle hooks and dispatches events.
//!
//! Lifecycle hooks are looked up by (plugin, hook) and their errors are
//! returned to the caller. Events fan out to every subscriber in weight
//! order; a failing subscriber is logged and skipped so the others still run.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error};

use super::context::{HookContext, HookError, HookOutput};
use super::registry::{Event, Hook, HookBindings};

/// A bound hook callback.
pub type HookFn = Arc<dyn Fn(&HookContext) -> Result<HookOutput, HookError> + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    plugin: String,
    weight: i32,
    callback: HookFn,
}

/// Process-wide registry of bound hooks.
#[derive(Default)]
pub struct HookBroker {
    hooks: RwLock<HashMap<(String, Hook), HookFn>>,
    subscribers: RwLock<HashMap<Event, Vec<Subscriber>>>,
}

impl HookBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install everything a plugin bound while loading.
    ///
    /// Replaces any earlier bindings for the same plugin, so binding is safe
    /// to repeat.
    pub fn bind(&self, bindings: HookBindings, weight: i32) {
        let plugin = bindings.plugin().to_string();
        self.unbind(&plugin);

        {
            let mut hooks = self.hooks.write();
            for (hook, callback) in bindings.hooks {
                hooks.insert((plugin.clone(), hook), callback);
            }
        }

        let mut subscribers = self.subscribers.write();
        for (event, callback) in bindings.events {
            let list = subscribers.entry(event).or_default();
            list.push(Subscriber {
                plugin: plugin.clone(),
                weight,
                callback,
            });
            // Stable sort keeps bind order among equal weights
            list.sort_by_key(|s| s.weight);
        }

        debug!(plugin = %plugin, weight, "bound plugin hooks");
    }

    /// Drop every hook and subscription belonging to a plugin.
    pub fn unbind(&self, plugin: &str) {
        self.hooks.write().retain(|(owner, _), _| owner != plugin);
        let mut subscribers = self.subscribers.write();
        for list in subscribers.values_mut() {
            list.retain(|s| s.plugin != plugin);
        }
        subscribers.retain(|_, list| !list.is_empty());
    }

    /// Check whether a plugin has bound a lifecycle hook.
    pub fn get_hook(&self, plugin: &str, hook: Hook) -> bool {
        self.hooks.read().contains_key(&(plugin.to_string(), hook))
    }

    /// Call one plugin's lifecycle hook.
    ///
    /// A hook the plugin never bound is a no-op returning `Ok(None)`.
    pub fn call_hook(&self, plugin: &str, hook: Hook, ctx: &HookContext) -> Result<HookOutput, HookError> {
        let callback = self.hooks.read().get(&(plugin.to_string(), hook)).cloned();
        let Some(callback) = callback else {
            debug!(plugin = %plugin, hook = %hook, "hook not bound, skipping");
            return Ok(None);
        };

        debug!(plugin = %plugin, hook = %hook, "calling hook");
        callback(ctx)
    }

    /// Dispatch an event to all subscribers in weight order.
    ///
    /// Returns the names of the plugins whose callbacks succeeded.
    pub fn dispatch(&self, event: Event, ctx: &HookContext) -> Vec<String> {
        let subscribers = self
            .subscribers
            .read()
            .get(&event)
            .cloned()
            .unwrap_or_default();

        if subscribers.is_empty() {
            debug!(event = %event, "no subscribers for event");
            return Vec::new();
        }

        let mut delivered = Vec::with_capacity(subscribers.len());
        for subscriber in &subscribers {
            let scoped = ctx.for_plugin(&subscriber.plugin);
            match (subscriber.callback)(&scoped) {
                Ok(_) => delivered.push(subscriber.plugin.clone()),
                Err(e) => {
                    error!(
                        plugin = %subscriber.plugin,
                        event = %event,
                        error = %e,
                        "event subscriber failed"
                    );
                }
            }
        }

        debug!(
            event = %event,
            subscribers = subscribers.len(),
            delivered = delivered.len(),
            "dispatch complete"
        );

        delivered
    }

    /// Number of subscribers for an event.
    pub fn subscriber_count(&self, event: Event) -> usize {
        self.subscribers.read().get(&event).map_or(0, Vec::len)
    }

    /// Whether any hook or subscription is bound for a plugin.
    pub fn is_bound(&self, plugin: &str) -> bool {
        self.hooks.read().keys().any(|(owner, _)| owner == plugin)
            || self
                .subscribers
                .read()
                .values()
                .any(|list| list.iter().any(|s| s.plugin == plugin))
    }
}

impl std::fmt::Debug for HookBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookBroker")
            .field("hooks", &self.hooks.read().len())
            .field("events", &self.subscribers.read().len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tagging::RecordKind;
    use parking_lot::Mutex;
    use serde_json::json;

    fn bind_recorder(broker: &HookBroker, plugin: &str, weight: i32, log: Arc<Mutex<Vec<String>>>) {
        let mut bindings = HookBindings::new(plugin);
        let name = plugin.to_string();
        bindings.subscribe(Event::Tag(RecordKind::Item), move |ctx| {
            assert_eq!(ctx.plugin, name);
            log.lock().push(name.clone());
            Ok(None)
        });
        broker.bind(bindings, weight);
    }

    #[test]
    fn call_unbound_hook_is_noop() {
        let broker = HookBroker::new();
        let out = broker
            .call_hook("missing", Hook::Install, &HookContext::empty("missing"))
            .unwrap();
        assert!(out.is_none());
        assert!(!broker.get_hook("missing", Hook::Install));
    }

    #[test]
    fn call_hook_returns_output_and_errors() {
        let broker = HookBroker::new();
        let mut bindings = HookBindings::new("simple_pages");
        bindings
            .on(Hook::UninstallMessage, |_| Ok(Some(json!("pages will be lost"))))
            .on(Hook::Config, |ctx| match ctx.arg_str("per_page") {
                Some(_) => Ok(None),
                None => Err(HookError::validation("per_page is required")),
            });
        broker.bind(bindings, 0);

        let ctx = HookContext::empty("simple_pages");
        assert_eq!(
            broker.call_hook("simple_pages", Hook::UninstallMessage, &ctx).unwrap(),
            Some(json!("pages will be lost"))
        );
        assert_eq!(
            broker.call_hook("simple_pages", Hook::Config, &ctx),
            Err(HookError::validation("per_page is required"))
        );
    }

    #[test]
    fn dispatch_in_weight_order() {
        let broker = HookBroker::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bind_recorder(&broker, "late", 10, log.clone());
        bind_recorder(&broker, "early", -5, log.clone());
        bind_recorder(&broker, "middle", 0, log.clone());

        let delivered = broker.dispatch(
            Event::Tag(RecordKind::Item),
            &HookContext::new("kernel", json!({})),
        );

        assert_eq!(delivered, vec!["early", "middle", "late"]);
        assert_eq!(*log.lock(), vec!["early", "middle", "late"]);
    }

    #[test]
    fn failing_subscriber_does_not_stop_dispatch() {
        let broker = HookBroker::new();
        let mut bad = HookBindings::new("bad");
        bad.subscribe(Event::Untag(RecordKind::Collection), |_| {
            Err(HookError::failed("boom"))
        });
        broker.bind(bad, 0);
        let mut good = HookBindings::new("good");
        good.subscribe(Event::Untag(RecordKind::Collection), |_| Ok(None));
        broker.bind(good, 1);

        let delivered = broker.dispatch(
            Event::Untag(RecordKind::Collection),
            &HookContext::empty("kernel"),
        );
        assert_eq!(delivered, vec!["good"]);
    }

    #[test]
    fn events_are_scoped_by_record_kind() {
        let broker = HookBroker::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bind_recorder(&broker, "items_only", 0, log.clone());

        let delivered = broker.dispatch(
            Event::Tag(RecordKind::Exhibit),
            &HookContext::empty("kernel"),
        );
        assert!(delivered.is_empty());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn rebind_replaces_and_unbind_removes() {
        let broker = HookBroker::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bind_recorder(&broker, "audit", 0, log.clone());
        bind_recorder(&broker, "audit", 0, log.clone());
        assert_eq!(broker.subscriber_count(Event::Tag(RecordKind::Item)), 1);
        assert!(broker.is_bound("audit"));

        broker.unbind("audit");
        assert_eq!(broker.subscriber_count(Event::Tag(RecordKind::Item)), 0);
        assert!(!broker.is_bound("audit"));
    }
}
