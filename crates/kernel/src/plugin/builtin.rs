//! Plugin modules compiled into the kernel binary.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;
use tracing::info;

use super::module::{ModuleCatalog, PluginModule};
use crate::hook::{Event, Hook, HookBindings, HookContext, HookError};
use crate::tagging::RecordKind;

/// Catalog of every built-in plugin module.
pub fn catalog() -> ModuleCatalog {
    ModuleCatalog::new().with(TagAudit::default())
}

/// Logs every tag and untag event.
#[derive(Debug, Default)]
pub struct TagAudit {
    events: Arc<AtomicU64>,
}

impl TagAudit {
    pub const NAME: &'static str = "tag_audit";

    /// Events observed since the module was created.
    pub fn events_seen(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }
}

impl PluginModule for TagAudit {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn register(&self, bindings: &mut HookBindings) -> anyhow::Result<()> {
        bindings
            .on(Hook::Install, |_| {
                info!(plugin = TagAudit::NAME, "tag audit enabled");
                Ok(None)
            })
            .on(Hook::Uninstall, |_| {
                info!(plugin = TagAudit::NAME, "tag audit removed");
                Ok(None)
            })
            .on(Hook::UninstallMessage, |_| {
                Ok(Some(json!("Tag changes will no longer be written to the audit log.")))
            })
            .on(Hook::ConfigForm, |ctx| {
                let kinds = ctx
                    .args
                    .pointer("/options/record_kinds")
                    .and_then(|v| v.as_str())
                    .unwrap_or("item, collection, exhibit");
                Ok(Some(json!(format!("record_kinds = \"{kinds}\""))))
            })
            .on(Hook::Config, configure);

        for event in Event::all() {
            let events = Arc::clone(&self.events);
            bindings.subscribe(event, move |ctx: &HookContext| {
                events.fetch_add(1, Ordering::Relaxed);
                info!(
                    plugin = TagAudit::NAME,
                    event = %event,
                    record_id = ctx.args.get("record_id").and_then(|v| v.as_i64()),
                    tags = ?ctx.arg_strings("tags"),
                    user = ?ctx.user.as_ref().map(|u| u.id),
                    "tag change"
                );
                Ok(None)
            });
        }

        Ok(())
    }
}

/// Accepts `record_kinds`, a comma separated list of record kinds to audit.
fn configure(ctx: &HookContext) -> Result<Option<serde_json::Value>, HookError> {
    let Some(raw) = ctx.args.pointer("/post/record_kinds").and_then(|v| v.as_str()) else {
        return Ok(None);
    };

    let mut kinds = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let kind: RecordKind = token
            .parse()
            .map_err(|_| HookError::validation(format!("'{token}' is not a record kind.")))?;
        kinds.push(kind.as_str());
    }
    if kinds.is_empty() {
        return Err(HookError::validation("Choose at least one record kind."));
    }

    Ok(Some(json!({ "record_kinds": kinds.join(", ") })))
}
