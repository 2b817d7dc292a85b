//! Per-invocation context handed to hook callbacks.
//!
//! Each hook call gets a fresh `HookContext` carrying the target plugin,
//! a JSON argument payload, and the acting user when there is one.

use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

/// What a hook callback may hand back: nothing, or a JSON value the caller
/// interprets (uninstall message text, config form markup, option maps).
pub type HookOutput = Option<JsonValue>;

/// Failure raised by a hook implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HookError {
    /// The hook ran and failed.
    #[error("{0}")]
    Failed(String),

    /// The hook rejected the input it was given (configuration forms).
    #[error("{0}")]
    Validation(String),
}

impl HookError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// The user on whose behalf a hook runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    /// User ID (Uuid::nil() for anonymous).
    pub id: Uuid,
    /// Whether the user is authenticated.
    pub authenticated: bool,
    /// Cached permissions for the user.
    pub permissions: Vec<String>,
}

impl UserContext {
    /// Create context for anonymous user.
    pub fn anonymous() -> Self {
        Self {
            id: Uuid::nil(),
            authenticated: false,
            permissions: Vec::new(),
        }
    }

    /// Create context for authenticated user.
    pub fn authenticated(id: Uuid, permissions: Vec<String>) -> Self {
        Self {
            id,
            authenticated: true,
            permissions,
        }
    }

    /// Check if user has a specific permission.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Context passed to a single hook invocation.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Plugin whose callback is being invoked.
    pub plugin: String,
    /// Hook arguments.
    pub args: JsonValue,
    /// Acting user, when the hook is triggered by one.
    pub user: Option<UserContext>,
}

impl HookContext {
    pub fn new(plugin: impl Into<String>, args: JsonValue) -> Self {
        Self {
            plugin: plugin.into(),
            args,
            user: None,
        }
    }

    /// Context with no arguments.
    pub fn empty(plugin: impl Into<String>) -> Self {
        Self::new(plugin, JsonValue::Null)
    }

    pub fn with_user(mut self, user: UserContext) -> Self {
        self.user = Some(user);
        self
    }

    /// Re-address the same payload to another plugin (event fan-out).
    pub(crate) fn for_plugin(&self, plugin: &str) -> Self {
        Self {
            plugin: plugin.to_string(),
            args: self.args.clone(),
            user: self.user.clone(),
        }
    }

    /// Get a string argument.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(JsonValue::as_str)
    }

    /// Get a list-of-strings argument; non-string entries are skipped.
    pub fn arg_strings(&self, key: &str) -> Vec<String> {
        self.args
            .get(key)
            .and_then(JsonValue::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn anonymous_user_context() {
        let ctx = UserContext::anonymous();
        assert_eq!(ctx.id, Uuid::nil());
        assert!(!ctx.authenticated);
        assert!(!ctx.has_permission("admin"));
    }

    #[test]
    fn authenticated_user_context() {
        let id = Uuid::now_v7();
        let ctx = UserContext::authenticated(id, vec!["tag records".to_string()]);
        assert_eq!(ctx.id, id);
        assert!(ctx.authenticated);
        assert!(ctx.has_permission("tag records"));
        assert!(!ctx.has_permission("delete"));
    }

    #[test]
    fn context_arguments() {
        let ctx = HookContext::new(
            "geolocation",
            json!({"old_version": "1.0", "tags": ["a", 3, "b"]}),
        );
        assert_eq!(ctx.arg_str("old_version"), Some("1.0"));
        assert_eq!(ctx.arg_str("missing"), None);
        assert_eq!(ctx.arg_strings("tags"), vec!["a", "b"]);
        assert!(ctx.arg_strings("old_version").is_empty());
    }

    #[test]
    fn readdressed_context_keeps_payload() {
        let user = UserContext::authenticated(Uuid::now_v7(), vec![]);
        let ctx = HookContext::new("kernel", json!({"k": "v"})).with_user(user.clone());
        let copy = ctx.for_plugin("audit");
        assert_eq!(copy.plugin, "audit");
        assert_eq!(copy.arg_str("k"), Some("v"));
        assert_eq!(copy.user, Some(user));
    }
}
