//! Plugin system error types with clear, actionable messages.
//!
//! All errors include the plugin name and relevant context to help
//! administrators quickly identify and fix issues.

use thiserror::Error;

use crate::hook::{Hook, HookError};

/// How an error should be surfaced to the person who triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Nothing went wrong; the request was already satisfied.
    Notice,
    /// A lifecycle precondition or hook failed.
    Installer,
    /// Plugin code could not be mapped into the process.
    Loader,
    /// A configuration hook rejected submitted input.
    Validation,
    /// The persistence layer failed.
    Storage,
}

/// Errors raised by the plugin registry, loader, and lifecycle manager.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Neither a plugin directory nor an installed record exists.
    #[error("plugin '{plugin}' was not found in the plugins directory")]
    NotFound { plugin: String },

    /// The requested transition is already satisfied.
    #[error("plugin '{plugin}' is already {state}")]
    AlreadyInState { plugin: String, state: &'static str },

    /// The transition requires an installed plugin.
    #[error("plugin '{plugin}' is not installed")]
    NotInstalled { plugin: String },

    /// Required plugins are missing, not installed, inactive, or not loaded.
    #[error(
        "plugin '{plugin}' cannot be {action} because it requires other plugins to be installed, activated, and loaded: {}",
        .missing.join(", ")
    )]
    DependencyUnmet {
        plugin: String,
        action: &'static str,
        missing: Vec<String>,
    },

    /// A lifecycle hook failed or a lifecycle precondition was violated.
    #[error("plugin '{plugin}': {message}")]
    Installer { plugin: String, message: String },

    /// The plugin's code could not be loaded.
    #[error("plugin '{plugin}' could not be loaded: {message}")]
    Loader { plugin: String, message: String },

    /// A configuration hook rejected the submitted values.
    #[error("plugin '{plugin}': {message}")]
    Validation { plugin: String, message: String },

    /// Another writer changed the plugin record between check and update.
    #[error("plugin '{plugin}' was changed by another request; reload and try again")]
    Conflict { plugin: String },

    /// The plugin manifest could not be parsed.
    #[error("plugin '{plugin}': failed to parse manifest: {details}")]
    InvalidManifest { plugin: String, details: String },

    /// The persistence layer failed.
    #[error("plugin storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl PluginError {
    pub fn not_found(plugin: impl Into<String>) -> Self {
        Self::NotFound {
            plugin: plugin.into(),
        }
    }

    pub fn not_installed(plugin: impl Into<String>) -> Self {
        Self::NotInstalled {
            plugin: plugin.into(),
        }
    }

    pub fn conflict(plugin: impl Into<String>) -> Self {
        Self::Conflict {
            plugin: plugin.into(),
        }
    }

    pub fn installer(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Installer {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    pub fn loader(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Loader {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Wrap a failure raised by one of the plugin's hooks.
    pub fn from_hook(plugin: impl Into<String>, hook: Hook, err: HookError) -> Self {
        let plugin = plugin.into();
        match err {
            HookError::Validation(message) => Self::Validation { plugin, message },
            HookError::Failed(message) => Self::Installer {
                plugin,
                message: format!("the {hook} hook failed: {message}"),
            },
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AlreadyInState { .. } => ErrorCategory::Notice,
            Self::NotFound { .. }
            | Self::NotInstalled { .. }
            | Self::DependencyUnmet { .. }
            | Self::Installer { .. }
            | Self::Conflict { .. } => ErrorCategory::Installer,
            Self::Loader { .. } | Self::InvalidManifest { .. } => ErrorCategory::Loader,
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Storage(_) => ErrorCategory::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_error_names_every_dependency() {
        let err = PluginError::DependencyUnmet {
            plugin: "exhibit_builder".to_string(),
            action: "activated",
            missing: vec!["geolocation (inactive)".to_string(), "maps (missing)".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("exhibit_builder"));
        assert!(msg.contains("cannot be activated"));
        assert!(msg.contains("geolocation (inactive), maps (missing)"));
        assert_eq!(err.category(), ErrorCategory::Installer);
    }

    #[test]
    fn hook_failures_keep_cause() {
        let err = PluginError::from_hook("coins", Hook::Upgrade, HookError::failed("table locked"));
        assert_eq!(err.to_string(), "plugin 'coins': the upgrade hook failed: table locked");
        assert_eq!(err.category(), ErrorCategory::Installer);
    }

    #[test]
    fn validation_failures_are_their_own_category() {
        let err = PluginError::from_hook("coins", Hook::Config, HookError::validation("bad url"));
        assert_eq!(err.to_string(), "plugin 'coins': bad url");
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn loader_and_installer_are_distinct() {
        let load = PluginError::loader("coins", "no plugin code is registered");
        assert_eq!(load.category(), ErrorCategory::Loader);
        assert!(load.to_string().contains("could not be loaded"));

        let already = PluginError::AlreadyInState {
            plugin: "coins".to_string(),
            state: "installed",
        };
        assert_eq!(already.category(), ErrorCategory::Notice);
        assert_eq!(already.to_string(), "plugin 'coins' is already installed");
    }
}
