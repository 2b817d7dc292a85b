//! Command implementations for plugin management.
//!
//! Each command runs one lifecycle transition and reports exactly one
//! [`Notice`] describing the outcome, whether it succeeded or not.

use std::fmt;

use anyhow::Result;

use super::browse::browse;
use super::error::{ErrorCategory, PluginError};
use super::lifecycle::{LifecycleManager, UninstallOutcome, UpgradeOutcome};
use super::loader::PluginLoader;
use super::status::PluginOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Notice,
    Error,
}

impl NoticeLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Notice => "notice",
            Self::Error => "error",
        }
    }
}

/// One human-readable outcome message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Notice,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level.as_str(), self.message)
    }
}

fn failure(action: &str, name: &str, err: &PluginError) -> Notice {
    match (err.category(), err) {
        (ErrorCategory::Notice, _) => Notice::notice(err.to_string()),
        (_, PluginError::Validation { message, .. }) => Notice::error(message.clone()),
        (_, PluginError::NotFound { .. }) => {
            Notice::error(format!("The plugin {name} must be installed."))
        }
        _ => Notice::error(format!(
            "The following error occurred while {action} the {name} plugin: {err}"
        )),
    }
}

async fn display_name(loader: &PluginLoader, name: &str) -> String {
    loader
        .get_plugin(name)
        .await
        .map(|p| p.display_name().to_string())
        .unwrap_or_else(|_| name.to_string())
}

pub async fn cmd_plugin_install(manager: &LifecycleManager, name: &str) -> Notice {
    let display = display_name(manager.loader(), name).await;
    match manager.install(name).await {
        Ok(_) => match manager.loader().load(name, true).await {
            Ok(_) => Notice::success(format!("The {display} plugin was successfully installed!")),
            Err(e) => Notice::error(format!(
                "The {display} plugin was installed, but could not be loaded: {e}"
            )),
        },
        Err(PluginError::AlreadyInState { .. }) => {
            Notice::notice(format!("The {display} plugin has already been installed."))
        }
        Err(e) => failure("installing", name, &e),
    }
}

pub async fn cmd_plugin_activate(manager: &LifecycleManager, name: &str) -> Notice {
    if let Err(e) = manager.activate(name).await {
        return failure("activating", name, &e);
    }
    match manager.loader().load(name, true).await {
        Ok(_) => Notice::success(format!("The {name} plugin was successfully activated!")),
        Err(e) => Notice::error(format!(
            "The {name} plugin was activated, but could not be loaded: {e}"
        )),
    }
}

pub async fn cmd_plugin_deactivate(manager: &LifecycleManager, name: &str) -> Notice {
    match manager.deactivate(name).await {
        Ok(true) => Notice::success(format!("The {name} plugin was successfully deactivated!")),
        Ok(false) => Notice::notice(format!("The {name} plugin is already inactive.")),
        Err(e) => failure("deactivating", name, &e),
    }
}

pub async fn cmd_plugin_upgrade(manager: &LifecycleManager, name: &str) -> Notice {
    match manager.upgrade(name).await {
        Ok(UpgradeOutcome::UpToDate { version }) => Notice::notice(format!(
            "The {name} plugin is already up to date (version {version})."
        )),
        Ok(UpgradeOutcome::Upgraded { from, to }) => {
            match manager.loader().load(name, false).await {
                Ok(_) => Notice::success(format!(
                    "The {name} plugin was successfully upgraded! ({from} -> {to})"
                )),
                Err(e) => Notice::error(format!(
                    "The {name} plugin was upgraded, but could not be loaded: {e}"
                )),
            }
        }
        Err(e) => failure("upgrading", name, &e),
    }
}

pub async fn cmd_plugin_uninstall(manager: &LifecycleManager, name: &str, confirm: bool) -> Notice {
    match manager.uninstall(name, confirm).await {
        Ok(UninstallOutcome::Uninstalled) => {
            Notice::success(format!("The {name} plugin was successfully uninstalled!"))
        }
        Ok(UninstallOutcome::NeedsConfirmation { message }) => {
            let mut text = String::from("You must confirm the uninstall before proceeding.");
            if let Some(message) = message {
                text.push(' ');
                text.push_str(&message);
            }
            Notice::notice(text)
        }
        Err(e) => failure("uninstalling", name, &e),
    }
}

pub async fn cmd_plugin_configure(
    manager: &LifecycleManager,
    name: &str,
    submission: &PluginOptions,
) -> Notice {
    let display = display_name(manager.loader(), name).await;
    match manager.configure(name, submission).await {
        Ok(_) => Notice::success(format!("The {display} plugin was successfully configured!")),
        Err(e) => failure("configuring", name, &e),
    }
}

/// Print every plugin grouped by status.
pub async fn cmd_plugin_list(loader: &PluginLoader) -> Result<()> {
    let listing = browse(loader, chrono::Utc::now()).await?;

    if listing.total() == 0 {
        println!("No plugins found.");
        return Ok(());
    }

    println!(
        "{:<20} {:<12} {:<12} {:<14} {:<8}",
        "PLUGIN", "INSTALLED", "AVAILABLE", "STATUS", "LOADED"
    );
    println!("{}", "-".repeat(70));

    let groups = [
        ("active", &listing.active),
        ("inactive", &listing.inactive),
        ("not installed", &listing.uninstalled),
    ];
    for (status, plugins) in groups {
        for plugin in plugins {
            println!(
                "{:<20} {:<12} {:<12} {:<14} {}",
                plugin.name,
                plugin.installed_version().unwrap_or("-"),
                plugin.available_version().unwrap_or("(not on disk)"),
                status,
                if plugin.loaded { "yes" } else { "no" }
            );
        }
    }

    if !listing.needs_attention.is_empty() {
        let names: Vec<_> = listing.needs_attention.iter().map(|p| p.name.as_str()).collect();
        println!("\nNeeds attention: {}", names.join(", "));
    }
    if !listing.new.is_empty() {
        let names: Vec<_> = listing.new.iter().map(|p| p.name.as_str()).collect();
        println!("New: {}", names.join(", "));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_messages_by_category() {
        let err = PluginError::installer("coins", "the install hook failed: boom");
        let notice = failure("installing", "coins", &err);
        assert!(notice.is_error());
        assert_eq!(
            notice.message,
            "The following error occurred while installing the coins plugin: \
             plugin 'coins': the install hook failed: boom"
        );

        let invalid = PluginError::Validation {
            plugin: "coins".into(),
            message: "Per page must be a number.".into(),
        };
        assert_eq!(
            failure("configuring", "coins", &invalid).message,
            "Per page must be a number."
        );

        let missing = PluginError::not_found("ghost");
        assert_eq!(
            failure("activating", "ghost", &missing).message,
            "The plugin ghost must be installed."
        );

        let already = PluginError::AlreadyInState {
            plugin: "coins".into(),
            state: "active",
        };
        assert_eq!(failure("activating", "coins", &already).level, NoticeLevel::Notice);
    }

    #[test]
    fn notice_display() {
        assert_eq!(Notice::success("done").to_string(), "[success] done");
    }
}
