#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for plugin discovery, listing and the built-in plugins.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test plugin_test
//! ```
//!
//! ## Test Coverage
//!
//! - Manifest discovery and validation from a plugins directory
//! - Grouped listing (active / inactive / not installed / attention / new)
//! - The shipped `tag_audit` plugin end to end

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use vitrine_kernel::hook::Hook;
use vitrine_kernel::plugin::{
    PluginError, PluginOptions, UninstallOutcome, browse, builtin, cli::NoticeLevel,
};
use vitrine_kernel::tagging::{RecordKind, RecordRef};
use vitrine_test_utils::{
    CallLog, RecordingModule, TestKernel, TestManifest, TestPluginDir, test_user,
};

/// The plugins directory shipped with the repository.
fn shipped_plugins_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../plugins")
}

#[tokio::test]
async fn discovers_valid_manifests_only() {
    let dir = TestPluginDir::new().expect("tempdir");
    dir.add(&TestManifest::new("coins", "1.0")).unwrap();
    dir.write_manifest("broken", "name = \"broken\"\nversion = ").unwrap();
    dir.write_manifest("renamed", "name = \"other\"\nversion = \"1.0\"\n").unwrap();
    std::fs::create_dir_all(dir.path().join("empty")).unwrap();
    let kernel = TestKernel::new(dir.path(), Vec::new());

    let plugins = kernel.kernel.loader().get_plugins().await.unwrap();
    assert_eq!(plugins.keys().collect::<Vec<_>>(), vec!["coins"]);

    let err = kernel.kernel.loader().get_plugin("broken").await.unwrap_err();
    assert!(matches!(err, PluginError::InvalidManifest { .. }));
    let err = kernel.kernel.loader().get_plugin("empty").await.unwrap_err();
    assert!(matches!(err, PluginError::NotFound { .. }));
}

#[tokio::test]
async fn browse_groups_plugins() {
    let dir = TestPluginDir::new().expect("tempdir");
    let log: CallLog = Arc::default();
    let manifests = [
        TestManifest::new("Coins", "1.0"),
        TestManifest::new("maps", "1.0"),
        TestManifest::new("exhibits", "1.0").requires(&["maps"]),
        TestManifest::new("future", "1.0").minimum_kernel_version("99"),
        TestManifest::new("fresh", "1.0"),
    ];
    let mut modules = Vec::new();
    for manifest in &manifests {
        dir.add(manifest).unwrap();
        modules.push(RecordingModule::new(&manifest.name, &[Hook::Install], &log));
    }
    let kernel = TestKernel::new(dir.path(), modules);
    let plugins = kernel.kernel.plugins();

    plugins.install("Coins").await.unwrap();
    plugins.install("maps").await.unwrap();
    kernel.kernel.loader().load("maps", true).await.unwrap();
    plugins.install("exhibits").await.unwrap();
    plugins.deactivate("maps").await.unwrap();

    let listing = browse(kernel.kernel.loader(), Utc::now()).await.unwrap();
    let names = |list: &[vitrine_kernel::plugin::Plugin]| {
        list.iter().map(|p| p.name.clone()).collect::<Vec<_>>()
    };
    assert_eq!(names(&listing.active), vec!["Coins", "exhibits"]);
    assert_eq!(names(&listing.inactive), vec!["maps"]);
    assert_eq!(names(&listing.uninstalled), vec!["fresh", "future"]);
    assert_eq!(names(&listing.needs_attention), vec!["exhibits", "future"]);
    // Every file was just written, so anything installable is new
    assert_eq!(names(&listing.new), vec!["fresh"]);
    assert_eq!(listing.total(), 5);
}

#[tokio::test]
async fn plugin_removed_from_disk_is_still_listed() {
    let dir = TestPluginDir::new().expect("tempdir");
    let log: CallLog = Arc::default();
    dir.add(&TestManifest::new("coins", "1.0")).unwrap();
    let kernel = TestKernel::new(
        dir.path(),
        vec![RecordingModule::new("coins", &[Hook::Install], &log)],
    );
    kernel.kernel.plugins().install("coins").await.unwrap();
    dir.remove("coins").unwrap();

    let plugin = kernel.kernel.loader().get_plugin("coins").await.unwrap();
    assert!(plugin.is_installed());
    assert!(!plugin.has_files());
    assert!(!kernel.kernel.loader().load("coins", false).await.unwrap());

    let listing = browse(kernel.kernel.loader(), Utc::now()).await.unwrap();
    assert_eq!(listing.active.len(), 1);
}

#[tokio::test]
async fn tag_audit_lifecycle() {
    let kernel = TestKernel::with_catalog(&shipped_plugins_dir(), builtin::catalog());
    let plugins = kernel.kernel.plugins();

    let notice = vitrine_kernel::plugin::cli::cmd_plugin_install(plugins, "tag_audit").await;
    assert_eq!(notice.level, NoticeLevel::Success, "{notice}");
    assert_eq!(notice.message, "The Tag Audit plugin was successfully installed!");
    assert!(kernel.kernel.loader().is_loaded("tag_audit"));

    let item = RecordRef::new(RecordKind::Item, 1);
    kernel
        .kernel
        .tagging()
        .apply_tag_string(&item, "maps", &test_user(), false)
        .await
        .unwrap();

    let form = plugins.config_form("tag_audit").await.unwrap();
    assert_eq!(form.as_deref(), Some("record_kinds = \"item, collection, exhibit\""));

    let mut submission = PluginOptions::new();
    submission.insert("record_kinds".into(), "exhibit, item".into());
    let stored = plugins.configure("tag_audit", &submission).await.unwrap();
    assert_eq!(stored["record_kinds"], "exhibit, item");
    let form = plugins.config_form("tag_audit").await.unwrap();
    assert_eq!(form.as_deref(), Some("record_kinds = \"exhibit, item\""));

    submission.insert("record_kinds".into(), "page".into());
    let notice =
        vitrine_kernel::plugin::cli::cmd_plugin_configure(plugins, "tag_audit", &submission).await;
    assert!(notice.is_error());
    assert_eq!(notice.message, "'page' is not a record kind.");

    let outcome = plugins.uninstall("tag_audit", false).await.unwrap();
    assert!(matches!(
        outcome,
        UninstallOutcome::NeedsConfirmation { message: Some(_) }
    ));
    let outcome = plugins.uninstall("tag_audit", true).await.unwrap();
    assert_eq!(outcome, UninstallOutcome::Uninstalled);
    assert!(!kernel.kernel.broker().is_bound("tag_audit"));
}
