#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the tagging engine.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test tagging_test
//! ```
//!
//! ## Test Coverage
//!
//! - Tag string reconciliation for one user and for all owners
//! - Events raised to loaded plugins, by record kind
//! - Concurrent creation of the same tag
//! - Identity preconditions

use std::sync::Arc;

use parking_lot::Mutex;
use vitrine_kernel::hook::{Event, Hook, UserContext};
use vitrine_kernel::tagging::{
    Identity, RecordKind, RecordRef, TagStore, Taggable, TaggingEngine, TaggingError,
};
use vitrine_test_utils::{
    CallLog, RecordingModule, TestKernel, TestManifest, TestPluginDir, calls_to, test_user,
};

/// A kernel with a loaded `audit` plugin subscribed to every tag event.
async fn audited_kernel() -> (TestPluginDir, TestKernel, CallLog, RecordingModule) {
    let dir = TestPluginDir::new().expect("tempdir");
    dir.add(&TestManifest::new("audit", "1.0")).expect("write manifest");
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let events: Vec<Event> = Event::all().collect();
    let module = RecordingModule::new("audit", &[Hook::Install], &log).with_events(&events);
    let kernel = TestKernel::new(dir.path(), vec![module.clone()]);

    kernel.kernel.plugins().install("audit").await.expect("install");
    assert!(kernel.kernel.loader().load("audit", true).await.expect("load"));
    log.lock().clear();
    (dir, kernel, log, module)
}

fn names(tags: Vec<vitrine_kernel::tagging::Tag>) -> Vec<String> {
    tags.into_iter().map(|t| t.name).collect()
}

/// A record type defined outside the kernel.
struct Exhibit {
    id: Option<i64>,
}

impl Taggable for Exhibit {
    fn record_kind(&self) -> RecordKind {
        RecordKind::Exhibit
    }

    fn record_id(&self) -> Option<i64> {
        self.id
    }
}

#[tokio::test]
async fn apply_new_tags_raises_one_tag_event() {
    let (_dir, kernel, log, module) = audited_kernel().await;
    let tagging = kernel.kernel.tagging();
    let item = RecordRef::new(RecordKind::Item, 42);
    let user = test_user();

    let diff = tagging.apply_tag_string(&item, "x, y", &user, false).await.unwrap();
    assert_eq!(diff.added, vec!["x", "y"]);
    assert!(diff.removed.is_empty());

    assert_eq!(kernel.tag_store.tag_count(), 2);
    assert_eq!(kernel.tag_store.tagging_count(), 2);
    assert_eq!(calls_to(&log, "tag_item"), vec!["audit"]);
    assert!(calls_to(&log, "untag_item").is_empty());

    let (_, args) = module
        .payloads()
        .into_iter()
        .find(|(name, _)| name == "tag_item")
        .expect("tag_item payload");
    assert_eq!(args["record_id"], 42);
    assert_eq!(args["tags"], serde_json::json!(["x", "y"]));
}

#[tokio::test]
async fn apply_replaces_removed_tags() {
    let (_dir, kernel, log, _) = audited_kernel().await;
    let tagging = kernel.kernel.tagging();
    let item = RecordRef::new(RecordKind::Item, 1);
    let user = test_user();

    tagging.apply_tag_string(&item, "a, b", &user, false).await.unwrap();
    log.lock().clear();

    let diff = tagging.apply_tag_string(&item, "b, c", &user, false).await.unwrap();
    assert_eq!(diff.added, vec!["c"]);
    assert_eq!(diff.removed, vec!["a"]);
    assert_eq!(tagging.tag_string(&item).await.unwrap(), "b, c");
    assert_eq!(calls_to(&log, "untag_item"), vec!["audit"]);
    assert_eq!(calls_to(&log, "tag_item"), vec!["audit"]);

    // Removing a tagging never deletes the tag itself
    assert_eq!(kernel.tag_store.tag_count(), 3);
    assert!(kernel.tag_store.find_tag("a").await.unwrap().is_some());

    log.lock().clear();
    let diff = tagging.apply_tag_string(&item, "", &user, false).await.unwrap();
    assert_eq!(diff.removed, vec!["b", "c"]);
    assert!(tagging.tags(&item).await.unwrap().is_empty());
    assert!(calls_to(&log, "tag_item").is_empty());
}

#[tokio::test]
async fn own_tags_leave_other_users_alone() {
    let (_dir, kernel, _log, _) = audited_kernel().await;
    let tagging = kernel.kernel.tagging();
    let item = RecordRef::new(RecordKind::Item, 7);
    let alice = test_user();
    let bob = test_user();

    tagging.apply_tag_string(&item, "maps, letters", &alice, false).await.unwrap();
    tagging.apply_tag_string(&item, "maps", &bob, false).await.unwrap();

    // Bob only compares against his own tags
    let diff = tagging.apply_tag_string(&item, "", &bob, false).await.unwrap();
    assert_eq!(diff.removed, vec!["maps"]);
    assert!(tagging.has_tag("maps", Some(alice.id), &item).await.unwrap());
    assert!(!tagging.has_tag("maps", Some(bob.id), &item).await.unwrap());
    assert!(tagging.has_tag("maps", None, &item).await.unwrap());

    assert_eq!(names(tagging.user_tags(&item, &alice).await.unwrap()), vec!["letters", "maps"]);
    assert!(tagging.user_tags(&item, &bob).await.unwrap().is_empty());
}

#[tokio::test]
async fn all_owners_compares_and_removes_everyones_tags() {
    let (_dir, kernel, _log, _) = audited_kernel().await;
    let tagging = kernel.kernel.tagging();
    let item = RecordRef::new(RecordKind::Item, 9);
    let alice = test_user();
    let admin = test_user();

    tagging.apply_tag_string(&item, "maps, letters", &alice, false).await.unwrap();

    let diff = tagging.apply_tag_string(&item, "maps, 1862", &admin, true).await.unwrap();
    assert_eq!(diff.added, vec!["1862"]);
    assert_eq!(diff.removed, vec!["letters"]);

    assert!(!tagging.has_tag("letters", None, &item).await.unwrap());
    // maps was already present, so the admin did not get a tagging of it
    assert!(tagging.has_tag("maps", Some(alice.id), &item).await.unwrap());
    assert!(!tagging.has_tag("maps", Some(admin.id), &item).await.unwrap());
    assert!(tagging.has_tag("1862", Some(admin.id), &item).await.unwrap());
    assert_eq!(tagging.tag_string(&item).await.unwrap(), "1862, maps");
}

#[tokio::test]
async fn events_are_specific_to_record_kind() {
    let (_dir, kernel, log, _) = audited_kernel().await;
    let tagging = kernel.kernel.tagging();
    let user = test_user();

    let collection = RecordRef::new(RecordKind::Collection, 3);
    tagging.apply_tag_string(&collection, "letters", &user, false).await.unwrap();
    tagging.apply_tag_string(&Exhibit { id: Some(5) }, "war", &user, false).await.unwrap();
    tagging.apply_tag_string(&collection, "", &user, false).await.unwrap();

    assert_eq!(calls_to(&log, "tag_collection"), vec!["audit"]);
    assert_eq!(calls_to(&log, "untag_collection"), vec!["audit"]);
    assert_eq!(calls_to(&log, "tag_exhibit"), vec!["audit"]);
    assert!(calls_to(&log, "tag_item").is_empty());
}

#[tokio::test]
async fn unloaded_plugins_do_not_receive_events() {
    let (_dir, kernel, log, _) = audited_kernel().await;
    kernel.kernel.plugins().deactivate("audit").await.expect("deactivate");

    let item = RecordRef::new(RecordKind::Item, 1);
    kernel
        .kernel
        .tagging()
        .apply_tag_string(&item, "quiet", &test_user(), false)
        .await
        .unwrap();
    assert!(calls_to(&log, "tag_item").is_empty());
}

#[tokio::test]
async fn tag_text_is_shared_across_records() {
    let (_dir, kernel, _log, _) = audited_kernel().await;
    let tagging = kernel.kernel.tagging();
    let user = test_user();

    tagging
        .apply_tag_string(&RecordRef::new(RecordKind::Item, 1), " vintage ", &user, false)
        .await
        .unwrap();
    tagging
        .apply_tag_string(&Exhibit { id: Some(1) }, "vintage,Vintage", &user, false)
        .await
        .unwrap();

    // Comparison is exact after trimming
    assert_eq!(kernel.tag_store.tag_count(), 2);
    assert_eq!(kernel.tag_store.tagging_count(), 3);
}

#[tokio::test]
async fn delete_all_tags_keeps_tags() {
    let (_dir, kernel, log, _) = audited_kernel().await;
    let tagging = kernel.kernel.tagging();
    let item = RecordRef::new(RecordKind::Item, 11);

    tagging.apply_tag_string(&item, "a, b", &test_user(), false).await.unwrap();
    tagging.apply_tag_string(&item, "a", &test_user(), false).await.unwrap();
    log.lock().clear();

    assert_eq!(tagging.delete_all_tags(&item).await.unwrap(), 3);
    assert!(tagging.tags(&item).await.unwrap().is_empty());
    assert_eq!(tagging.tag_string(&item).await.unwrap(), "");
    assert_eq!(kernel.tag_store.tag_count(), 2);
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn add_and_remove_tags_directly() {
    let (_dir, kernel, log, _) = audited_kernel().await;
    let tagging = kernel.kernel.tagging();
    let item = RecordRef::new(RecordKind::Item, 12);
    let user = test_user();

    assert_eq!(tagging.add_tags(&item, "a, b", &user).await.unwrap(), 2);
    assert_eq!(tagging.add_tags(&item, "b, c", &user).await.unwrap(), 1);
    assert_eq!(tagging.remove_tags(&item, &["a", " "], &user, false).await.unwrap(), 1);
    assert_eq!(tagging.tag_string(&item).await.unwrap(), "b, c");
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn identity_is_required() {
    let (_dir, kernel, _log, _) = audited_kernel().await;
    let tagging = kernel.kernel.tagging();

    let err = tagging
        .apply_tag_string(&Exhibit { id: None }, "a", &test_user(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, TaggingError::IdentityMissing(Identity::Record)));

    let item = RecordRef::new(RecordKind::Item, 1);
    let err = tagging
        .apply_tag_string(&item, "a", &UserContext::anonymous(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, TaggingError::IdentityMissing(Identity::User)));
    assert_eq!(kernel.tag_store.tag_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_users_share_one_tag() {
    let (_dir, kernel, log, _) = audited_kernel().await;
    let item = RecordRef::new(RecordKind::Item, 100);

    let mut handles = Vec::new();
    for _ in 0..2 {
        let engine: TaggingEngine = kernel.kernel.tagging().clone();
        let user = test_user();
        handles.push(tokio::spawn(async move {
            engine.apply_tag_string(&item, "vintage", &user, false).await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("apply");
    }

    assert_eq!(kernel.tag_store.tag_count(), 1);
    assert_eq!(kernel.tag_store.tagging_count(), 2);
    assert_eq!(kernel.tag_store.taggings_for(item).await.unwrap().len(), 2);
    assert_eq!(calls_to(&log, "tag_item").len(), 2);
}
