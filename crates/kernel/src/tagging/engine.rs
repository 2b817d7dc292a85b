//! Tagging engine - reconciles tag strings with stored taggings.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use super::diff::{TagDiff, diff_tag_string, join_tags, split_tag_string};
use super::error::{Identity, TaggingError};
use super::model::{RecordRef, Tag, Taggable};
use super::store::{TagChangeSet, TagStore};
use crate::hook::{Event, HookBroker, HookContext, UserContext};

/// Default tag string delimiter.
pub const DEFAULT_DELIMITER: &str = ",";

/// Applies tag changes to records and raises tag/untag events.
#[derive(Clone)]
pub struct TaggingEngine {
    store: Arc<dyn TagStore>,
    broker: Arc<HookBroker>,
    delimiter: String,
}

impl TaggingEngine {
    pub fn new(store: Arc<dyn TagStore>, broker: Arc<HookBroker>) -> Self {
        Self {
            store,
            broker,
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Compare a tag string with a set of existing tag names.
    pub fn diff<S: AsRef<str>>(&self, input: &str, existing: &[S]) -> TagDiff {
        diff_tag_string(input, existing, &self.delimiter)
    }

    /// Make a record's tags match `input`.
    ///
    /// With `delete_all_owners` the comparison covers every user's tags and
    /// removals delete every owner's tagging; otherwise only `user`'s own
    /// taggings are considered. Raises `untag_<kind>` when something was
    /// removed and `tag_<kind>` when something was added.
    pub async fn apply_tag_string<R: Taggable + ?Sized>(
        &self,
        record: &R,
        input: &str,
        user: &UserContext,
        delete_all_owners: bool,
    ) -> Result<TagDiff, TaggingError> {
        let record = record.record_ref()?;
        let user_id = require_user(user)?;

        let scope = (!delete_all_owners).then_some(user_id);
        let existing = names(self.store.tags_for(record, scope).await?);
        let diff = self.diff(input, &existing);

        if diff.is_empty() {
            debug!(record = %record, "tag string unchanged");
            return Ok(diff);
        }

        let applied = self
            .store
            .apply(&TagChangeSet {
                record,
                user: user_id,
                remove: diff.removed.clone(),
                remove_for_all_owners: delete_all_owners,
                add: diff.added.clone(),
            })
            .await?;

        info!(
            record = %record,
            user = %user_id,
            added = applied.added_taggings,
            removed = applied.removed_taggings,
            "applied tag string"
        );

        if !diff.removed.is_empty() {
            self.raise(Event::Untag(record.kind), record, &diff.removed, user);
        }
        if !diff.added.is_empty() {
            self.raise(Event::Tag(record.kind), record, &diff.added, user);
        }

        Ok(diff)
    }

    /// Attach the tags in `input` to a record for `user`.
    ///
    /// Already-present taggings are left alone. No events are raised.
    /// Returns the number of taggings created.
    pub async fn add_tags<R: Taggable + ?Sized>(
        &self,
        record: &R,
        input: &str,
        user: &UserContext,
    ) -> Result<u64, TaggingError> {
        let record = record.record_ref()?;
        let user_id = require_user(user)?;
        let add = split_tag_string(input, &self.delimiter);
        if add.is_empty() {
            return Ok(0);
        }

        let applied = self
            .store
            .apply(&TagChangeSet {
                record,
                user: user_id,
                remove: Vec::new(),
                remove_for_all_owners: false,
                add,
            })
            .await?;
        Ok(applied.added_taggings)
    }

    /// Remove tags from a record, either `user`'s taggings or every owner's.
    ///
    /// No events are raised. Returns the number of taggings deleted.
    pub async fn remove_tags<R: Taggable + ?Sized, S: AsRef<str>>(
        &self,
        record: &R,
        tags: &[S],
        user: &UserContext,
        delete_all_owners: bool,
    ) -> Result<u64, TaggingError> {
        let record = record.record_ref()?;
        let user_id = require_user(user)?;
        let remove: Vec<String> = tags
            .iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if remove.is_empty() {
            return Ok(0);
        }

        let applied = self
            .store
            .apply(&TagChangeSet {
                record,
                user: user_id,
                remove,
                remove_for_all_owners: delete_all_owners,
                add: Vec::new(),
            })
            .await?;
        Ok(applied.removed_taggings)
    }

    /// Whether a record carries `tag`, optionally applied by a given user.
    pub async fn has_tag<R: Taggable + ?Sized>(
        &self,
        tag: &str,
        user: Option<Uuid>,
        record: &R,
    ) -> Result<bool, TaggingError> {
        let record = record.record_ref()?;
        let count = self.store.count_taggings(tag.trim(), record, user).await?;
        Ok(count > 0)
    }

    /// All distinct tags on a record, ordered by name.
    pub async fn tags<R: Taggable + ?Sized>(&self, record: &R) -> Result<Vec<Tag>, TaggingError> {
        let record = record.record_ref()?;
        Ok(self.store.tags_for(record, None).await?)
    }

    /// Tags a single user applied to a record.
    pub async fn user_tags<R: Taggable + ?Sized>(
        &self,
        record: &R,
        user: &UserContext,
    ) -> Result<Vec<Tag>, TaggingError> {
        let record = record.record_ref()?;
        let user_id = require_user(user)?;
        Ok(self.store.tags_for(record, Some(user_id)).await?)
    }

    /// Render a record's tags as `"a, b, c"`.
    pub async fn tag_string<R: Taggable + ?Sized>(&self, record: &R) -> Result<String, TaggingError> {
        let tags = names(self.tags(record).await?);
        Ok(join_tags(&tags, &self.delimiter))
    }

    /// Remove every tagging on a record, e.g. when the record is deleted.
    pub async fn delete_all_tags<R: Taggable + ?Sized>(&self, record: &R) -> Result<u64, TaggingError> {
        let record = record.record_ref()?;
        let deleted = self.store.delete_taggings_for(record).await?;
        debug!(record = %record, deleted, "deleted all taggings");
        Ok(deleted)
    }

    fn raise(&self, event: Event, record: RecordRef, tags: &[String], user: &UserContext) {
        let ctx = HookContext::new(
            "kernel",
            json!({
                "record_kind": record.kind.as_str(),
                "record_id": record.id,
                "tags": tags,
                "user_id": user.id,
            }),
        )
        .with_user(user.clone());
        self.broker.dispatch(event, &ctx);
    }
}

impl std::fmt::Debug for TaggingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaggingEngine")
            .field("delimiter", &self.delimiter)
            .finish()
    }
}

fn require_user(user: &UserContext) -> Result<Uuid, TaggingError> {
    if user.id.is_nil() {
        return Err(TaggingError::IdentityMissing(Identity::User));
    }
    Ok(user.id)
}

fn names(tags: Vec<Tag>) -> Vec<String> {
    tags.into_iter().map(|t| t.name).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::hook::HookBindings;
    use crate::tagging::{MemoryTagStore, RecordKind};
    use parking_lot::Mutex;

    fn engine() -> (TaggingEngine, Arc<MemoryTagStore>, Arc<HookBroker>) {
        let store = Arc::new(MemoryTagStore::new());
        let broker = Arc::new(HookBroker::new());
        (TaggingEngine::new(store.clone(), broker.clone()), store, broker)
    }

    fn user() -> UserContext {
        UserContext::authenticated(Uuid::now_v7(), vec![])
    }

    #[tokio::test]
    async fn apply_to_unsaved_record_fails_fast() {
        struct Unsaved;
        impl Taggable for Unsaved {
            fn record_kind(&self) -> RecordKind {
                RecordKind::Exhibit
            }
            fn record_id(&self) -> Option<i64> {
                None
            }
        }

        let (engine, store, _) = engine();
        let err = engine
            .apply_tag_string(&Unsaved, "a", &user(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, TaggingError::IdentityMissing(Identity::Record)));
        assert_eq!(store.tagging_count(), 0);
    }

    #[tokio::test]
    async fn anonymous_user_cannot_tag() {
        let (engine, store, _) = engine();
        let record = RecordRef::new(RecordKind::Item, 1);
        let err = engine
            .apply_tag_string(&record, "a", &UserContext::anonymous(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, TaggingError::IdentityMissing(Identity::User)));
        assert_eq!(store.tag_count(), 0);
    }

    #[tokio::test]
    async fn unchanged_string_raises_nothing() {
        let (engine, _, broker) = engine();
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let mut bindings = HookBindings::new("audit");
        bindings
            .subscribe(Event::Tag(RecordKind::Item), {
                let counter = counter.clone();
                move |_: &HookContext| {
                    *counter.lock() += 1;
                    Ok(None)
                }
            })
            .subscribe(Event::Untag(RecordKind::Item), move |_| {
                *counter.lock() += 1;
                Ok(None)
            });
        broker.bind(bindings, 0);

        let record = RecordRef::new(RecordKind::Item, 1);
        let u = user();
        engine.apply_tag_string(&record, "a,b", &u, false).await.unwrap();
        assert_eq!(*calls.lock(), 1);

        let diff = engine.apply_tag_string(&record, "b, a", &u, false).await.unwrap();
        assert!(diff.is_empty());
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test]
    async fn custom_delimiter() {
        let (engine, _, _) = engine();
        let engine = engine.with_delimiter(";");
        let record = RecordRef::new(RecordKind::Collection, 3);
        engine
            .apply_tag_string(&record, "maps; letters, 1862", &user(), false)
            .await
            .unwrap();
        assert_eq!(engine.tag_string(&record).await.unwrap(), "letters, 1862; maps");
    }
}
