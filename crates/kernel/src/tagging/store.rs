//! Persistence boundary for tags and taggings.
//!
//! [`TagStore`] is implemented by [`MemoryTagStore`] (single process) and
//! [`PgTagStore`](super::PgTagStore) (PostgreSQL). Both guarantee one tag row
//! per text and one tagging per (tag, record, user), whatever the number of
//! concurrent writers.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::model::{RecordRef, Tag, Tagging};

/// Tag changes for one record, applied atomically.
#[derive(Debug, Clone)]
pub struct TagChangeSet {
    pub record: RecordRef,
    /// Acting user; owner of new taggings.
    pub user: Uuid,
    /// Tag names whose taggings are removed.
    pub remove: Vec<String>,
    /// Remove every owner's tagging instead of only the acting user's.
    pub remove_for_all_owners: bool,
    /// Tag names to find-or-create and attach.
    pub add: Vec<String>,
}

/// Row counts from applying a [`TagChangeSet`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedChanges {
    pub removed_taggings: u64,
    /// Taggings actually inserted; duplicates of an existing key are skipped.
    pub added_taggings: u64,
}

#[async_trait]
pub trait TagStore: Send + Sync {
    /// Find a tag by its exact text.
    async fn find_tag(&self, name: &str) -> Result<Option<Tag>>;

    /// Return the tag with this text, creating it if needed.
    async fn find_or_create_tag(&self, name: &str, created_by: Uuid) -> Result<Tag>;

    /// Distinct tags on a record ordered by name, optionally only one user's.
    async fn tags_for(&self, record: RecordRef, user: Option<Uuid>) -> Result<Vec<Tag>>;

    /// All taggings on a record.
    async fn taggings_for(&self, record: RecordRef) -> Result<Vec<Tagging>>;

    /// Count taggings of `tag` on a record, optionally only one user's.
    async fn count_taggings(&self, tag: &str, record: RecordRef, user: Option<Uuid>) -> Result<u64>;

    /// Apply removals then additions in a single atomic step.
    async fn apply(&self, changes: &TagChangeSet) -> Result<AppliedChanges>;

    /// Delete every tagging on a record. Tags themselves are kept.
    async fn delete_taggings_for(&self, record: RecordRef) -> Result<u64>;
}

#[derive(Debug, Default)]
struct TagTables {
    next_tag_id: i64,
    next_tagging_id: i64,
    /// Keyed by text, which is the uniqueness constraint.
    tags: BTreeMap<String, Tag>,
    taggings: Vec<Tagging>,
}

impl TagTables {
    fn find_or_create(&mut self, name: &str, created_by: Uuid, now: i64) -> Tag {
        if let Some(tag) = self.tags.get(name) {
            return tag.clone();
        }
        self.next_tag_id += 1;
        let tag = Tag {
            id: self.next_tag_id,
            name: name.to_string(),
            created_by,
            created: now,
        };
        self.tags.insert(name.to_string(), tag.clone());
        tag
    }

    fn tag_id(&self, name: &str) -> Option<i64> {
        self.tags.get(name).map(|t| t.id)
    }

    fn matches(t: &Tagging, tag_id: i64, record: RecordRef, user: Option<Uuid>) -> bool {
        t.tag_id == tag_id && t.record == record && user.is_none_or(|u| t.user_id == u)
    }
}

/// In-memory tag store.
///
/// All mutation happens under one lock, which serializes find-or-create the
/// same way a unique index does.
#[derive(Debug, Default)]
pub struct MemoryTagStore {
    tables: Mutex<TagTables>,
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of tag rows.
    pub fn tag_count(&self) -> usize {
        self.tables.lock().tags.len()
    }

    /// Total number of tagging rows.
    pub fn tagging_count(&self) -> usize {
        self.tables.lock().taggings.len()
    }
}

#[async_trait]
impl TagStore for MemoryTagStore {
    async fn find_tag(&self, name: &str) -> Result<Option<Tag>> {
        Ok(self.tables.lock().tags.get(name).cloned())
    }

    async fn find_or_create_tag(&self, name: &str, created_by: Uuid) -> Result<Tag> {
        let now = chrono::Utc::now().timestamp();
        Ok(self.tables.lock().find_or_create(name, created_by, now))
    }

    async fn tags_for(&self, record: RecordRef, user: Option<Uuid>) -> Result<Vec<Tag>> {
        let tables = self.tables.lock();
        // BTreeMap iteration yields tags ordered by name
        let tags = tables
            .tags
            .values()
            .filter(|tag| {
                tables
                    .taggings
                    .iter()
                    .any(|t| TagTables::matches(t, tag.id, record, user))
            })
            .cloned()
            .collect();
        Ok(tags)
    }

    async fn taggings_for(&self, record: RecordRef) -> Result<Vec<Tagging>> {
        let tables = self.tables.lock();
        Ok(tables
            .taggings
            .iter()
            .filter(|t| t.record == record)
            .cloned()
            .collect())
    }

    async fn count_taggings(&self, tag: &str, record: RecordRef, user: Option<Uuid>) -> Result<u64> {
        let tables = self.tables.lock();
        let Some(tag_id) = tables.tag_id(tag) else {
            return Ok(0);
        };
        let count = tables
            .taggings
            .iter()
            .filter(|t| TagTables::matches(t, tag_id, record, user))
            .count();
        Ok(count as u64)
    }

    async fn apply(&self, changes: &TagChangeSet) -> Result<AppliedChanges> {
        let now = chrono::Utc::now().timestamp();
        let mut tables = self.tables.lock();
        let mut applied = AppliedChanges::default();

        let owner = (!changes.remove_for_all_owners).then_some(changes.user);
        for name in &changes.remove {
            let Some(tag_id) = tables.tag_id(name) else {
                continue;
            };
            let before = tables.taggings.len();
            tables
                .taggings
                .retain(|t| !TagTables::matches(t, tag_id, changes.record, owner));
            applied.removed_taggings += (before - tables.taggings.len()) as u64;
        }

        for name in &changes.add {
            let tag = tables.find_or_create(name, changes.user, now);
            let exists = tables
                .taggings
                .iter()
                .any(|t| TagTables::matches(t, tag.id, changes.record, Some(changes.user)));
            if exists {
                continue;
            }
            tables.next_tagging_id += 1;
            let id = tables.next_tagging_id;
            tables.taggings.push(Tagging {
                id,
                tag_id: tag.id,
                record: changes.record,
                user_id: changes.user,
                created: now,
            });
            applied.added_taggings += 1;
        }

        Ok(applied)
    }

    async fn delete_taggings_for(&self, record: RecordRef) -> Result<u64> {
        let mut tables = self.tables.lock();
        let before = tables.taggings.len();
        tables.taggings.retain(|t| t.record != record);
        Ok((before - tables.taggings.len()) as u64)
    }
}
