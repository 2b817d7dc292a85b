//! Tag and tagging models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{Identity, TaggingError};

/// Record kinds that can carry tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Item,
    Collection,
    Exhibit,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Item, RecordKind::Collection, RecordKind::Exhibit];

    /// Discriminator stored in the `record_kind` column.
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Item => "item",
            RecordKind::Collection => "collection",
            RecordKind::Exhibit => "exhibit",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = TaggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "item" => Ok(RecordKind::Item),
            "collection" => Ok(RecordKind::Collection),
            "exhibit" => Ok(RecordKind::Exhibit),
            other => Err(TaggingError::UnknownRecordKind(other.to_string())),
        }
    }
}

/// A persisted record, addressed by kind and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub kind: RecordKind,
    pub id: i64,
}

impl RecordRef {
    pub fn new(kind: RecordKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Capability implemented by every record type that can be tagged.
pub trait Taggable {
    fn record_kind(&self) -> RecordKind;

    /// Database id, `None` until the record has been saved.
    fn record_id(&self) -> Option<i64>;

    fn record_ref(&self) -> Result<RecordRef, TaggingError> {
        self.record_id()
            .map(|id| RecordRef::new(self.record_kind(), id))
            .ok_or(TaggingError::IdentityMissing(Identity::Record))
    }
}

impl Taggable for RecordRef {
    fn record_kind(&self) -> RecordKind {
        self.kind
    }

    fn record_id(&self) -> Option<i64> {
        Some(self.id)
    }
}

/// A tag, unique by its trimmed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    /// User who first used the tag.
    pub created_by: Uuid,
    /// Unix timestamp when created.
    pub created: i64,
}

/// One user's application of a tag to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tagging {
    pub id: i64,
    pub tag_id: i64,
    pub record: RecordRef,
    pub user_id: Uuid,
    pub created: i64,
}
