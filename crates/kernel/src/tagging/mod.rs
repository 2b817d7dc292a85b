//! Tagging engine for taggable records.
//!
//! Tags are shared by text across every record kind. A tagging links one tag,
//! one record (kind + id), and the user who applied it. The engine reconciles
//! a submitted tag string against what is stored and applies the minimal
//! set of additions and removals.

mod diff;
mod engine;
mod error;
mod model;
mod pg_store;
mod store;

pub use diff::{TagDiff, diff_tag_string, join_tags, split_tag_string};
pub use engine::{DEFAULT_DELIMITER, TaggingEngine};
pub use error::{Identity, TaggingError};
pub use model::{RecordKind, RecordRef, Tag, Taggable, Tagging};
pub use pg_store::PgTagStore;
pub use store::{AppliedChanges, MemoryTagStore, TagChangeSet, TagStore};
