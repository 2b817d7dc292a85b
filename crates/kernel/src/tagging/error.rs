use std::fmt;

use thiserror::Error;

/// The identity a tagging operation could not do without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Record,
    User,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Record => f.write_str("persisted record id"),
            Identity::User => f.write_str("user id"),
        }
    }
}

/// Errors raised by the tagging engine.
#[derive(Debug, Error)]
pub enum TaggingError {
    /// Tagging was attempted without a persisted record or an acting user.
    /// This is a caller bug, not a user-facing condition.
    #[error("a valid {0} must be provided when tagging")]
    IdentityMissing(Identity),

    /// A record kind discriminator that the kernel does not know.
    #[error("unknown record kind '{0}'. Valid kinds: item, collection, exhibit")]
    UnknownRecordKind(String),

    /// The persistence layer failed.
    #[error("tag storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
