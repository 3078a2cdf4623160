use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::{CategoryId, IdError};

use super::transaction::PublicationState;

/// Where a category sits in its owner's forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPosition {
    pub parent_id: Option<CategoryId>,
    pub level: i32,
}

impl fmt::Display for CategoryPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent_id {
            Some(parent) => write!(f, "under category {} (level {})", parent, self.level),
            None => write!(f, "as a root (level {})", self.level),
        }
    }
}

/// Why a publication did not commit.
#[derive(Error, Debug)]
pub enum PublishError {
    /// A category title is already bound to a different tree position for
    /// the same owner.
    #[error("category \"{title}\" already exists {existing} but the path places it {requested}")]
    CategoryConflict {
        title: String,
        existing: CategoryPosition,
        requested: CategoryPosition,
    },

    #[error("invalid publication: {0}")]
    Validation(String),

    /// Connectivity, timeout or serialization failure. Retrying the whole
    /// publication is safe.
    #[error("transient store failure: {0}")]
    TransientStore(#[source] sqlx::Error),

    #[error("store error: {0}")]
    Store(#[source] sqlx::Error),

    #[error("id generation failed: {0}")]
    IdGeneration(#[from] IdError),

    #[error("publication is {actual}, expected {expected}")]
    InvalidState {
        expected: PublicationState,
        actual: PublicationState,
    },
}

impl PublishError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether re-running the same publication may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientStore(_) | Self::IdGeneration(IdError::ClockMovedBackwards { .. })
        )
    }

    /// Stable machine-readable name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CategoryConflict { .. } => "category_conflict",
            Self::Validation(_) => "validation",
            Self::TransientStore(_) => "transient_store",
            Self::Store(_) => "store",
            Self::IdGeneration(_) => "id_generation",
            Self::InvalidState { .. } => "invalid_state",
        }
    }
}

impl From<sqlx::Error> for PublishError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient(&err) {
            Self::TransientStore(err)
        } else {
            Self::Store(err)
        }
    }
}

/// Classify a driver error as transient (connectivity, pool exhaustion,
/// serialization conflicts) or permanent.
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| {
            // 08xxx connection exception, 40001 serialization failure,
            // 40P01 deadlock, 57P01 admin shutdown, 57P03 cannot connect now
            code.starts_with("08") || matches!(&*code, "40001" | "40P01" | "57P01" | "57P03")
        }),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Tag,
    File,
}

/// A tag or file record that was skipped without failing the publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetWarning {
    pub kind: AssetKind,
    pub name: String,
    pub reason: String,
}

impl AssetWarning {
    pub fn tag(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: AssetKind::Tag,
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn file(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: AssetKind::File,
            name: name.into(),
            reason: reason.into(),
        }
    }
}
