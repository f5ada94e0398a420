//! Error taxonomy for store operations
//!
//! - [`ValidationError`]: a required field is missing at commit time
//! - [`Error::Persistence`]: the durable write behind `save()` failed
//! - [`Error::NotFound`] / [`Error::AttachmentNotFound`]: a stale identity or handle
//!
//! None of these are fatal; a failed commit leaves pending changes in place so
//! the caller can retry or discard them.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{AttachmentHandle, BookId, EntityKind};
use crate::storage::StorageError;

/// A record is missing a field that must be present before commit
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Book {book} has an empty title")]
    MissingTitle { book: BookId },

    #[error("Book {book} has an empty author")]
    MissingAuthor { book: BookId },
}

/// Errors returned by the store
#[derive(Error, Debug)]
pub enum Error {
    /// A record failed validation; nothing was written
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The durable write failed; pending changes are kept for a retry
    #[error("Failed to persist changes: {0}")]
    Persistence(#[from] StorageError),

    /// No live record with this identity
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: Uuid },

    /// The attachment handle does not resolve to a stored blob
    #[error("Attachment not found: {0}")]
    AttachmentNotFound(AttachmentHandle),
}

impl Error {
    pub(crate) fn not_found(kind: EntityKind, id: Uuid) -> Self {
        Error::NotFound { kind, id }
    }

    /// True for stale identities and handles, which callers treat as "no data"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::AttachmentNotFound(_))
    }

    /// True when retrying `save()` may succeed without changing any record
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Persistence(e) => e.is_recoverable(),
            _ => false,
        }
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;
