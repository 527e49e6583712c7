//! Error types for mergeway-store.

use crate::ObjectId;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading or writing the object store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Path does not hold a repository.
    #[error("not a repository: {0}")]
    NotARepository(String),

    /// Branch not found.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// Branch already exists.
    #[error("branch already exists: {0}")]
    BranchExists(String),

    /// No object stored under this id.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// The object exists but has a different kind.
    #[error("object {id} is not a {expected}")]
    UnexpectedKind {
        /// The object that was looked up.
        id: ObjectId,
        /// The kind the caller asked for.
        expected: &'static str,
    },

    /// Malformed object id.
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// Tree path that cannot be stored (empty component, leading slash, ...).
    #[error("invalid tree path: {0}")]
    InvalidPath(String),

    /// Underlying git2 error.
    #[error("git error: {0}")]
    Git2(#[from] git2::Error),
}
