//! Error types for mergeway-core.

use std::path::PathBuf;

use crate::merge::ConflictReport;
use crate::pull_request::PullState;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mergeway-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No repository with this name.
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// No pull request with this number in the repository.
    #[error("pull request #{id} not found in {repo}")]
    PullNotFound { repo: String, id: u64 },

    /// Branch name is malformed or names a branch that does not exist.
    #[error("invalid branch '{name}': {reason}")]
    InvalidReference {
        /// The offending branch name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The pull request is not in a state that allows the action.
    #[error("cannot {action} pull request #{id}: it is {state}")]
    InvalidState {
        id: u64,
        state: PullState,
        action: &'static str,
    },

    /// The two branches share no commit.
    #[error("'{source_branch}' and '{target_branch}' have no common history")]
    UnrelatedHistories {
        source_branch: String,
        target_branch: String,
    },

    /// The three-way merge found conflicting paths.
    #[error("merge conflict: {0}")]
    Conflict(ConflictReport),

    /// The target branch moved between observation and update.
    #[error("branch '{branch}' was updated concurrently - retry the merge")]
    ConcurrentModification { branch: String },

    /// The object store failed.
    #[error("object store unavailable: {0}")]
    StoreUnavailable(#[source] mergeway_store::Error),

    /// State file parsing error.
    #[error("failed to parse {file}: {message}")]
    StateParseError { file: PathBuf, message: String },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<mergeway_store::Error> for Error {
    fn from(err: mergeway_store::Error) -> Self {
        match err {
            mergeway_store::Error::BranchNotFound(name) => Self::InvalidReference {
                name,
                reason: "branch does not exist".into(),
            },
            other => Self::StoreUnavailable(other),
        }
    }
}
