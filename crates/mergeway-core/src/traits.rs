//! Trait abstractions for the engine's two backends.
//!
//! `StoreProvider` hands out an [`ObjectStore`] per repository and
//! `RecordStore` persists pull request records, so the engine can run
//! against git repositories on disk or entirely in memory.

use mergeway_store::ObjectStore;

use crate::Result;
use crate::state::RepoSnapshot;

/// Opens the object store of a named repository.
#[allow(clippy::missing_errors_doc)]
pub trait StoreProvider: Send + Sync {
    /// Store type handed out per call.
    type Store: ObjectStore;

    /// Open `repo`, failing with `RepositoryNotFound` if it does not exist.
    fn open(&self, repo: &str) -> Result<Self::Store>;
}

/// Persists pull request records, one snapshot per repository.
#[allow(clippy::missing_errors_doc)]
pub trait RecordStore: Send + Sync {
    /// Load the snapshot for `repo`, or `None` if nothing was saved yet.
    fn load(&self, repo: &str) -> Result<Option<RepoSnapshot>>;

    /// Replace the stored snapshot for `snapshot.name`.
    fn save(&self, snapshot: &RepoSnapshot) -> Result<()>;
}
