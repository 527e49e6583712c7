//! Store providers: where repositories come from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use mergeway_store::{GitStore, MemoryStore};
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::traits::StoreProvider;

/// Check that `name` can be used as a single path component.
///
/// Repository names become directory and file names, so anything that
/// could escape the configured directories is treated as unknown.
///
/// # Errors
/// Returns `RepositoryNotFound` for unusable names.
pub fn validate_repo_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(Error::RepositoryNotFound(name.to_string()))
    }
}

/// Git repositories living as subdirectories of one root.
#[derive(Debug, Clone)]
pub struct GitRepositories {
    root: PathBuf,
}

impl GitRepositories {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create an empty bare repository named `repo`.
    ///
    /// # Errors
    /// Returns error if the name is unusable or git cannot initialize it.
    pub fn init(&self, repo: &str) -> Result<GitStore> {
        validate_repo_name(repo)?;
        Ok(GitStore::init_bare(self.root.join(repo))?)
    }
}

impl StoreProvider for GitRepositories {
    type Store = GitStore;

    fn open(&self, repo: &str) -> Result<GitStore> {
        validate_repo_name(repo)?;
        let path = self.root.join(repo);
        if !path.is_dir() {
            return Err(Error::RepositoryNotFound(repo.to_string()));
        }
        GitStore::open(&path).map_err(|e| match e {
            mergeway_store::Error::NotARepository(_) => Error::RepositoryNotFound(repo.to_string()),
            other => other.into(),
        })
    }
}

/// In-memory repositories, registered by name.
#[derive(Debug, Default)]
pub struct MemoryRepositories {
    repos: RwLock<HashMap<String, MemoryStore>>,
}

impl MemoryRepositories {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the store for `repo`, creating an empty one if needed.
    ///
    /// The returned handle shares its arena with every later `open`.
    pub fn create(&self, repo: &str) -> MemoryStore {
        self.repos
            .write()
            .entry(repo.to_string())
            .or_default()
            .clone()
    }
}

impl StoreProvider for MemoryRepositories {
    type Store = MemoryStore;

    fn open(&self, repo: &str) -> Result<MemoryStore> {
        self.repos
            .read()
            .get(repo)
            .cloned()
            .ok_or_else(|| Error::RepositoryNotFound(repo.to_string()))
    }
}
