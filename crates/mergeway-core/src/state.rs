//! Persistence of pull request records as JSON files.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::provider::validate_repo_name;
use crate::pull_request::PullRequest;
use crate::traits::RecordStore;

/// Everything persisted for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSnapshot {
    /// Repository name.
    pub name: String,
    /// Number the next pull request will get.
    pub next_id: u64,
    /// Records ordered by id.
    pub pull_requests: Vec<PullRequest>,
}

impl RepoSnapshot {
    /// An empty snapshot; numbering starts at 1.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: 1,
            pull_requests: Vec::new(),
        }
    }
}

/// Manages the state directory holding `<repo>.json` files.
#[derive(Debug)]
pub struct State {
    dir: PathBuf,
}

impl State {
    /// Create a `State` rooted at `dir`. The directory is created on the
    /// first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the path to the state directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, repo: &str) -> PathBuf {
        self.dir.join(format!("{repo}.json"))
    }
}

impl RecordStore for State {
    fn load(&self, repo: &str) -> Result<Option<RepoSnapshot>> {
        validate_repo_name(repo)?;
        let path = self.snapshot_path(repo);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let snapshot: RepoSnapshot =
            serde_json::from_str(&content).map_err(|e| Error::StateParseError {
                file: path,
                message: e.to_string(),
            })?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &RepoSnapshot) -> Result<()> {
        validate_repo_name(&snapshot.name)?;
        fs::create_dir_all(&self.dir)?;

        // Write then rename so readers never see a half-written file
        let path = self.snapshot_path(&snapshot.name);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(snapshot)?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Record store that keeps snapshots in memory.
#[derive(Debug, Default)]
pub struct MemoryRecords {
    snapshots: Mutex<HashMap<String, RepoSnapshot>>,
}

impl MemoryRecords {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecords {
    fn load(&self, repo: &str) -> Result<Option<RepoSnapshot>> {
        Ok(self.snapshots.lock().get(repo).cloned())
    }

    fn save(&self, snapshot: &RepoSnapshot) -> Result<()> {
        self.snapshots
            .lock()
            .insert(snapshot.name.clone(), snapshot.clone());
        Ok(())
    }
}
