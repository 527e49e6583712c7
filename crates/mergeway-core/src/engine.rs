//! The pull request engine: lifecycle operations over a store provider and
//! a record store.

use chrono::Utc;
use mergeway_store::{ObjectId, ObjectStore};
use tracing::{debug, info, warn};

use crate::branch_name::BranchName;
use crate::config::MergeConfig;
use crate::error::{Error, Result};
use crate::merge::{self, MergeResult, Mergeability};
use crate::pull_request::{NewPullRequest, PullFilter, PullRequest, PullRequestPatch};
use crate::registry::Registry;
use crate::resolver::{self, CommitRange, CommitSummary};
use crate::traits::{RecordStore, StoreProvider};

/// Creates, edits, inspects and merges pull requests.
///
/// Safe to share between threads; every method is synchronous and may
/// block on store I/O.
pub struct Engine<P, R> {
    provider: P,
    registry: Registry<R>,
    merge: MergeConfig,
}

impl<P: StoreProvider, R: RecordStore> Engine<P, R> {
    /// Create an engine.
    pub fn new(provider: P, records: R, merge: MergeConfig) -> Self {
        Self {
            provider,
            registry: Registry::new(records),
            merge,
        }
    }

    /// The store provider.
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Open a pull request from `request.source_branch` into
    /// `request.target_branch`.
    ///
    /// # Errors
    /// `RepositoryNotFound` for an unknown repository, `InvalidReference`
    /// for a malformed or missing branch.
    pub fn create(&self, repo: &str, request: NewPullRequest) -> Result<PullRequest> {
        let store = self.provider.open(repo)?;
        let source = existing_branch(&store, &request.source_branch)?;
        let target = existing_branch(&store, &request.target_branch)?;

        let table = self.registry.table(repo)?;
        let pr = self.registry.insert(&table, |id| {
            PullRequest::open(id, request, source, target, Utc::now())
        })?;
        info!(
            repo,
            id = pr.id,
            source = %pr.source_branch,
            target = %pr.target_branch,
            "opened pull request"
        );
        Ok(pr)
    }

    /// Fetch one pull request.
    ///
    /// # Errors
    /// `RepositoryNotFound` or `PullNotFound`.
    pub fn get(&self, repo: &str, id: u64) -> Result<PullRequest> {
        self.provider.open(repo)?;
        self.registry.table(repo)?.get(id)
    }

    /// All pull requests matching `filter`, ordered by id.
    ///
    /// # Errors
    /// `RepositoryNotFound` for an unknown repository.
    pub fn list(&self, repo: &str, filter: &PullFilter) -> Result<Vec<PullRequest>> {
        self.provider.open(repo)?;
        Ok(self.registry.table(repo)?.list(filter))
    }

    /// Change the title, description or target branch of an open pull
    /// request, and close it if `patch.close` is set.
    ///
    /// All changes are saved together or not at all.
    ///
    /// # Errors
    /// `InvalidState` unless open, `InvalidReference` for a bad target.
    pub fn update(&self, repo: &str, id: u64, patch: PullRequestPatch) -> Result<PullRequest> {
        let store = self.provider.open(repo)?;
        let table = self.registry.table(repo)?;
        let slot = table.slot(id)?;
        let mut slot = slot.lock();

        let mut pr = table.get(id)?;
        pr.ensure_open(if patch.close { "close" } else { "update" })?;
        if patch.is_empty() {
            return Ok(pr);
        }

        let retarget = match patch.target_branch {
            Some(target) => Some(existing_branch(&store, &target)?),
            None => None,
        };
        if let Some(title) = patch.title {
            pr.title = title;
        }
        if let Some(description) = patch.description {
            pr.description = description;
        }
        let retargeted = retarget.is_some_and(|target| {
            let changed = target != pr.target_branch;
            pr.target_branch = target;
            changed
        });
        let now = Utc::now();
        pr.updated_at = now;
        if patch.close {
            pr.mark_closed(now)?;
        }

        let pr = self.registry.replace(&table, pr)?;
        if retargeted || patch.close {
            slot.cache = None;
        }
        info!(repo, id, retargeted, closed = patch.close, "updated pull request");
        Ok(pr)
    }

    /// Close an open pull request without merging.
    ///
    /// # Errors
    /// `InvalidState` unless open.
    pub fn close(&self, repo: &str, id: u64) -> Result<PullRequest> {
        self.provider.open(repo)?;
        let table = self.registry.table(repo)?;
        let slot = table.slot(id)?;
        let mut slot = slot.lock();

        let mut pr = table.get(id)?;
        pr.mark_closed(Utc::now())?;
        let pr = self.registry.replace(&table, pr)?;
        slot.cache = None;
        info!(repo, id, "closed pull request");
        Ok(pr)
    }

    /// Resolve the pull request's branches at their current tips.
    ///
    /// # Errors
    /// `InvalidReference` if a branch is gone, `UnrelatedHistories` if the
    /// branches share no commit.
    pub fn resolve(&self, repo: &str, id: u64) -> Result<CommitRange> {
        let store = self.provider.open(repo)?;
        let pr = self.registry.table(repo)?.get(id)?;
        resolver::resolve(&store, &pr.source_branch, &pr.target_branch)
    }

    /// Commits the pull request would introduce, newest first.
    ///
    /// # Errors
    /// Same as [`Engine::resolve`].
    pub fn commits(&self, repo: &str, id: u64) -> Result<Vec<CommitSummary>> {
        Ok(self.resolve(repo, id)?.commits)
    }

    /// Whether an open pull request would merge cleanly right now.
    ///
    /// Nothing becomes reachable from a branch. The result is cached until
    /// either tip moves or the target branch changes.
    ///
    /// # Errors
    /// `InvalidState` unless open, plus the errors of [`Engine::resolve`].
    pub fn check_mergeable(&self, repo: &str, id: u64) -> Result<Mergeability> {
        let store = self.provider.open(repo)?;
        let table = self.registry.table(repo)?;
        let slot = table.slot(id)?;
        let mut slot = slot.lock();

        let pr = table.get(id)?;
        pr.ensure_open("check")?;
        let source_tip = store.branch_tip(&pr.source_branch)?;
        let target_tip = store.branch_tip(&pr.target_branch)?;

        if let Some(cached) = &slot.cache {
            if cached.observed_at(&source_tip, &target_tip) {
                debug!(repo, id, "mergeability cache hit");
                return Ok(cached.clone());
            }
        }

        let base = merge_base_of(&store, &pr, &source_tip, &target_tip)?;
        let plan = merge::plan(&store, &base, &source_tip, &target_tip)?;
        let result = Mergeability::from_plan(plan, source_tip, target_tip, base);
        slot.cache = Some(result.clone());
        Ok(result)
    }

    /// Merge an open pull request into its target branch.
    ///
    /// The target moves only if the merge is conflict free and nobody else
    /// moved it since it was read.
    ///
    /// # Errors
    /// `InvalidState` unless open, `InvalidReference` if a branch is gone,
    /// `UnrelatedHistories`, `Conflict` with the conflicting paths, or
    /// `ConcurrentModification` if the target moved. The record stays open
    /// on every error.
    pub fn request_merge(&self, repo: &str, id: u64) -> Result<PullRequest> {
        let store = self.provider.open(repo)?;
        let table = self.registry.table(repo)?;
        let slot = table.slot(id)?;
        let mut slot = slot.lock();

        let mut pr = table.get(id)?;
        pr.ensure_open("merge")?;
        let source_tip = store.branch_tip(&pr.source_branch)?;
        let target_tip = store.branch_tip(&pr.target_branch)?;
        let base = merge_base_of(&store, &pr, &source_tip, &target_tip)?;

        let message = self
            .merge
            .message(&pr.source_branch, &pr.target_branch, pr.id);
        let result = merge::merge(
            &store,
            &base,
            &source_tip,
            &target_tip,
            &self.merge.committer(),
            &message,
        )?;
        let new_tip = match result {
            MergeResult::FastForward { new_target_tip } => new_target_tip,
            MergeResult::Merged { commit, .. } => commit,
            MergeResult::Conflict(report) => {
                info!(repo, id, conflicts = report.conflicts.len(), "merge blocked by conflicts");
                return Err(Error::Conflict(report));
            }
        };

        if !store.compare_and_swap_branch(&pr.target_branch, &target_tip, &new_tip)? {
            warn!(repo, id, branch = %pr.target_branch, "target moved during merge");
            return Err(Error::ConcurrentModification {
                branch: pr.target_branch.to_string(),
            });
        }

        let target_branch = pr.target_branch.clone();
        pr.mark_merged(new_tip.clone(), Utc::now())?;
        match self.registry.replace(&table, pr) {
            Ok(pr) => {
                slot.cache = None;
                info!(
                    repo,
                    id,
                    target = %target_branch,
                    tip = new_tip.short(),
                    "merged pull request"
                );
                Ok(pr)
            }
            Err(e) => {
                roll_back(&store, &target_branch, &new_tip, &target_tip);
                Err(e)
            }
        }
    }
}

fn merge_base_of<S: ObjectStore>(
    store: &S,
    pr: &PullRequest,
    source_tip: &ObjectId,
    target_tip: &ObjectId,
) -> Result<ObjectId> {
    resolver::merge_base(store, source_tip, target_tip)?.ok_or_else(|| Error::UnrelatedHistories {
        source_branch: pr.source_branch.to_string(),
        target_branch: pr.target_branch.to_string(),
    })
}

/// Move `branch` back from `merged_tip` to `previous` after the merged
/// record could not be saved.
fn roll_back<S: ObjectStore>(store: &S, branch: &str, merged_tip: &ObjectId, previous: &ObjectId) {
    match store.compare_and_swap_branch(branch, merged_tip, previous) {
        Ok(true) => warn!(branch, tip = previous.short(), "rolled back merge"),
        Ok(false) => warn!(branch, "branch moved after merge, not rolled back"),
        Err(e) => warn!(branch, error = %e, "failed to roll back merge"),
    }
}

/// Validate `name` and check that the branch exists.
fn existing_branch<S: ObjectStore>(store: &S, name: &str) -> Result<BranchName> {
    let branch = BranchName::new(name)?;
    if !store.branch_exists(&branch) {
        return Err(Error::InvalidReference {
            name: branch.to_string(),
            reason: "branch does not exist".into(),
        });
    }
    Ok(branch)
}
