//! Commit range resolution: merge bases and the commits a branch adds.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use mergeway_store::{Commit, ObjectId, ObjectStore, Signature};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

/// A commit as reported to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub sha: ObjectId,
    pub author: Signature,
    pub message: String,
    pub parents: Vec<ObjectId>,
    pub time: DateTime<Utc>,
}

impl From<Commit> for CommitSummary {
    fn from(commit: Commit) -> Self {
        Self {
            sha: commit.id,
            author: commit.author,
            message: commit.message,
            parents: commit.parents,
            time: commit.time,
        }
    }
}

/// Result of resolving a source branch against a target branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRange {
    pub source_tip: ObjectId,
    pub target_tip: ObjectId,
    pub merge_base: ObjectId,
    /// Commits reachable from the source tip but not from the merge base,
    /// newest first.
    pub commits: Vec<CommitSummary>,
}

/// Memoized commit reads for a single walk.
struct History<'a, S> {
    store: &'a S,
    commits: HashMap<ObjectId, Commit>,
}

impl<'a, S: ObjectStore> History<'a, S> {
    fn new(store: &'a S) -> Self {
        Self {
            store,
            commits: HashMap::new(),
        }
    }

    fn commit(&mut self, id: &ObjectId) -> Result<&Commit> {
        if !self.commits.contains_key(id) {
            let commit = self.store.commit(id)?;
            self.commits.insert(id.clone(), commit);
        }
        self.commits
            .get(id)
            .ok_or_else(|| Error::StoreUnavailable(mergeway_store::Error::ObjectNotFound(id.clone())))
    }

    fn parents(&mut self, id: &ObjectId) -> Result<Vec<ObjectId>> {
        Ok(self.commit(id)?.parents.clone())
    }

    /// Every commit reachable from `tip`, in breadth-first discovery order.
    fn ancestry(&mut self, tip: &ObjectId) -> Result<Vec<ObjectId>> {
        let mut seen = HashSet::from([tip.clone()]);
        let mut order = Vec::new();
        let mut queue = VecDeque::from([tip.clone()]);

        while let Some(id) = queue.pop_front() {
            for parent in self.parents(&id)? {
                if seen.insert(parent.clone()) {
                    queue.push_back(parent);
                }
            }
            order.push(id);
        }
        Ok(order)
    }
}

/// Check whether `ancestor` is reachable from `descendant` (or equal to it).
///
/// # Errors
/// Returns error if a commit cannot be read.
pub fn is_ancestor<S: ObjectStore>(
    store: &S,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> Result<bool> {
    is_ancestor_in(&mut History::new(store), ancestor, descendant)
}

fn is_ancestor_in<S: ObjectStore>(
    history: &mut History<'_, S>,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> Result<bool> {
    if ancestor == descendant {
        return Ok(true);
    }
    let mut seen = HashSet::from([descendant.clone()]);
    let mut queue = VecDeque::from([descendant.clone()]);
    while let Some(id) = queue.pop_front() {
        for parent in history.parents(&id)? {
            if &parent == ancestor {
                return Ok(true);
            }
            if seen.insert(parent.clone()) {
                queue.push_back(parent);
            }
        }
    }
    Ok(false)
}

/// Find the merge base of two tips, or `None` for unrelated histories.
///
/// When one tip is an ancestor of the other, that tip is the base.
/// Otherwise both sides are walked back one generation at a time, the
/// source side first, and every commit reached by both walks is a
/// candidate. Candidates that are ancestors of another candidate are
/// dropped; among the remaining nearest ones (criss-cross histories) the
/// first discovered wins.
///
/// # Errors
/// Returns error if a commit cannot be read.
pub fn merge_base<S: ObjectStore>(
    store: &S,
    source_tip: &ObjectId,
    target_tip: &ObjectId,
) -> Result<Option<ObjectId>> {
    let mut history = History::new(store);

    if is_ancestor_in(&mut history, target_tip, source_tip)? {
        return Ok(Some(target_tip.clone()));
    }
    if is_ancestor_in(&mut history, source_tip, target_tip)? {
        return Ok(Some(source_tip.clone()));
    }

    let mut source = Side::new(source_tip);
    let mut target = Side::new(target_tip);
    let mut common = Vec::new();
    while !source.frontier.is_empty() || !target.frontier.is_empty() {
        source.expand(&mut history, &target.seen, &mut common)?;
        target.expand(&mut history, &source.seen, &mut common)?;
    }

    let stale = strict_ancestors(&mut history, &common)?;
    Ok(common.into_iter().find(|id| !stale.contains(id)))
}

/// Every commit reachable from `ids` through at least one parent edge.
fn strict_ancestors<S: ObjectStore>(
    history: &mut History<'_, S>,
    ids: &[ObjectId],
) -> Result<HashSet<ObjectId>> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    for id in ids {
        for parent in history.parents(id)? {
            if seen.insert(parent.clone()) {
                queue.push_back(parent);
            }
        }
    }
    while let Some(id) = queue.pop_front() {
        for parent in history.parents(&id)? {
            if seen.insert(parent.clone()) {
                queue.push_back(parent);
            }
        }
    }
    Ok(seen)
}

/// One side of the simultaneous walk.
struct Side {
    seen: HashSet<ObjectId>,
    frontier: Vec<ObjectId>,
}

impl Side {
    fn new(tip: &ObjectId) -> Self {
        Self {
            seen: HashSet::from([tip.clone()]),
            frontier: vec![tip.clone()],
        }
    }

    /// Advance one generation, appending to `common` each commit the other
    /// side has already reached.
    fn expand<S: ObjectStore>(
        &mut self,
        history: &mut History<'_, S>,
        other: &HashSet<ObjectId>,
        common: &mut Vec<ObjectId>,
    ) -> Result<()> {
        let mut next = Vec::new();
        for id in std::mem::take(&mut self.frontier) {
            for parent in history.parents(&id)? {
                if self.seen.insert(parent.clone()) {
                    if other.contains(&parent) {
                        common.push(parent.clone());
                    }
                    next.push(parent);
                }
            }
        }
        self.frontier = next;
        Ok(())
    }
}

/// Commits reachable from `tip` but not from `base`, newest first.
///
/// Ties in commit time keep breadth-first discovery order from `tip`.
///
/// # Errors
/// Returns error if a commit cannot be read.
pub fn commits_between<S: ObjectStore>(
    store: &S,
    tip: &ObjectId,
    base: &ObjectId,
) -> Result<Vec<CommitSummary>> {
    let mut history = History::new(store);
    let excluded: HashSet<ObjectId> = history.ancestry(base)?.into_iter().collect();
    if excluded.contains(tip) {
        return Ok(Vec::new());
    }

    let mut seen = HashSet::from([tip.clone()]);
    let mut queue = VecDeque::from([tip.clone()]);
    let mut found = Vec::new();
    while let Some(id) = queue.pop_front() {
        let commit = history.commit(&id)?.clone();
        for parent in &commit.parents {
            if !excluded.contains(parent) && seen.insert(parent.clone()) {
                queue.push_back(parent.clone());
            }
        }
        found.push(commit);
    }

    // Stable sort keeps discovery order among equal timestamps
    found.sort_by_key(|commit| Reverse(commit.time));
    Ok(found.into_iter().map(CommitSummary::from).collect())
}

/// Resolve `source_branch` against `target_branch` at their current tips.
///
/// # Errors
/// Returns `InvalidReference` if either branch is missing and
/// `UnrelatedHistories` if the tips share no commit.
pub fn resolve<S: ObjectStore>(
    store: &S,
    source_branch: &str,
    target_branch: &str,
) -> Result<CommitRange> {
    let source_tip = store.branch_tip(source_branch)?;
    let target_tip = store.branch_tip(target_branch)?;

    let merge_base =
        merge_base(store, &source_tip, &target_tip)?.ok_or_else(|| Error::UnrelatedHistories {
            source_branch: source_branch.to_string(),
            target_branch: target_branch.to_string(),
        })?;
    debug!(
        source = source_branch,
        target = target_branch,
        base = merge_base.short(),
        "resolved merge base"
    );

    let commits = commits_between(store, &source_tip, &merge_base)?;
    Ok(CommitRange {
        source_tip,
        target_tip,
        merge_base,
        commits,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mergeway_store::MemoryStore;

    fn sig() -> Signature {
        Signature::new("Test User", "test@example.com")
    }

    fn commit(store: &MemoryStore, parents: &[&ObjectId], file: &str, message: &str) -> ObjectId {
        let parents: Vec<ObjectId> = parents.iter().map(|p| (*p).clone()).collect();
        store
            .commit_files(&parents, &[("f.txt", file)], &sig(), message)
            .unwrap()
    }

    #[test]
    fn test_linear_history() {
        let store = MemoryStore::new();
        let a = commit(&store, &[], "a", "A");
        let b = commit(&store, &[&a], "b", "B");
        let c = commit(&store, &[&b], "c", "C");

        assert!(is_ancestor(&store, &a, &c).unwrap());
        assert!(!is_ancestor(&store, &c, &a).unwrap());
        assert_eq!(merge_base(&store, &c, &b).unwrap(), Some(b.clone()));
        assert_eq!(merge_base(&store, &b, &c).unwrap(), Some(b.clone()));
        assert_eq!(merge_base(&store, &c, &c).unwrap(), Some(c.clone()));

        let commits = commits_between(&store, &c, &a).unwrap();
        let shas: Vec<&ObjectId> = commits.iter().map(|s| &s.sha).collect();
        assert_eq!(shas, vec![&c, &b]);
    }

    #[test]
    fn test_divergent_branches() {
        let store = MemoryStore::new();
        let a = commit(&store, &[], "a", "A");
        let b = commit(&store, &[&a], "b", "B");
        let left = commit(&store, &[&b], "l1", "L1");
        let left = commit(&store, &[&left], "l2", "L2");
        let right = commit(&store, &[&b], "r1", "R1");

        assert_eq!(merge_base(&store, &left, &right).unwrap(), Some(b.clone()));
        assert_eq!(merge_base(&store, &right, &left).unwrap(), Some(b.clone()));
        assert_eq!(commits_between(&store, &left, &b).unwrap().len(), 2);
    }

    #[test]
    fn test_merge_commit_in_source() {
        let store = MemoryStore::new();
        let a = commit(&store, &[], "a", "A");
        let side = commit(&store, &[&a], "s", "side");
        let main = commit(&store, &[&a], "m", "main");
        let merged = commit(&store, &[&main, &side], "m+s", "merge side");

        let commits = commits_between(&store, &merged, &a).unwrap();
        assert_eq!(commits.len(), 3);
        assert_eq!(commits[0].sha, merged);
        assert_eq!(commits[0].parents, vec![main, side]);
    }

    #[test]
    fn test_unrelated_histories() {
        let store = MemoryStore::new();
        let left = commit(&store, &[], "l", "L");
        let right = commit(&store, &[], "r", "R");
        store.create_branch("left", &left).unwrap();
        store.create_branch("right", &right).unwrap();

        assert_eq!(merge_base(&store, &left, &right).unwrap(), None);
        assert!(matches!(
            resolve(&store, "left", "right"),
            Err(Error::UnrelatedHistories { .. })
        ));
    }

    #[test]
    fn test_criss_cross_is_deterministic() {
        // Two merges cross each other, leaving x and y as equally good bases.
        // The source walks first, so the target's first parent is met first.
        // The older root is common too but never nearest.
        let store = MemoryStore::new();
        let root = commit(&store, &[], "0", "root");
        let x = commit(&store, &[&root], "x", "x");
        let y = commit(&store, &[&root], "y", "y");
        let source = commit(&store, &[&x, &y], "s", "source");
        let target = commit(&store, &[&y, &x], "t", "target");

        assert_eq!(merge_base(&store, &source, &target).unwrap(), Some(y));
        assert_eq!(merge_base(&store, &target, &source).unwrap(), Some(x));
    }

    #[test]
    fn test_merge_base_is_nearest_common_ancestor() {
        // The target's first parent reaches a quickly, while the newer x is
        // only reachable through a longer second-parent chain.
        let store = MemoryStore::new();
        let a = commit(&store, &[], "v0", "A");
        let x = commit(&store, &[&a], "v1", "X");
        let source = commit(&store, &[&x], "v1", "S");
        let z = commit(&store, &[&x], "v1", "Z");
        let y = commit(&store, &[&z], "v2", "Y");
        let target = commit(&store, &[&a, &y], "v2", "T");

        assert_eq!(merge_base(&store, &source, &target).unwrap(), Some(x.clone()));
        assert_eq!(merge_base(&store, &target, &source).unwrap(), Some(x.clone()));

        let plan = crate::merge::plan(&store, &x, &source, &target).unwrap();
        assert!(matches!(plan, crate::merge::MergePlan::Clean(_)));

        store.create_branch("source", &source).unwrap();
        store.create_branch("target", &target).unwrap();
        let range = resolve(&store, "source", "target").unwrap();
        let shas: Vec<&ObjectId> = range.commits.iter().map(|c| &c.sha).collect();
        assert_eq!(shas, vec![&source]);
    }

    #[test]
    fn test_resolve_empty_when_source_is_base() {
        let store = MemoryStore::new();
        let a = commit(&store, &[], "a", "A");
        let b = commit(&store, &[&a], "b", "B");
        store.create_branch("main", &b).unwrap();
        store.create_branch("stale", &a).unwrap();

        let range = resolve(&store, "stale", "main").unwrap();
        assert_eq!(range.merge_base, a);
        assert!(range.commits.is_empty());
    }

    #[test]
    fn test_resolve_missing_branch() {
        let store = MemoryStore::new();
        let a = commit(&store, &[], "a", "A");
        store.create_branch("main", &a).unwrap();

        assert!(matches!(
            resolve(&store, "nope", "main"),
            Err(Error::InvalidReference { .. })
        ));
    }
}
