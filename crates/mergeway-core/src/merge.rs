//! Three-way merge of flattened trees.
//!
//! The computation is split in two: [`plan`] decides the outcome without
//! writing anything, and [`merge`] additionally stores the merged tree and
//! commit. Neither moves a branch; that is the caller's compare-and-swap.

use std::collections::BTreeSet;
use std::fmt;

use mergeway_store::{ObjectId, ObjectStore, Signature, TreeEntries, TreeEntry};
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// Why a path could not be merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Both sides changed the file to different contents.
    BothModified,
    /// The source deleted a file the target modified.
    DeletedBySource,
    /// The target deleted a file the source modified.
    DeletedByTarget,
    /// Both sides added the file with different contents.
    BothAdded,
    /// The merged tree would hold this path as a file and as a directory.
    FileDirectory,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BothModified => "both modified",
            Self::DeletedBySource => "deleted by source",
            Self::DeletedByTarget => "deleted by target",
            Self::BothAdded => "both added",
            Self::FileDirectory => "file/directory clash",
        })
    }
}

/// A single conflicting path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathConflict {
    pub path: String,
    pub reason: ConflictReason,
}

/// Every conflict found by a three-way merge, sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    pub conflicts: Vec<PathConflict>,
}

impl ConflictReport {
    /// Conflicting paths, in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.conflicts.iter().map(|c| c.path.as_str())
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, conflict) in self.conflicts.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} ({})", conflict.path, conflict.reason)?;
        }
        Ok(())
    }
}

/// Merge three flattened trees path by path.
///
/// Blob ids stand in for content, so equal ids mean equal files. Content
/// and file mode are merged independently, so an executable bit set on
/// one side survives a content change on the other.
///
/// # Errors
/// Returns the full [`ConflictReport`] if any path conflicts.
pub fn three_way(
    base: &TreeEntries,
    source: &TreeEntries,
    target: &TreeEntries,
) -> std::result::Result<TreeEntries, ConflictReport> {
    let paths: BTreeSet<&String> = base.keys().chain(source.keys()).chain(target.keys()).collect();

    let mut merged = TreeEntries::new();
    let mut report = ConflictReport::default();
    for path in paths {
        let (b, s, t) = (base.get(path), source.get(path), target.get(path));
        let resolved = if s == t || s == b {
            t.cloned()
        } else if t == b {
            s.cloned()
        } else if let Some(entry) = merge_parts(b, s, t) {
            Some(entry)
        } else {
            let reason = match (b, s, t) {
                (None, _, _) => ConflictReason::BothAdded,
                (Some(_), None, _) => ConflictReason::DeletedBySource,
                (Some(_), _, None) => ConflictReason::DeletedByTarget,
                (Some(_), Some(_), Some(_)) => ConflictReason::BothModified,
            };
            report.conflicts.push(PathConflict {
                path: path.clone(),
                reason,
            });
            continue;
        };
        if let Some(entry) = resolved {
            merged.insert(path.clone(), entry);
        }
    }

    let dirs: BTreeSet<&str> = merged
        .keys()
        .flat_map(|path| path.match_indices('/').map(move |(i, _)| &path[..i]))
        .collect();
    for path in merged.keys().filter(|path| dirs.contains(path.as_str())) {
        report.conflicts.push(PathConflict {
            path: path.clone(),
            reason: ConflictReason::FileDirectory,
        });
    }
    report.conflicts.sort_by(|a, b| a.path.cmp(&b.path));

    if report.conflicts.is_empty() {
        Ok(merged)
    } else {
        Err(report)
    }
}

/// Resolve a path changed on both sides when one side changed only the
/// content and the other only the mode.
fn merge_parts(
    base: Option<&TreeEntry>,
    source: Option<&TreeEntry>,
    target: Option<&TreeEntry>,
) -> Option<TreeEntry> {
    fn pick<T: PartialEq + Clone>(base: &T, source: &T, target: &T) -> Option<T> {
        if source == target || source == base {
            Some(target.clone())
        } else if target == base {
            Some(source.clone())
        } else {
            None
        }
    }

    let (base, source, target) = (base?, source?, target?);
    Some(TreeEntry::new(
        pick(&base.id, &source.id, &target.id)?,
        pick(&base.mode, &source.mode, &target.mode)?,
    ))
}

/// Outcome of a merge, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergePlan {
    /// The target is an ancestor of the source.
    FastForward,
    /// A merge commit with this tree would be conflict free.
    Clean(TreeEntries),
    /// At least one path conflicts; nothing may be written.
    Conflicted(ConflictReport),
}

/// Decide how `source_tip` merges into `target_tip` given their base.
///
/// # Errors
/// Returns error if a commit or tree cannot be read.
pub fn plan<S: ObjectStore>(
    store: &S,
    merge_base: &ObjectId,
    source_tip: &ObjectId,
    target_tip: &ObjectId,
) -> Result<MergePlan> {
    // The base equals the target exactly when the target is an ancestor of
    // the source.
    if merge_base == target_tip {
        return Ok(MergePlan::FastForward);
    }

    let tree_of = |id: &ObjectId| -> Result<TreeEntries> {
        let commit = store.commit(id)?;
        Ok(store.tree(&commit.tree)?)
    };
    let base = tree_of(merge_base)?;
    let source = tree_of(source_tip)?;
    let target = tree_of(target_tip)?;

    let plan = match three_way(&base, &source, &target) {
        Ok(tree) => MergePlan::Clean(tree),
        Err(report) => MergePlan::Conflicted(report),
    };
    debug!(
        base = merge_base.short(),
        source = source_tip.short(),
        target = target_tip.short(),
        clean = matches!(plan, MergePlan::Clean(_)),
        "computed three-way merge"
    );
    Ok(plan)
}

/// Result of [`merge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    /// Move the target to `new_target_tip`; no commit was written.
    FastForward { new_target_tip: ObjectId },
    /// A merge commit with parents `[target, source]` was written.
    Merged { commit: ObjectId, tree: ObjectId },
    /// Nothing was written.
    Conflict(ConflictReport),
}

/// Compute and store the merge of `source_tip` into `target_tip`.
///
/// # Errors
/// Returns error if the store cannot be read or written.
pub fn merge<S: ObjectStore>(
    store: &S,
    merge_base: &ObjectId,
    source_tip: &ObjectId,
    target_tip: &ObjectId,
    committer: &Signature,
    message: &str,
) -> Result<MergeResult> {
    match plan(store, merge_base, source_tip, target_tip)? {
        MergePlan::FastForward => Ok(MergeResult::FastForward {
            new_target_tip: source_tip.clone(),
        }),
        MergePlan::Conflicted(report) => Ok(MergeResult::Conflict(report)),
        MergePlan::Clean(entries) => {
            let tree = store.put_tree(&entries)?;
            let parents = [target_tip.clone(), source_tip.clone()];
            let commit = store.put_commit(&parents, &tree, committer, message)?;
            Ok(MergeResult::Merged { commit, tree })
        }
    }
}

/// Read-only view of whether a pull request can be merged right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mergeability {
    pub source_tip: ObjectId,
    pub target_tip: ObjectId,
    pub merge_base: ObjectId,
    pub mergeable: bool,
    pub status: MergeStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<PathConflict>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    FastForward,
    Clean,
    Conflicted,
}

impl Mergeability {
    /// Summarize a plan computed at the given tips.
    #[must_use]
    pub fn from_plan(
        plan: MergePlan,
        source_tip: ObjectId,
        target_tip: ObjectId,
        merge_base: ObjectId,
    ) -> Self {
        let (status, conflicts) = match plan {
            MergePlan::FastForward => (MergeStatus::FastForward, Vec::new()),
            MergePlan::Clean(_) => (MergeStatus::Clean, Vec::new()),
            MergePlan::Conflicted(report) => (MergeStatus::Conflicted, report.conflicts),
        };
        Self {
            source_tip,
            target_tip,
            merge_base,
            mergeable: status != MergeStatus::Conflicted,
            status,
            conflicts,
        }
    }

    /// Whether this result was computed at exactly these tips.
    #[must_use]
    pub fn observed_at(&self, source_tip: &ObjectId, target_tip: &ObjectId) -> bool {
        &self.source_tip == source_tip && &self.target_tip == target_tip
    }
}
