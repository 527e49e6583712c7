//! Trait abstraction over the object store.
//!
//! This module defines the `ObjectStore` trait which abstracts the
//! content-addressed graph and branch references, enabling the merge engine
//! to run against an in-memory arena or an on-disk git repository.

use crate::{Commit, ObjectId, Result, Signature, TreeEntries, TreeEntry};

/// Trait for object store operations.
///
/// Objects are immutable once written; the only mutable state is the set of
/// branch references, and those only move through
/// [`compare_and_swap_branch`](ObjectStore::compare_and_swap_branch).
///
/// Note: like `git2`, all operations are synchronous.
#[allow(clippy::missing_errors_doc)]
pub trait ObjectStore {
    // === Branches ===

    /// Check if a branch exists.
    fn branch_exists(&self, name: &str) -> bool;

    /// List all branches, sorted by name.
    fn list_branches(&self) -> Result<Vec<String>>;

    /// Get the commit a branch currently points to.
    fn branch_tip(&self, name: &str) -> Result<ObjectId>;

    /// Create a branch pointing at `target`.
    ///
    /// Fails with `BranchExists` if the name is taken.
    fn create_branch(&self, name: &str, target: &ObjectId) -> Result<()>;

    /// Atomically move `name` from `expected` to `new`.
    ///
    /// Returns `Ok(false)` when the branch no longer points at `expected`.
    fn compare_and_swap_branch(&self, name: &str, expected: &ObjectId, new: &ObjectId)
    -> Result<bool>;

    // === Reads ===

    /// Read a commit.
    fn commit(&self, id: &ObjectId) -> Result<Commit>;

    /// Read a tree, flattened to `path -> entry`.
    fn tree(&self, id: &ObjectId) -> Result<TreeEntries>;

    /// Read a blob's bytes.
    fn blob(&self, id: &ObjectId) -> Result<Vec<u8>>;

    // === Writes ===

    /// Store a blob.
    fn put_blob(&self, content: &[u8]) -> Result<ObjectId>;

    /// Store a tree from flattened entries.
    ///
    /// Fails with `InvalidPath` if a path is malformed or is both a file
    /// and a directory.
    fn put_tree(&self, entries: &TreeEntries) -> Result<ObjectId>;

    /// Store a commit. Does not move any branch.
    fn put_commit(
        &self,
        parents: &[ObjectId],
        tree: &ObjectId,
        author: &Signature,
        message: &str,
    ) -> Result<ObjectId>;

    /// Store a full snapshot of text files (blobs, tree and commit) in one call.
    fn commit_files(
        &self,
        parents: &[ObjectId],
        files: &[(&str, &str)],
        author: &Signature,
        message: &str,
    ) -> Result<ObjectId> {
        let mut entries = TreeEntries::new();
        for (path, content) in files {
            let blob = self.put_blob(content.as_bytes())?;
            entries.insert((*path).to_string(), TreeEntry::file(blob));
        }
        let tree = self.put_tree(&entries)?;
        self.put_commit(parents, &tree, author, message)
    }
}
