//! Object store backed by an on-disk git repository.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use git2::{BranchType, ErrorCode, FileMode as GitMode, ObjectType, Oid, TreeWalkMode, TreeWalkResult};

use crate::error::{Error, Result};
use crate::object::validate_tree;
use crate::{Commit, FileMode, ObjectId, ObjectStore, Signature, TreeEntries, TreeEntry};


/// High-level wrapper around a git repository exposing it as an
/// [`ObjectStore`].
///
/// `git2::Repository` is `Send` but not `Sync`, so a `GitStore` is opened
/// per operation rather than shared; the reference database provides the
/// cross-process atomicity for branch updates.
pub struct GitStore {
    inner: git2::Repository,
}

impl GitStore {
    /// Open the repository at `path` (bare or with a working directory).
    ///
    /// # Errors
    /// Returns `NotARepository` if no repository lives at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let inner = git2::Repository::open(path).map_err(|e| match e.code() {
            ErrorCode::NotFound => Error::NotARepository(path.display().to_string()),
            _ => Error::Git2(e),
        })?;
        Ok(Self { inner })
    }

    /// Initialize an empty bare repository at `path`.
    ///
    /// # Errors
    /// Returns error if the directory cannot be initialized.
    pub fn init_bare(path: impl AsRef<Path>) -> Result<Self> {
        let inner = git2::Repository::init_bare(path)?;
        Ok(Self { inner })
    }

    /// Get the path to the git directory.
    #[must_use]
    pub fn git_dir(&self) -> &Path {
        self.inner.path()
    }

    fn find_branch_oid(&self, name: &str) -> Result<Oid> {
        let branch = self
            .inner
            .find_branch(name, BranchType::Local)
            .map_err(|_| Error::BranchNotFound(name.into()))?;

        branch
            .get()
            .target()
            .ok_or_else(|| Error::BranchNotFound(name.into()))
    }

    fn write_dir(&self, dir: &Dir) -> Result<Oid> {
        let mut builder = self.inner.treebuilder(None)?;
        for (name, (oid, mode)) in &dir.files {
            builder.insert(name.as_str(), *oid, git_mode(*mode))?;
        }
        for (name, child) in &dir.dirs {
            let oid = self.write_dir(child)?;
            builder.insert(name.as_str(), oid, i32::from(GitMode::Tree))?;
        }
        Ok(builder.write()?)
    }
}

/// Nested view of a flattened tree, used to write git trees bottom-up.
#[derive(Default)]
struct Dir {
    files: BTreeMap<String, (Oid, FileMode)>,
    dirs: BTreeMap<String, Dir>,
}

impl Dir {
    fn insert(&mut self, path: &str, entry: (Oid, FileMode)) -> Result<()> {
        match path.split_once('/') {
            None => {
                if self.dirs.contains_key(path) {
                    return Err(Error::InvalidPath(path.to_string()));
                }
                self.files.insert(path.to_string(), entry);
                Ok(())
            }
            Some((head, rest)) => {
                if self.files.contains_key(head) {
                    return Err(Error::InvalidPath(path.to_string()));
                }
                self.dirs.entry(head.to_string()).or_default().insert(rest, entry)
            }
        }
    }
}

fn git_mode(mode: FileMode) -> i32 {
    i32::from(match mode {
        FileMode::Regular => GitMode::Blob,
        FileMode::Executable => GitMode::BlobExecutable,
        FileMode::Symlink => GitMode::Link,
        FileMode::Submodule => GitMode::Commit,
    })
}

/// Map a raw git file mode; trees and unknown modes yield `None`.
fn file_mode(raw: i32) -> Option<FileMode> {
    match raw {
        0o100_644 | 0o100_664 => Some(FileMode::Regular),
        0o100_755 => Some(FileMode::Executable),
        0o120_000 => Some(FileMode::Symlink),
        0o160_000 => Some(FileMode::Submodule),
        _ => None,
    }
}

fn to_oid(id: &ObjectId) -> Result<Oid> {
    Oid::from_str(id.as_str()).map_err(|_| Error::InvalidObjectId(id.to_string()))
}

fn from_oid(oid: Oid) -> ObjectId {
    ObjectId::from_hex_unchecked(oid.to_string())
}

fn not_found(id: &ObjectId, e: git2::Error) -> Error {
    if e.code() == ErrorCode::NotFound {
        Error::ObjectNotFound(id.clone())
    } else {
        Error::Git2(e)
    }
}

fn branch_ref(name: &str) -> String {
    format!("refs/heads/{name}")
}

impl ObjectStore for GitStore {
    fn branch_exists(&self, name: &str) -> bool {
        self.inner.find_branch(name, BranchType::Local).is_ok()
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        let branches = self.inner.branches(Some(BranchType::Local))?;

        let mut names: Vec<String> = branches
            .filter_map(std::result::Result::ok)
            .filter_map(|(b, _)| b.name().ok().flatten().map(String::from))
            .collect();
        names.sort();

        Ok(names)
    }

    fn branch_tip(&self, name: &str) -> Result<ObjectId> {
        self.find_branch_oid(name).map(from_oid)
    }

    fn create_branch(&self, name: &str, target: &ObjectId) -> Result<()> {
        if self.branch_exists(name) {
            return Err(Error::BranchExists(name.to_string()));
        }
        let commit = self
            .inner
            .find_commit(to_oid(target)?)
            .map_err(|e| not_found(target, e))?;
        self.inner.branch(name, &commit, false)?;
        Ok(())
    }

    fn compare_and_swap_branch(
        &self,
        name: &str,
        expected: &ObjectId,
        new: &ObjectId,
    ) -> Result<bool> {
        // Fail early with BranchNotFound rather than a generic git error
        self.find_branch_oid(name)?;
        let new_oid = to_oid(new)?;
        self.inner
            .find_commit(new_oid)
            .map_err(|e| not_found(new, e))?;

        let result = self.inner.reference_matching(
            &branch_ref(name),
            new_oid,
            true,
            to_oid(expected)?,
            &format!("mergeway: move {name} to {}", new.short()),
        );

        match result {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.code(), ErrorCode::Modified | ErrorCode::Locked) => Ok(false),
            Err(e) => Err(Error::Git2(e)),
        }
    }

    fn commit(&self, id: &ObjectId) -> Result<Commit> {
        let commit = self
            .inner
            .find_commit(to_oid(id)?)
            .map_err(|e| not_found(id, e))?;

        let author = commit.author();
        let time = DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0).unwrap_or_default();

        Ok(Commit {
            id: id.clone(),
            parents: commit.parent_ids().map(from_oid).collect(),
            tree: from_oid(commit.tree_id()),
            author: Signature::new(
                author.name().unwrap_or_default(),
                author.email().unwrap_or_default(),
            ),
            message: commit.message().unwrap_or_default().to_string(),
            time,
        })
    }

    fn tree(&self, id: &ObjectId) -> Result<TreeEntries> {
        let tree = self
            .inner
            .find_tree(to_oid(id)?)
            .map_err(|e| not_found(id, e))?;

        let mut entries = TreeEntries::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Tree) {
                return TreeWalkResult::Ok;
            }
            if let (Some(name), Some(mode)) = (entry.name(), file_mode(entry.filemode())) {
                entries.insert(
                    format!("{root}{name}"),
                    TreeEntry::new(from_oid(entry.id()), mode),
                );
            }
            TreeWalkResult::Ok
        })?;

        Ok(entries)
    }

    fn blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
        let blob = self
            .inner
            .find_blob(to_oid(id)?)
            .map_err(|e| not_found(id, e))?;
        Ok(blob.content().to_vec())
    }

    fn put_blob(&self, content: &[u8]) -> Result<ObjectId> {
        Ok(from_oid(self.inner.blob(content)?))
    }

    fn put_tree(&self, entries: &TreeEntries) -> Result<ObjectId> {
        validate_tree(entries)?;
        let mut root = Dir::default();
        for (path, entry) in entries {
            root.insert(path, (to_oid(&entry.id)?, entry.mode))?;
        }
        self.write_dir(&root).map(from_oid)
    }

    fn put_commit(
        &self,
        parents: &[ObjectId],
        tree: &ObjectId,
        author: &Signature,
        message: &str,
    ) -> Result<ObjectId> {
        let tree = self
            .inner
            .find_tree(to_oid(tree)?)
            .map_err(|e| not_found(tree, e))?;

        let parents = parents
            .iter()
            .map(|id| {
                self.inner
                    .find_commit(to_oid(id)?)
                    .map_err(|e| not_found(id, e))
            })
            .collect::<Result<Vec<_>>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let sig = git2::Signature::now(&author.name, &author.email)?;
        let oid = self
            .inner
            .commit(None, &sig, &sig, message, &tree, &parent_refs)?;

        Ok(from_oid(oid))
    }
}

impl std::fmt::Debug for GitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitStore")
            .field("path", &self.git_dir())
            .finish()
    }
}
