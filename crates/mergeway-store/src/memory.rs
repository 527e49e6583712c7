//! In-memory arena of immutable, hash-keyed objects.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::object::validate_tree;
use crate::{Commit, ObjectId, ObjectStore, Signature, TreeEntries};

#[derive(Debug, Clone)]
enum Object {
    Blob(Vec<u8>),
    Tree(TreeEntries),
    Commit {
        parents: Vec<ObjectId>,
        tree: ObjectId,
        author: Signature,
        message: String,
        time: DateTime<Utc>,
    },
}

#[derive(Debug, Default)]
struct Arena {
    objects: HashMap<ObjectId, Object>,
    branches: HashMap<String, ObjectId>,
}

/// Object store kept entirely in memory.
///
/// Cloning is cheap and every clone shares the same arena, so one
/// `MemoryStore` can be handed to many concurrent callers.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    arena: Arc<RwLock<Arena>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects (blobs, trees and commits).
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.arena.read().objects.len()
    }

    fn insert(&self, id: ObjectId, object: Object) -> ObjectId {
        self.arena.write().objects.entry(id.clone()).or_insert(object);
        id
    }

    fn get(&self, id: &ObjectId) -> Result<Object> {
        self.arena
            .read()
            .objects
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ObjectNotFound(id.clone()))
    }

    fn require_commit(&self, id: &ObjectId) -> Result<()> {
        match self.get(id)? {
            Object::Commit { .. } => Ok(()),
            _ => Err(Error::UnexpectedKind {
                id: id.clone(),
                expected: "commit",
            }),
        }
    }
}

fn hash(kind: &str, parts: &[&[u8]]) -> ObjectId {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0]);
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    ObjectId::from_hex_unchecked(hex::encode(hasher.finalize()))
}

impl ObjectStore for MemoryStore {
    fn branch_exists(&self, name: &str) -> bool {
        self.arena.read().branches.contains_key(name)
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.arena.read().branches.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn branch_tip(&self, name: &str) -> Result<ObjectId> {
        self.arena
            .read()
            .branches
            .get(name)
            .cloned()
            .ok_or_else(|| Error::BranchNotFound(name.to_string()))
    }

    fn create_branch(&self, name: &str, target: &ObjectId) -> Result<()> {
        self.require_commit(target)?;
        let mut arena = self.arena.write();
        if arena.branches.contains_key(name) {
            return Err(Error::BranchExists(name.to_string()));
        }
        arena.branches.insert(name.to_string(), target.clone());
        Ok(())
    }

    fn compare_and_swap_branch(
        &self,
        name: &str,
        expected: &ObjectId,
        new: &ObjectId,
    ) -> Result<bool> {
        self.require_commit(new)?;
        let mut arena = self.arena.write();
        let current = arena
            .branches
            .get_mut(name)
            .ok_or_else(|| Error::BranchNotFound(name.to_string()))?;
        if current != expected {
            return Ok(false);
        }
        *current = new.clone();
        Ok(true)
    }

    fn commit(&self, id: &ObjectId) -> Result<Commit> {
        match self.get(id)? {
            Object::Commit {
                parents,
                tree,
                author,
                message,
                time,
            } => Ok(Commit {
                id: id.clone(),
                parents,
                tree,
                author,
                message,
                time,
            }),
            _ => Err(Error::UnexpectedKind {
                id: id.clone(),
                expected: "commit",
            }),
        }
    }

    fn tree(&self, id: &ObjectId) -> Result<TreeEntries> {
        match self.get(id)? {
            Object::Tree(entries) => Ok(entries),
            _ => Err(Error::UnexpectedKind {
                id: id.clone(),
                expected: "tree",
            }),
        }
    }

    fn blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
        match self.get(id)? {
            Object::Blob(content) => Ok(content),
            _ => Err(Error::UnexpectedKind {
                id: id.clone(),
                expected: "blob",
            }),
        }
    }

    fn put_blob(&self, content: &[u8]) -> Result<ObjectId> {
        let id = hash("blob", &[content]);
        Ok(self.insert(id, Object::Blob(content.to_vec())))
    }

    fn put_tree(&self, entries: &TreeEntries) -> Result<ObjectId> {
        validate_tree(entries)?;
        let mut parts: Vec<&[u8]> = Vec::with_capacity(entries.len() * 3);
        for (path, entry) in entries {
            if entry.mode.is_blob() {
                self.blob(&entry.id)?;
            }
            parts.push(path.as_bytes());
            parts.push(entry.mode.as_str().as_bytes());
            parts.push(entry.id.as_str().as_bytes());
        }
        let id = hash("tree", &parts);
        Ok(self.insert(id, Object::Tree(entries.clone())))
    }

    fn put_commit(
        &self,
        parents: &[ObjectId],
        tree: &ObjectId,
        author: &Signature,
        message: &str,
    ) -> Result<ObjectId> {
        self.tree(tree)?;
        for parent in parents {
            self.require_commit(parent)?;
        }

        let time = Utc::now();
        let stamp = time.timestamp_nanos_opt().unwrap_or_default().to_be_bytes();
        let author_line = author.to_string();
        let mut parts: Vec<&[u8]> = vec![tree.as_str().as_bytes()];
        parts.extend(parents.iter().map(|p| p.as_str().as_bytes()));
        parts.push(author_line.as_bytes());
        parts.push(message.as_bytes());
        parts.push(&stamp);
        let id = hash("commit", &parts);

        Ok(self.insert(
            id,
            Object::Commit {
                parents: parents.to_vec(),
                tree: tree.clone(),
                author: author.clone(),
                message: message.to_string(),
                time,
            },
        ))
    }
}
