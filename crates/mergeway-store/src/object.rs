//! Object model shared by every store backend.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Hex-encoded content hash of a blob, tree or commit.
///
/// Ids are compared as opaque strings; each backend decides the hash
/// function (SHA-256 for the memory arena, SHA-1 for git).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse an id from its hex form.
    ///
    /// # Errors
    /// Returns [`Error::InvalidObjectId`] if the string is empty or not
    /// lowercase hex.
    pub fn parse(hex: impl Into<String>) -> Result<Self, Error> {
        let hex = hex.into();
        let valid = !hex.is_empty()
            && hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if valid {
            Ok(Self(hex))
        } else {
            Err(Error::InvalidObjectId(hex))
        }
    }

    pub(crate) const fn from_hex_unchecked(hex: String) -> Self {
        Self(hex)
    }

    /// The id as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight hex digits, for log lines and commit messages.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ObjectId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(s).map_err(serde::de::Error::custom)
    }
}

/// Kind of a tree entry, mirroring the git file modes a tree can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileMode {
    /// Regular file (`100644`).
    #[default]
    Regular,
    /// Executable file (`100755`).
    Executable,
    /// Symbolic link; the blob holds the link target (`120000`).
    Symlink,
    /// Submodule commit recorded by id only (`160000`).
    Submodule,
}

impl FileMode {
    /// Short tag used when hashing trees.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Executable => "executable",
            Self::Symlink => "symlink",
            Self::Submodule => "submodule",
        }
    }

    /// Whether the entry's id names a blob in this store.
    #[must_use]
    pub const fn is_blob(self) -> bool {
        !matches!(self, Self::Submodule)
    }
}

/// One path of a flattened tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeEntry {
    /// Blob id, or the submodule commit for [`FileMode::Submodule`].
    pub id: ObjectId,
    pub mode: FileMode,
}

impl TreeEntry {
    /// An entry with an explicit mode.
    #[must_use]
    pub const fn new(id: ObjectId, mode: FileMode) -> Self {
        Self { id, mode }
    }

    /// A regular file.
    #[must_use]
    pub const fn file(id: ObjectId) -> Self {
        Self::new(id, FileMode::Regular)
    }
}

/// Flattened tree: path (components joined with `/`) to entry.
pub type TreeEntries = BTreeMap<String, TreeEntry>;

/// Author or committer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

impl Signature {
    /// Create a signature.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// A commit as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Commit id.
    pub id: ObjectId,
    /// Parent commit ids, in order (first parent first).
    pub parents: Vec<ObjectId>,
    /// Root tree id.
    pub tree: ObjectId,
    /// Commit author.
    pub author: Signature,
    /// Full commit message.
    pub message: String,
    /// Commit timestamp.
    pub time: DateTime<Utc>,
}

impl Commit {
    /// First line of the commit message.
    #[must_use]
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// Check that a flattened tree path can be stored.
pub(crate) fn validate_path(path: &str) -> Result<(), Error> {
    let ok = !path.is_empty()
        && path
            .split('/')
            .all(|component| !component.is_empty() && component != "." && component != "..");
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidPath(path.to_string()))
    }
}

/// Check every path of a tree and that no path is also used as a
/// directory by another entry.
pub(crate) fn validate_tree(entries: &TreeEntries) -> Result<(), Error> {
    let mut dirs = BTreeSet::new();
    for path in entries.keys() {
        validate_path(path)?;
        dirs.extend(path.match_indices('/').map(|(i, _)| &path[..i]));
    }
    match entries.keys().find(|path| dirs.contains(path.as_str())) {
        Some(path) => Err(Error::InvalidPath(path.clone())),
        None => Ok(()),
    }
}
