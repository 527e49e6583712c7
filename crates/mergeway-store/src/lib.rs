//! # mergeway-store
//!
//! Object store abstraction for mergeway: an addressable graph of
//! immutable commits, trees and blobs keyed by content hash, plus branch
//! references that only move through compare-and-swap.
//!
//! Two backends are provided: [`MemoryStore`], an in-memory arena, and
//! [`GitStore`], an on-disk git repository built on git2-rs.

mod error;
mod git;
mod memory;
mod object;
mod traits;

pub use error::{Error, Result};
pub use git::GitStore;
pub use memory::MemoryStore;
pub use object::{Commit, FileMode, ObjectId, Signature, TreeEntries, TreeEntry};
pub use traits::ObjectStore;
