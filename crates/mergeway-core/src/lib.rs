//! # mergeway-core
//!
//! Pull request lifecycle and merge engine for mergeway.
//!
//! - [`Engine`] owns the state machine: create, update, close and merge
//! - [`resolver`] computes merge bases and the commits a branch adds
//! - [`merge`] performs three-way merges of flattened trees
//! - [`State`] persists records as one JSON file per repository
//! - [`Config`] is the TOML configuration shared with the server

pub mod branch_name;
pub mod config;
mod engine;
pub mod error;
pub mod merge;
pub mod provider;
pub mod pull_request;
mod registry;
pub mod resolver;
pub mod state;
pub mod traits;

pub use branch_name::BranchName;
pub use config::Config;
pub use engine::Engine;
pub use error::{Error, Result};
pub use merge::{ConflictReason, ConflictReport, MergeStatus, Mergeability, PathConflict};
pub use provider::{GitRepositories, MemoryRepositories};
pub use pull_request::{NewPullRequest, PullFilter, PullRequest, PullRequestPatch, PullState};
pub use resolver::{CommitRange, CommitSummary};
pub use state::{MemoryRecords, RepoSnapshot, State};
pub use traits::{RecordStore, StoreProvider};
