//! Pull request record and its state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use mergeway_store::ObjectId;
use serde::{Deserialize, Serialize};

use crate::BranchName;
use crate::error::{Error, Result};

/// Lifecycle state of a pull request.
///
/// `Merged` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullState {
    Open,
    Merged,
    Closed,
}

/// An edge of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Merge,
    Close,
}

impl PullState {
    /// State reached by taking `transition`, or `None` if the edge does
    /// not exist.
    #[must_use]
    pub const fn apply(self, transition: Transition) -> Option<Self> {
        match (self, transition) {
            (Self::Open, Transition::Merge) => Some(Self::Merged),
            (Self::Open, Transition::Close) => Some(Self::Closed),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for PullState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Merged => "merged",
            Self::Closed => "closed",
        })
    }
}

/// A proposal to integrate `source_branch` into `target_branch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Pull request number, unique within its repository.
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub source_branch: BranchName,
    pub target_branch: BranchName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub state: PullState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Tip of the target branch right after the merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_commit: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    /// Build a fresh open pull request.
    #[must_use]
    pub fn open(
        id: u64,
        request: NewPullRequest,
        source_branch: BranchName,
        target_branch: BranchName,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: request.title,
            description: request.description,
            source_branch,
            target_branch,
            author: request.author,
            state: PullState::Open,
            created_at: now,
            updated_at: now,
            merge_commit: None,
            merged_at: None,
            closed_at: None,
        }
    }

    /// Fail with [`Error::InvalidState`] unless the pull request is open.
    ///
    /// # Errors
    /// Returns `InvalidState` naming `action` for merged or closed records.
    pub fn ensure_open(&self, action: &'static str) -> Result<()> {
        if self.state.is_open() {
            Ok(())
        } else {
            Err(Error::InvalidState {
                id: self.id,
                state: self.state,
                action,
            })
        }
    }

    /// Record a successful merge that left the target at `merge_commit`.
    ///
    /// # Errors
    /// Returns `InvalidState` unless open.
    pub fn mark_merged(&mut self, merge_commit: ObjectId, now: DateTime<Utc>) -> Result<()> {
        self.state = self.transition(Transition::Merge, "merge")?;
        self.merge_commit = Some(merge_commit);
        self.merged_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Close without merging.
    ///
    /// # Errors
    /// Returns `InvalidState` unless open.
    pub fn mark_closed(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.state = self.transition(Transition::Close, "close")?;
        self.closed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    fn transition(&self, transition: Transition, action: &'static str) -> Result<PullState> {
        self.state
            .apply(transition)
            .ok_or(Error::InvalidState {
                id: self.id,
                state: self.state,
                action,
            })
    }
}

/// Fields supplied when opening a pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPullRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub source_branch: String,
    pub target_branch: String,
    #[serde(default)]
    pub author: Option<String>,
}

/// Editable fields; `None` leaves the field as is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullRequestPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub target_branch: Option<String>,
    /// Close the pull request in the same change.
    #[serde(default)]
    pub close: bool,
}

impl PullRequestPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.target_branch.is_none()
            && !self.close
    }
}

/// Criteria for listing pull requests.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PullFilter {
    pub state: Option<PullState>,
}

impl PullFilter {
    #[must_use]
    pub fn matches(&self, pr: &PullRequest) -> bool {
        self.state.is_none_or(|state| state == pr.state)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> PullRequest {
        let request = NewPullRequest {
            title: "Add login".into(),
            description: String::new(),
            source_branch: "feature".into(),
            target_branch: "main".into(),
            author: Some("ada".into()),
        };
        PullRequest::open(
            1,
            request,
            BranchName::new("feature").unwrap(),
            BranchName::new("main").unwrap(),
            Utc::now(),
        )
    }

    fn commit_id() -> ObjectId {
        ObjectId::parse("c0ffee").unwrap()
    }

    #[test]
    fn test_transition_table() {
        assert_eq!(PullState::Open.apply(Transition::Merge), Some(PullState::Merged));
        assert_eq!(PullState::Open.apply(Transition::Close), Some(PullState::Closed));
        for terminal in [PullState::Merged, PullState::Closed] {
            assert_eq!(terminal.apply(Transition::Merge), None);
            assert_eq!(terminal.apply(Transition::Close), None);
        }
    }

    #[test]
    fn test_mark_merged() {
        let mut pr = sample();
        let now = Utc::now();
        pr.mark_merged(commit_id(), now).unwrap();

        assert_eq!(pr.state, PullState::Merged);
        assert_eq!(pr.merge_commit, Some(commit_id()));
        assert_eq!(pr.merged_at, Some(now));
        assert_eq!(pr.updated_at, now);
    }

    #[test]
    fn test_terminal_states_reject_changes() {
        let mut pr = sample();
        pr.mark_closed(Utc::now()).unwrap();
        let before = pr.clone();

        assert!(matches!(
            pr.mark_merged(commit_id(), Utc::now()),
            Err(Error::InvalidState { state: PullState::Closed, action: "merge", .. })
        ));
        assert!(pr.mark_closed(Utc::now()).is_err());
        assert_eq!(pr, before);
    }

    #[test]
    fn test_serialized_shape() {
        let pr = sample();
        let json = serde_json::to_value(&pr).unwrap();

        assert_eq!(json["state"], "open");
        assert_eq!(json["source_branch"], "feature");
        assert_eq!(json["author"], "ada");
        assert!(json.get("merge_commit").is_none());
    }

    #[test]
    fn test_filter() {
        let mut pr = sample();
        assert!(PullFilter::default().matches(&pr));
        assert!(PullFilter { state: Some(PullState::Open) }.matches(&pr));

        pr.mark_closed(Utc::now()).unwrap();
        assert!(!PullFilter { state: Some(PullState::Open) }.matches(&pr));
    }

    #[test]
    fn test_new_request_defaults() {
        let request: NewPullRequest = serde_json::from_str(
            r#"{"title":"t","source_branch":"a","target_branch":"b"}"#,
        )
        .unwrap();
        assert!(request.description.is_empty());
        assert!(request.author.is_none());
    }
}
