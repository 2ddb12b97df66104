// src/model.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a hosted repository, e.g. `rust-lang/rust`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Directory-safe name used for snapshot storage
    pub fn slug(&self) -> String {
        format!("{}__{}", self.owner, self.repo)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// The three resource types pulled from the hosting API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Commits,
    PullRequests,
    Issues,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Commits, Resource::PullRequests, Resource::Issues];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Commits => "commits",
            Resource::PullRequests => "pull_requests",
            Resource::Issues => "issues",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single commit, flattened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub sha: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub additions: u64,
    pub deletions: u64,
    pub files_changed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub state: String,
    pub additions: u64,
    pub deletions: u64,
    pub review_comments: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub state: String,
    /// Label names in API order
    pub labels: Vec<String>,
}

/// Everything collected for one repository. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepoTables {
    pub commits: Vec<CommitRecord>,
    pub pull_requests: Vec<PullRequestRecord>,
    pub issues: Vec<IssueRecord>,
}

impl RepoTables {
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty() && self.pull_requests.is_empty() && self.issues.is_empty()
    }
}
