// src/normalize.rs
//
// Raw GitHub REST payloads and their mapping onto flat records. Every field
// the API may omit is optional here, so normalization never fails.

use crate::model::{CommitRecord, IssueRecord, PullRequestRecord};
use chrono::{DateTime, Utc};
use serde::Deserialize;

const UNKNOWN_AUTHOR: &str = "Unknown";
const NO_TITLE: &str = "No Title";

#[derive(Debug, Clone, Deserialize)]
pub struct RawUser {
    pub login: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGitSignature {
    pub name: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCommitDetail {
    pub author: Option<RawGitSignature>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStats {
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCommit {
    pub sha: String,
    pub author: Option<RawUser>,
    #[serde(default)]
    pub commit: RawCommitDetail,
    /// Only present on the single-commit endpoint
    pub stats: Option<RawStats>,
    pub files: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPullRequest {
    pub number: u64,
    pub title: Option<String>,
    pub user: Option<RawUser>,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub state: Option<String>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub review_comments: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLabel {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawIssue {
    pub number: u64,
    pub title: Option<String>,
    pub user: Option<RawUser>,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub state: Option<String>,
    #[serde(default)]
    pub labels: Vec<RawLabel>,
    /// Set when the "issue" is actually a pull request
    pub pull_request: Option<serde_json::Value>,
}

impl RawIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

fn login_of(user: Option<&RawUser>) -> Option<String> {
    user.and_then(|u| u.login.clone()).filter(|l| !l.is_empty())
}

pub fn normalize_commit(raw: &RawCommit) -> CommitRecord {
    let signature = raw.commit.author.clone().unwrap_or_default();
    let author = login_of(raw.author.as_ref())
        .or_else(|| signature.name.clone().filter(|n| !n.is_empty()))
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
    let (additions, deletions) = raw
        .stats
        .as_ref()
        .map_or((0, 0), |s| (s.additions, s.deletions));

    CommitRecord {
        sha: raw.sha.clone(),
        author,
        timestamp: signature.date.unwrap_or_default(),
        message: raw.commit.message.clone().unwrap_or_default(),
        additions,
        deletions,
        files_changed: raw.files.as_ref().map_or(0, |f| f.len() as u64),
    }
}

pub fn normalize_pull_request(raw: &RawPullRequest) -> PullRequestRecord {
    let state = if raw.merged_at.is_some() {
        "merged".to_string()
    } else {
        raw.state.clone().unwrap_or_else(|| "open".to_string())
    };

    PullRequestRecord {
        number: raw.number,
        title: raw
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| NO_TITLE.to_string()),
        author: login_of(raw.user.as_ref()).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
        created_at: raw.created_at.unwrap_or_default(),
        closed_at: raw.closed_at,
        merged_at: raw.merged_at,
        state,
        additions: raw.additions.unwrap_or(0),
        deletions: raw.deletions.unwrap_or(0),
        review_comments: raw.review_comments.unwrap_or(0),
    }
}

pub fn normalize_issue(raw: &RawIssue) -> IssueRecord {
    IssueRecord {
        number: raw.number,
        title: raw
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| NO_TITLE.to_string()),
        author: login_of(raw.user.as_ref()).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
        created_at: raw.created_at.unwrap_or_default(),
        closed_at: raw.closed_at,
        state: raw.state.clone().unwrap_or_else(|| "open".to_string()),
        labels: raw.labels.iter().filter_map(|l| l.name.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn commit_without_stats_gets_zero_counts() {
        let raw: RawCommit = serde_json::from_value(json!({
            "sha": "abc123",
            "author": null,
            "commit": {
                "author": { "name": "Jane Doe", "date": "2024-03-01T10:00:00Z" },
                "message": "Fix: Handle AWS S3 timeouts"
            }
        }))
        .unwrap();

        let record = normalize_commit(&raw);
        assert_eq!(record.author, "Jane Doe");
        assert_eq!(record.message, "Fix: Handle AWS S3 timeouts");
        assert_eq!(record.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        assert_eq!((record.additions, record.deletions, record.files_changed), (0, 0, 0));
    }

    #[test]
    fn commit_prefers_login_and_counts_files() {
        let raw: RawCommit = serde_json::from_value(json!({
            "sha": "def456",
            "author": { "login": "jdoe" },
            "commit": {
                "author": { "name": "Jane Doe", "date": "2024-03-01T10:00:00Z" },
                "message": "x"
            },
            "stats": { "additions": 12, "deletions": 3, "total": 15 },
            "files": [ { "filename": "a.rs" }, { "filename": "b.rs" } ]
        }))
        .unwrap();

        let record = normalize_commit(&raw);
        assert_eq!(record.author, "jdoe");
        assert_eq!((record.additions, record.deletions, record.files_changed), (12, 3, 2));
    }

    #[test]
    fn empty_commit_payload_still_normalizes() {
        let raw: RawCommit = serde_json::from_value(json!({ "sha": "0000" })).unwrap();
        let record = normalize_commit(&raw);
        assert_eq!(record.author, "Unknown");
        assert_eq!(record.message, "");
        assert_eq!(record.timestamp, DateTime::<Utc>::default());
    }

    #[test]
    fn merged_pull_request_reports_merged_state() {
        let raw: RawPullRequest = serde_json::from_value(json!({
            "number": 7,
            "title": "",
            "user": { "login": "octo" },
            "created_at": "2024-01-01T00:00:00Z",
            "closed_at": "2024-01-04T00:00:00Z",
            "merged_at": "2024-01-04T00:00:00Z",
            "state": "closed"
        }))
        .unwrap();

        let record = normalize_pull_request(&raw);
        assert_eq!(record.state, "merged");
        assert_eq!(record.title, "No Title");
        assert_eq!(record.additions, 0);
        assert!(record.merged_at.is_some());
    }

    #[test]
    fn issue_labels_and_pull_request_marker() {
        let raw: RawIssue = serde_json::from_value(json!({
            "number": 3,
            "title": "Crash on startup",
            "user": null,
            "created_at": "2024-01-01T00:00:00Z",
            "state": "open",
            "labels": [ { "name": "bug" }, { "name": "p1" } ],
            "pull_request": { "url": "https://api.github.com/repos/o/r/pulls/3" }
        }))
        .unwrap();

        assert!(raw.is_pull_request());
        let record = normalize_issue(&raw);
        assert_eq!(record.labels, vec!["bug", "p1"]);
        assert_eq!(record.author, "Unknown");
        assert_eq!(record.closed_at, None);
    }
}
