// src/snapshot.rs
//
// CSV snapshots of the collected tables, one directory per repository.
// Each collection run overwrites the files of the resources it fetched.

use crate::error::{Error, Result};
use crate::model::{IssueRecord, RepoId, RepoTables, Resource};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const METRICS_FILE: &str = "metrics.csv";

/// One flattened metric value, e.g. `("commits_by_hour", "14", 32.0)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub metric: String,
    pub key: String,
    pub value: f64,
}

/// Issue shape on disk; labels are stored as a JSON array in one cell
#[derive(Debug, Serialize, Deserialize)]
struct IssueRow {
    number: u64,
    title: String,
    author: String,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    state: String,
    labels: String,
}

impl TryFrom<&IssueRecord> for IssueRow {
    type Error = Error;

    fn try_from(issue: &IssueRecord) -> Result<Self> {
        Ok(Self {
            number: issue.number,
            title: issue.title.clone(),
            author: issue.author.clone(),
            created_at: issue.created_at,
            closed_at: issue.closed_at,
            state: issue.state.clone(),
            labels: serde_json::to_string(&issue.labels)?,
        })
    }
}

impl TryFrom<IssueRow> for IssueRecord {
    type Error = Error;

    fn try_from(row: IssueRow) -> Result<Self> {
        let labels = if row.labels.is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&row.labels)?
        };
        Ok(Self {
            number: row.number,
            title: row.title,
            author: row.author,
            created_at: row.created_at,
            closed_at: row.closed_at,
            state: row.state,
            labels,
        })
    }
}

pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = records.len(), "wrote csv");
    Ok(())
}

pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
    Ok(records)
}

pub fn file_name(resource: Resource) -> &'static str {
    match resource {
        Resource::Commits => "commits.csv",
        Resource::PullRequests => "pull_requests.csv",
        Resource::Issues => "issues.csv",
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn repo_dir(&self, repo: &RepoId) -> PathBuf {
        self.root.join(repo.slug())
    }

    pub fn exists(&self, repo: &RepoId) -> bool {
        self.repo_dir(repo).join(file_name(Resource::Commits)).is_file()
    }

    /// Writes the given resource tables, replacing earlier snapshots.
    pub fn save(
        &self,
        repo: &RepoId,
        tables: &RepoTables,
        resources: &[Resource],
    ) -> Result<PathBuf> {
        let dir = self.repo_dir(repo);
        fs::create_dir_all(&dir)?;

        for resource in resources {
            let path = dir.join(file_name(*resource));
            match resource {
                Resource::Commits => write_records(&path, &tables.commits)?,
                Resource::PullRequests => write_records(&path, &tables.pull_requests)?,
                Resource::Issues => {
                    let rows = tables
                        .issues
                        .iter()
                        .map(IssueRow::try_from)
                        .collect::<Result<Vec<_>>>()?;
                    write_records(&path, &rows)?
                }
            }
        }

        Ok(dir)
    }

    /// Loads a snapshot. Resource files that were never written load empty.
    pub fn load(&self, repo: &RepoId) -> Result<RepoTables> {
        let dir = self.repo_dir(repo);
        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "no snapshot for {} in {}; run `collect` first",
                repo,
                self.root.display()
            )));
        }

        let load = |resource: Resource| -> Option<PathBuf> {
            let path = dir.join(file_name(resource));
            path.is_file().then_some(path)
        };

        let mut tables = RepoTables::default();
        if let Some(path) = load(Resource::Commits) {
            tables.commits = read_records(&path)?;
        }
        if let Some(path) = load(Resource::PullRequests) {
            tables.pull_requests = read_records(&path)?;
        }
        if let Some(path) = load(Resource::Issues) {
            let rows: Vec<IssueRow> = read_records(&path)?;
            tables.issues = rows
                .into_iter()
                .map(IssueRecord::try_from)
                .collect::<Result<Vec<_>>>()?;
        }
        Ok(tables)
    }

    pub fn save_metrics(&self, repo: &RepoId, rows: &[MetricRow]) -> Result<PathBuf> {
        let dir = self.repo_dir(repo);
        fs::create_dir_all(&dir)?;
        let path = dir.join(METRICS_FILE);
        write_records(&path, rows)?;
        Ok(path)
    }

    pub fn load_metrics(&self, repo: &RepoId) -> Result<Vec<MetricRow>> {
        read_records(&self.repo_dir(repo).join(METRICS_FILE))
    }
}
