// src/analyzer.rs

use crate::model::*;
use crate::snapshot::MetricRow;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

pub const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

static COMMIT_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+):").expect("static regex is valid"));

/// One row of the contributor ranking
#[derive(Debug, Clone, PartialEq)]
pub struct ContributorRank {
    pub author: String,
    pub commits: u64,
    pub first_commit: DateTime<Utc>,
}

/// Per-author activity, as shown on a developer page
#[derive(Debug, Clone, PartialEq)]
pub struct DeveloperProfile {
    pub author: String,
    pub commits: u64,
    pub first_commit: DateTime<Utc>,
    pub last_commit: DateTime<Utc>,
    pub additions: u64,
    pub deletions: u64,
    pub pull_requests: u64,
    pub commit_types: Vec<(String, u64)>,
}

/// Derived metrics. Always rebuilt from the tables, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub total_commits: usize,
    pub total_pull_requests: usize,
    pub total_issues: usize,
    pub active_authors: usize,

    pub commits_by_hour: [u64; 24],
    /// Monday first
    pub commits_by_weekday: [u64; 7],
    /// `YYYY-MM` → commits, chronological
    pub commits_by_month: BTreeMap<String, u64>,

    pub commit_churn: u64,
    pub pull_request_churn: u64,
    /// Lines per day over the observed commit window
    pub growth_rate: Option<f64>,

    /// PR number → cycle time; `None` while the PR is open
    pub review_cycle_times: Vec<(u64, Option<Duration>)>,
    pub average_review_cycle_days: Option<f64>,
    pub contributors: Vec<ContributorRank>,

    pub average_commits_per_week: f64,
    pub average_active_contributors_per_month: f64,
    pub average_pr_size: Option<f64>,
    pub average_review_comments: Option<f64>,
    pub pull_request_states: Vec<(String, u64)>,
    pub commit_types: Vec<(String, u64)>,

    pub open_issues: usize,
    pub closed_issues: usize,
    pub bug_to_feature_ratio: f64,
    pub average_issue_resolution_days: Option<f64>,
}

pub fn compute_metrics(tables: &RepoTables) -> MetricsSnapshot {
    debug!(
        commits = tables.commits.len(),
        pull_requests = tables.pull_requests.len(),
        issues = tables.issues.len(),
        "computing metrics"
    );

    let commits = &tables.commits;
    let prs = &tables.pull_requests;

    let contributors = rank_contributors(commits);
    let review_cycle_times: Vec<(u64, Option<Duration>)> =
        prs.iter().map(|pr| (pr.number, review_cycle_time(pr))).collect();
    let average_review_cycle_days = mean(
        review_cycle_times
            .iter()
            .filter_map(|(_, d)| d.map(duration_days)),
    );

    let (bugs, features) = tables.issues.iter().fold((0u64, 0u64), |(b, f), issue| {
        (
            b + issue_mentions(issue, "bug") as u64,
            f + issue_mentions(issue, "feature") as u64,
        )
    });
    let closed_issues = tables.issues.iter().filter(|i| i.closed_at.is_some()).count();

    MetricsSnapshot {
        total_commits: commits.len(),
        total_pull_requests: prs.len(),
        total_issues: tables.issues.len(),
        active_authors: contributors.len(),

        commits_by_hour: commits_by_hour(commits),
        commits_by_weekday: commits_by_weekday(commits),
        commits_by_month: commits_by_month(commits),

        commit_churn: commits.iter().map(|c| c.additions + c.deletions).sum(),
        pull_request_churn: prs.iter().map(|p| p.additions + p.deletions).sum(),
        growth_rate: growth_rate(commits),

        review_cycle_times,
        average_review_cycle_days,
        contributors,

        average_commits_per_week: average_commits_per_week(commits),
        average_active_contributors_per_month: average_active_contributors_per_month(commits),
        average_pr_size: mean(prs.iter().map(|p| (p.additions + p.deletions) as f64)),
        average_review_comments: mean(prs.iter().map(|p| p.review_comments as f64)),
        pull_request_states: ranked_counts(prs.iter().map(|p| p.state.clone())),
        commit_types: commit_types(commits),

        open_issues: tables.issues.len() - closed_issues,
        closed_issues,
        bug_to_feature_ratio: if features > 0 { bugs as f64 / features as f64 } else { 0.0 },
        average_issue_resolution_days: mean(
            tables
                .issues
                .iter()
                .filter_map(|i| i.closed_at.map(|closed| duration_days(closed - i.created_at))),
        ),
    }
}

/// `merged_at - created_at`, else `closed_at - created_at`; `None` while open.
pub fn review_cycle_time(pr: &PullRequestRecord) -> Option<Duration> {
    pr.merged_at.or(pr.closed_at).map(|end| end - pr.created_at)
}

/// Commits per author, descending. Equal counts go to whoever committed first.
pub fn rank_contributors(commits: &[CommitRecord]) -> Vec<ContributorRank> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut ranking: Vec<ContributorRank> = Vec::new();

    for commit in commits {
        match index.get(commit.author.as_str()) {
            Some(&i) => {
                let entry = &mut ranking[i];
                entry.commits += 1;
                entry.first_commit = entry.first_commit.min(commit.timestamp);
            }
            None => {
                index.insert(&commit.author, ranking.len());
                ranking.push(ContributorRank {
                    author: commit.author.clone(),
                    commits: 1,
                    first_commit: commit.timestamp,
                });
            }
        }
    }

    // Stable: identical (count, first commit) keeps first-seen order
    ranking.sort_by(|a, b| b.commits.cmp(&a.commits).then(a.first_commit.cmp(&b.first_commit)));
    ranking
}

/// Counts occurrences, ranked by count descending with ties in first-seen order.
pub fn ranked_counts<I>(items: I) -> Vec<(String, u64)>
where
    I: IntoIterator<Item = String>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, u64)> = Vec::new();
    for item in items {
        match index.get(&item) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(item.clone(), counts.len());
                counts.push((item, 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

pub fn commits_by_hour(commits: &[CommitRecord]) -> [u64; 24] {
    let mut buckets = [0u64; 24];
    for commit in commits {
        buckets[commit.timestamp.hour() as usize] += 1;
    }
    buckets
}

pub fn commits_by_weekday(commits: &[CommitRecord]) -> [u64; 7] {
    let mut buckets = [0u64; 7];
    for commit in commits {
        buckets[commit.timestamp.weekday().num_days_from_monday() as usize] += 1;
    }
    buckets
}

pub fn commits_by_month(commits: &[CommitRecord]) -> BTreeMap<String, u64> {
    let mut months = BTreeMap::new();
    for commit in commits {
        *months.entry(month_key(commit.timestamp)).or_insert(0) += 1;
    }
    months
}

/// Commits per calendar day, chronological
pub fn commits_by_day(commits: &[CommitRecord]) -> BTreeMap<NaiveDate, u64> {
    let mut days = BTreeMap::new();
    for commit in commits {
        *days.entry(commit.timestamp.date_naive()).or_insert(0) += 1;
    }
    days
}

/// Conventional-commit prefix (`fix:`, `feat:`), `Other` when absent
pub fn commit_type(message: &str) -> String {
    COMMIT_TYPE
        .captures(message)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "Other".to_string())
}

pub fn commit_types(commits: &[CommitRecord]) -> Vec<(String, u64)> {
    ranked_counts(commits.iter().map(|c| commit_type(&c.message)))
}

pub fn month_key(ts: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", ts.year(), ts.month())
}

/// Net line delta per day between the first and last commit
pub fn growth_rate(commits: &[CommitRecord]) -> Option<f64> {
    let (first, last) = time_window(commits)?;
    let days = (last - first).num_seconds() as f64 / 86_400.0;
    if days <= 0.0 {
        return None;
    }
    let net: i64 = commits
        .iter()
        .map(|c| c.additions as i64 - c.deletions as i64)
        .sum();
    Some(net as f64 / days)
}

/// Mean commits per Monday-based week, counting empty weeks in the window
pub fn average_commits_per_week(commits: &[CommitRecord]) -> f64 {
    let Some((first, last)) = time_window(commits) else {
        return 0.0;
    };
    let weeks = (week_start(last.date_naive()) - week_start(first.date_naive())).num_weeks() + 1;
    commits.len() as f64 / weeks as f64
}

/// Mean number of distinct authors per calendar month, counting empty months
pub fn average_active_contributors_per_month(commits: &[CommitRecord]) -> f64 {
    let Some((first, last)) = time_window(commits) else {
        return 0.0;
    };
    let mut authors: BTreeMap<String, std::collections::HashSet<&str>> = BTreeMap::new();
    for commit in commits {
        authors
            .entry(month_key(commit.timestamp))
            .or_default()
            .insert(commit.author.as_str());
    }
    let months = month_index(last) - month_index(first) + 1;
    let total: usize = authors.values().map(|a| a.len()).sum();
    total as f64 / months as f64
}

pub fn developer_profile(tables: &RepoTables, author: &str) -> Option<DeveloperProfile> {
    let commits: Vec<CommitRecord> = tables
        .commits
        .iter()
        .filter(|c| c.author == author)
        .cloned()
        .collect();
    let (first_commit, last_commit) = time_window(&commits)?;

    Some(DeveloperProfile {
        author: author.to_string(),
        commits: commits.len() as u64,
        first_commit,
        last_commit,
        additions: commits.iter().map(|c| c.additions).sum(),
        deletions: commits.iter().map(|c| c.deletions).sum(),
        pull_requests: tables
            .pull_requests
            .iter()
            .filter(|p| p.author == author)
            .count() as u64,
        commit_types: commit_types(&commits),
    })
}

fn time_window(commits: &[CommitRecord]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let first = commits.iter().map(|c| c.timestamp).min()?;
    let last = commits.iter().map(|c| c.timestamp).max()?;
    Some((first, last))
}

fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

fn month_index(ts: DateTime<Utc>) -> i64 {
    ts.year() as i64 * 12 + ts.month0() as i64
}

fn issue_mentions(issue: &IssueRecord, word: &str) -> bool {
    issue.title.to_lowercase().contains(word)
        || issue.labels.iter().any(|l| l.to_lowercase().contains(word))
}

pub fn duration_days(d: Duration) -> f64 {
    d.num_seconds() as f64 / 86_400.0
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

impl MetricsSnapshot {
    /// Flattens every metric into `metric,key,value` rows for CSV export.
    pub fn to_rows(&self) -> Vec<MetricRow> {
        let mut rows = Vec::new();
        let mut scalar = |metric: &str, value: f64| {
            rows.push(MetricRow {
                metric: metric.to_string(),
                key: String::new(),
                value,
            })
        };

        scalar("total_commits", self.total_commits as f64);
        scalar("total_pull_requests", self.total_pull_requests as f64);
        scalar("total_issues", self.total_issues as f64);
        scalar("active_authors", self.active_authors as f64);
        scalar("commit_churn", self.commit_churn as f64);
        scalar("pull_request_churn", self.pull_request_churn as f64);
        scalar("average_commits_per_week", self.average_commits_per_week);
        scalar(
            "average_active_contributors_per_month",
            self.average_active_contributors_per_month,
        );
        scalar("open_issues", self.open_issues as f64);
        scalar("closed_issues", self.closed_issues as f64);
        scalar("bug_to_feature_ratio", self.bug_to_feature_ratio);
        // Undefined metrics are left out rather than written as zero
        for (metric, value) in [
            ("growth_rate", self.growth_rate),
            ("average_review_cycle_days", self.average_review_cycle_days),
            ("average_pr_size", self.average_pr_size),
            ("average_review_comments", self.average_review_comments),
            ("average_issue_resolution_days", self.average_issue_resolution_days),
        ] {
            if let Some(v) = value {
                scalar(metric, v);
            }
        }

        let mut keyed = |metric: &str, key: String, value: f64| {
            rows.push(MetricRow {
                metric: metric.to_string(),
                key,
                value,
            })
        };
        for (hour, count) in self.commits_by_hour.iter().enumerate() {
            keyed("commits_by_hour", hour.to_string(), *count as f64);
        }
        for (day, count) in WEEKDAYS.iter().zip(self.commits_by_weekday.iter()) {
            keyed("commits_by_weekday", day.to_string(), *count as f64);
        }
        for (month, count) in &self.commits_by_month {
            keyed("commits_by_month", month.clone(), *count as f64);
        }
        for rank in &self.contributors {
            keyed("contributor_commits", rank.author.clone(), rank.commits as f64);
        }
        for (number, cycle) in &self.review_cycle_times {
            if let Some(d) = cycle {
                keyed("review_cycle_days", number.to_string(), duration_days(*d));
            }
        }
        for (state, count) in &self.pull_request_states {
            keyed("pull_request_states", state.clone(), *count as f64);
        }
        for (kind, count) in &self.commit_types {
            keyed("commit_types", kind.clone(), *count as f64);
        }

        rows
    }
}

fn fmt_opt(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}{}", v, unit))
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total commits:                    {}", self.total_commits)?;
        writeln!(f, "Total pull requests:              {}", self.total_pull_requests)?;
        writeln!(
            f,
            "Total issues:                     {} ({} open)",
            self.total_issues, self.open_issues
        )?;
        writeln!(f, "Active authors:                   {}", self.active_authors)?;
        writeln!(f, "Average commits per week:         {:.2}", self.average_commits_per_week)?;
        writeln!(
            f,
            "Average active contributors/month: {:.2}",
            self.average_active_contributors_per_month
        )?;
        writeln!(f, "Code churn (commits):             {}", self.commit_churn)?;
        writeln!(f, "Code churn (pull requests):       {}", self.pull_request_churn)?;
        writeln!(
            f,
            "Growth rate:                      {}",
            fmt_opt(self.growth_rate, " lines/day")
        )?;
        writeln!(
            f,
            "Average PR review cycle:          {}",
            fmt_opt(self.average_review_cycle_days, " days")
        )?;
        writeln!(
            f,
            "Average PR size:                  {}",
            fmt_opt(self.average_pr_size, " lines")
        )?;
        writeln!(
            f,
            "Average PR review comments:       {}",
            fmt_opt(self.average_review_comments, "")
        )?;
        writeln!(f, "Bug to feature ratio:             {:.2}", self.bug_to_feature_ratio)?;
        writeln!(
            f,
            "Average issue resolution:         {}",
            fmt_opt(self.average_issue_resolution_days, " days")
        )?;

        if !self.contributors.is_empty() {
            writeln!(f, "Top contributors:")?;
            for rank in self.contributors.iter().take(10) {
                writeln!(f, "  {:<24} {}", rank.author, rank.commits)?;
            }
        }
        Ok(())
    }
}
