// src/github.rs
//
// Pulls commits, pull requests and issues from the GitHub REST API. Each
// resource type is fetched in its own task and fails on its own.

use crate::error::{Error, Result};
use crate::model::{CommitRecord, IssueRecord, PullRequestRecord, RepoId, RepoTables, Resource};
use crate::normalize::{self, RawCommit, RawIssue, RawPullRequest};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const PER_PAGE: &str = "100";

static REPO_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[/@.])github\.com/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)")
        .expect("static regex is valid")
});

/// Extracts the owner/repo pair from a GitHub URL.
///
/// Accepts the scheme-less form, trailing slashes, a `.git` suffix and any
/// trailing path (`/tree/main`, `/pulls`).
pub fn extract_repo_info(url: &str) -> Result<RepoId> {
    let captures = REPO_URL
        .captures(url.trim())
        .ok_or_else(|| Error::InvalidUrl(url.to_string()))?;

    let owner = &captures[1];
    let repo = captures[2].trim_end_matches(".git");
    if repo.is_empty() || repo == "." || repo == ".." {
        return Err(Error::InvalidUrl(url.to_string()));
    }

    Ok(RepoId::new(owner, repo))
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub token: Option<String>,
    pub api_url: String,
    /// Page cap per resource type (100 records per page)
    pub max_pages: usize,
    /// Fetch per-commit and per-PR documents to fill in line stats
    pub fetch_details: bool,
    pub detail_concurrency: usize,
    pub show_progress: bool,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
            max_pages: 10,
            fetch_details: true,
            detail_concurrency: 8,
            show_progress: false,
        }
    }
}

/// Per-resource results of a collection run
#[derive(Debug)]
pub struct FetchOutcome {
    pub commits: Result<Vec<CommitRecord>>,
    pub pull_requests: Result<Vec<PullRequestRecord>>,
    pub issues: Result<Vec<IssueRecord>>,
}

impl FetchOutcome {
    /// Splits the outcome into tables (failed resources left empty) and the
    /// errors of the failed resources.
    pub fn into_tables(self) -> (RepoTables, Vec<Error>) {
        let mut errors = Vec::new();
        let mut tables = RepoTables::default();

        match self.commits {
            Ok(c) => tables.commits = c,
            Err(e) => errors.push(e),
        }
        match self.pull_requests {
            Ok(p) => tables.pull_requests = p,
            Err(e) => errors.push(e),
        }
        match self.issues {
            Ok(i) => tables.issues = i,
            Err(e) => errors.push(e),
        }

        (tables, errors)
    }

    pub fn failed(&self) -> Vec<Resource> {
        let mut failed = Vec::new();
        if self.commits.is_err() {
            failed.push(Resource::Commits);
        }
        if self.pull_requests.is_err() {
            failed.push(Resource::PullRequests);
        }
        if self.issues.is_err() {
            failed.push(Resource::Issues);
        }
        failed
    }
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("repo-pulse/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Fetches all three resource types concurrently.
    pub async fn fetch_all(&self, repo: &RepoId) -> FetchOutcome {
        info!(%repo, "collecting repository data");

        let commits = tokio::spawn({
            let this = self.clone();
            let repo = repo.clone();
            async move { this.fetch_commits(&repo).await }
        });
        let pull_requests = tokio::spawn({
            let this = self.clone();
            let repo = repo.clone();
            async move { this.fetch_pull_requests(&repo).await }
        });
        let issues = tokio::spawn({
            let this = self.clone();
            let repo = repo.clone();
            async move { this.fetch_issues(&repo).await }
        });

        let (commits, pull_requests, issues) = tokio::join!(commits, pull_requests, issues);

        FetchOutcome {
            commits: joined(commits, Resource::Commits),
            pull_requests: joined(pull_requests, Resource::PullRequests),
            issues: joined(issues, Resource::Issues),
        }
    }

    pub async fn fetch_commits(&self, repo: &RepoId) -> Result<Vec<CommitRecord>> {
        let mut raw: Vec<RawCommit> =
            self.get_paginated(Resource::Commits, repo, "commits", &[]).await?;

        if self.config.fetch_details && !raw.is_empty() {
            let bar = self.progress_bar(raw.len(), "commit stats");
            let shas: Vec<String> = raw.iter().map(|c| c.sha.clone()).collect();
            let details: Vec<Result<RawCommit>> = stream::iter(shas)
                .map(|sha| {
                    let bar = bar.clone();
                    async move {
                        let path = format!("commits/{}", sha);
                        let detail =
                            self.get_json(Resource::Commits, &self.repo_url(repo, &path)).await;
                        bar.inc(1);
                        detail
                    }
                })
                .buffered(self.config.detail_concurrency.max(1))
                .collect()
                .await;
            bar.finish_and_clear();

            for (slot, detail) in raw.iter_mut().zip(details) {
                match detail {
                    Ok(d) => *slot = d,
                    Err(e) => warn!(
                        sha = %slot.sha,
                        error = %e,
                        "commit detail unavailable, keeping zero stats"
                    ),
                }
            }
        }

        Ok(raw.iter().map(normalize::normalize_commit).collect())
    }

    pub async fn fetch_pull_requests(&self, repo: &RepoId) -> Result<Vec<PullRequestRecord>> {
        let query = [("state", "all"), ("sort", "created"), ("direction", "desc")];
        let mut raw: Vec<RawPullRequest> =
            self.get_paginated(Resource::PullRequests, repo, "pulls", &query).await?;

        if self.config.fetch_details && !raw.is_empty() {
            let bar = self.progress_bar(raw.len(), "pull request stats");
            let numbers: Vec<u64> = raw.iter().map(|p| p.number).collect();
            let details: Vec<Result<RawPullRequest>> = stream::iter(numbers)
                .map(|number| {
                    let bar = bar.clone();
                    async move {
                        let path = format!("pulls/{}", number);
                        let detail = self
                            .get_json(Resource::PullRequests, &self.repo_url(repo, &path))
                            .await;
                        bar.inc(1);
                        detail
                    }
                })
                .buffered(self.config.detail_concurrency.max(1))
                .collect()
                .await;
            bar.finish_and_clear();

            for (slot, detail) in raw.iter_mut().zip(details) {
                match detail {
                    Ok(d) => *slot = d,
                    Err(e) => {
                        warn!(number = slot.number, error = %e, "pull request detail unavailable")
                    }
                }
            }
        }

        Ok(raw.iter().map(normalize::normalize_pull_request).collect())
    }

    pub async fn fetch_issues(&self, repo: &RepoId) -> Result<Vec<IssueRecord>> {
        let raw: Vec<RawIssue> = self
            .get_paginated(Resource::Issues, repo, "issues", &[("state", "all")])
            .await?;

        Ok(raw
            .iter()
            .filter(|i| !i.is_pull_request())
            .map(normalize::normalize_issue)
            .collect())
    }

    fn repo_url(&self, repo: &RepoId, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            repo.owner,
            repo.repo,
            path
        )
    }

    fn build_request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(ref token) = self.config.token {
            request = request.bearer_auth(token);
        }
        request
    }

    /// Follows `Link: rel="next"` until exhausted or `max_pages` is reached.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        resource: Resource,
        repo: &RepoId,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut request = self
            .build_request(&self.repo_url(repo, path))
            .query(&[("per_page", PER_PAGE)]);
        if !query.is_empty() {
            request = request.query(query);
        }

        let mut records = Vec::new();
        let mut page = 1;
        loop {
            debug!(%resource, page, "fetching page");
            let response = request
                .send()
                .await
                .map_err(|e| Error::fetch(resource, format!("request failed: {}", e)))?;
            let response = check_status(response, resource).await?;

            let next = response
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_next_link);

            let batch: Vec<T> = response
                .json()
                .await
                .map_err(|e| Error::fetch(resource, format!("malformed response: {}", e)))?;
            records.extend(batch);

            match next {
                Some(url) if page < self.config.max_pages => {
                    request = self.build_request(&url);
                    page += 1;
                }
                Some(_) => {
                    warn!(%resource, pages = page, "page limit reached, remaining records skipped");
                    break;
                }
                None => break,
            }
        }

        info!(%resource, count = records.len(), "fetched");
        Ok(records)
    }

    async fn get_json<T: DeserializeOwned>(&self, resource: Resource, url: &str) -> Result<T> {
        let response = self
            .build_request(url)
            .send()
            .await
            .map_err(|e| Error::fetch(resource, format!("request failed: {}", e)))?;
        let response = check_status(response, resource).await?;
        response
            .json()
            .await
            .map_err(|e| Error::fetch(resource, format!("malformed response: {}", e)))
    }

    fn progress_bar(&self, len: usize, message: &'static str) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:30}] {pos}/{len}") {
            bar.set_style(style);
        }
        bar.set_message(message);
        bar
    }
}

fn joined<T>(
    result: std::result::Result<Result<T>, tokio::task::JoinError>,
    resource: Resource,
) -> Result<T> {
    result.unwrap_or_else(|e| Err(Error::fetch(resource, format!("fetch task aborted: {}", e))))
}

async fn check_status(
    response: reqwest::Response,
    resource: Resource,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let reason = match status {
        StatusCode::NOT_FOUND => "repository not found".to_string(),
        StatusCode::UNAUTHORIZED => "invalid or missing token".to_string(),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            let reset = response
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .map(|s| format!(" (resets at {})", s))
                .unwrap_or_default();
            format!("rate limited{}", reset)
        }
        other => {
            let body = response.text().await.unwrap_or_default();
            format!("HTTP {}: {}", other, body.trim())
        }
    };
    Err(Error::fetch(resource, reason))
}

/// Returns the `rel="next"` target of a `Link` header
fn parse_next_link(link: &str) -> Option<String> {
    // Format: <url>; rel="next", <url>; rel="last"
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| p.trim() == "rel=\"next\"");
        if is_next {
            Some(target.trim_start_matches('<').trim_end_matches('>').to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_forms_resolve_to_the_same_repo() {
        let expected = RepoId::new("aws-samples", "aws-copilot-sample-service");
        for url in [
            "https://github.com/aws-samples/aws-copilot-sample-service",
            "https://github.com/aws-samples/aws-copilot-sample-service/",
            "https://github.com/aws-samples/aws-copilot-sample-service.git",
            "https://github.com/aws-samples/aws-copilot-sample-service.git/",
            "github.com/aws-samples/aws-copilot-sample-service",
            "http://www.github.com/aws-samples/aws-copilot-sample-service/tree/main",
        ] {
            assert_eq!(extract_repo_info(url).unwrap(), expected, "url: {}", url);
        }
    }

    #[test]
    fn malformed_urls_are_rejected() {
        for url in [
            "https://gitlab.com/a/b",
            "https://notgithub.com/a/b",
            "https://github.com.evil.io/a/b",
            "github.com/onlyowner",
            "not a url",
            "github.com/o/.git",
        ] {
            assert!(matches!(extract_repo_info(url), Err(Error::InvalidUrl(_))), "url: {}", url);
        }
    }

    #[test]
    fn next_link_is_extracted() {
        let header = concat!(
            r#"<https://api.github.com/repositories/1/commits?page=2>; rel="next", "#,
            r#"<https://api.github.com/repositories/1/commits?page=9>; rel="last""#
        );
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://api.github.com/repositories/1/commits?page=2")
        );
        assert_eq!(parse_next_link(r#"<https://x/?page=1>; rel="prev""#), None);
    }

    #[test]
    fn outcome_keeps_successful_resources() {
        let outcome = FetchOutcome {
            commits: Ok(Vec::new()),
            pull_requests: Err(Error::fetch(Resource::PullRequests, "rate limited")),
            issues: Ok(Vec::new()),
        };
        assert_eq!(outcome.failed(), vec![Resource::PullRequests]);

        let (tables, errors) = outcome.into_tables();
        assert!(tables.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("pull_requests"));
    }
}
