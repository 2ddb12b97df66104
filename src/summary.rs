// src/summary.rs
//
// A compact view of the commit table for prompts. The full table never goes
// to a model.

use crate::analyzer::{self, rank_contributors};
use crate::entities::EntityCounts;
use crate::model::CommitRecord;
use chrono::{DateTime, Utc};
use std::fmt::Write;

#[derive(Debug, Clone)]
pub struct SummaryConfig {
    pub top_authors: usize,
    pub top_entities: usize,
    /// Sample messages quoted per top author
    pub messages_per_author: usize,
    pub max_context_chars: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            top_authors: 5,
            top_entities: 10,
            messages_per_author: 3,
            max_context_chars: 6000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorSummary {
    pub author: String,
    pub commits: u64,
    pub sample_messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitSummary {
    pub total_commits: usize,
    pub total_authors: usize,
    pub first_commit: Option<DateTime<Utc>>,
    pub last_commit: Option<DateTime<Utc>>,
    pub top_authors: Vec<AuthorSummary>,
    pub top_entities: Vec<(String, u64)>,
    pub commits_by_month: Vec<(String, u64)>,
}

impl CommitSummary {
    pub fn build(
        commits: &[CommitRecord],
        entities: &EntityCounts,
        config: &SummaryConfig,
    ) -> Self {
        let ranking = rank_contributors(commits);
        let top_authors = ranking
            .iter()
            .take(config.top_authors)
            .map(|rank| AuthorSummary {
                author: rank.author.clone(),
                commits: rank.commits,
                sample_messages: commits
                    .iter()
                    .filter(|c| c.author == rank.author)
                    .take(config.messages_per_author)
                    .map(|c| first_line(&c.message).to_string())
                    .collect(),
            })
            .collect();

        Self {
            total_commits: commits.len(),
            total_authors: ranking.len(),
            first_commit: commits.iter().map(|c| c.timestamp).min(),
            last_commit: commits.iter().map(|c| c.timestamp).max(),
            top_authors,
            top_entities: entities.top(config.top_entities).to_vec(),
            commits_by_month: analyzer::commits_by_month(commits).into_iter().collect(),
        }
    }

    /// Prompt context, cut to `max_chars` on a character boundary
    pub fn context(&self, max_chars: usize) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Commits: {} by {} authors",
            self.total_commits, self.total_authors
        );
        if let (Some(first), Some(last)) = (self.first_commit, self.last_commit) {
            let _ = writeln!(
                out,
                "Period: {} to {}",
                first.format("%Y-%m-%d"),
                last.format("%Y-%m-%d")
            );
        }

        if !self.top_authors.is_empty() {
            let _ = writeln!(out, "\nTop authors by commit count:");
            for author in &self.top_authors {
                let _ = writeln!(out, "- {}: {} commits", author.author, author.commits);
                for message in &author.sample_messages {
                    let _ = writeln!(out, "    \"{}\"", message);
                }
            }
        }

        if !self.top_entities.is_empty() {
            let entities: Vec<String> = self
                .top_entities
                .iter()
                .map(|(e, n)| format!("{} ({})", e, n))
                .collect();
            let _ = writeln!(
                out,
                "\nEntities (technologies, organizations, locations) \
                 mentioned in commit messages: {}",
                entities.join(", ")
            );
        }

        if !self.commits_by_month.is_empty() {
            let months: Vec<String> = self
                .commits_by_month
                .iter()
                .map(|(m, n)| format!("{}: {}", m, n))
                .collect();
            let _ = writeln!(out, "\nCommits per month: {}", months.join(", "));
        }

        truncate_chars(&out, max_chars).to_string()
    }
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or("").trim()
}

pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::HeuristicRecognizer;
    use chrono::TimeZone;

    fn commits() -> Vec<CommitRecord> {
        let names = ["ana", "bo", "ana", "cy", "ana", "bo"];
        names
            .iter()
            .enumerate()
            .map(|(i, a)| CommitRecord {
                sha: i.to_string(),
                author: a.to_string(),
                timestamp: Utc.with_ymd_and_hms(2024, 1 + i as u32, 1, 0, 0, 0).unwrap(),
                message: format!("Ship Docker build {}\n\nlong body", i),
                additions: 1,
                deletions: 1,
                files_changed: 1,
            })
            .collect()
    }

    #[test]
    fn summary_respects_top_n() {
        let commits = commits();
        let entities = EntityCounts::from_commits(&HeuristicRecognizer::default(), &commits);
        let config = SummaryConfig {
            top_authors: 2,
            top_entities: 1,
            messages_per_author: 1,
            ..Default::default()
        };
        let summary = CommitSummary::build(&commits, &entities, &config);

        assert_eq!(summary.top_authors.len(), 2);
        assert_eq!(summary.top_authors[0].author, "ana");
        assert_eq!(summary.top_authors[0].sample_messages, vec!["Ship Docker build 0"]);
        assert_eq!(summary.top_entities, vec![("Docker".to_string(), 6)]);
        assert_eq!(summary.total_authors, 3);
    }

    #[test]
    fn context_is_bounded() {
        let commits = commits();
        let summary =
            CommitSummary::build(&commits, &EntityCounts::default(), &SummaryConfig::default());
        let full = summary.context(usize::MAX);
        assert!(full.contains("- ana: 3 commits"));
        assert!(full.contains("Commits per month: 2024-01: 1"));
        assert_eq!(summary.context(40).chars().count(), 40);
    }

    #[test]
    fn truncation_keeps_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
