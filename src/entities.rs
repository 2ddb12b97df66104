// src/entities.rs
//
// Named-entity extraction over commit messages. Only organization, product
// and location-like mentions are kept; casing is preserved as written.

use crate::analyzer::ranked_counts;
use crate::model::CommitRecord;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use std::collections::HashSet;

static WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z][A-Za-z0-9]*(?:[.+\-][A-Za-z0-9]+)*").expect("static regex is valid")
});

// Capitalized words that are almost never entities in commit messages
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "of", "to", "in", "on", "at", "by", "for", "with",
    "from", "as", "into", "is", "are", "was", "be", "it", "this", "that", "these", "those", "we",
    "i", "you", "not", "no", "fix", "fixes", "fixed", "add", "adds", "added", "update", "updates",
    "updated", "remove", "removes", "removed", "merge", "merged", "refactor", "bump", "revert",
    "initial", "commit", "use", "make", "move", "rename", "change", "changes", "improve", "clean",
    "cleanup", "support", "allow", "set", "wip", "pull", "request", "branch", "release", "version",
    "readme", "todo", "test", "tests", "docs", "doc", "feat", "chore", "style", "perf", "build",
    "ci", "ok", "also", "when", "then", "after", "before", "signed", "off", "co", "authored",
];

// Well-known products, platforms and organizations, matched case-insensitively
const GAZETTEER: &[&str] = &[
    "aws", "azure", "gcp", "google", "amazon", "microsoft", "github", "gitlab", "docker",
    "kubernetes", "k8s", "terraform", "postgres", "postgresql", "mysql", "redis", "kafka", "linux",
    "windows", "macos", "ios", "android", "python", "rust", "node", "nodejs", "react", "npm", "s3",
    "ec2", "lambda", "copilot", "qdrant", "openai", "slack", "jira", "heroku", "nginx", "graphql",
    "mongodb", "elasticsearch", "ubuntu", "debian",
];

const PLACES: &[&str] = &[
    "berlin", "london", "paris", "tokyo", "singapore", "sydney", "dublin", "frankfurt", "virginia",
    "oregon", "ohio", "california", "europe", "asia", "america", "germany", "france", "india",
    "japan", "canada",
];

// Word right before a phrase that marks a place ("deployed in Frankfurt")
const PLACE_CUES: &[&str] = &["in", "at", "near", "across", "within"];

// Word right after a phrase that marks an organization, place or product
const TRAILING_CUES: &[&str] = &[
    "office", "offices", "region", "datacenter", "campus", "team", "api", "sdk", "cli", "cloud",
    "server", "plugin", "integration", "driver", "client",
];

// Last word of an organization name
const ORG_SUFFIXES: &[&str] = &[
    "inc", "corp", "corporation", "ltd", "gmbh", "llc", "labs", "foundation", "software",
    "technologies", "systems", "group", "university",
];

/// Finds entity mentions in free text
pub trait EntityExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<String>;
}

/// Rule-based recognizer for organizations, products and places.
///
/// Runs of proper-noun-looking tokens form candidate phrases. A phrase is
/// kept only when it names something in the gazetteer, is shaped like a
/// product (`GitHub`, `NATS`, `Python3`, `Vue.js`), ends in an organization
/// suffix, or sits next to a place or organization cue. Plain capitalized
/// runs such as personal names are dropped.
#[derive(Debug)]
pub struct HeuristicRecognizer {
    stop_words: HashSet<&'static str>,
    gazetteer: HashSet<&'static str>,
    place_cues: HashSet<&'static str>,
    trailing_cues: HashSet<&'static str>,
    org_suffixes: HashSet<&'static str>,
}

impl Default for HeuristicRecognizer {
    fn default() -> Self {
        Self {
            stop_words: STOP_WORDS.iter().copied().collect(),
            gazetteer: GAZETTEER.iter().chain(PLACES).copied().collect(),
            place_cues: PLACE_CUES.iter().copied().collect(),
            trailing_cues: TRAILING_CUES.iter().copied().collect(),
            org_suffixes: ORG_SUFFIXES.iter().copied().collect(),
        }
    }
}

struct Token<'a> {
    text: &'a str,
    sentence_start: bool,
    /// Separated from the previous token by plain spaces only
    joined: bool,
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut last_end = 0;
    let mut sentence_start = true;

    for m in WORD.find_iter(text) {
        let gap = &text[last_end..m.start()];
        if gap.contains(['.', '!', '?', '\n', ':']) {
            sentence_start = true;
        }
        tokens.push(Token {
            text: m.as_str(),
            sentence_start,
            joined: last_end > 0 && gap.chars().all(|c| c == ' '),
        });
        sentence_start = false;
        last_end = m.end();
    }
    tokens
}

fn product_shaped(token: &str) -> bool {
    let mut chars = token.chars();
    let first_upper = chars.next().is_some_and(|c| c.is_uppercase());
    let internal_caps = chars.any(|c| c.is_uppercase());
    let acronym = first_upper
        && token.len() >= 2
        && token.chars().all(|c| c.is_uppercase() || c.is_ascii_digit());
    let versioned = token.chars().any(|c| c.is_ascii_digit() || c == '.' || c == '+');
    internal_caps || acronym || versioned
}

impl HeuristicRecognizer {
    fn in_gazetteer(&self, token: &str) -> bool {
        self.gazetteer.contains(token.to_lowercase().as_str())
    }

    fn is_candidate(&self, token: &Token<'_>) -> bool {
        let text = token.text;
        if self.in_gazetteer(text) {
            return true;
        }
        if self.stop_words.contains(text.to_lowercase().as_str()) || text.len() < 2 {
            return false;
        }

        // A capital at the start of a sentence says nothing by itself
        if token.sentence_start {
            product_shaped(text) && text.chars().next().is_some_and(|c| c.is_uppercase())
        } else {
            text.chars().any(|c| c.is_uppercase())
        }
    }

    fn accepts(&self, phrase: &[Token<'_>], before: Option<&str>, after: Option<&str>) -> bool {
        if phrase.iter().any(|t| self.in_gazetteer(t.text) || product_shaped(t.text)) {
            return true;
        }
        if let Some(last) = phrase.last() {
            if phrase.len() > 1 && self.org_suffixes.contains(last.text.to_lowercase().as_str()) {
                return true;
            }
        }
        let cue = |word: Option<&str>, cues: &HashSet<&'static str>| {
            word.is_some_and(|w| cues.contains(w.to_lowercase().as_str()))
        };
        cue(before, &self.place_cues) || cue(after, &self.trailing_cues)
    }
}

impl EntityExtractor for HeuristicRecognizer {
    fn extract(&self, text: &str) -> Vec<String> {
        let tokens = tokenize(text);
        let mut entities = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            if !self.is_candidate(&tokens[i]) {
                i += 1;
                continue;
            }
            let start = i;
            i += 1;
            // Phrases only continue across plain spaces
            while i < tokens.len() && tokens[i].joined && self.is_candidate(&tokens[i]) {
                i += 1;
            }

            let phrase = &tokens[start..i];
            let before = (start > 0 && tokens[start].joined).then(|| tokens[start - 1].text);
            let after = tokens.get(i).filter(|t| t.joined).map(|t| t.text);
            if self.accepts(phrase, before, after) {
                let words: Vec<&str> = phrase.iter().map(|t| t.text).collect();
                entities.push(words.join(" "));
            }
        }

        entities
    }
}

/// Entity → mention count, ranked by count with ties in first-seen order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityCounts {
    ranked: Vec<(String, u64)>,
}

impl EntityCounts {
    /// Every mention counts, repeats within one message included.
    pub fn from_messages<'a, E, I>(extractor: &E, messages: I) -> Self
    where
        E: EntityExtractor + ?Sized,
        I: IntoParallelIterator<Item = &'a str>,
        I::Iter: IndexedParallelIterator,
    {
        let per_message: Vec<Vec<String>> = messages
            .into_par_iter()
            .map(|message| extractor.extract(message))
            .collect();

        Self {
            ranked: ranked_counts(per_message.into_iter().flatten()),
        }
    }

    pub fn from_commits<E>(extractor: &E, commits: &[CommitRecord]) -> Self
    where
        E: EntityExtractor + ?Sized,
    {
        let messages: Vec<&str> = commits.iter().map(|c| c.message.as_str()).collect();
        Self::from_messages(extractor, messages)
    }

    pub fn top(&self, n: usize) -> &[(String, u64)] {
        &self.ranked[..n.min(self.ranked.len())]
    }

    pub fn ranked(&self) -> &[(String, u64)] {
        &self.ranked
    }

    pub fn get(&self, entity: &str) -> u64 {
        self.ranked
            .iter()
            .find(|(e, _)| e == entity)
            .map_or(0, |(_, c)| *c)
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<String> {
        HeuristicRecognizer::default().extract(text)
    }

    #[test]
    fn finds_products_and_places() {
        assert_eq!(
            extract("Fix upload to AWS S3 from the Berlin office"),
            vec!["AWS S3", "Berlin"]
        );
        assert_eq!(
            extract("Add GitHub Actions workflow for docker"),
            vec!["GitHub Actions", "docker"]
        );
    }

    #[test]
    fn sentence_initial_capitals_are_ignored() {
        assert!(extract("Refactor parser. Simplify loop").is_empty());
        assert_eq!(extract("Kubernetes manifests cleaned"), vec!["Kubernetes"]);
    }

    #[test]
    fn punctuation_breaks_phrases() {
        assert_eq!(
            extract("chore: move from Redis, Kafka to NATS"),
            vec!["Redis", "Kafka", "NATS"]
        );
    }

    #[test]
    fn casing_is_preserved() {
        assert_eq!(extract("bump PostgreSQL driver"), vec!["PostgreSQL"]);
    }

    #[test]
    fn personal_names_are_not_entities() {
        assert!(extract("Thanks to Alice Johnson for the review").is_empty());
        assert!(extract("Merge pull request #12 from Jane Doe").is_empty());
        assert_eq!(extract("Reviewed by Alice Johnson, deployed to AWS"), vec!["AWS"]);
    }

    #[test]
    fn cues_and_shapes_admit_unknown_names() {
        assert_eq!(extract("open a new office in Lisbon"), vec!["Lisbon"]);
        assert_eq!(extract("switch to the Stripe client"), vec!["Stripe"]);
        assert_eq!(extract("contract with Initech Corp signed"), vec!["Initech Corp"]);
        assert_eq!(extract("upgrade to Python3 and Vue.js"), vec!["Python3", "Vue.js"]);
    }

    #[test]
    fn counts_every_mention_and_ranks() {
        let messages = vec![
            "Deploy to AWS and AWS again", "Move Docker images to AWS", "update Docker base image",
            "Nothing here",
        ];
        let counts = EntityCounts::from_messages(&HeuristicRecognizer::default(), messages);
        assert_eq!(counts.get("AWS"), 3);
        assert_eq!(counts.get("Docker"), 2);
        assert_eq!(counts.top(1), &[("AWS".to_string(), 3)]);
        assert_eq!(counts.top(10).len(), 2);
    }
}
