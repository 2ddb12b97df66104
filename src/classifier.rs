// src/classifier.rs
//
// Decides whether a question wants a chart or a written answer.

use crate::llm::LanguageModel;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

const VISUALIZATION_KEYWORDS: [&str; 6] =
    ["show", "plot", "graph", "visualize", "chart", "display"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryClass {
    Graph,
    Text,
}

impl QueryClass {
    /// Exact match against the two class labels
    pub fn parse(reply: &str) -> Option<Self> {
        let label = reply
            .trim()
            .trim_matches(|c: char| {
                c == '"' || c == '\'' || c == '`' || c == '.' || c.is_whitespace()
            })
            .to_lowercase();
        match label.as_str() {
            "graph" => Some(QueryClass::Graph),
            "text" => Some(QueryClass::Text),
            _ => None,
        }
    }
}

impl fmt::Display for QueryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryClass::Graph => f.write_str("graph"),
            QueryClass::Text => f.write_str("text"),
        }
    }
}

#[async_trait]
pub trait Classify: Send + Sync {
    /// Never fails: anything unclassifiable is `Text`
    async fn classify(&self, query: &str) -> QueryClass;
}

/// Single-shot classification by a language model
pub struct LlmClassifier {
    model: Arc<dyn LanguageModel>,
}

impl LlmClassifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn prompt(query: &str) -> String {
        format!(
            "Classify the following request about a GitHub repository's commit data. \
             If the user wants a chart, plot or other visualization, the class is 'graph'; \
             otherwise it is 'text'. Answer only with 'graph' or 'text'.\n\nRequest: {}",
            query.trim()
        )
    }
}

#[async_trait]
impl Classify for LlmClassifier {
    async fn classify(&self, query: &str) -> QueryClass {
        let reply = match self.model.complete(&Self::prompt(query)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "classifier call failed, answering as text");
                return QueryClass::Text;
            }
        };

        match QueryClass::parse(&reply) {
            Some(class) => {
                debug!(%class, "query classified");
                class
            }
            None => {
                warn!(reply = %reply.trim(), "unrecognized classification, answering as text");
                QueryClass::Text
            }
        }
    }
}

/// Offline keyword heuristic
#[derive(Debug, Default)]
pub struct KeywordClassifier;

#[async_trait]
impl Classify for KeywordClassifier {
    async fn classify(&self, query: &str) -> QueryClass {
        let lower = query.to_lowercase();
        if VISUALIZATION_KEYWORDS.iter().any(|k| lower.contains(k)) {
            QueryClass::Graph
        } else {
            QueryClass::Text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;

    async fn classify_with(reply: &str, query: &str) -> QueryClass {
        let model = Arc::new(ScriptedModel::replying(reply));
        LlmClassifier::new(model).classify(query).await
    }

    #[tokio::test]
    async fn model_labels_map_to_classes() {
        assert_eq!(
            classify_with("graph", "show me a chart of commits over time").await,
            QueryClass::Graph
        );
        assert_eq!(classify_with("text", "who committed the most").await, QueryClass::Text);
        assert_eq!(classify_with("  Graph.\n", "plot it").await, QueryClass::Graph);
        assert_eq!(classify_with("\"TEXT\"", "why").await, QueryClass::Text);
    }

    #[tokio::test]
    async fn unexpected_replies_fall_back_to_text() {
        for reply in ["chart", "graph or text", "I think this is a graph", ""] {
            assert_eq!(
                classify_with(reply, "show me commits").await,
                QueryClass::Text,
                "reply: {:?}",
                reply
            );
        }
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_text() {
        let model = Arc::new(ScriptedModel::failing());
        assert_eq!(LlmClassifier::new(model).classify("plot commits").await, QueryClass::Text);
    }

    #[tokio::test]
    async fn prompt_carries_instruction_and_query() {
        let model = Arc::new(ScriptedModel::replying("text"));
        let classifier = LlmClassifier::new(model.clone());
        classifier.classify("who committed the most").await;
        let prompt = model.last_prompt();
        assert!(prompt.contains("Answer only with 'graph' or 'text'"));
        assert!(prompt.ends_with("who committed the most"));
    }

    #[tokio::test]
    async fn keyword_classifier() {
        assert_eq!(
            KeywordClassifier.classify("Show me a chart of commits over time").await,
            QueryClass::Graph
        );
        assert_eq!(KeywordClassifier.classify("who committed the most").await, QueryClass::Text);
    }
}
