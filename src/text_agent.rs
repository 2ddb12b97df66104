// src/text_agent.rs

use crate::error::Result;
use crate::llm::LanguageModel;
use crate::summary::CommitSummary;
use std::sync::Arc;
use tracing::info;

/// Answers questions in prose from the commit summary
pub struct TextAgent {
    model: Arc<dyn LanguageModel>,
    max_context_chars: usize,
}

impl TextAgent {
    pub fn new(model: Arc<dyn LanguageModel>, max_context_chars: usize) -> Self {
        Self {
            model,
            max_context_chars,
        }
    }

    pub fn prompt(&self, query: &str, summary: &CommitSummary) -> String {
        format!(
            "Given the following GitHub commit data:\n\n{}\n\
             Please answer the following query:\n{}\n\n\
             Provide your answer in a clear, concise manner.",
            summary.context(self.max_context_chars),
            query.trim()
        )
    }

    /// Returns the model's answer unmodified. A failed call is an
    /// `ExternalService` error, never an empty answer.
    pub async fn answer(&self, query: &str, summary: &CommitSummary) -> Result<String> {
        info!(provider = self.model.name(), "generating text response");
        self.model.complete(&self.prompt(query, summary)).await
    }
}
