// src/config.rs
//
// Settings assembled from the environment (and `.env`) plus the provider
// choices made on the command line. Keys a chosen provider needs are checked
// before any network work starts.

use crate::classifier::{Classify, KeywordClassifier, LlmClassifier};
use crate::embedding::{Embedder, GeminiEmbedder, HashingEmbedder};
use crate::error::{Error, Result};
use crate::github::{GitHubClient, GitHubConfig, DEFAULT_API_URL};
use crate::graph_agent::GraphAgent;
use crate::llm::{GeminiClient, GroqClient, LanguageModel};
use crate::renderer::RenderOptions;
use crate::session::Assistant;
use crate::summary::SummaryConfig;
use crate::text_agent::TextAgent;
use crate::vector_index::{MemoryIndex, QdrantIndex, TemplateSelector, VectorIndex};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const GITHUB_API_URL: &str = "GITHUB_API_URL";
pub const GROQ_API_KEY: &str = "GROQ_API_KEY";
pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const QDRANT_URL: &str = "QDRANT_URL";
pub const QDRANT_API_KEY: &str = "QDRANT_API_KEY";

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    /// Groq chat completions
    Groq,
    /// Google Gemini generateContent
    Gemini,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassifierKind {
    /// Ask the language model
    Llm,
    /// Offline keyword heuristic
    Keyword,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexBackend {
    /// In-process cosine search
    Memory,
    /// Qdrant over REST
    Qdrant,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbedderKind {
    /// Local feature hashing, no network
    Hashing,
    /// Gemini text-embedding-004
    Gemini,
}

/// Provider choices for the question-answering pipeline
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub llm: LlmProvider,
    pub model: Option<String>,
    pub classifier: ClassifierKind,
    pub index: IndexBackend,
    pub embedder: EmbedderKind,
    pub summary: SummaryConfig,
    pub render: RenderOptions,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            llm: LlmProvider::Groq,
            model: None,
            classifier: ClassifierKind::Llm,
            index: IndexBackend::Memory,
            embedder: EmbedderKind::Hashing,
            summary: SummaryConfig::default(),
            render: RenderOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub github_token: Option<String>,
    pub github_api_url: String,
    pub groq_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub qdrant_url: Option<String>,
    pub qdrant_api_key: Option<String>,
    pub request_timeout: Duration,
}

impl Settings {
    /// Reads the process environment. `.env` must already be loaded.
    pub fn from_env(data_dir: PathBuf) -> Self {
        Self::from_lookup(data_dir, |key| std::env::var(key).ok())
    }

    /// Empty values count as unset.
    pub fn from_lookup(data_dir: PathBuf, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            data_dir,
            github_token: get(GITHUB_TOKEN),
            github_api_url: get(GITHUB_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            groq_api_key: get(GROQ_API_KEY),
            gemini_api_key: get(GEMINI_API_KEY),
            qdrant_url: get(QDRANT_URL),
            qdrant_api_key: get(QDRANT_API_KEY),
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Fails on the first key a selected provider needs but is missing
    pub fn validate(&self, config: &AssistantConfig) -> Result<()> {
        match config.llm {
            LlmProvider::Groq => require(&self.groq_api_key, GROQ_API_KEY)?,
            LlmProvider::Gemini => require(&self.gemini_api_key, GEMINI_API_KEY)?,
        };
        if config.embedder == EmbedderKind::Gemini {
            require(&self.gemini_api_key, GEMINI_API_KEY)?;
        }
        if config.index == IndexBackend::Qdrant {
            require(&self.qdrant_url, QDRANT_URL)?;
        }
        Ok(())
    }

    /// The REST API is always called with a bearer token
    pub fn github_client(
        &self,
        max_pages: usize,
        fetch_details: bool,
        show_progress: bool,
    ) -> Result<GitHubClient> {
        let token = self.github_token.clone().ok_or_else(|| {
            Error::Config(format!("{} must be set to collect repository data", GITHUB_TOKEN))
        })?;
        GitHubClient::new(GitHubConfig {
            token: Some(token),
            api_url: self.github_api_url.clone(),
            max_pages,
            fetch_details,
            show_progress,
            ..Default::default()
        })
    }

    pub fn language_model(
        &self,
        provider: LlmProvider,
        model: Option<String>,
    ) -> Result<Arc<dyn LanguageModel>> {
        Ok(match provider {
            LlmProvider::Groq => Arc::new(GroqClient::new(
                require(&self.groq_api_key, GROQ_API_KEY)?,
                model,
                self.request_timeout,
            )?),
            LlmProvider::Gemini => Arc::new(GeminiClient::new(
                require(&self.gemini_api_key, GEMINI_API_KEY)?,
                model,
                self.request_timeout,
            )?),
        })
    }

    pub fn embedder(&self, kind: EmbedderKind) -> Result<Arc<dyn Embedder>> {
        Ok(match kind {
            EmbedderKind::Hashing => Arc::new(HashingEmbedder::default()),
            EmbedderKind::Gemini => Arc::new(GeminiEmbedder::new(
                require(&self.gemini_api_key, GEMINI_API_KEY)?,
                self.request_timeout,
            )?),
        })
    }

    pub fn vector_index(&self, backend: IndexBackend) -> Result<Arc<dyn VectorIndex>> {
        Ok(match backend {
            IndexBackend::Memory => Arc::new(MemoryIndex::new()),
            IndexBackend::Qdrant => Arc::new(QdrantIndex::new(
                require(&self.qdrant_url, QDRANT_URL)?,
                self.qdrant_api_key.clone(),
                self.request_timeout,
            )?),
        })
    }

    pub fn assistant(&self, config: &AssistantConfig) -> Result<Assistant> {
        self.validate(config)?;
        debug!(?config, "building assistant");

        let model = self.language_model(config.llm, config.model.clone())?;
        let classifier: Arc<dyn Classify> = match config.classifier {
            ClassifierKind::Llm => Arc::new(LlmClassifier::new(model.clone())),
            ClassifierKind::Keyword => Arc::new(KeywordClassifier),
        };
        let embedder = self.embedder(config.embedder)?;
        let selector = TemplateSelector::new(embedder, self.vector_index(config.index)?);

        Ok(Assistant::new(
            classifier,
            TextAgent::new(model.clone(), config.summary.max_context_chars),
            selector,
            GraphAgent::new(model, config.render, config.summary.max_context_chars),
        ))
    }
}

fn require(value: &Option<String>, key: &str) -> Result<String> {
    value
        .clone()
        .ok_or_else(|| Error::Config(format!("{} must be set for the selected provider", key)))
}
