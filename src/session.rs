// src/session.rs
//
// One analysis session per repository: the collected tables plus the derived
// views every query reads. Sessions are immutable; re-collecting a repository
// replaces its session.

use crate::chart::ChartBindings;
use crate::classifier::{Classify, QueryClass};
use crate::entities::{EntityCounts, EntityExtractor};
use crate::error::{Error, Result};
use crate::graph_agent::{GraphAgent, RenderedChart};
use crate::model::{RepoId, RepoTables};
use crate::summary::{CommitSummary, SummaryConfig};
use crate::text_agent::TextAgent;
use crate::vector_index::TemplateSelector;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub const CHART_FALLBACK_MESSAGE: &str = "Sorry, I couldn't produce a chart for that question. \
     Try rephrasing it or asking for a text answer.";

#[derive(Debug)]
pub struct Session {
    pub repo: RepoId,
    pub tables: Arc<RepoTables>,
    pub entities: EntityCounts,
    pub summary: CommitSummary,
    pub bindings: ChartBindings,
}

impl Session {
    pub fn new(
        repo: RepoId,
        tables: Arc<RepoTables>,
        extractor: &dyn EntityExtractor,
        config: &SummaryConfig,
    ) -> Self {
        let entities = EntityCounts::from_commits(extractor, &tables.commits);
        let summary = CommitSummary::build(&tables.commits, &entities, config);
        let bindings = ChartBindings::new(&tables.commits, &entities);
        info!(
            repo = %repo,
            commits = tables.commits.len(),
            entities = entities.ranked().len(),
            "session ready"
        );
        Self {
            repo,
            tables,
            entities,
            summary,
            bindings,
        }
    }
}

/// Sessions keyed by repository. Entries live until invalidated.
#[derive(Debug, Default)]
pub struct SessionCache {
    sessions: Mutex<HashMap<RepoId, Arc<Session>>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, repo: &RepoId) -> Option<Arc<Session>> {
        self.sessions.lock().ok()?.get(repo).cloned()
    }

    /// Replaces any session already cached for the same repository
    pub fn insert(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(session.repo.clone(), session.clone());
        }
        session
    }

    pub fn invalidate(&self, repo: &RepoId) -> bool {
        self.sessions
            .lock()
            .map(|mut sessions| sessions.remove(repo).is_some())
            .unwrap_or(false)
    }

    /// Cached session, or a new one built from `load`
    pub async fn get_or_try_insert_with<F, Fut>(
        &self,
        repo: &RepoId,
        load: F,
    ) -> Result<Arc<Session>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Session>>,
    {
        if let Some(session) = self.get(repo) {
            return Ok(session);
        }
        Ok(self.insert(load().await?))
    }
}

#[derive(Debug, Clone)]
pub enum QueryResponse {
    Text(String),
    Chart(RenderedChart),
    /// The chart could not be produced; shown instead of an error
    Fallback(String),
}

/// Routes a question to the text or chart composer
pub struct Assistant {
    classifier: Arc<dyn Classify>,
    text_agent: TextAgent,
    selector: TemplateSelector,
    graph_agent: GraphAgent,
}

impl Assistant {
    pub fn new(
        classifier: Arc<dyn Classify>,
        text_agent: TextAgent,
        selector: TemplateSelector,
        graph_agent: GraphAgent,
    ) -> Self {
        Self {
            classifier,
            text_agent,
            selector,
            graph_agent,
        }
    }

    /// Chart failures become `QueryResponse::Fallback`; model and vector
    /// service failures are returned as errors for this query only.
    pub async fn ask(&self, session: &Session, query: &str) -> Result<QueryResponse> {
        if query.trim().is_empty() {
            return Err(Error::Config("query must not be empty".to_string()));
        }

        match self.classifier.classify(query).await {
            QueryClass::Text => {
                let answer = self.text_agent.answer(query, &session.summary).await?;
                Ok(QueryResponse::Text(answer))
            }
            QueryClass::Graph => {
                let template = self.selector.select(query).await?;
                match self
                    .graph_agent
                    .compose(query, template, &session.bindings, &session.summary)
                    .await
                {
                    Ok(chart) => Ok(QueryResponse::Chart(chart)),
                    Err(e) if e.is_chart_failure() => {
                        warn!(
                            error = %e,
                            template = template.name,
                            "chart failed, answering with fallback"
                        );
                        Ok(QueryResponse::Fallback(CHART_FALLBACK_MESSAGE.to_string()))
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }
}
