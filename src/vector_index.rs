// src/vector_index.rs

use crate::embedding::{cosine, Embedder};
use crate::error::{Error, Result};
use crate::templates::{self, ChartTemplate, CATALOG};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub const TEMPLATE_COLLECTION: &str = "chart_templates";

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPoint {
    pub id: u64,
    pub vector: Vec<f32>,
    /// Template name carried as payload
    pub name: String,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts or replaces points by id
    async fn upsert(&self, points: Vec<IndexedPoint>) -> Result<()>;

    /// Payload name of the single closest point
    async fn nearest(&self, vector: &[f32]) -> Result<Option<String>>;
}

#[derive(Debug, Default)]
pub struct MemoryIndex {
    points: RwLock<Vec<IndexedPoint>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, points: Vec<IndexedPoint>) -> Result<()> {
        let mut stored = self
            .points
            .write()
            .map_err(|_| Error::ExternalService("memory index lock poisoned".to_string()))?;
        for point in points {
            match stored.iter_mut().find(|p| p.id == point.id) {
                Some(existing) => *existing = point,
                None => stored.push(point),
            }
        }
        Ok(())
    }

    async fn nearest(&self, vector: &[f32]) -> Result<Option<String>> {
        let stored = self
            .points
            .read()
            .map_err(|_| Error::ExternalService("memory index lock poisoned".to_string()))?;

        // Strict comparison keeps the earliest point on ties
        let mut best: Option<(&IndexedPoint, f32)> = None;
        for point in stored.iter() {
            let score = cosine(vector, &point.vector);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((point, score));
            }
        }
        Ok(best.map(|(p, _)| p.name.clone()))
    }
}

/// Qdrant over its REST API
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    collection_ready: OnceCell<()>,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<PointPayload>,
}

#[derive(Deserialize)]
struct PointPayload {
    name: String,
}

impl QdrantIndex {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            collection: TEMPLATE_COLLECTION.to_string(),
            collection_ready: OnceCell::new(),
        })
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/collections/{}{}", self.base_url, self.collection, path);
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        action: &str,
    ) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::ExternalService(format!("Qdrant {} failed: {}", action, e)))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ExternalService(format!(
                "Qdrant {} failed with {}: {}",
                action,
                status,
                body.trim()
            )));
        }
        Ok(response)
    }

    /// Creates the collection unless it already exists
    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        self.collection_ready
            .get_or_try_init(|| async {
                let existing = self
                    .request(reqwest::Method::GET, "")
                    .send()
                    .await
                    .map_err(|e| Error::ExternalService(format!("Qdrant lookup failed: {}", e)))?;
                if existing.status().is_success() {
                    debug!(collection = %self.collection, "collection exists");
                    return Ok(());
                }

                info!(collection = %self.collection, dimensions, "creating collection");
                let body = json!({ "vectors": { "size": dimensions, "distance": "Cosine" } });
                self.send(self.request(reqwest::Method::PUT, "").json(&body), "create collection")
                    .await?;
                Ok::<(), Error>(())
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, points: Vec<IndexedPoint>) -> Result<()> {
        let Some(dimensions) = points.first().map(|p| p.vector.len()) else {
            return Ok(());
        };
        self.ensure_collection(dimensions).await?;

        let points: Vec<_> = points
            .into_iter()
            .map(|p| json!({ "id": p.id, "vector": p.vector, "payload": { "name": p.name } }))
            .collect();
        self.send(
            self.request(reqwest::Method::PUT, "/points")
                .query(&[("wait", "true")])
                .json(&json!({ "points": points })),
            "upsert",
        )
        .await?;
        Ok(())
    }

    async fn nearest(&self, vector: &[f32]) -> Result<Option<String>> {
        let body = json!({ "vector": vector, "limit": 1, "with_payload": true });
        let response = self
            .send(self.request(reqwest::Method::POST, "/points/search").json(&body), "search")
            .await?;
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| {
                Error::ExternalService(format!("Qdrant search returned bad JSON: {}", e))
            })?;

        Ok(parsed.result.into_iter().next().and_then(|hit| {
            debug!(score = hit.score, "nearest template");
            hit.payload.map(|p| p.name)
        }))
    }
}

/// Picks the chart template closest to a question
pub struct TemplateSelector {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    seeded: OnceCell<()>,
}

impl TemplateSelector {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            seeded: OnceCell::new(),
        }
    }

    /// Stores the catalog in the index. Ids are fixed, so running it again
    /// rewrites the same nine points.
    pub async fn seed(&self) -> Result<()> {
        self.seeded
            .get_or_try_init(|| async {
                let mut points = Vec::with_capacity(CATALOG.len());
                for (id, template) in CATALOG.iter().enumerate() {
                    points.push(IndexedPoint {
                        id: id as u64,
                        vector: self.embedder.embed(template.description).await?,
                        name: template.name.to_string(),
                    });
                }
                self.index.upsert(points).await?;
                info!(templates = CATALOG.len(), "chart templates indexed");
                Ok::<(), Error>(())
            })
            .await
            .map(|_| ())
    }

    pub async fn select(&self, query: &str) -> Result<&'static ChartTemplate> {
        self.seed().await?;
        let vector = self.embedder.embed(query).await?;
        let name = self
            .index
            .nearest(&vector)
            .await?
            .ok_or_else(|| Error::ExternalService("vector index returned no match".to_string()))?;
        let template = templates::by_name(&name).ok_or_else(|| {
            Error::ExternalService(format!("vector index returned unknown template '{}'", name))
        })?;
        info!(template = template.name, "template selected");
        Ok(template)
    }
}
