use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Feature, Result};
use crate::models::Resource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
}

impl SearchHit {
    pub fn markdown_link(&self) -> String {
        format!("- [{}]({})", self.title, self.link)
    }
}

impl From<&Resource> for SearchHit {
    fn from(resource: &Resource) -> Self {
        Self {
            title: resource.title.clone(),
            link: resource.link.clone(),
        }
    }
}

/// Similarity index over resource text. May be absent or fail at call time;
/// callers treat any error as "index unavailable".
#[async_trait]
pub trait EmbeddingIndex: Send + Sync {
    /// At most `k` hits, most similar first.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<SearchHit>>;

    async fn add(&self, resource: &Resource) -> Result<()>;
}

/// Used when no embedding model is configured.
pub struct NullIndex;

#[async_trait]
impl EmbeddingIndex for NullIndex {
    async fn query(&self, _text: &str, _k: usize) -> Result<Vec<SearchHit>> {
        Err(AppError::FeatureUnavailable(Feature::EmbeddingIndex))
    }

    async fn add(&self, _resource: &Resource) -> Result<()> {
        Err(AppError::FeatureUnavailable(Feature::EmbeddingIndex))
    }
}

struct IndexedResource {
    id: i64,
    hit: SearchHit,
    vector: Vec<f32>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// In-memory vector index backed by an OpenAI-compatible `/embeddings` endpoint.
/// Built from the resource store on first query.
pub struct HttpEmbeddingIndex {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    repository: Repository,
    entries: RwLock<Option<Vec<IndexedResource>>>,
}

impl HttpEmbeddingIndex {
    pub fn new(config: &Config, model: String, repository: Repository) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.embedding_endpoint().trim_end_matches('/')),
            model,
            api_key: config.llm_api_key.clone(),
            repository,
            entries: RwLock::new(None),
        })
    }

    async fn embed(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Embedding(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Embedding(format!("endpoint returned HTTP {status}")));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Embedding(e.to_string()))?;
        if parsed.data.len() != input.len() {
            return Err(AppError::Embedding(format!(
                "expected {} vectors, got {}",
                input.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn ensure_built(&self) -> Result<()> {
        if self.entries.read().await.is_some() {
            return Ok(());
        }

        let mut entries = self.entries.write().await;
        if entries.is_some() {
            return Ok(());
        }

        let resources = self.repository.get_all_resources().await?;
        let documents: Vec<String> = resources.iter().map(Resource::document).collect();
        let vectors = self.embed(&documents).await?;

        tracing::info!(count = resources.len(), "Built embedding index");
        *entries = Some(
            resources
                .iter()
                .zip(vectors)
                .map(|(resource, vector)| IndexedResource {
                    id: resource.id,
                    hit: resource.into(),
                    vector,
                })
                .collect(),
        );
        Ok(())
    }
}

#[async_trait]
impl EmbeddingIndex for HttpEmbeddingIndex {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.ensure_built().await?;

        let mut vectors = self.embed(&[text.to_string()]).await?;
        let query = vectors
            .pop()
            .ok_or_else(|| AppError::Embedding("empty query embedding".to_string()))?;

        let entries = self.entries.read().await;
        let Some(entries) = entries.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(rank(&query, entries, k))
    }

    async fn add(&self, resource: &Resource) -> Result<()> {
        // Not built yet, or a build already read it from the store.
        match self.entries.read().await.as_ref() {
            None => return Ok(()),
            Some(entries) if contains(entries, resource.id) => return Ok(()),
            Some(_) => {}
        }

        let mut vectors = self.embed(&[resource.document()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| AppError::Embedding("empty resource embedding".to_string()))?;

        if let Some(entries) = self.entries.write().await.as_mut() {
            if !contains(entries, resource.id) {
                entries.push(IndexedResource {
                    id: resource.id,
                    hit: resource.into(),
                    vector,
                });
            }
        }
        Ok(())
    }
}

fn contains(entries: &[IndexedResource], id: i64) -> bool {
    entries.iter().any(|entry| entry.id == id)
}

fn rank(query: &[f32], entries: &[IndexedResource], k: usize) -> Vec<SearchHit> {
    let mut scored: Vec<(f64, &IndexedResource)> = entries
        .iter()
        .map(|entry| (cosine_similarity(query, &entry.vector), entry))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(k)
        .map(|(_, entry)| entry.hit.clone())
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub fn build_embedding_index(
    config: &Config,
    repository: Repository,
) -> Result<Arc<dyn EmbeddingIndex>> {
    match config.embedding_model.as_ref().filter(|m| !m.trim().is_empty()) {
        Some(model) => {
            tracing::info!(model = %model, "Vector search enabled");
            Ok(Arc::new(HttpEmbeddingIndex::new(
                config,
                model.clone(),
                repository,
            )?))
        }
        None => {
            tracing::info!("No embedding model configured, using simple resource search");
            Ok(Arc::new(NullIndex))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, vector: Vec<f32>) -> IndexedResource {
        IndexedResource {
            id: 0,
            hit: SearchHit {
                title: title.to_string(),
                link: format!("https://{title}"),
            },
            vector,
        }
    }

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let sim = cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]);
        assert!((sim - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn rank_orders_by_similarity_and_truncates() {
        let entries = vec![
            entry("far", vec![0.0, 1.0]),
            entry("near", vec![1.0, 0.1]),
            entry("middle", vec![1.0, 1.0]),
        ];
        let hits = rank(&[1.0, 0.0], &entries, 2);
        let titles: Vec<&str> = hits.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["near", "middle"]);
    }

    #[tokio::test]
    async fn null_index_is_unavailable() {
        let err = NullIndex.query("sql", 5).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::FeatureUnavailable(Feature::EmbeddingIndex)
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_embedding_error() {
        let repository = Repository::in_memory().await.unwrap();
        let config = Config {
            embedding_base_url: Some("http://127.0.0.1:9".to_string()),
            llm_timeout_secs: 5,
            ..Config::default()
        };
        let index = HttpEmbeddingIndex::new(&config, "m".to_string(), repository).unwrap();
        let err = index.query("sql", 5).await.unwrap_err();
        assert!(matches!(err, AppError::Embedding(_)));
    }

    #[tokio::test]
    async fn add_skips_resources_the_build_already_read() {
        let repository = Repository::in_memory().await.unwrap();
        let resource = repository.get_all_resources().await.unwrap().remove(0);
        let config = Config {
            embedding_base_url: Some("http://127.0.0.1:9".to_string()),
            llm_timeout_secs: 5,
            ..Config::default()
        };
        let index = HttpEmbeddingIndex::new(&config, "m".to_string(), repository).unwrap();
        *index.entries.write().await = Some(vec![IndexedResource {
            id: resource.id,
            hit: (&resource).into(),
            vector: vec![1.0, 0.0],
        }]);

        // no embedding call is made, so the unreachable endpoint is never hit
        index.add(&resource).await.unwrap();
        assert_eq!(index.entries.read().await.as_ref().unwrap().len(), 1);
    }
}
