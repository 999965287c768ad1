use std::sync::Arc;

use serde::Serialize;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{NewResource, Resource};
use crate::services::ErrorLogger;

use super::embedding::{EmbeddingIndex, SearchHit};

pub const NOTHING_FOUND: &str = "Ничего не найдено. Попробуйте изменить запрос.";

const VECTOR_RESULTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Vector,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub source: SearchSource,
    pub hits: Vec<SearchHit>,
}

impl SearchOutcome {
    /// One markdown link per line, or the "nothing found" sentinel.
    pub fn render(&self) -> String {
        if self.hits.is_empty() {
            return NOTHING_FOUND.to_string();
        }
        self.hits
            .iter()
            .map(SearchHit::markdown_link)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Vector search with a tag/substring fallback over the resource store.
#[derive(Clone)]
pub struct RetrievalService {
    repository: Repository,
    index: Arc<dyn EmbeddingIndex>,
    errors: ErrorLogger,
}

impl RetrievalService {
    pub fn new(repository: Repository, index: Arc<dyn EmbeddingIndex>, errors: ErrorLogger) -> Self {
        Self {
            repository,
            index,
            errors,
        }
    }

    pub async fn search(&self, query: &str) -> Result<SearchOutcome> {
        match self.index.query(query, VECTOR_RESULTS).await {
            Ok(hits) if !hits.is_empty() => {
                return Ok(SearchOutcome {
                    source: SearchSource::Vector,
                    hits,
                });
            }
            Ok(_) => tracing::debug!(query, "Vector search returned nothing, falling back"),
            Err(e) => self.errors.record("vector search", &e).await,
        }

        let hits = self
            .errors
            .intercept("resource search", self.repository.search_resources(query))
            .await?
            .iter()
            .map(SearchHit::from)
            .collect();
        Ok(SearchOutcome {
            source: SearchSource::Fallback,
            hits,
        })
    }

    pub async fn find_resources(&self, query: &str) -> Result<String> {
        Ok(self.search(query).await?.render())
    }

    /// Stores the resource, then offers it to the index. Index failures never fail the add.
    pub async fn add_resource(&self, resource: NewResource) -> Result<Resource> {
        let stored = self
            .errors
            .intercept("add resource", async {
                let id = self.repository.insert_resource(resource).await?;
                self.repository
                    .get_resource(id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("resource {id}")))
            })
            .await?;

        if let Err(e) = self.index.add(&stored).await {
            self.errors.record("index resource", &e).await;
        }
        tracing::info!(id = stored.id, title = %stored.title, "Added knowledge resource");
        Ok(stored)
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        self.errors
            .intercept("list resources", self.repository.get_all_resources())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::NullIndex;
    use async_trait::async_trait;

    struct FailingIndex;

    #[async_trait]
    impl EmbeddingIndex for FailingIndex {
        async fn query(&self, _text: &str, _k: usize) -> Result<Vec<SearchHit>> {
            Err(AppError::Embedding("connection reset".to_string()))
        }

        async fn add(&self, _resource: &Resource) -> Result<()> {
            Err(AppError::Embedding("connection reset".to_string()))
        }
    }

    struct EmptyIndex;

    #[async_trait]
    impl EmbeddingIndex for EmptyIndex {
        async fn query(&self, _text: &str, _k: usize) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }

        async fn add(&self, _resource: &Resource) -> Result<()> {
            Ok(())
        }
    }

    struct FixedIndex(Vec<SearchHit>);

    #[async_trait]
    impl EmbeddingIndex for FixedIndex {
        async fn query(&self, _text: &str, k: usize) -> Result<Vec<SearchHit>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }

        async fn add(&self, _resource: &Resource) -> Result<()> {
            Ok(())
        }
    }

    fn service(repository: &Repository, index: Arc<dyn EmbeddingIndex>) -> RetrievalService {
        RetrievalService::new(repository.clone(), index, ErrorLogger::new(repository.clone()))
    }

    fn fallback_text(resources: &[Resource]) -> String {
        if resources.is_empty() {
            return NOTHING_FOUND.to_string();
        }
        resources
            .iter()
            .map(Resource::markdown_link)
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn unavailable_index_gives_exactly_the_fallback() {
        let repository = Repository::in_memory().await.unwrap();
        let queries = ["sql", "Найди статью про API", "kafka", "микросервис", "", "xyz"];

        for index in [
            Arc::new(NullIndex) as Arc<dyn EmbeddingIndex>,
            Arc::new(FailingIndex),
            Arc::new(EmptyIndex),
        ] {
            let retrieval = service(&repository, index);
            for query in queries {
                let expected = fallback_text(&repository.search_resources(query).await.unwrap());
                assert_eq!(retrieval.find_resources(query).await.unwrap(), expected);
            }
        }
    }

    #[tokio::test]
    async fn sql_query_finds_sql_academy() {
        let repository = Repository::unseeded().await.unwrap();
        repository
            .insert_resource(NewResource {
                title: "SQL Academy".to_string(),
                link: "https://sql-academy.org/".to_string(),
                tags: "sql,practice".to_string(),
            })
            .await
            .unwrap();

        let retrieval = service(&repository, Arc::new(NullIndex));
        assert_eq!(
            retrieval.find_resources("sql").await.unwrap(),
            "- [SQL Academy](https://sql-academy.org/)"
        );
    }

    #[tokio::test]
    async fn tag_in_any_case_finds_the_resource() {
        let repository = Repository::in_memory().await.unwrap();
        let retrieval = service(&repository, Arc::new(NullIndex));
        let added = retrieval
            .add_resource(NewResource {
                title: "Camunda Modeler".to_string(),
                link: "https://camunda.com".to_string(),
                tags: "Camunda, bpmn".to_string(),
            })
            .await
            .unwrap();

        for query in ["camunda", "CAMUNDA", "CaMuNdA"] {
            let outcome = retrieval.search(query).await.unwrap();
            assert_eq!(outcome.source, SearchSource::Fallback);
            assert!(outcome.hits.iter().any(|h| h.link == added.link));
        }
    }

    #[tokio::test]
    async fn empty_fallback_returns_sentinel() {
        let repository = Repository::in_memory().await.unwrap();
        let retrieval = service(&repository, Arc::new(FailingIndex));
        assert_eq!(
            retrieval.find_resources("квантовая физика").await.unwrap(),
            NOTHING_FOUND
        );
        // index failures are external errors and land in the log
        let logs = repository.get_error_logs(10).await.unwrap();
        assert_eq!(logs[0].error_type, "Embedding");
    }

    #[tokio::test]
    async fn vector_hits_win_when_present() {
        let repository = Repository::in_memory().await.unwrap();
        let hit = SearchHit {
            title: "Vector".to_string(),
            link: "https://v".to_string(),
        };
        let retrieval = service(&repository, Arc::new(FixedIndex(vec![hit.clone(); 7])));

        let outcome = retrieval.search("sql").await.unwrap();
        assert_eq!(outcome.source, SearchSource::Vector);
        assert_eq!(outcome.hits.len(), VECTOR_RESULTS);
        assert_eq!(outcome.hits[0], hit);
    }

    #[tokio::test]
    async fn index_failure_does_not_fail_add() {
        let repository = Repository::in_memory().await.unwrap();
        let retrieval = service(&repository, Arc::new(FailingIndex));
        let added = retrieval
            .add_resource(NewResource {
                title: "DMN".to_string(),
                link: "https://dmn".to_string(),
                tags: "dmn".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(added.tags, vec!["dmn"]);

        let err = retrieval
            .add_resource(NewResource {
                title: String::new(),
                link: "https://x".to_string(),
                tags: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn store_failures_are_logged() {
        let repository = Repository::in_memory().await.unwrap();
        let retrieval = service(&repository, Arc::new(EmptyIndex));
        repository.execute_batch("DROP TABLE knowledge_base").await.unwrap();

        assert!(matches!(retrieval.list_resources().await, Err(AppError::Database(_))));
        assert!(matches!(retrieval.search("sql").await, Err(AppError::Database(_))));

        let logs = repository.get_error_logs(10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.error_type == "Database"));
    }
}
