//! In-memory `StoreInterface` implementation, backed by `dashmap` concurrent maps for
//! lock-free reads and writes under concurrent feed polling. Useful for tests and for
//! running the pipeline without a database.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{Alert, Article, Cluster, DuplicateLink, Embedding};

use super::{CandidateFilters, StoreInterface};

#[derive(Default)]
pub struct InMemoryStore {
    articles: DashMap<Uuid, Article>,
    by_url: DashMap<String, Uuid>,
    by_hash: DashMap<String, Uuid>,
    links: DashMap<Uuid, DuplicateLink>, // keyed by duplicate_article_id
    clusters: DashMap<Uuid, Cluster>,
    article_cluster: DashMap<Uuid, Uuid>, // article_id -> cluster_id
    embeddings: DashMap<Uuid, Embedding>,
    alerts: DashMap<Uuid, Alert>,
    metrics: DashMap<String, f64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreInterface for InMemoryStore {
    async fn put_article(&self, article: Article) -> Result<(), PipelineError> {
        self.by_url.insert(article.url.clone(), article.id);
        self.by_hash.insert(article.content_hash.clone(), article.id);
        self.articles.insert(article.id, article);
        Ok(())
    }

    async fn find_article_by_url(&self, url: &str) -> Result<Option<Article>, PipelineError> {
        Ok(self
            .by_url
            .get(url)
            .and_then(|id| self.articles.get(&*id).map(|a| a.clone())))
    }

    async fn find_article_by_hash(&self, hash: &str) -> Result<Option<Article>, PipelineError> {
        Ok(self
            .by_hash
            .get(hash)
            .and_then(|id| self.articles.get(&*id).map(|a| a.clone())))
    }

    async fn get_article(&self, id: Uuid) -> Result<Option<Article>, PipelineError> {
        Ok(self.articles.get(&id).map(|a| a.clone()))
    }

    async fn find_candidate_articles(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        exclude_id: Uuid,
        filters: &CandidateFilters,
    ) -> Result<Vec<Article>, PipelineError> {
        let cutoff = now - window;
        let mut candidates: Vec<Article> = self
            .articles
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|a| a.id != exclude_id)
            .filter(|a| a.published_at >= cutoff && a.published_at <= now)
            .filter(|a| {
                filters
                    .source
                    .as_ref()
                    .is_some_and(|s| &a.source == s)
                    || filters
                        .category
                        .as_ref()
                        .is_some_and(|c| &a.category == c)
                    || filters.tags.iter().any(|t| a.tags.contains(t))
            })
            .collect();

        candidates.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        candidates.truncate(50);
        Ok(candidates)
    }

    async fn update_article_flags(
        &self,
        id: Uuid,
        is_duplicate: bool,
        original_article_id: Option<Uuid>,
        processed_at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        if let Some(mut article) = self.articles.get_mut(&id) {
            article.is_duplicate = is_duplicate;
            article.original_article_id = original_article_id;
            article.duplicate_checked = true;
            article.processed_at = Some(processed_at);
            Ok(())
        } else {
            Err(PipelineError::StoreError {
                operation: "update_article_flags".to_string(),
                message: format!("article {id} not found"),
            })
        }
    }

    async fn mark_alert_sent(&self, article_id: Uuid) -> Result<(), PipelineError> {
        if let Some(mut article) = self.articles.get_mut(&article_id) {
            article.alert_sent = true;
        }
        Ok(())
    }

    async fn put_duplicate_link(&self, link: DuplicateLink) -> Result<(), PipelineError> {
        self.links.insert(link.duplicate_article_id, link);
        Ok(())
    }

    async fn find_duplicate_link_for(
        &self,
        duplicate_article_id: Uuid,
    ) -> Result<Option<DuplicateLink>, PipelineError> {
        Ok(self.links.get(&duplicate_article_id).map(|l| l.clone()))
    }

    async fn put_cluster(&self, cluster: Cluster) -> Result<(), PipelineError> {
        for article_id in &cluster.article_ids {
            self.article_cluster.insert(*article_id, cluster.id);
        }
        self.clusters.insert(cluster.id, cluster);
        Ok(())
    }

    async fn update_cluster(&self, cluster: Cluster) -> Result<(), PipelineError> {
        self.put_cluster(cluster).await
    }

    async fn get_cluster(&self, id: Uuid) -> Result<Option<Cluster>, PipelineError> {
        Ok(self.clusters.get(&id).map(|c| c.clone()))
    }

    async fn find_cluster_for_article(&self, article_id: Uuid) -> Result<Option<Cluster>, PipelineError> {
        Ok(self
            .article_cluster
            .get(&article_id)
            .and_then(|cid| self.clusters.get(&*cid).map(|c| c.clone())))
    }

    async fn list_clusters(&self) -> Result<Vec<Cluster>, PipelineError> {
        Ok(self.clusters.iter().map(|e| e.value().clone()).collect())
    }

    async fn put_embedding(&self, embedding: Embedding) -> Result<(), PipelineError> {
        self.embeddings.insert(embedding.article_id, embedding);
        Ok(())
    }

    async fn find_embedding_by_article(&self, article_id: Uuid) -> Result<Option<Embedding>, PipelineError> {
        Ok(self.embeddings.get(&article_id).map(|e| e.clone()))
    }

    async fn put_alert(&self, alert: Alert) -> Result<(), PipelineError> {
        self.alerts.insert(alert.id, alert);
        Ok(())
    }

    async fn update_alert_status(&self, alert: Alert) -> Result<(), PipelineError> {
        self.alerts.insert(alert.id, alert);
        Ok(())
    }

    async fn list_recent_alerts(&self, since: DateTime<Utc>) -> Result<Vec<Alert>, PipelineError> {
        Ok(self
            .alerts
            .iter()
            .map(|e| e.value().clone())
            .filter(|a| a.created_at >= since)
            .collect())
    }

    async fn put_metric(&self, name: &str, value: f64) -> Result<(), PipelineError> {
        self.metrics.insert(name.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    fn sample_article(url: &str, hash: &str, published_at: DateTime<Utc>) -> Article {
        Article {
            id: Uuid::new_v4(),
            url: url.to_string(),
            content_hash: hash.to_string(),
            title: "Title".to_string(),
            summary: None,
            content: Some("content".to_string()),
            source: "source-a".to_string(),
            source_id: Uuid::new_v4(),
            category: "business".to_string(),
            tags: vec!["m&a".to_string()],
            priority: Priority::Medium,
            published_at,
            fetched_at: published_at,
            author: None,
            image_url: None,
            language: None,
            entities: vec![],
            duplicate_checked: false,
            is_duplicate: false,
            original_article_id: None,
            processed_at: None,
            alert_sent: false,
        }
    }

    #[tokio::test]
    async fn put_then_find_by_url_round_trips() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let article = sample_article("https://example.com/a", "hash-a", now);
        let id = article.id;
        store.put_article(article).await.unwrap();

        let found = store.find_article_by_url("https://example.com/a").await.unwrap();
        assert_eq!(found.unwrap().id, id);
    }

    #[tokio::test]
    async fn find_by_hash_is_an_alternate_index_on_the_same_article() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let article = sample_article("https://example.com/b", "hash-b", now);
        store.put_article(article).await.unwrap();

        assert!(store.find_article_by_hash("hash-b").await.unwrap().is_some());
        assert!(store.find_article_by_hash("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn candidate_window_boundary_is_inclusive() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let boundary = now - Duration::hours(24);
        let boundary_article = sample_article("https://example.com/c", "hash-c", boundary);
        let exclude = sample_article("https://example.com/d", "hash-d", now);
        let exclude_id = exclude.id;

        store.put_article(boundary_article).await.unwrap();
        store.put_article(exclude).await.unwrap();

        let filters = CandidateFilters {
            source: Some("source-a".to_string()),
            ..Default::default()
        };
        let candidates = store
            .find_candidate_articles(now, Duration::hours(24), exclude_id, &filters)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
    }
}
