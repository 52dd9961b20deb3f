//! Store Interface (spec §4.G): a consumer contract, not a storage engine.
//!
//! The core pipeline only depends on this trait; swapping in a persistent backend is a
//! matter of implementing it. This crate ships one concrete implementation, an
//! in-memory store, sufficient to run the pipeline standalone and for tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{Alert, Article, Cluster, DuplicateLink, Embedding};

pub use memory::InMemoryStore;

/// Filters applied by [`StoreInterface::find_candidate_articles`] (spec §4.D candidate
/// retrieval: shares source, category, or any tag with the querying article).
#[derive(Debug, Clone, Default)]
pub struct CandidateFilters {
    pub source: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

#[async_trait]
pub trait StoreInterface: Send + Sync {
    async fn put_article(&self, article: Article) -> Result<(), PipelineError>;
    async fn find_article_by_url(&self, url: &str) -> Result<Option<Article>, PipelineError>;
    async fn find_article_by_hash(&self, hash: &str) -> Result<Option<Article>, PipelineError>;
    async fn get_article(&self, id: Uuid) -> Result<Option<Article>, PipelineError>;

    /// Articles published within `[now - window, now]`, excluding `exclude_id`,
    /// matching at least one of `filters`, capped at 50, ordered by `published_at` desc.
    async fn find_candidate_articles(
        &self,
        now: DateTime<Utc>,
        window: chrono::Duration,
        exclude_id: Uuid,
        filters: &CandidateFilters,
    ) -> Result<Vec<Article>, PipelineError>;

    async fn update_article_flags(
        &self,
        id: Uuid,
        is_duplicate: bool,
        original_article_id: Option<Uuid>,
        processed_at: DateTime<Utc>,
    ) -> Result<(), PipelineError>;

    async fn mark_alert_sent(&self, article_id: Uuid) -> Result<(), PipelineError>;

    async fn put_duplicate_link(&self, link: DuplicateLink) -> Result<(), PipelineError>;
    async fn find_duplicate_link_for(
        &self,
        duplicate_article_id: Uuid,
    ) -> Result<Option<DuplicateLink>, PipelineError>;

    async fn put_cluster(&self, cluster: Cluster) -> Result<(), PipelineError>;
    async fn update_cluster(&self, cluster: Cluster) -> Result<(), PipelineError>;
    async fn get_cluster(&self, id: Uuid) -> Result<Option<Cluster>, PipelineError>;
    async fn find_cluster_for_article(&self, article_id: Uuid) -> Result<Option<Cluster>, PipelineError>;
    async fn list_clusters(&self) -> Result<Vec<Cluster>, PipelineError>;

    async fn put_embedding(&self, embedding: Embedding) -> Result<(), PipelineError>;
    async fn find_embedding_by_article(&self, article_id: Uuid) -> Result<Option<Embedding>, PipelineError>;

    async fn put_alert(&self, alert: Alert) -> Result<(), PipelineError>;
    async fn update_alert_status(&self, alert: Alert) -> Result<(), PipelineError>;
    async fn list_recent_alerts(&self, since: DateTime<Utc>) -> Result<Vec<Alert>, PipelineError>;

    async fn put_metric(&self, name: &str, value: f64) -> Result<(), PipelineError>;
}
