//! Deduplication Engine (spec §4.D) — the largest subsystem in the pipeline.
//!
//! Retrieves window-bounded candidates sharing source/category/tag with a newly
//! normalized article, scores each against the article, assigns a primary detection
//! method, optionally gates borderline scores through an LLM, elects an original among
//! the article and its matched duplicates, and updates cluster membership.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::DedupConfig;
use crate::error::PipelineError;
use crate::models::{Article, Cluster, ClusterCentroid, DuplicateLink, LinkMetadataSnapshot};
use crate::pipeline::embedding::EmbeddingAdapter;
use crate::pipeline::similarity::{score_candidate, threshold_for, ScoredCandidate};
use crate::store::{CandidateFilters, StoreInterface};

const MAX_CANDIDATES: usize = 50;
const DISCARD_BELOW: f64 = 0.3;
const BORDERLINE_LOW: f64 = 0.7;
const BORDERLINE_MARGIN: f64 = 0.05;
const MAX_SCORING_ATTEMPTS: u32 = 3;

/// Outcome of running one article through the dedup engine.
pub enum DedupOutcome {
    /// The article is an elected original; an alert should be considered for it.
    Unique(Article),
    /// The article was judged a duplicate of `original_article_id`; no alert is emitted.
    Duplicate {
        article_id: Uuid,
        original_article_id: Uuid,
    },
}

pub struct DedupEngine {
    store: Arc<dyn StoreInterface>,
    embedding: Arc<EmbeddingAdapter>,
    config: DedupConfig,
    /// Enforces "single-active batch" (spec §4.D batching): only one batch drains
    /// at a time even if the caller invokes `process_batch` concurrently.
    batch_lock: Mutex<()>,
}

impl DedupEngine {
    pub fn new(store: Arc<dyn StoreInterface>, embedding: Arc<EmbeddingAdapter>, config: DedupConfig) -> Self {
        Self {
            store,
            embedding,
            config,
            batch_lock: Mutex::new(()),
        }
    }

    /// Drain a batch of not-yet-duplicate-checked articles sequentially.
    pub async fn process_batch(&self, articles: Vec<Article>) -> Vec<Result<DedupOutcome, PipelineError>> {
        let _guard = self.batch_lock.lock().await;
        let mut results = Vec::with_capacity(articles.len());
        for article in articles {
            results.push(self.process_with_retry(article).await);
        }
        results
    }

    /// `received → enqueued → scoring → {unique|duplicate} → persisted`, re-enqueuing
    /// recoverable scoring errors up to `MAX_SCORING_ATTEMPTS` times.
    async fn process_with_retry(&self, article: Article) -> Result<DedupOutcome, PipelineError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.process_article(article.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() && attempt < MAX_SCORING_ATTEMPTS => {
                    tracing::warn!(
                        article_id = %article.id,
                        attempt,
                        error = %err,
                        "recoverable dedup scoring error, re-enqueuing"
                    );
                    continue;
                }
                Err(err) => {
                    tracing::error!(
                        article_id = %article.id,
                        error = %err,
                        "dedup scoring exhausted retries, leaving duplicate_checked=false"
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn process_article(&self, article: Article) -> Result<DedupOutcome, PipelineError> {
        let now = Utc::now();
        let filters = CandidateFilters {
            source: Some(article.source.clone()),
            category: Some(article.category.clone()),
            tags: article.tags.clone(),
        };
        let window = Duration::hours(self.config.time_window_hours);
        let candidates = self
            .store
            .find_candidate_articles(now, window, article.id, &filters)
            .await?;

        if candidates.is_empty() {
            return self.finalize_unique(article, now).await;
        }

        let mut scored: Vec<ScoredCandidate> = Vec::with_capacity(candidates.len().min(MAX_CANDIDATES));
        for candidate in candidates.into_iter().take(MAX_CANDIDATES) {
            let semantic_sim = self.semantic_similarity(&article, &candidate).await;
            scored.push(score_candidate(&article, candidate, semantic_sim, &self.config));
        }
        scored.sort_by(|a, b| b.overall.partial_cmp(&a.overall).unwrap_or(std::cmp::Ordering::Equal));

        let mut matches: Vec<ScoredCandidate> = Vec::new();
        for candidate in scored {
            if candidate.overall < DISCARD_BELOW {
                continue;
            }

            let threshold = threshold_for(candidate.method, self.config.similarity_threshold);
            let algorithmic_match = candidate.overall >= threshold;
            let borderline_hi = threshold + BORDERLINE_MARGIN;

            let final_match = if candidate.overall >= BORDERLINE_LOW && candidate.overall <= borderline_hi {
                match self
                    .embedding
                    .validate_duplicate(&article.title, &candidate.candidate.title)
                    .await
                {
                    Some(verdict) => verdict.is_duplicate && verdict.confidence >= 0.85,
                    None => algorithmic_match,
                }
            } else {
                algorithmic_match
            };

            if final_match {
                matches.push(candidate);
            }
        }

        if matches.is_empty() {
            return self.finalize_unique(article, now).await;
        }

        self.finalize_group(article, matches, now).await
    }

    async fn semantic_similarity(&self, subject: &Article, candidate: &Article) -> f64 {
        let subject_vector = self.vector_for(subject).await;
        let candidate_vector = self.vector_for(candidate).await;
        crate::pipeline::similarity::cosine_similarity(&subject_vector, &candidate_vector)
    }

    /// Cached-or-computed embedding for `article`, persisting a freshly computed
    /// vector so later lookups hit the store instead of recomputing (spec §4.E).
    async fn vector_for(&self, article: &Article) -> Vec<f32> {
        if let Ok(Some(embedding)) = self.store.find_embedding_by_article(article.id).await {
            return embedding.vector;
        }

        let text = article.combined_text();
        let vector = self.embedding.embed(&text).await;

        let embedding = crate::models::Embedding {
            article_id: article.id,
            vector: vector.clone(),
            model: self.embedding.model_name().to_string(),
            text_length: text.len(),
            created_at: Utc::now(),
        };
        if let Err(err) = self.store.put_embedding(embedding).await {
            tracing::warn!(article_id = %article.id, error = %err, "failed to persist computed embedding");
        }

        vector
    }

    async fn finalize_unique(&self, mut article: Article, now: DateTime<Utc>) -> Result<DedupOutcome, PipelineError> {
        article.duplicate_checked = true;
        article.is_duplicate = false;
        article.original_article_id = None;
        article.processed_at = Some(now);

        self.store
            .update_article_flags(article.id, false, None, now)
            .await?;

        let cluster = Cluster::singleton(article.id, now);
        self.store.put_cluster(cluster).await?;

        tracing::info!(article_id = %article.id, "unique_article_detected");
        Ok(DedupOutcome::Unique(article))
    }

    /// Elect an original among `article` and its matched duplicates, persist links,
    /// update article flags, and fold the group into a cluster.
    async fn finalize_group(
        &self,
        article: Article,
        matches: Vec<ScoredCandidate>,
        now: DateTime<Utc>,
    ) -> Result<DedupOutcome, PipelineError> {
        let original = matches
            .iter()
            .map(|m| &m.candidate)
            .chain(std::iter::once(&article))
            .min_by_key(|a| (a.published_at, a.fetched_at))
            .expect("matches is non-empty")
            .clone();

        let is_article_the_original = original.id == article.id;

        // Link every non-original candidate to the elected original.
        for scored in &matches {
            if scored.candidate.id == original.id {
                continue;
            }
            let link = DuplicateLink {
                original_article_id: original.id,
                duplicate_article_id: scored.candidate.id,
                similarity_score: scored.overall,
                detection_method: scored.method,
                similarity_breakdown: scored.breakdown,
                metadata: LinkMetadataSnapshot {
                    original_title: original.title.clone(),
                    duplicate_title: scored.candidate.title.clone(),
                    original_source: original.source.clone(),
                    duplicate_source: scored.candidate.source.clone(),
                    delta_seconds: (scored.candidate.published_at - original.published_at).num_seconds(),
                },
                created_at: now,
            };
            self.store.put_duplicate_link(link).await?;
        }

        // If the new article itself isn't the original, link it too, using the
        // strongest-matching candidate's signals as the recorded breakdown.
        if !is_article_the_original {
            let best = matches
                .iter()
                .max_by(|a, b| a.overall.partial_cmp(&b.overall).unwrap_or(std::cmp::Ordering::Equal))
                .expect("matches is non-empty");
            let link = DuplicateLink {
                original_article_id: original.id,
                duplicate_article_id: article.id,
                similarity_score: best.overall,
                detection_method: best.method,
                similarity_breakdown: best.breakdown,
                metadata: LinkMetadataSnapshot {
                    original_title: original.title.clone(),
                    duplicate_title: article.title.clone(),
                    original_source: original.source.clone(),
                    duplicate_source: article.source.clone(),
                    delta_seconds: (article.published_at - original.published_at).num_seconds(),
                },
                created_at: now,
            };
            self.store.put_duplicate_link(link).await?;
        }

        if is_article_the_original {
            // The new article predates all matched candidates: every candidate that
            // wasn't already pointing at it is re-pointed to the new original.
            for scored in &matches {
                self.store
                    .update_article_flags(scored.candidate.id, true, Some(original.id), now)
                    .await?;
            }
            self.update_cluster_for_group(&original, &matches, now).await?;
            self.store
                .update_article_flags(article.id, false, None, now)
                .await?;
            tracing::info!(article_id = %article.id, "unique_article_detected");
            let mut article = article;
            article.duplicate_checked = true;
            article.is_duplicate = false;
            article.processed_at = Some(now);
            Ok(DedupOutcome::Unique(article))
        } else {
            self.update_cluster_for_group(&original, &matches, now).await?;
            self.store
                .update_article_flags(article.id, true, Some(original.id), now)
                .await?;
            Ok(DedupOutcome::Duplicate {
                article_id: article.id,
                original_article_id: original.id,
            })
        }
    }

    async fn update_cluster_for_group(
        &self,
        original: &Article,
        matches: &[ScoredCandidate],
        now: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let mut cluster = self
            .store
            .find_cluster_for_article(original.id)
            .await?
            .unwrap_or_else(|| Cluster::singleton(original.id, now));

        for scored in matches {
            if !cluster.article_ids.contains(&scored.candidate.id) {
                cluster.article_ids.push(scored.candidate.id);
            }
        }
        if !cluster.article_ids.contains(&original.id) {
            cluster.article_ids.push(original.id);
        }

        let member_ids = cluster.article_ids.clone();
        let mut members = Vec::with_capacity(member_ids.len());
        for id in &member_ids {
            if let Some(found) = self.store.get_article(*id).await? {
                members.push(found);
            } else if *id == original.id {
                members.push(original.clone());
            }
        }

        cluster.centroid = recompute_centroid(&members, now);
        cluster.category = original.category.clone();
        cluster.tags = members.iter().flat_map(|m| m.tags.clone()).collect();
        cluster.tags.sort();
        cluster.tags.dedup();
        cluster.sources = members.iter().map(|m| m.source.clone()).collect::<std::collections::HashSet<_>>().into_iter().collect();
        cluster.original_article_id = original.id;
        cluster.updated_at = now;

        self.store.update_cluster(cluster).await
    }
}

fn recompute_centroid(members: &[Article], now: DateTime<Utc>) -> ClusterCentroid {
    if members.is_empty() {
        return ClusterCentroid {
            mean_published_at: now,
            ..Default::default()
        };
    }

    let count = members.len() as f64;
    let avg_word_count = members.iter().map(|a| a.word_count() as f64).sum::<f64>() / count;
    let avg_entity_count = members.iter().map(|a| a.entities.len() as f64).sum::<f64>() / count;

    let mut categories: Vec<String> = members.iter().map(|a| a.category.clone()).collect();
    categories.sort();
    categories.dedup();

    let mut tags: Vec<String> = members.iter().flat_map(|a| a.tags.clone()).collect();
    tags.sort();
    tags.dedup();

    let mut source_distribution = std::collections::HashMap::new();
    for member in members {
        *source_distribution.entry(member.source.clone()).or_insert(0usize) += 1;
    }

    let mean_seconds = members
        .iter()
        .map(|a| a.published_at.timestamp())
        .sum::<i64>()
        / members.len() as i64;
    let mean_published_at = DateTime::from_timestamp(mean_seconds, 0).unwrap_or(now);

    ClusterCentroid {
        avg_word_count,
        avg_entity_count,
        common_categories: categories,
        common_tags: tags,
        source_distribution,
        mean_published_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingConfig, HashAlgorithm, LlmConfig};
    use crate::models::Priority;
    use crate::store::memory::InMemoryStore;

    fn test_dedup_config() -> DedupConfig {
        DedupConfig {
            similarity_threshold: 0.85,
            time_window_hours: 24,
            hash_algorithm: HashAlgorithm::Sha256,
            batch_size: 50,
            weight_title: 0.4,
            weight_content: 0.4,
            weight_entity: 0.2,
            tfidf_max_vocab: 2000,
            tfidf_max_tokens_per_doc: 500,
        }
    }

    fn article(title: &str, source: &str, published_at: DateTime<Utc>) -> Article {
        Article {
            id: Uuid::new_v4(),
            url: format!("https://example.com/{}", Uuid::new_v4()),
            content_hash: Uuid::new_v4().to_string(),
            title: title.to_string(),
            summary: None,
            content: Some(format!("{title} is a story about business news today.")),
            source: source.to_string(),
            source_id: Uuid::new_v4(),
            category: "business".to_string(),
            tags: vec!["deals".to_string()],
            priority: Priority::default(),
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

    fn test_engine(store: Arc<dyn StoreInterface>) -> DedupEngine {
        let embedding = Arc::new(EmbeddingAdapter::new(
            EmbeddingConfig {
                model_name: "test".to_string(),
                max_length: 512,
                dimension: 16,
                cache_max_entries: 10,
                cache_ttl_seconds: 60,
            },
            LlmConfig {
                enabled: false,
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                timeout_seconds: 1,
            },
        ));
        DedupEngine::new(store, embedding, test_dedup_config())
    }

    #[tokio::test]
    async fn article_with_no_candidates_is_unique() {
        let store: Arc<dyn StoreInterface> = Arc::new(InMemoryStore::new());
        let engine = test_engine(store.clone());

        let a = article("Acme buys Beta", "wire-a", Utc::now());
        store.put_article(a.clone()).await.unwrap();

        match engine.process_article(a).await.unwrap() {
            DedupOutcome::Unique(_) => {}
            DedupOutcome::Duplicate { .. } => panic!("expected unique"),
        }
    }

    #[tokio::test]
    async fn near_identical_titles_from_different_sources_are_linked_as_duplicates() {
        let store: Arc<dyn StoreInterface> = Arc::new(InMemoryStore::new());
        let engine = test_engine(store.clone());

        let t0 = Utc::now();
        let first = article("Acme announces acquisition of Beta Corp", "wire-a", t0);
        store.put_article(first.clone()).await.unwrap();
        engine.process_article(first.clone()).await.unwrap();

        let second = article(
            "Acme announces acquisition of Beta Corp",
            "wire-b",
            t0 + chrono::Duration::minutes(10),
        );
        store.put_article(second.clone()).await.unwrap();

        match engine.process_article(second.clone()).await.unwrap() {
            DedupOutcome::Duplicate { original_article_id, .. } => {
                assert_eq!(original_article_id, first.id);
            }
            DedupOutcome::Unique(_) => panic!("expected a duplicate match on near-identical titles"),
        }
    }
}
