//! Article Normalizer (spec §4.C).
//!
//! Cleans raw feed items into persisted `Article`s, computing the content fingerprint
//! and running the exact-duplicate short-circuit (by URL, then by hash) before handing
//! unique articles to the Dedup Engine.

use chrono::Utc;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use uuid::Uuid;

use crate::config::{DedupConfig, HashAlgorithm};
use crate::error::PipelineError;
use crate::models::{Article, Entity, Priority};
use crate::pipeline::entities::EntityExtractor;
use crate::pipeline::fetcher::RawItem;
use crate::store::StoreInterface;
use crate::text::normalize;

/// Outcome of normalizing one raw item.
pub enum NormalizeOutcome {
    /// A new article was persisted and should be handed to the Dedup Engine.
    New(Article),
    /// The item was an exact duplicate (by URL or content hash) and was dropped.
    /// Carries the duplicate link that was recorded, if the match was by hash.
    Dropped,
}

pub struct Normalizer {
    entity_extractor: EntityExtractor,
    hash_algorithm: HashAlgorithm,
}

impl Normalizer {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            entity_extractor: EntityExtractor::new(),
            hash_algorithm: config.hash_algorithm,
        }
    }

    fn content_hash(&self, title: &str, content: Option<&str>) -> String {
        let combined = match content {
            Some(c) => format!("{title} {c}"),
            None => title.to_string(),
        };
        let normalized = normalize(&combined);

        match self.hash_algorithm {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(normalized.as_bytes());
                hex::encode(hasher.finalize())
            }
            HashAlgorithm::Sha1 => {
                let mut hasher = Sha1::new();
                hasher.update(normalized.as_bytes());
                hex::encode(hasher.finalize())
            }
            HashAlgorithm::Md5 => format!("{:x}", md5::compute(normalized.as_bytes())),
        }
    }

    /// Clean feed-supplied text: collapse whitespace and drop characters that html
    /// entity-decoding in `feed-rs` already unescaped.
    fn clean_text(raw: &str) -> String {
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub async fn normalize_item(
        &self,
        item: RawItem,
        store: &dyn StoreInterface,
    ) -> Result<NormalizeOutcome, PipelineError> {
        // Exact-duplicate short-circuit by URL.
        if store.find_article_by_url(&item.url).await?.is_some() {
            tracing::debug!(url = %item.url, "exact duplicate by url, dropped");
            return Ok(NormalizeOutcome::Dropped);
        }

        let title = Self::clean_text(&item.title);
        let content = item.content.as_deref().map(Self::clean_text);
        let hash = self.content_hash(&title, content.as_deref());

        // Exact-duplicate short-circuit by content hash. The duplicate is persisted
        // (with is_duplicate/original_article_id set at creation) so the link it's
        // given below names two real, queryable articles.
        if let Some(existing) = store.find_article_by_hash(&hash).await? {
            let published_at = item.published_at.unwrap_or(item.fetched_at);
            let now = Utc::now();
            let duplicate = Article {
                id: Uuid::new_v4(),
                url: item.url,
                content_hash: hash,
                title: title.clone(),
                summary: item.summary,
                content,
                source: item.source_name,
                source_id: item.source_id,
                category: item.source_category,
                tags: item.categories,
                priority: Priority::default(),
                published_at,
                fetched_at: item.fetched_at,
                author: item.authors.into_iter().next(),
                image_url: item.image_url,
                language: None,
                entities: Vec::new(),
                duplicate_checked: true,
                is_duplicate: true,
                original_article_id: Some(existing.id),
                processed_at: Some(now),
                alert_sent: false,
            };
            store.put_article(duplicate.clone()).await?;

            let link = crate::models::DuplicateLink {
                original_article_id: existing.id,
                duplicate_article_id: duplicate.id,
                similarity_score: 1.0,
                detection_method: crate::models::DetectionMethod::ContentHash,
                similarity_breakdown: crate::models::SimilarityBreakdown {
                    content_hash: 1.0,
                    ..Default::default()
                },
                metadata: crate::models::LinkMetadataSnapshot {
                    original_title: existing.title.clone(),
                    duplicate_title: title,
                    original_source: existing.source.clone(),
                    duplicate_source: duplicate.source.clone(),
                    delta_seconds: (published_at - existing.published_at).num_seconds(),
                },
                created_at: now,
            };
            store.put_duplicate_link(link).await?;
            tracing::debug!(
                article_id = %duplicate.id,
                original_id = %existing.id,
                detection_method = "content_hash",
                "exact duplicate by content hash, persisted and linked"
            );
            return Ok(NormalizeOutcome::Dropped);
        }

        let combined = match &content {
            Some(c) => format!("{title} {c}"),
            None => title.clone(),
        };
        let entities: Vec<Entity> = self.entity_extractor.extract(&combined);

        let published_at = item.published_at.unwrap_or(item.fetched_at);

        let article = Article {
            id: Uuid::new_v4(),
            url: item.url,
            content_hash: hash,
            title,
            summary: item.summary,
            content,
            source: item.source_name,
            source_id: item.source_id,
            category: item.source_category,
            tags: item.categories,
            priority: Priority::default(),
            published_at,
            fetched_at: item.fetched_at,
            author: item.authors.into_iter().next(),
            image_url: item.image_url,
            language: None,
            entities,
            duplicate_checked: false,
            is_duplicate: false,
            original_article_id: None,
            processed_at: None,
            alert_sent: false,
        };

        store.put_article(article.clone()).await?;
        tracing::debug!(article_id = %article.id, category = %article.category, "new article normalized and persisted");
        Ok(NormalizeOutcome::New(article))
    }
}
