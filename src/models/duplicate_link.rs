//! DuplicateLink model (spec §3, §4.D).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The signal that dominated a duplicate decision, modeled as a closed tagged variant
/// so thresholding code must handle every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    ContentHash,
    TitleSimilarity,
    ContentSimilarity,
    EntitySimilarity,
    SemanticSimilarity,
}

/// Per-signal scores behind an overall duplicate decision (spec §4.D table).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SimilarityBreakdown {
    pub content_hash: f64,
    pub title_sim: f64,
    pub content_sim: f64,
    pub entity_sim: f64,
    pub semantic_sim: f64,
    pub temporal_prox: f64,
    pub source_align: f64,
}

/// A snapshot of the two articles' identifying fields at link-creation time, kept so
/// the link remains informative even if the articles are later pruned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkMetadataSnapshot {
    pub original_title: String,
    pub duplicate_title: String,
    pub original_source: String,
    pub duplicate_source: String,
    pub delta_seconds: i64,
}

/// A directed edge from a duplicate article to its elected original.
///
/// Invariant: `(original_article_id, duplicate_article_id)` is unique;
/// `original_article_id != duplicate_article_id`; `original.published_at <= duplicate.published_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateLink {
    pub original_article_id: Uuid,
    pub duplicate_article_id: Uuid,
    pub similarity_score: f64,
    pub detection_method: DetectionMethod,
    pub similarity_breakdown: SimilarityBreakdown,
    pub metadata: LinkMetadataSnapshot,
    pub created_at: DateTime<Utc>,
}
