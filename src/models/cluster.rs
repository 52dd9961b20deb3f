//! Cluster model (spec §3, §4.D).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Aggregated features of the articles currently in a cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterCentroid {
    pub avg_word_count: f64,
    pub avg_entity_count: f64,
    pub common_categories: Vec<String>,
    pub common_tags: Vec<String>,
    pub source_distribution: HashMap<String, usize>,
    pub mean_published_at: DateTime<Utc>,
}

/// An equivalence class of articles judged to cover one story.
///
/// Invariant: `article_ids` is non-empty; every referenced article exists; an article
/// belongs to at most one active cluster. The `original` (earliest `published_at`)
/// anchors the story's canonical timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: Uuid,
    pub article_ids: Vec<Uuid>,
    pub original_article_id: Uuid,
    pub centroid: ClusterCentroid,
    pub category: String,
    pub tags: Vec<String>,
    pub sources: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    pub fn singleton(article_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            article_ids: vec![article_id],
            original_article_id: article_id,
            centroid: ClusterCentroid {
                mean_published_at: now,
                ..Default::default()
            },
            category: String::new(),
            tags: Vec::new(),
            sources: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
