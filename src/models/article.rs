//! Article model (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named-entity mention extracted from an article's title/content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Money,
    Percentage,
    Date,
    Ticker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

/// An ingested, normalized news item.
///
/// Created by the Normalizer (4.C); mutated exactly once by the Dedup Engine (4.D) to
/// set `is_duplicate`/`original_article_id`/`processed_at`; never mutated thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub url: String,
    pub content_hash: String,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub source: String,
    pub source_id: Uuid,
    pub category: String,
    pub tags: Vec<String>,
    pub priority: Priority,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub author: Option<String>,
    pub image_url: Option<String>,
    pub language: Option<String>,
    pub entities: Vec<Entity>,

    pub duplicate_checked: bool,
    pub is_duplicate: bool,
    pub original_article_id: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub alert_sent: bool,
}

impl Article {
    /// Combined title+content text used for hashing, similarity and entity extraction.
    pub fn combined_text(&self) -> String {
        match &self.content {
            Some(content) => format!("{} {}", self.title, content),
            None => self.title.clone(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.combined_text().split_whitespace().count()
    }
}
