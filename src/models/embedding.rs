//! Embedding model (spec §3, §4.E).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cached dense vector for an article. TTL-expired by the store (default 7 days).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub article_id: Uuid,
    pub vector: Vec<f32>,
    pub model: String,
    pub text_length: usize,
    pub created_at: DateTime<Utc>,
}
