//! Feed model (spec §3, §6): RSS source configuration and runtime counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A feeds configuration file (spec §6) only needs to name `name`/`url`/`category`;
/// everything else defaults so hand-written entries stay short.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub category: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub last_fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub articles_processed: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_error_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl Feed {
    pub fn new(name: impl Into<String>, url: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            url: url.into(),
            category: category.into(),
            priority: 0,
            enabled: true,
            tags: Vec::new(),
            last_fetched_at: None,
            articles_processed: 0,
            error_count: 0,
            last_error: None,
            last_error_at: None,
        }
    }

    pub fn record_success(&mut self, now: DateTime<Utc>, articles: u64) {
        self.last_fetched_at = Some(now);
        self.articles_processed += articles;
    }

    pub fn record_error(&mut self, now: DateTime<Utc>, message: impl Into<String>) {
        self.error_count += 1;
        self.last_error = Some(message.into());
        self.last_error_at = Some(now);
    }
}
