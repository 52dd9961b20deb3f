//! Alert model (spec §3, §4.F).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Entity, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Webhook,
    Email,
    Slack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

/// The outcome of dispatching an alert to a single channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelResult {
    pub channel: Channel,
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

/// A queued or delivered notification derived from an elected-original article.
///
/// Invariants: `sent_at` is set iff `status` is `Sent` or `Failed`; `status = Sent` iff
/// at least one channel result has `success = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub article_id: Uuid,
    pub title: String,
    pub summary: Option<String>,
    pub source: String,
    pub category: String,
    pub priority: Priority,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub entities: Vec<Entity>,
    pub tags: Vec<String>,
    pub channels: Vec<Channel>,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub results: Vec<ChannelResult>,
    pub resend_count: u32,
}

impl Alert {
    /// `status = Sent` iff at least one channel succeeded, per spec invariant.
    pub fn resolve_status(results: &[ChannelResult]) -> AlertStatus {
        if results.iter().any(|r| r.success) {
            AlertStatus::Sent
        } else {
            AlertStatus::Failed
        }
    }
}
