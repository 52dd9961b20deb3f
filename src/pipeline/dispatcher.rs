//! Alert Dispatcher (spec §4.F).
//!
//! Consumes `unique_article_detected` events from the Dedup Engine and turns admitted
//! ones into delivered alerts. Three independent admission checks run before an alert
//! is ever created: rate limit, cooldown, and a quality-score threshold. Rate-limit and
//! cooldown state are process-local (§5): a multi-instance deployment needs its own
//! externalized limiter, out of scope here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::error::PipelineError;
use crate::models::{Alert, AlertStatus, Article, Channel, Priority};
use crate::pipeline::channels::ChannelSender;
use crate::store::StoreInterface;

const TRUSTED_SOURCES: &[&str] = &["reuters", "associated press", "bloomberg", "ap"];

const BREAKING_KEYWORDS: &[&str] = &["breaking", "urgent", "alert", "developing"];
const BUSINESS_KEYWORDS: &[&str] = &[
    "merger",
    "acquisition",
    "ipo",
    "bankruptcy",
    "ceo",
    "funding",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admitted,
    RateLimited,
    Cooldown,
    LowQuality,
}

/// Process-local history used by the rate-limit and cooldown checks. Separate from the
/// store so the hot admission path never round-trips to it.
struct DispatchHistory {
    recent_alerts: Vec<DateTime<Utc>>,
    cooldown_index: HashMap<String, DateTime<Utc>>,
    filtered_alerts: u64,
}

impl DispatchHistory {
    fn new() -> Self {
        Self {
            recent_alerts: Vec::new(),
            cooldown_index: HashMap::new(),
            filtered_alerts: 0,
        }
    }
}

pub struct AlertDispatcher {
    store: Arc<dyn StoreInterface>,
    sender: ChannelSender,
    config: DispatcherConfig,
    history: RwLock<DispatchHistory>,
}

impl AlertDispatcher {
    pub fn new(store: Arc<dyn StoreInterface>, config: DispatcherConfig) -> Self {
        let sender = ChannelSender::new(config.clone());
        Self {
            store,
            sender,
            config,
            history: RwLock::new(DispatchHistory::new()),
        }
    }

    /// Evaluate an admitted-unique article and, if it passes the admission gate,
    /// dispatch it. Returns the admission decision either way so callers (and tests)
    /// can observe why an article was filtered.
    pub async fn handle_unique_article(
        &self,
        article: &Article,
        now: DateTime<Utc>,
    ) -> Result<AdmissionDecision, PipelineError> {
        let cooldown_key = cooldown_key(&article.source, &article.title);

        let decision = {
            let mut history = self.history.write().await;
            history
                .recent_alerts
                .retain(|t| now - *t <= chrono::Duration::hours(1));

            if history.recent_alerts.len() >= self.config.max_alerts_per_hour {
                history.filtered_alerts += 1;
                AdmissionDecision::RateLimited
            } else if let Some(last) = history.cooldown_index.get(&cooldown_key) {
                if now - *last <= chrono::Duration::minutes(self.config.cooldown_minutes) {
                    history.filtered_alerts += 1;
                    AdmissionDecision::Cooldown
                } else {
                    AdmissionDecision::Admitted
                }
            } else if quality_score(article, now) < 3 {
                history.filtered_alerts += 1;
                AdmissionDecision::LowQuality
            } else {
                AdmissionDecision::Admitted
            }
        };

        if decision != AdmissionDecision::Admitted {
            tracing::info!(
                article_id = %article.id,
                decision = ?decision,
                "alert filtered by admission gate"
            );
            return Ok(decision);
        }

        let priority = calculate_priority(article);
        let channels = select_channels(&self.config, priority, &article.category);

        let alert = Alert {
            id: Uuid::new_v4(),
            article_id: article.id,
            title: article.title.clone(),
            summary: article.summary.clone(),
            source: article.source.clone(),
            category: article.category.clone(),
            priority,
            url: article.url.clone(),
            published_at: article.published_at,
            entities: article.entities.clone(),
            tags: article.tags.clone(),
            channels: channels.clone(),
            status: AlertStatus::Pending,
            created_at: now,
            sent_at: None,
            results: Vec::new(),
            resend_count: 0,
        };

        self.store.put_alert(alert.clone()).await?;

        {
            let mut history = self.history.write().await;
            history.recent_alerts.push(now);
            history.cooldown_index.insert(cooldown_key, now);
        }

        self.dispatch(alert, now).await?;
        Ok(AdmissionDecision::Admitted)
    }

    async fn dispatch(&self, mut alert: Alert, now: DateTime<Utc>) -> Result<(), PipelineError> {
        let mut results = Vec::with_capacity(alert.channels.len());
        for channel in &alert.channels {
            let result = tokio::time::timeout(
                Duration::from_secs(self.config.channel_timeout_seconds),
                self.sender.send(&alert, *channel),
            )
            .await
            .unwrap_or_else(|_| crate::models::ChannelResult {
                channel: *channel,
                success: false,
                status_code: None,
                error: Some("channel delivery timed out".to_string()),
            });
            results.push(result);
        }

        alert.status = Alert::resolve_status(&results);
        alert.results = results;
        alert.sent_at = Some(now);

        if alert.status == AlertStatus::Sent {
            self.store.mark_alert_sent(alert.article_id).await?;
        }

        self.store.update_alert_status(alert).await
    }

    /// Drop cooldown entries older than twice the configured window; run hourly.
    pub async fn gc_cooldown_index(&self, now: DateTime<Utc>) {
        let mut history = self.history.write().await;
        let cutoff = chrono::Duration::minutes(self.config.cooldown_minutes * 2);
        history.cooldown_index.retain(|_, t| now - *t <= cutoff);
        history
            .recent_alerts
            .retain(|t| now - *t <= chrono::Duration::hours(1));
    }

    pub async fn filtered_count(&self) -> u64 {
        self.history.read().await.filtered_alerts
    }
}

/// Coarse dedup key for the cooldown check: source plus the article's three longest
/// "meaningful" (≥4 char) title words, normalized.
fn cooldown_key(source: &str, title: &str) -> String {
    let normalized = crate::text::normalize(title);
    let mut words: Vec<&str> = crate::text::tokenize(&normalized)
        .into_iter()
        .filter(|w| w.len() >= 4)
        .collect();
    words.sort_by(|a, b| b.len().cmp(&a.len()));
    words.truncate(3);
    words.sort_unstable();
    format!("{source}:{}", words.join("-"))
}

fn quality_score(article: &Article, now: DateTime<Utc>) -> u32 {
    let mut score = 0u32;

    let content_len = article.content.as_ref().map(|c| c.len()).unwrap_or(0);
    if content_len >= 500 {
        score += 2;
    } else if content_len >= 200 {
        score += 1;
    }

    if !article.entities.is_empty() {
        score += 1;
    }

    let category = article.category.to_lowercase();
    if matches!(category.as_str(), "business" | "technology" | "breaking") {
        score += 2;
    }

    if TRUSTED_SOURCES.contains(&article.source.to_lowercase().as_str()) {
        score += 1;
    }

    if now - article.published_at < chrono::Duration::hours(2) {
        score += 1;
    }

    score
}

fn calculate_priority(article: &Article) -> Priority {
    let category = article.category.to_lowercase();
    if category == "entertainment" {
        return Priority::Low;
    }
    if category == "breaking" {
        return Priority::High;
    }

    let title_lower = article.title.to_lowercase();
    if BREAKING_KEYWORDS.iter().any(|k| title_lower.contains(k)) {
        return Priority::High;
    }
    if BUSINESS_KEYWORDS.iter().any(|k| title_lower.contains(k)) {
        return Priority::High;
    }

    let content_lower = article
        .content
        .as_deref()
        .unwrap_or("")
        .to_lowercase();
    if content_lower.contains("billion") || monetary_magnitude_match(&content_lower) {
        return Priority::High;
    }

    Priority::Medium
}

/// Matches a crude "$NNNmillion"-style magnitude in free text without pulling in a
/// full money-entity parser here (entity extraction already runs upstream).
fn monetary_magnitude_match(text: &str) -> bool {
    text.split_whitespace().any(|word| {
        let digits: String = word.chars().filter(|c| c.is_ascii_digit()).collect();
        !digits.is_empty() && word.to_lowercase().contains("million") && digits.len() >= 3
    })
}

fn select_channels(config: &DispatcherConfig, priority: Priority, category: &str) -> Vec<Channel> {
    let mut channels = Vec::new();
    if config.webhook_enabled {
        channels.push(Channel::Webhook);
    }
    if config.email_enabled && priority == Priority::High {
        channels.push(Channel::Email);
    }
    let category = category.to_lowercase();
    if config.slack_enabled && matches!(category.as_str(), "business" | "technology") {
        channels.push(Channel::Slack);
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    // Admission-gate tests exercise `handle_unique_article`, which also dispatches.
    // Channels are disabled here so those tests stay network-free; channel selection
    // itself is covered separately as a pure function below.
    fn test_config() -> DispatcherConfig {
        DispatcherConfig {
            cooldown_minutes: 5,
            max_alerts_per_hour: 2,
            channel_timeout_seconds: 1,
            webhook_enabled: false,
            webhook_url: None,
            webhook_retry_attempts: 1,
            email_enabled: false,
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            email_from: None,
            email_to: None,
            slack_enabled: false,
            slack_webhook_url: None,
            slack_channel: None,
        }
    }

    fn article(title: &str, category: &str, source: &str, published_at: DateTime<Utc>) -> Article {
        use fake::Fake;
        let summary: String = fake::faker::lorem::en::Sentence(8..16).fake();

        Article {
            id: Uuid::new_v4(),
            url: format!("https://example.com/{}", Uuid::new_v4()),
            content_hash: "hash".to_string(),
            title: title.to_string(),
            summary: Some(summary),
            content: Some("x".repeat(600)),
            source: source.to_string(),
            source_id: Uuid::new_v4(),
            category: category.to_string(),
            tags: vec![],
            priority: Priority::Medium,
            published_at,
            fetched_at: published_at,
            author: None,
            image_url: None,
            language: None,
            entities: vec![],
            duplicate_checked: true,
            is_duplicate: false,
            original_article_id: None,
            processed_at: Some(published_at),
            alert_sent: false,
        }
    }

    #[tokio::test]
    async fn third_alert_within_the_hour_is_rate_limited() {
        let store: Arc<dyn StoreInterface> = Arc::new(InMemoryStore::new());
        let dispatcher = AlertDispatcher::new(store, test_config());
        let now = Utc::now();

        let a1 = article("Acme wins big contract", "business", "wire-a", now);
        let a2 = article("Totally different headline here", "technology", "wire-b", now);
        let a3 = article("Yet another unrelated story now", "technology", "wire-c", now);

        assert_eq!(
            dispatcher.handle_unique_article(&a1, now).await.unwrap(),
            AdmissionDecision::Admitted
        );
        assert_eq!(
            dispatcher.handle_unique_article(&a2, now).await.unwrap(),
            AdmissionDecision::Admitted
        );
        assert_eq!(
            dispatcher.handle_unique_article(&a3, now).await.unwrap(),
            AdmissionDecision::RateLimited
        );
        assert_eq!(dispatcher.filtered_count().await, 1);
    }

    #[tokio::test]
    async fn near_identical_title_within_cooldown_window_is_filtered() {
        let store: Arc<dyn StoreInterface> = Arc::new(InMemoryStore::new());
        let config = DispatcherConfig {
            max_alerts_per_hour: 100,
            ..test_config()
        };
        let dispatcher = AlertDispatcher::new(store, config);
        let now = Utc::now();

        let a1 = article("Acme announces major expansion plan", "business", "wire-a", now);
        let a2 = article(
            "Acme announces major expansion here",
            "business",
            "wire-a",
            now + chrono::Duration::minutes(1),
        );

        assert_eq!(
            dispatcher.handle_unique_article(&a1, now).await.unwrap(),
            AdmissionDecision::Admitted
        );
        assert_eq!(
            dispatcher
                .handle_unique_article(&a2, now + chrono::Duration::minutes(1))
                .await
                .unwrap(),
            AdmissionDecision::Cooldown
        );
    }

    #[tokio::test]
    async fn thin_article_fails_quality_threshold() {
        let store: Arc<dyn StoreInterface> = Arc::new(InMemoryStore::new());
        let dispatcher = AlertDispatcher::new(store, test_config());
        let now = Utc::now();

        let mut thin = article("Short story", "general", "unknown-blog", now - chrono::Duration::hours(10));
        thin.content = Some("too short".to_string());

        assert_eq!(
            dispatcher.handle_unique_article(&thin, now).await.unwrap(),
            AdmissionDecision::LowQuality
        );
    }

    #[test]
    fn breaking_keyword_in_title_upgrades_priority_to_high() {
        let a = article("Breaking: markets react to news", "general", "wire", Utc::now());
        assert_eq!(calculate_priority(&a), Priority::High);
    }

    #[test]
    fn entertainment_category_defaults_to_low_priority() {
        let a = article("Celebrity attends premiere", "entertainment", "wire", Utc::now());
        assert_eq!(calculate_priority(&a), Priority::Low);
    }

    #[test]
    fn channel_selection_follows_priority_and_category_rules() {
        let config = DispatcherConfig {
            webhook_enabled: true,
            webhook_url: Some("https://example.com/hook".to_string()),
            email_enabled: true,
            smtp_host: Some("smtp.example.com".to_string()),
            slack_enabled: true,
            slack_webhook_url: Some("https://hooks.slack.com/x".to_string()),
            slack_channel: Some("#news".to_string()),
            ..test_config()
        };
        let high_business = select_channels(&config, Priority::High, "business");
        assert!(high_business.contains(&Channel::Webhook));
        assert!(high_business.contains(&Channel::Email));
        assert!(high_business.contains(&Channel::Slack));

        let medium_general = select_channels(&config, Priority::Medium, "general");
        assert_eq!(medium_general, vec![Channel::Webhook]);
    }

    #[test]
    fn cooldown_key_ignores_short_words_and_word_order() {
        let a = cooldown_key("wire-a", "Acme Beta Merger is so big");
        let b = cooldown_key("wire-a", "Merger Beta Acme is so big");
        assert_eq!(a, b);
    }
}
