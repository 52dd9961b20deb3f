//! Pipeline Orchestrator: wires fetcher → scraper → normalizer → dedup → dispatcher
//! for a single feed poll (spec §4.A-4.F end to end).
//!
//! One call to [`PipelineOrchestrator::run_feed`] is the unit of work the scheduler
//! fans out over feeds; item-level errors are contained within the item and never
//! abort the rest of the feed (spec §7 propagation policy).

use std::sync::Arc;

use chrono::Utc;

use crate::config::SchedulerConfig;
use crate::error::PipelineError;
use crate::models::{Article, Feed};
use crate::pipeline::dedup::{DedupEngine, DedupOutcome};
use crate::pipeline::dispatcher::AlertDispatcher;
use crate::pipeline::fetcher::FeedFetcher;
use crate::pipeline::normalizer::{NormalizeOutcome, Normalizer};
use crate::pipeline::scraper::FullPageScraper;
use crate::store::StoreInterface;

pub type FeedRunOutcome = Result<usize, PipelineError>;

pub struct PipelineOrchestrator {
    store: Arc<dyn StoreInterface>,
    fetcher: FeedFetcher,
    scraper: FullPageScraper,
    normalizer: Normalizer,
    dedup: Arc<DedupEngine>,
    dispatcher: Arc<AlertDispatcher>,
    config: SchedulerConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<dyn StoreInterface>,
        fetcher: FeedFetcher,
        scraper: FullPageScraper,
        normalizer: Normalizer,
        dedup: Arc<DedupEngine>,
        dispatcher: Arc<AlertDispatcher>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            scraper,
            normalizer,
            dedup,
            dispatcher,
            config,
        }
    }

    /// Fetch, normalize, dedup and dispatch alerts for every item in `feed`. Returns
    /// the count of newly-persisted articles (duplicates included).
    pub async fn run_feed(&self, feed: &Feed) -> FeedRunOutcome {
        let items = self
            .fetcher
            .fetch(feed)
            .await
            .map_err(|e| fetch_error_to_pipeline_error(feed, e))?;

        tracing::info!(feed = %feed.name, items = items.len(), "fetched feed items");

        let mut new_articles: Vec<Article> = Vec::new();

        for mut item in items {
            if item.content.is_none() && self.config.enable_full_page_scraping {
                match self.scraper.extract(&item.url).await {
                    Ok(text) => item.content = Some(text),
                    Err(err) => {
                        tracing::warn!(url = %item.url, error = %err, "full-page scrape failed, continuing without full content");
                    }
                }
            }

            match self.normalizer.normalize_item(item, self.store.as_ref()).await {
                Ok(NormalizeOutcome::New(article)) => new_articles.push(article),
                Ok(NormalizeOutcome::Dropped) => {}
                Err(err) => {
                    tracing::error!(feed = %feed.name, error = %err, "failed to normalize item");
                }
            }
        }

        let count = new_articles.len();
        if new_articles.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        for outcome in self.dedup.process_batch(new_articles).await {
            match outcome {
                Ok(DedupOutcome::Unique(article)) => {
                    if let Err(err) = self.dispatcher.handle_unique_article(&article, now).await {
                        tracing::error!(article_id = %article.id, error = %err, "alert dispatch failed");
                    }
                }
                Ok(DedupOutcome::Duplicate { .. }) => {}
                Err(err) => {
                    tracing::error!(feed = %feed.name, error = %err, "dedup scoring failed for article");
                }
            }
        }

        Ok(count)
    }
}

/// Reclassify a fetch-stage failure into the pipeline's stage-agnostic error taxonomy
/// (spec §7): transport/5xx stays retryable, 4xx and parse failures do not.
fn fetch_error_to_pipeline_error(feed: &Feed, err: crate::pipeline::fetcher::FetchError) -> PipelineError {
    use crate::pipeline::fetcher::FetchError;
    match err {
        FetchError::Transport(_, source) => PipelineError::TransientFetchError { feed_id: feed.id, source },
        FetchError::ServerError { url, status } => PipelineError::MalformedFeedError {
            feed_id: feed.id,
            message: format!("server error {status} fetching {url} (retries exhausted)"),
        },
        FetchError::ClientError { url, status } => PipelineError::MalformedFeedError {
            feed_id: feed.id,
            message: format!("client error {status} fetching {url}"),
        },
        FetchError::Malformed(url, source) => PipelineError::MalformedFeedError {
            feed_id: feed.id,
            message: format!("malformed feed at {url}: {source}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DedupConfig, DispatcherConfig, EmbeddingConfig, HashAlgorithm, LlmConfig};
    use crate::pipeline::embedding::EmbeddingAdapter;
    use crate::store::memory::InMemoryStore;

    fn scheduler_config() -> SchedulerConfig {
        SchedulerConfig {
            refresh_interval_minutes: 60,
            fetch_timeout_seconds: 5,
            retry_attempts: 1,
            retry_delay_ms: 1,
            max_concurrent_feeds: 4,
            enable_full_page_scraping: false,
            scraper_crawl_delay_ms: 0,
        }
    }

    fn dedup_config() -> DedupConfig {
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

    fn test_orchestrator() -> PipelineOrchestrator {
        let store: Arc<dyn StoreInterface> = Arc::new(InMemoryStore::new());
        let embedding = Arc::new(EmbeddingAdapter::new(
            EmbeddingConfig {
                model_name: "test".to_string(),
                max_length: 512,
                dimension: 8,
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
        let sched_config = scheduler_config();
        let dedup_cfg = dedup_config();
        PipelineOrchestrator::new(
            store.clone(),
            FeedFetcher::new(&sched_config),
            FullPageScraper::new(&sched_config),
            Normalizer::new(&dedup_cfg),
            Arc::new(DedupEngine::new(store.clone(), embedding, dedup_cfg)),
            Arc::new(AlertDispatcher::new(
                store,
                DispatcherConfig {
                    cooldown_minutes: 5,
                    max_alerts_per_hour: 20,
                    channel_timeout_seconds: 5,
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
                },
            )),
            sched_config,
        )
    }

    #[tokio::test]
    async fn run_feed_against_an_empty_feed_returns_zero() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(
                "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Empty</title></channel></rss>",
            ))
            .mount(&server)
            .await;

        let orchestrator = test_orchestrator();
        let feed = Feed::new("test", server.uri(), "general");
        let count = orchestrator.run_feed(&feed).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn run_feed_persists_and_dedups_a_single_item() {
        let server = wiremock::MockServer::start().await;
        let body = format!(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>T</title>\
             <item><title>Acme buys Beta for $2 billion</title>\
             <link>{}/story-1</link>\
             <description>Acme Corp completed the acquisition today.</description>\
             </item></channel></rss>",
            server.uri()
        );
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let orchestrator = test_orchestrator();
        let feed = Feed::new("test", server.uri(), "business");
        let count = orchestrator.run_feed(&feed).await.unwrap();
        assert_eq!(count, 1);

        let article = orchestrator
            .store
            .find_article_by_url(&format!("{}/story-1", server.uri()))
            .await
            .unwrap()
            .expect("article persisted");
        assert!(article.duplicate_checked);
    }
}
