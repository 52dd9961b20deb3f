//! Feed Scheduler (spec §4.A).
//!
//! Polls every enabled feed on a fixed cadence, bounded to `max_concurrent_feeds`
//! in-flight fetches at once. A re-entrancy guard skips a tick that fires while the
//! previous one is still draining, rather than piling up overlapping cycles.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use futures::stream::{self, StreamExt};
use tokio::sync::RwLock;

use crate::config::SchedulerConfig;
use crate::models::Feed;
use crate::pipeline::orchestrator::PipelineOrchestrator;

pub struct FeedScheduler {
    orchestrator: Arc<PipelineOrchestrator>,
    feeds: Arc<RwLock<Vec<Feed>>>,
    config: SchedulerConfig,
    is_running: Arc<RwLock<bool>>,
}

impl FeedScheduler {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, feeds: Vec<Feed>, config: SchedulerConfig) -> Self {
        Self {
            orchestrator,
            feeds: Arc::new(RwLock::new(feeds)),
            config,
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    /// Run one poll cycle over all enabled feeds, bounded to `max_concurrent_feeds`
    /// concurrent fetches. Skips entirely if a previous cycle is still running.
    pub async fn run_cycle(&self) {
        {
            let mut running = self.is_running.write().await;
            if *running {
                tracing::warn!("skipping scheduler tick: previous cycle still running");
                return;
            }
            *running = true;
        }

        let feeds = self.feeds.read().await.clone();
        let enabled: Vec<Feed> = feeds.into_iter().filter(|f| f.enabled).collect();

        tracing::info!(count = enabled.len(), "starting feed poll cycle");

        let results: Vec<(Feed, crate::pipeline::orchestrator::FeedRunOutcome)> = stream::iter(enabled)
            .map(|feed| {
                let orchestrator = self.orchestrator.clone();
                async move {
                    let outcome = orchestrator.run_feed(&feed).await;
                    (feed, outcome)
                }
            })
            .buffer_unordered(self.config.max_concurrent_feeds)
            .collect()
            .await;

        let mut feeds = self.feeds.write().await;
        for (mut feed, outcome) in results {
            match outcome {
                Ok(count) => feed.record_success(chrono::Utc::now(), count as u64),
                Err(err) => {
                    tracing::error!(feed = %feed.name, error = %err, "feed poll failed");
                    feed.record_error(chrono::Utc::now(), err.to_string());
                }
            }
            if let Some(existing) = feeds.iter_mut().find(|f| f.id == feed.id) {
                *existing = feed;
            }
        }
        drop(feeds);

        *self.is_running.write().await = false;
    }

    /// Spawn the recurring poll loop at `refresh_interval_minutes` and return a handle
    /// that stops it on shutdown (spec §5: scheduler ticks stop first).
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let stop_flag = Arc::new(RwLock::new(false));
        let handle_stop = stop_flag.clone();
        let scheduler = self.clone();
        let period = StdDuration::from_secs(self.config.refresh_interval_minutes * 60);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if *stop_flag.read().await {
                    break;
                }
                scheduler.run_cycle().await;
            }
        });

        SchedulerHandle { stop_flag: handle_stop }
    }
}

pub struct SchedulerHandle {
    stop_flag: Arc<RwLock<bool>>,
}

impl SchedulerHandle {
    pub async fn stop(&self) {
        *self.stop_flag.write().await = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::dedup::DedupEngine;
    use crate::pipeline::dispatcher::AlertDispatcher;
    use crate::pipeline::embedding::EmbeddingAdapter;
    use crate::pipeline::normalizer::Normalizer;
    use crate::pipeline::scraper::FullPageScraper;
    use crate::pipeline::fetcher::FeedFetcher;
    use crate::store::memory::InMemoryStore;
    use crate::config::{DedupConfig, DispatcherConfig, EmbeddingConfig, HashAlgorithm, LlmConfig};
    use std::sync::Arc;

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

    fn test_orchestrator() -> Arc<PipelineOrchestrator> {
        let store: Arc<dyn crate::store::StoreInterface> = Arc::new(InMemoryStore::new());
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
        Arc::new(PipelineOrchestrator::new(
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
        ))
    }

    #[tokio::test]
    async fn run_cycle_with_no_feeds_completes_immediately() {
        let scheduler = FeedScheduler::new(test_orchestrator(), vec![], scheduler_config());
        scheduler.run_cycle().await;
    }

    #[tokio::test]
    async fn disabled_feeds_are_skipped() {
        use fake::Fake;
        let feed_name: String = fake::faker::company::en::CompanyName().fake();
        let mut feed = Feed::new(feed_name, "https://example.com/rss", "general");
        feed.enabled = false;
        let scheduler = FeedScheduler::new(test_orchestrator(), vec![feed], scheduler_config());
        scheduler.run_cycle().await;
        let feeds = scheduler.feeds.read().await;
        assert_eq!(feeds[0].articles_processed, 0);
        assert_eq!(feeds[0].error_count, 0);
    }

    /// A cycle that finds a previous one still marked running returns immediately,
    /// without ever reaching an await point that needs a driven runtime — exercised
    /// by polling the future by hand rather than spawning it onto a reactor.
    #[test]
    fn a_skipped_cycle_resolves_on_first_poll() {
        let scheduler = FeedScheduler::new(test_orchestrator(), vec![], scheduler_config());
        *scheduler.is_running.try_write().unwrap() = true;

        let mut task = tokio_test::task::spawn(scheduler.run_cycle());
        tokio_test::assert_ready!(task.poll());
    }
}
