use std::sync::Arc;

use feedwatch::config::AppConfig;
use feedwatch::models::Feed;
use feedwatch::pipeline::dedup::DedupEngine;
use feedwatch::pipeline::dispatcher::AlertDispatcher;
use feedwatch::pipeline::embedding::EmbeddingAdapter;
use feedwatch::pipeline::fetcher::FeedFetcher;
use feedwatch::pipeline::normalizer::Normalizer;
use feedwatch::pipeline::orchestrator::PipelineOrchestrator;
use feedwatch::pipeline::scheduler::FeedScheduler;
use feedwatch::pipeline::scraper::FullPageScraper;
use feedwatch::store::{InMemoryStore, StoreInterface};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Feeds configuration file (spec §6): a document listing
/// `{id, name, url, category, priority, enabled, tags[]}`. Loaded from the path in
/// `FEEDS_CONFIG_PATH`, defaulting to `feeds.json` in the working directory.
fn load_feeds() -> Vec<Feed> {
    let path = std::env::var("FEEDS_CONFIG_PATH").unwrap_or_else(|_| "feeds.json".to_string());

    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "no feeds configuration found, starting with zero feeds");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<Feed>>(&contents) {
        Ok(feeds) => {
            tracing::info!(count = feeds.len(), path = %path, "loaded feeds configuration");
            feeds
        }
        Err(err) => {
            tracing::error!(path = %path, error = %err, "failed to parse feeds configuration, starting with zero feeds");
            Vec::new()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(environment = ?config.environment, "starting feedwatch");

    let store: Arc<dyn StoreInterface> = Arc::new(InMemoryStore::new());
    let embedding = Arc::new(EmbeddingAdapter::new(config.embedding.clone(), config.llm.clone()));

    let dedup = Arc::new(DedupEngine::new(store.clone(), embedding, config.dedup.clone()));
    let dispatcher = Arc::new(AlertDispatcher::new(store.clone(), config.dispatcher.clone()));

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        store,
        FeedFetcher::new(&config.scheduler),
        FullPageScraper::new(&config.scheduler),
        Normalizer::new(&config.dedup),
        dedup,
        dispatcher,
        config.scheduler.clone(),
    ));

    let feeds = load_feeds();
    let scheduler = Arc::new(FeedScheduler::new(orchestrator, feeds, config.scheduler));

    // Run one cycle immediately, then hand off to the recurring interval (spec §4.A).
    scheduler.run_cycle().await;
    let handle = scheduler.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining in-flight work");
    handle.stop().await;

    Ok(())
}
