//! Feed Fetcher/Parser (spec §4.B).
//!
//! Fetches a feed under a bounded timeout and redirect policy, parses it with
//! `feed-rs`, and retries only transport/5xx failures with linear backoff. 4xx is
//! recorded and not retried. Partial failure (one feed down) never aborts a cycle.

use std::time::Duration;

use chrono::Utc;
use feed_rs::parser;
use reqwest::{Client, StatusCode};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::models::Feed;

/// A single raw item read off a feed, before normalization (4.C).
#[derive(Debug, Clone)]
pub struct RawItem {
    pub source_id: Uuid,
    pub source_name: String,
    pub source_category: String,
    pub url: String,
    pub title: String,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub published_at: Option<chrono::DateTime<Utc>>,
    pub fetched_at: chrono::DateTime<Utc>,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error fetching {0}: {1}")]
    Transport(String, #[source] reqwest::Error),
    #[error("HTTP {status} fetching {url} (not retried)")]
    ClientError { url: String, status: StatusCode },
    #[error("HTTP {status} fetching {url}")]
    ServerError { url: String, status: StatusCode },
    #[error("failed to parse feed from {0}: {1}")]
    Malformed(String, #[source] feed_rs::parser::ParseFeedError),
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(..) | Self::ServerError { .. })
    }
}

pub struct FeedFetcher {
    client: Client,
    retry_attempts: u32,
    retry_delay: Duration,
    max_items_per_feed: usize,
}

impl FeedFetcher {
    pub fn new(config: &SchedulerConfig) -> Self {
        let client = Client::builder()
            .user_agent("feedwatch/1.0")
            .timeout(Duration::from_secs(config.fetch_timeout_seconds))
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            retry_attempts: config.retry_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_items_per_feed: 100,
        }
    }

    /// Fetch and parse a single feed, retrying transport/5xx failures with linear
    /// backoff starting at `retry_delay` (default 1s, default 3 attempts): the wait
    /// grows by one `retry_delay` increment per attempt rather than exponentially.
    pub async fn fetch(&self, feed: &Feed) -> Result<Vec<RawItem>, FetchError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.fetch_once(feed).await {
                Ok(items) => return Ok(items),
                Err(err) if err.is_retryable() && attempt < self.retry_attempts => {
                    let wait = self.retry_delay * attempt;
                    tracing::warn!(
                        feed = %feed.name,
                        attempt,
                        error = %err,
                        "retrying feed fetch after transient failure"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(&self, feed: &Feed) -> Result<Vec<RawItem>, FetchError> {
        let response = self
            .client
            .get(&feed.url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(feed.url.clone(), e))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(FetchError::ClientError {
                url: feed.url.clone(),
                status,
            });
        }
        if status.is_server_error() {
            return Err(FetchError::ServerError {
                url: feed.url.clone(),
                status,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(feed.url.clone(), e))?;

        let parsed = parser::parse(&body[..]).map_err(|e| FetchError::Malformed(feed.url.clone(), e))?;

        let items = parsed
            .entries
            .iter()
            .take(self.max_items_per_feed)
            .map(|entry| {
                let url = entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_else(|| entry.id.clone());

                let content = entry
                    .content
                    .as_ref()
                    .and_then(|c| c.body.clone())
                    .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()));

                let image_url = entry
                    .media
                    .first()
                    .and_then(|m| m.content.first())
                    .and_then(|c| c.url.as_ref().map(|u| u.to_string()));

                RawItem {
                    source_id: feed.id,
                    source_name: feed.name.clone(),
                    source_category: feed.category.clone(),
                    url,
                    title: entry
                        .title
                        .as_ref()
                        .map(|t| t.content.clone())
                        .unwrap_or_default(),
                    content,
                    summary: entry.summary.as_ref().map(|s| s.content.clone()),
                    published_at: entry.published.or(entry.updated),
                    fetched_at: Utc::now(),
                    authors: entry.authors.iter().map(|a| a.name.clone()).collect(),
                    categories: entry.categories.iter().map(|c| c.term.clone()).collect(),
                    image_url,
                }
            })
            .collect();

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SchedulerConfig {
        SchedulerConfig {
            refresh_interval_minutes: 5,
            fetch_timeout_seconds: 5,
            retry_attempts: 3,
            retry_delay_ms: 10,
            max_concurrent_feeds: 10,
            enable_full_page_scraping: false,
            scraper_crawl_delay_ms: 0,
        }
    }

    #[tokio::test]
    async fn fetch_returns_empty_items_for_an_empty_valid_feed() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(
                "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Empty</title></channel></rss>",
            ))
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new(&test_config());
        let feed = Feed::new("test", server.uri(), "general");
        let items = fetcher.fetch(&feed).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn fetch_does_not_retry_4xx() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new(&test_config());
        let feed = Feed::new("test", server.uri(), "general");
        let result = fetcher.fetch(&feed).await;
        assert!(matches!(result, Err(FetchError::ClientError { .. })));
    }

    #[tokio::test]
    async fn fetch_retries_5xx_up_to_configured_attempts() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new(&test_config());
        let feed = Feed::new("test", server.uri(), "general");
        let result = fetcher.fetch(&feed).await;
        assert!(matches!(result, Err(FetchError::ServerError { .. })));
    }
}
