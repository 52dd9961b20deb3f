//! Optional full-page content extraction (spec §4.B).
//!
//! When enabled, fetches an item's URL and extracts the main article text by
//! per-domain CSS selector heuristics, falling back to the largest text block when no
//! selector matches. Failures here are non-fatal: the item keeps its feed-provided
//! summary. A crawl delay is enforced per domain.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use scraper::{Html, Selector};
use tokio::sync::RwLock;
use url::Url;

use crate::config::SchedulerConfig;

#[derive(Debug, Clone)]
pub struct SiteSelectors {
    pub title: String,
    pub content: String,
}

fn default_site_selectors() -> HashMap<String, SiteSelectors> {
    let mut selectors = HashMap::new();
    selectors.insert(
        "default".to_string(),
        SiteSelectors {
            title: "h1, article h1, .article-title, .post-title".to_string(),
            content: "article, .article-content, .post-content, .entry-content, main".to_string(),
        },
    );
    selectors
}

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("transport error fetching {0}: {1}")]
    Transport(String, #[source] reqwest::Error),
    #[error("HTTP {status} for {url}")]
    Http { url: String, status: reqwest::StatusCode },
}

pub struct FullPageScraper {
    client: Client,
    crawl_delay: Duration,
    site_selectors: HashMap<String, SiteSelectors>,
    last_request: Arc<RwLock<HashMap<String, Instant>>>,
}

impl FullPageScraper {
    pub fn new(config: &SchedulerConfig) -> Self {
        let client = Client::builder()
            .user_agent("feedwatch/1.0")
            .timeout(Duration::from_secs(config.fetch_timeout_seconds))
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            crawl_delay: Duration::from_millis(config.scraper_crawl_delay_ms),
            site_selectors: default_site_selectors(),
            last_request: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn domain_of(url: &str) -> Option<String> {
        Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
    }

    fn selectors_for(&self, domain: &str) -> &SiteSelectors {
        self.site_selectors
            .get(domain)
            .unwrap_or_else(|| self.site_selectors.get("default").expect("default selectors always exist"))
    }

    async fn respect_crawl_delay(&self, domain: &str) {
        let mut last_requests = self.last_request.write().await;
        if let Some(last) = last_requests.get(domain) {
            let elapsed = last.elapsed();
            if elapsed < self.crawl_delay {
                tokio::time::sleep(self.crawl_delay - elapsed).await;
            }
        }
        last_requests.insert(domain.to_string(), Instant::now());
    }

    /// Extract main article text for `url`, falling back to the largest visible text
    /// block if no configured selector matches.
    pub async fn extract(&self, url: &str) -> Result<String, ScrapeError> {
        let domain = Self::domain_of(url).ok_or_else(|| ScrapeError::InvalidUrl(url.to_string()))?;
        self.respect_crawl_delay(&domain).await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::Transport(url.to_string(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Http {
                url: url.to_string(),
                status,
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| ScrapeError::Transport(url.to_string(), e))?;

        let document = Html::parse_document(&html);
        let selectors = self.selectors_for(&domain);

        if let Some(text) = extract_text(&document, &selectors.content) {
            return Ok(text);
        }

        Ok(largest_text_block(&document))
    }
}

fn extract_text(document: &Html, selector_str: &str) -> Option<String> {
    let selector = Selector::parse(selector_str).ok()?;
    let element = document.select(&selector).next()?;
    let text = collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "));
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Heuristic fallback: strip scripts/nav/ads, then return the text of whichever
/// remaining element has the most characters.
fn largest_text_block(document: &Html) -> String {
    let exclude = Selector::parse("script, style, nav, header, footer, aside, .ad, .ads").ok();
    let all = Selector::parse("div, article, section, main, p").ok();

    let Some(all) = all else { return String::new() };
    let excluded_texts: std::collections::HashSet<String> = exclude
        .map(|sel| {
            document
                .select(&sel)
                .map(|el| el.text().collect::<Vec<_>>().join(" "))
                .collect()
        })
        .unwrap_or_default();

    document
        .select(&all)
        .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| !excluded_texts.contains(text))
        .max_by_key(|text| text.len())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn largest_text_block_picks_the_longest_remaining_element() {
        let html = r#"
            <html><body>
                <nav>short nav text</nav>
                <div>A very long article body with lots of words describing the news story in detail.</div>
                <div>short</div>
            </body></html>
        "#;
        let document = Html::parse_document(html);
        let text = largest_text_block(&document);
        assert!(text.contains("long article body"));
    }

    #[test]
    fn extract_text_returns_none_for_missing_selector() {
        let document = Html::parse_document("<html><body><p>hi</p></body></html>");
        assert!(extract_text(&document, ".does-not-exist").is_none());
    }
}
