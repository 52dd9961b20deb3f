//! Application configuration module
//!
//! Provides centralized, environment-aware configuration with validation, loaded once
//! at process start from the environment (optionally seeded from a `.env` file).

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration value for {key} is out of range: {message}")]
    OutOfRange { key: String, message: String },
}

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        match std::env::var("ENVIRONMENT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Content fingerprint algorithm for `Article::content_hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha1,
    Md5,
}

impl HashAlgorithm {
    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha1" => Ok(Self::Sha1),
            "md5" => Ok(Self::Md5),
            other => Err(ConfigError::InvalidValue {
                key: "HASH_ALGORITHM".to_string(),
                message: format!("unknown algorithm '{other}', expected sha256|sha1|md5"),
            }),
        }
    }
}

/// Scheduler timing and concurrency (spec §4.A/§4.B).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub refresh_interval_minutes: u64,
    pub fetch_timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub max_concurrent_feeds: usize,
    pub enable_full_page_scraping: bool,
    pub scraper_crawl_delay_ms: u64,
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_concurrent_feeds = env_parsed_or("MAX_CONCURRENT_FEEDS", 10usize);
        if !(1..=50).contains(&max_concurrent_feeds) {
            return Err(ConfigError::OutOfRange {
                key: "MAX_CONCURRENT_FEEDS".to_string(),
                message: "must be between 1 and 50".to_string(),
            });
        }

        Ok(Self {
            refresh_interval_minutes: env_parsed_or("REFRESH_INTERVAL_MINUTES", 5),
            fetch_timeout_seconds: env_parsed_or("FETCH_TIMEOUT_SECONDS", 30),
            retry_attempts: env_parsed_or("RETRY_ATTEMPTS", 3),
            retry_delay_ms: env_parsed_or("RETRY_DELAY_MS", 1000),
            max_concurrent_feeds,
            enable_full_page_scraping: env_parsed_or("ENABLE_FULL_PAGE_SCRAPING", false),
            scraper_crawl_delay_ms: env_parsed_or("SCRAPER_CRAWL_DELAY_MS", 2000),
        })
    }
}

/// Dedup engine thresholds and weights (spec §4.D).
#[derive(Debug, Clone)]
pub struct DedupConfig {
    pub similarity_threshold: f64,
    pub time_window_hours: i64,
    pub hash_algorithm: HashAlgorithm,
    pub batch_size: usize,
    pub weight_title: f64,
    pub weight_content: f64,
    pub weight_entity: f64,
    pub tfidf_max_vocab: usize,
    pub tfidf_max_tokens_per_doc: usize,
}

impl DedupConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let similarity_threshold = env_parsed_or("SIMILARITY_THRESHOLD", 0.85);
        if !(0.0..=1.0).contains(&similarity_threshold) {
            return Err(ConfigError::OutOfRange {
                key: "SIMILARITY_THRESHOLD".to_string(),
                message: "must be in [0, 1]".to_string(),
            });
        }

        let time_window_hours = env_parsed_or("TIME_WINDOW_HOURS", 24i64);
        if !(1..=168).contains(&time_window_hours) {
            return Err(ConfigError::OutOfRange {
                key: "TIME_WINDOW_HOURS".to_string(),
                message: "must be between 1 and 168".to_string(),
            });
        }

        let batch_size = env_parsed_or("BATCH_SIZE", 50usize);
        if !(1..=1000).contains(&batch_size) {
            return Err(ConfigError::OutOfRange {
                key: "BATCH_SIZE".to_string(),
                message: "must be between 1 and 1000".to_string(),
            });
        }

        let weight_title = env_parsed_or("WEIGHT_TITLE", 0.4);
        let weight_content = env_parsed_or("WEIGHT_CONTENT", 0.4);
        let weight_entity = env_parsed_or("WEIGHT_ENTITY", 0.2);
        let weight_sum = weight_title + weight_content + weight_entity;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::InvalidValue {
                key: "WEIGHT_TITLE+WEIGHT_CONTENT+WEIGHT_ENTITY".to_string(),
                message: format!("must sum to 1.0, got {weight_sum}"),
            });
        }

        let hash_algorithm = HashAlgorithm::from_str(&env_or_default("HASH_ALGORITHM", "sha256"))?;

        Ok(Self {
            similarity_threshold,
            time_window_hours,
            hash_algorithm,
            batch_size,
            weight_title,
            weight_content,
            weight_entity,
            tfidf_max_vocab: env_parsed_or("TFIDF_MAX_VOCAB", 2000),
            tfidf_max_tokens_per_doc: env_parsed_or("TFIDF_MAX_TOKENS_PER_DOC", 500),
        })
    }
}

/// Embedding model configuration (spec §4.E).
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub model_name: String,
    pub max_length: usize,
    pub dimension: usize,
    pub cache_max_entries: usize,
    pub cache_ttl_seconds: u64,
}

impl EmbeddingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            model_name: env_or_default("EMBEDDING_MODEL", "BAAI/bge-small-en-v1.5"),
            max_length: env_parsed_or("EMBEDDING_MAX_LENGTH", 512),
            dimension: env_parsed_or("EMBEDDING_DIMENSION", 384),
            cache_max_entries: env_parsed_or("EMBEDDING_CACHE_MAX_ENTRIES", 1000),
            cache_ttl_seconds: env_parsed_or("EMBEDDING_CACHE_TTL_SECONDS", 3600),
        })
    }
}

/// Alert dispatcher configuration (spec §4.F).
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub cooldown_minutes: i64,
    pub max_alerts_per_hour: usize,
    pub channel_timeout_seconds: u64,
    pub webhook_enabled: bool,
    pub webhook_url: Option<String>,
    pub webhook_retry_attempts: u32,
    pub email_enabled: bool,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub email_from: Option<String>,
    pub email_to: Option<String>,
    pub slack_enabled: bool,
    pub slack_webhook_url: Option<String>,
    pub slack_channel: Option<String>,
}

impl DispatcherConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let webhook_enabled = env_parsed_or("WEBHOOK_ENABLED", false);
        let webhook_url = std::env::var("WEBHOOK_URL").ok();
        if webhook_enabled && webhook_url.is_none() {
            return Err(ConfigError::MissingRequired("WEBHOOK_URL".to_string()));
        }

        let slack_enabled = env_parsed_or("SLACK_ENABLED", false);
        let slack_webhook_url = std::env::var("SLACK_WEBHOOK_URL").ok();
        if slack_enabled && slack_webhook_url.is_none() {
            return Err(ConfigError::MissingRequired("SLACK_WEBHOOK_URL".to_string()));
        }

        let email_enabled = env_parsed_or("EMAIL_ENABLED", false);
        let email_from = std::env::var("EMAIL_FROM").ok();
        let email_to = std::env::var("EMAIL_TO").ok();
        if email_enabled && (email_from.is_none() || email_to.is_none()) {
            return Err(ConfigError::MissingRequired("EMAIL_FROM/EMAIL_TO".to_string()));
        }

        Ok(Self {
            cooldown_minutes: env_parsed_or("ALERT_COOLDOWN_MINUTES", 5),
            max_alerts_per_hour: env_parsed_or("MAX_ALERTS_PER_HOUR", 20),
            channel_timeout_seconds: env_parsed_or("CHANNEL_TIMEOUT_SECONDS", 10),
            webhook_enabled,
            webhook_url,
            webhook_retry_attempts: env_parsed_or("WEBHOOK_RETRY_ATTEMPTS", 3),
            email_enabled,
            smtp_host: std::env::var("SMTP_HOST").ok(),
            smtp_port: env_parsed_or("SMTP_PORT", 587),
            smtp_username: std::env::var("SMTP_USERNAME").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
            email_from,
            email_to,
            slack_enabled,
            slack_webhook_url,
            slack_channel: std::env::var("SLACK_CHANNEL").ok(),
        })
    }
}

/// LLM provider configuration for optional borderline-duplicate validation (spec §4.E).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("LLM_API_KEY").ok();
        Ok(Self {
            enabled: api_key.is_some() && env_parsed_or("LLM_VALIDATION_ENABLED", true),
            api_key,
            model: env_or_default("LLM_MODEL", "gpt-4o-mini"),
            timeout_seconds: env_parsed_or("LLM_TIMEOUT_SECONDS", 10),
        })
    }
}

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub scheduler: SchedulerConfig,
    pub dedup: DedupConfig,
    pub embedding: EmbeddingConfig,
    pub dispatcher: DispatcherConfig,
    pub llm: LlmConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();
        let config = Self {
            environment,
            scheduler: SchedulerConfig::from_env()?,
            dedup: DedupConfig::from_env()?,
            embedding: EmbeddingConfig::from_env()?,
            dispatcher: DispatcherConfig::from_env()?,
            llm: LlmConfig::from_env()?,
        };

        if environment.is_production() {
            config.validate_production()?;
        }

        Ok(config)
    }

    fn validate_production(&self) -> Result<(), ConfigError> {
        if self.dispatcher.webhook_enabled && self.dispatcher.webhook_url.is_none() {
            return Err(ConfigError::MissingRequired("WEBHOOK_URL".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        };
        write!(f, "{name}")
    }
}

/// Required environment variable, or a `ConfigError`.
pub fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingRequired(key.to_string()))
}

/// Optional environment variable with a string default.
pub fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Optional environment variable, parsed, falling back to `default` on absence or
/// parse failure.
fn env_parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_detection_defaults_to_development() {
        assert!(Environment::from_env().is_development() || !Environment::from_env().is_production());
    }

    #[test]
    fn test_hash_algorithm_parsing() {
        assert!(matches!(HashAlgorithm::from_str("sha256"), Ok(HashAlgorithm::Sha256)));
        assert!(matches!(HashAlgorithm::from_str("MD5"), Ok(HashAlgorithm::Md5)));
        assert!(HashAlgorithm::from_str("bogus").is_err());
    }

    #[test]
    fn test_dedup_config_rejects_weights_not_summing_to_one() {
        std::env::set_var("WEIGHT_TITLE", "0.5");
        std::env::set_var("WEIGHT_CONTENT", "0.5");
        std::env::set_var("WEIGHT_ENTITY", "0.5");
        let result = DedupConfig::from_env();
        std::env::remove_var("WEIGHT_TITLE");
        std::env::remove_var("WEIGHT_CONTENT");
        std::env::remove_var("WEIGHT_ENTITY");
        assert!(result.is_err());
    }
}
