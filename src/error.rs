//! Pipeline error taxonomy (spec §7).
//!
//! Item-level errors are contained within the item's stage; they never propagate sideways.
//! Only configuration errors and unrecoverable store loss are fatal for the process.

use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transient fetch failure for feed {feed_id}: {source}")]
    TransientFetchError {
        feed_id: Uuid,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed feed {feed_id}: {message}")]
    MalformedFeedError { feed_id: Uuid, message: String },

    #[error("malformed item from feed {feed_id}: {message}")]
    MalformedItemError { feed_id: Uuid, message: String },

    #[error("store error during {operation}: {message}")]
    StoreError { operation: String, message: String },

    #[error("embedding/LLM provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    #[error("channel delivery failed on {channel}: {message}")]
    ChannelDeliveryError { channel: String, message: String },

    #[error("configuration error: {0}")]
    ConfigurationError(#[from] ConfigError),

    #[error("unhandled pipeline error: {0}")]
    UnhandledError(#[from] anyhow::Error),
}

impl PipelineError {
    /// Whether the stage that produced this error should retry the same unit of work.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientFetchError { .. } | Self::StoreError { .. }
        )
    }

    /// Whether this error should terminate the process rather than being contained
    /// to the item or cycle that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigurationError(_))
    }

    /// A short machine-readable class name, stable across variant field changes.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TransientFetchError { .. } => "transient_fetch_error",
            Self::MalformedFeedError { .. } => "malformed_feed",
            Self::MalformedItemError { .. } => "malformed_item",
            Self::StoreError { .. } => "store_error",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::ChannelDeliveryError { .. } => "channel_delivery_error",
            Self::ConfigurationError(_) => "configuration_error",
            Self::UnhandledError(_) => "unhandled_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_store_errors_are_retryable() {
        let err = PipelineError::StoreError {
            operation: "put_article".to_string(),
            message: "timeout".to_string(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn configuration_errors_are_fatal() {
        let err = PipelineError::ConfigurationError(ConfigError::MissingRequired(
            "WEBHOOK_URL".to_string(),
        ));
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }
}
