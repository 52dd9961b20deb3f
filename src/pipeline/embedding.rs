//! Embedding/LLM Adapter (spec §4.E).
//!
//! `embed` returns a cached vector if available, otherwise calls the local fastembed
//! model, otherwise falls back to a deterministic pseudo-vector derived from text
//! features so `semantic_sim` degrades to a cheap surrogate instead of failing the
//! pipeline. Vectors are cached in-process in a bounded, TTL'd cache (`moka`).
//! `validate_duplicate` is an optional borderline-band gate backed by an LLM provider;
//! any provider/parse failure downgrades to a no-op, never to a pipeline error.

use std::sync::Arc;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::{EmbeddingConfig, LlmConfig};

/// Narrow, defensively-parsed shape for the LLM's duplicate-comparison answer.
/// The LLM is treated as an untrusted input channel; unknown/missing fields default
/// to the conservative "not a duplicate" answer.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmDuplicateVerdict {
    #[serde(default)]
    pub is_duplicate: bool,
    #[serde(default)]
    pub confidence: f64,
}

impl Default for LlmDuplicateVerdict {
    fn default() -> Self {
        Self {
            is_duplicate: false,
            confidence: 0.0,
        }
    }
}

pub struct EmbeddingAdapter {
    config: EmbeddingConfig,
    llm: LlmConfig,
    model: Arc<Mutex<Option<TextEmbedding>>>,
    cache: moka::future::Cache<String, Vec<f32>>,
    http: reqwest::Client,
}

impl EmbeddingAdapter {
    pub fn new(config: EmbeddingConfig, llm: LlmConfig) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(config.cache_max_entries as u64)
            .time_to_live(std::time::Duration::from_secs(config.cache_ttl_seconds))
            .build();

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(llm.timeout_seconds))
            .build()
            .expect("failed to build HTTP client");

        Self {
            config,
            llm,
            model: Arc::new(Mutex::new(None)),
            cache,
            http,
        }
    }

    async fn ensure_model(&self) -> Result<(), ()> {
        let mut guard = self.model.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let mut options = InitOptions::default();
        options.model_name = EmbeddingModel::BGESmallENV15;
        options.show_download_progress = false;

        match TextEmbedding::try_new(options) {
            Ok(model) => {
                *guard = Some(model);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "embedding model unavailable, falling back to pseudo-vectors");
                Err(())
            }
        }
    }

    /// The configured model identifier, for stamping persisted embeddings.
    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn truncate(&self, text: &str) -> String {
        if text.len() <= self.config.max_length {
            return text.to_string();
        }
        let truncated = &text[..self.config.max_length];
        match truncated.rfind(' ') {
            Some(idx) => truncated[..idx].to_string(),
            None => truncated.to_string(),
        }
    }

    /// Return a vector for `text`: cached, else freshly computed, else a deterministic
    /// pseudo-vector. Never fails.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        if let Some(cached) = self.cache.get(text).await {
            return cached;
        }

        let truncated = self.truncate(text);
        let vector = match self.ensure_model().await {
            Ok(()) => {
                let guard = self.model.lock().await;
                let model = guard.as_ref().expect("model initialized above");
                match model.embed(vec![truncated], None) {
                    Ok(mut embeddings) => embeddings.pop().unwrap_or_else(|| pseudo_vector(text, self.config.dimension)),
                    Err(err) => {
                        tracing::warn!(error = %err, "embedding inference failed, using pseudo-vector");
                        pseudo_vector(text, self.config.dimension)
                    }
                }
            }
            Err(()) => pseudo_vector(text, self.config.dimension),
        };

        self.cache.insert(text.to_string(), vector.clone()).await;
        vector
    }

    /// Pose a structured duplicate-comparison prompt to the LLM provider. Returns
    /// `None` on any provider/parse failure, leaving the algorithmic decision to stand.
    pub async fn validate_duplicate(&self, title_a: &str, title_b: &str) -> Option<LlmDuplicateVerdict> {
        if !self.llm.enabled {
            return None;
        }
        let api_key = self.llm.api_key.as_ref()?;

        let body = serde_json::json!({
            "model": self.llm.model,
            "messages": [{
                "role": "user",
                "content": format!(
                    "Are these two news headlines describing the same event? Respond with JSON {{\"is_duplicate\": bool, \"confidence\": 0..1}}.\nA: {title_a}\nB: {title_b}"
                )
            }],
            "response_format": { "type": "json_object" },
        });

        let response = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(error = %err, "LLM provider unavailable, skipping validation");
                return None;
            }
        };

        let parsed: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "LLM response was not valid JSON, skipping validation");
                return None;
            }
        };

        let content = parsed
            .get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()?;

        serde_json::from_str::<LlmDuplicateVerdict>(content).ok()
    }
}

/// Deterministic pseudo-vector derived from cheap text features (length, character
/// frequency buckets). Used only as a last-resort fallback: the `0.30·semantic_sim`
/// weight keeps this surrogate from ever being the sole decisive signal.
fn pseudo_vector(text: &str, dimension: usize) -> Vec<f32> {
    let mut buckets = vec![0.0_f32; dimension];
    if dimension == 0 {
        return buckets;
    }
    for (i, byte) in text.bytes().enumerate() {
        let idx = (byte as usize + i) % dimension;
        buckets[idx] += 1.0;
    }
    let norm: f32 = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in buckets.iter_mut() {
            *v /= norm;
        }
    }
    buckets
}
