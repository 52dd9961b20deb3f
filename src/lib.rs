//! feedwatch: ingests RSS/Atom news feeds, deduplicates near-identical coverage of the
//! same story, and dispatches alerts for unique, high-quality articles (spec §1-§7).

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod text;

pub use config::{AppConfig, ConfigError, Environment};
pub use error::PipelineError;
