//! Suggestion service: produces the altered wording that traps are diffed
//! from.
//!
//! The service is an explicit capability handed to the pipeline. When no
//! endpoint is configured, a deterministic [`PatternSuggester`] is used so
//! trap generation also works offline.

mod http;
mod pattern;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::SuggestionConfig;
use crate::secrets;

pub use http::HttpSuggester;
pub use pattern::{PatternSuggester, DEFAULT_MAX_TRAPS};

#[derive(Error, Debug)]
pub enum SuggesterError {
    #[error("Suggestion service unavailable: {0}")]
    Unavailable(String),

    #[error("Suggestion request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Suggestion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response from suggestion service: {0}")]
    InvalidResponse(String),

    #[error("Invalid suggestion service configuration: {0}")]
    Config(String),
}

impl SuggesterError {
    /// Worth retrying later, as opposed to a setup problem.
    pub fn is_transient(&self) -> bool {
        !matches!(self, SuggesterError::Config(_))
    }
}

/// The suggested rewrite of an instructions text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub text: String,
}

#[async_trait::async_trait]
pub trait SuggestionService: Send + Sync {
    fn name(&self) -> &str;

    async fn suggest(&self, instructions: &str) -> Result<Suggestion, SuggesterError>;
}

/// Builds the configured service: HTTP when an endpoint is set, otherwise
/// the offline pattern suggester.
pub fn from_config(config: &SuggestionConfig) -> Result<Arc<dyn SuggestionService>, SuggesterError> {
    match config.endpoint.as_deref().filter(|e| !e.is_empty()) {
        Some(endpoint) => {
            let api_key = secrets::resolve_secret_optional(
                config.api_key.as_deref(),
                config.api_key_file.as_deref(),
                config.api_key_env_var.as_deref(),
            )
            .map_err(|e| SuggesterError::Config(e.to_string()))?;
            let suggester = HttpSuggester::new(
                endpoint,
                api_key,
                Duration::from_secs(config.timeout_secs),
            )?;
            Ok(Arc::new(suggester))
        }
        None => Ok(Arc::new(PatternSuggester::new(config.max_traps))),
    }
}
