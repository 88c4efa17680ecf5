use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{Suggestion, SuggesterError, SuggestionService};

/// Connect timeout; the request timeout comes from configuration.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct SuggestRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct SuggestResponse {
    mutated: String,
}

/// Client for a remote suggestion endpoint.
///
/// POSTs `{"text": ...}` and expects `{"mutated": ...}` back.
pub struct HttpSuggester {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl HttpSuggester {
    pub fn new(
        endpoint: &str,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, SuggesterError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| SuggesterError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl SuggestionService for HttpSuggester {
    fn name(&self) -> &str {
        "http"
    }

    async fn suggest(&self, instructions: &str) -> Result<Suggestion, SuggesterError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&SuggestRequest { text: instructions });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SuggesterError::Timeout(self.timeout)
            } else {
                SuggesterError::Unavailable(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SuggesterError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: SuggestResponse = response
            .json()
            .await
            .map_err(|e| SuggesterError::InvalidResponse(e.to_string()))?;

        tracing::debug!(
            input_chars = instructions.chars().count(),
            output_chars = body.mutated.chars().count(),
            "Suggestion received"
        );

        Ok(Suggestion { text: body.mutated })
    }
}
