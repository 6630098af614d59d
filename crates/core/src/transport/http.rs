use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    config::TransportConfig,
    error::{QuizgenError, Result},
    provider::{Provider, upstream_error_message},
    transport::{Completion, CompletionRequest, LlmTransport},
};

const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 5000;

/// Probes (`is_available`, `list_models`) use a short bound of their own.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

fn backoff(attempt: u32) -> Duration {
    let delay = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay.min(MAX_BACKOFF_MS))
}

/// `reqwest`-backed transport for Ollama and OpenAI-compatible endpoints.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    provider: Provider,
    api_key: Option<String>,
    max_retries: u32,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms));

        if config.use_proxy {
            let proxy = reqwest::Proxy::all(&config.proxy_address).map_err(|e| {
                QuizgenError::InvalidConfig {
                    reason: format!("proxy address {}: {e}", config.proxy_address),
                }
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| QuizgenError::InvalidConfig {
            reason: format!("failed to build HTTP client: {e}"),
        })?;

        let api_key = config.provider.api_key(config.api_key_env.as_deref())?;
        let base_url = config.base_url();

        info!(
            provider = config.provider.name(),
            base_url = %base_url,
            use_proxy = config.use_proxy,
            "LLM transport created"
        );

        Ok(Self {
            client,
            base_url,
            provider: config.provider,
            api_key,
            max_retries: config.max_retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn classify(&self, err: reqwest::Error, url: &str, timeout: Duration) -> QuizgenError {
        if err.is_timeout() {
            QuizgenError::UpstreamTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }
        } else if err.is_connect() {
            QuizgenError::UpstreamUnavailable {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            QuizgenError::UpstreamError {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }

    async fn complete_once(&self, request: &CompletionRequest) -> Result<Completion> {
        let url = self.url(self.provider.config().generate_path);
        let body = self.provider.request_body(request);

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(request.timeout)
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.classify(e, &url, request.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(QuizgenError::UpstreamError {
                status: Some(status.as_u16()),
                message: upstream_error_message(&text),
            });
        }

        let payload = response
            .json::<Value>()
            .await
            .map_err(|e| self.classify(e, &url, request.timeout))?;

        let text = self
            .provider
            .response_text(&payload)
            .ok_or_else(|| QuizgenError::UpstreamError {
                status: Some(status.as_u16()),
                message: format!("unexpected {} response shape", self.provider.name()),
            })?;

        Ok(Completion {
            text: text.to_string(),
        })
    }

    /// True when the endpoint answers its health probe with a 2xx.
    pub async fn is_available(&self) -> bool {
        let url = self.url(self.provider.config().health_path);
        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(url = %url, error = %e, "LLM endpoint is not available");
                false
            }
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = self.url(self.provider.config().models_path);
        let mut builder = self.client.get(&url).timeout(PROBE_TIMEOUT);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.classify(e, &url, PROBE_TIMEOUT))?;

        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            return Err(QuizgenError::UpstreamError {
                status: Some(status.as_u16()),
                message: upstream_error_message(&text),
            });
        }

        let payload = response
            .json::<Value>()
            .await
            .map_err(|e| self.classify(e, &url, PROBE_TIMEOUT))?;
        Ok(self.provider.model_names(&payload))
    }
}

#[async_trait]
impl LlmTransport for HttpTransport {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let mut attempt = 0;
        loop {
            match self.complete_once(&request).await {
                Ok(completion) => {
                    debug!(
                        model = %request.model,
                        chars = completion.text.len(),
                        "completion received"
                    );
                    return Ok(completion);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying completion request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
