use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{ChatRequest, ChatResponse, Message};
use super::Oracle;
use crate::config::{OracleConfig, RequestConfig};
use crate::error::{OracleError, OracleResult};

/// Client for an OpenAI-compatible chat-completions endpoint
#[derive(Clone)]
pub struct OracleClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    request_config: RequestConfig,
}

impl OracleClient {
    /// Create a new client bound to one model
    pub fn new(
        config: &OracleConfig,
        model: impl Into<String>,
        request_config: RequestConfig,
    ) -> OracleResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(OracleError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: model.into(),
            temperature: config.temperature,
            request_config,
        })
    }

    /// Primary oracle for the configured model
    pub fn primary(config: &OracleConfig, request_config: RequestConfig) -> OracleResult<Self> {
        Self::new(config, config.model.clone(), request_config)
    }

    /// Secondary oracle used by rescue cycles
    pub fn secondary(config: &OracleConfig, request_config: RequestConfig) -> OracleResult<Self> {
        Self::new(config, config.fast_model.clone(), request_config)
    }

    /// Send a chat request, retrying with exponential backoff
    pub async fn chat(&self, request: ChatRequest) -> OracleResult<ChatResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    model = %self.model,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying oracle request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    info!(
                        model = %self.model,
                        choices = response.choices.len(),
                        latency_ms = start.elapsed().as_millis(),
                        "Oracle call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        model = %self.model,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Oracle call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(OracleError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute_request(
        &self,
        url: &str,
        request: &ChatRequest,
    ) -> OracleResult<ChatResponse> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            n = request.n,
            "Calling oracle"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    OracleError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let chat_response: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| OracleError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        if chat_response.choices.is_empty() {
            return Err(OracleError::EmptyResponse);
        }

        Ok(chat_response)
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Model this client talks to
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Oracle for OracleClient {
    async fn propose(
        &self,
        transcript: &[Message],
        stop: &[&str],
        n: usize,
    ) -> OracleResult<Vec<Message>> {
        let request = ChatRequest::new(&self.model, transcript, n)
            .with_stop(stop)
            .with_temperature(self.temperature);
        let response = self.chat(request).await?;
        Ok(response.into_messages())
    }
}
