//! Chat completion client for the remote text API
//!
//! Posts `{model, messages, max_tokens, temperature}` to `{base_url}/openai`
//! and returns the content of the first choice.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use super::types::{ChatMessage, ChatRequest, ChatResponse};
use crate::metrics::LLM_CALL_TIME;

/// Error type for chat operations
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Empty response from completion service")]
    EmptyResponse,
}

/// Per-call parameters for a completion request
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    /// Model name sent to the service (e.g. "openai-large")
    pub model: String,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Whole-request timeout
    pub timeout: Duration,
    /// Label for the call-duration metric ("proposal", "intent", "chat")
    pub purpose: &'static str,
}

impl CompletionOptions {
    pub fn new(model: impl Into<String>, purpose: &'static str) -> Self {
        Self {
            model: model.into(),
            max_tokens: 1000,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
            purpose,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Client for the `/openai` chat endpoint
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the text API (e.g., "https://text.pollinations.ai")
    /// * `token` - Optional bearer credential
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.filter(|t| !t.is_empty()),
            client: reqwest::Client::new(),
        }
    }

    /// Endpoint the client posts to
    pub fn endpoint(&self) -> String {
        format!("{}/openai", self.base_url.trim_end_matches('/'))
    }

    /// Send a chat completion request
    ///
    /// # Returns
    /// The trimmed content of `choices[0].message.content`
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ChatError> {
        let body = ChatRequest {
            model: &options.model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let mut request = self
            .client
            .post(self.endpoint())
            .timeout(options.timeout)
            .header(
                reqwest::header::USER_AGENT,
                concat!("shellpilot/", env!("CARGO_PKG_VERSION")),
            )
            .json(&body);

        // The service accepts the credential as a header or a query parameter
        if let Some(token) = &self.token {
            request = request.bearer_auth(token).query(&[("token", token.as_str())]);
        }

        let start = Instant::now();
        let result = self.send(request, options.timeout).await;
        LLM_CALL_TIME
            .with_label_values(&[options.purpose])
            .observe(start.elapsed().as_secs_f64());

        let text = result?;
        debug!(purpose = options.purpose, bytes = text.len(), "completion received");

        let response: ChatResponse = serde_json::from_str(&text)?;
        let content = response
            .first_content()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(ChatError::EmptyResponse)?;

        Ok(content.to_string())
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<String, ChatError> {
        let response = request.send().await.map_err(|e| timeout_or(e, timeout))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| timeout_or(e, timeout))?;

        if !status.is_success() {
            return Err(ChatError::Status {
                status: status.as_u16(),
                body: truncate(&text, 200),
            });
        }
        if text.is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(text)
    }
}

fn timeout_or(e: reqwest::Error, timeout: Duration) -> ChatError {
    if e.is_timeout() {
        ChatError::Timeout(timeout)
    } else {
        ChatError::Request(e)
    }
}

/// Truncate on a char boundary, appending an ellipsis if shortened
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
