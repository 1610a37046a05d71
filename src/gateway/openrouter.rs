//! OpenRouter client for chat completions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::error::GatewayError;
use super::types::{Message, Role};
use super::{normalize_output, ChatGateway};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenRouter API client. One call is one request/response exchange;
/// no streaming, no transport-level retries.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenRouterClient {
    /// Create with the default endpoint and timeout.
    pub fn new(api_key: impl Into<String>) -> Result<Self, GatewayError> {
        Self::with_config(api_key, DEFAULT_BASE_URL, DEFAULT_TIMEOUT, None, None)
    }

    /// Create from environment variables.
    ///
    /// Reads `OPENROUTER_API_KEY` (may be empty; the key is validated
    /// per call, before any network I/O), plus optional
    /// `OPENROUTER_BASE_URL`, `OPENROUTER_TIMEOUT_SECONDS`,
    /// `OPENROUTER_REFERER` and `OPENROUTER_APP_TITLE`.
    pub fn from_env() -> Result<Self, GatewayError> {
        let api_key = std::env::var("OPENROUTER_API_KEY").unwrap_or_default();

        let base_url =
            std::env::var("OPENROUTER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());

        let timeout = std::env::var("OPENROUTER_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        let referer = std::env::var("OPENROUTER_REFERER").ok();
        let app_title = std::env::var("OPENROUTER_APP_TITLE").ok();

        Self::with_config(api_key, base_url, timeout, referer, app_title)
    }

    /// Create with custom configuration.
    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        referer: Option<String>,
        app_title: Option<String>,
    ) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(ref r) = referer {
            if let Ok(v) = HeaderValue::from_str(r) {
                headers.insert("HTTP-Referer", v);
            }
        }

        if let Some(ref t) = app_title {
            if let Ok(v) = HeaderValue::from_str(t) {
                headers.insert("X-Title", v);
            }
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(GatewayError::Transport)?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a Message> for ApiMessage<'a> {
    fn from(m: &'a Message) -> Self {
        Self {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &m.content,
        }
    }
}

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Option<Vec<Choice>>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
}

/// Pull a human-readable message out of an error response body:
/// the structured `error.message` field when the body parses, the raw
/// body otherwise.
fn extract_error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ChatApiResponse>(body) {
        if let Some(message) = parsed.error.and_then(|e| e.message) {
            if !message.is_empty() {
                return message;
            }
        }
    }
    body.to_string()
}

// =============================================================================
// CHAT GATEWAY IMPL
// =============================================================================

#[async_trait]
impl ChatGateway for OpenRouterClient {
    async fn generate(&self, model: &str, messages: &[Message]) -> Result<String, GatewayError> {
        if self.api_key.is_empty() {
            return Err(GatewayError::Auth);
        }

        let api_req = ChatApiRequest {
            model,
            messages: messages.iter().map(ApiMessage::from).collect(),
        };

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&api_req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(GatewayError::Backend {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        let parsed: ChatApiResponse =
            serde_json::from_str(&body).map_err(|e| GatewayError::Backend {
                status: status.as_u16(),
                message: format!("invalid JSON in response: {e}"),
            })?;

        // Some providers report errors inside a 200 body.
        if let Some(error) = parsed.error {
            return Err(GatewayError::Backend {
                status: status.as_u16(),
                message: error.message.unwrap_or_default(),
            });
        }

        let content = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| GatewayError::Backend {
                status: status.as_u16(),
                message: "no choices in response".to_string(),
            })?;

        Ok(normalize_output(&content))
    }
}
