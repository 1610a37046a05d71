//! Generation client: one request/response exchange against a chat
//! backend, with output normalization and a uniform error taxonomy.

pub mod error;
pub mod openrouter;
pub mod types;

use async_trait::async_trait;

pub use error::GatewayError;
pub use openrouter::OpenRouterClient;
pub use types::{Message, Role};

/// One synchronous generation exchange. `model` is the backend
/// identifier; `messages` is the full conversation so far. The
/// returned text is already normalized via [`normalize_output`].
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn generate(&self, model: &str, messages: &[Message]) -> Result<String, GatewayError>;
}

/// Strip a single pair of enclosing code fences and trim.
///
/// Models routinely wrap whole markdown answers in ```` ```markdown ````
/// fences, which downstream renderers show verbatim. Only the enclosing
/// fence pair is removed; internal formatting (bold, headings, nested
/// fences) is left alone.
pub fn normalize_output(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // Drop an optional language tag after the opening fence.
        text = rest
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
            .trim_start();
    }

    let trimmed = text.trim_end();
    text = trimmed.strip_suffix("```").unwrap_or(trimmed);

    text.trim().to_string()
}
