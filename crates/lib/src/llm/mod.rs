//! Text completion: the backend trait the fallback talks to, and the OpenAI Responses client.

mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openai::{OpenAiClient, DEFAULT_BASE_URL, DEFAULT_MODEL};

/// One turn of the prompt (role is "system" or "user").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion service not configured: {0}")]
    NotConfigured(&'static str),
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion api error: {0}")]
    Api(String),
}

impl CompletionError {
    /// Short kind name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CompletionError::NotConfigured(_) => "not_configured",
            CompletionError::Request(e) if e.is_timeout() => "timeout",
            CompletionError::Request(_) => "request",
            CompletionError::Api(_) => "api",
        }
    }
}

/// Prompt in, text out.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// First non-empty output text. `Ok(None)` when the service answered but produced nothing usable.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>, CompletionError>;
}
