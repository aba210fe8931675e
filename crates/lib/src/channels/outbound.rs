//! Outbound replies: payload types and the send interface the dispatcher talks to.

use crate::profile::QuickReply;
use async_trait::async_trait;

/// One reply message.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text {
        text: String,
        quick_replies: Vec<QuickReply>,
    },
    Image {
        original_url: String,
        preview_url: String,
    },
    Location {
        title: String,
        address: String,
        latitude: f64,
        longitude: f64,
    },
}

impl Reply {
    /// Plain text without quick replies.
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text {
            text: text.into(),
            quick_replies: Vec::new(),
        }
    }

    /// Text body when this is a text reply.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Reply::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Short kind name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Text { .. } => "text",
            Reply::Image { .. } => "image",
            Reply::Location { .. } => "location",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel not configured: {0}")]
    NotConfigured(&'static str),
    #[error("channel request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("channel api error: {0}")]
    Api(String),
}

/// Sends the reply for one inbound event.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Channel id for logs (e.g. "line").
    fn id(&self) -> &str;
    /// Deliver `reply` using the event's reply token.
    async fn send_reply(&self, reply_token: &str, reply: &Reply) -> Result<(), ChannelError>;
}
