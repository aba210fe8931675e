//! Inbound message event: one text message delivered by the platform, handled then dropped.

/// Sender id used when the platform omits one.
pub const UNKNOWN_SENDER: &str = "unknown";

/// A text message from a user, with the token needed to answer it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub sender_id: String,
    /// Trimmed message text.
    pub text: String,
    /// Opaque handle for the single reply the platform allows.
    pub reply_token: String,
}

impl InboundEvent {
    pub fn new(
        sender_id: impl Into<String>,
        text: impl Into<String>,
        reply_token: impl Into<String>,
    ) -> Self {
        let text: String = text.into();
        Self {
            sender_id: sender_id.into(),
            text: text.trim().to_string(),
            reply_token: reply_token.into(),
        }
    }
}
