//! LINE Messaging API channel: webhook payload parsing, signature check, reply API.

use crate::channels::inbound::{InboundEvent, UNKNOWN_SENDER};
use crate::channels::outbound::{ChannelError, Reply, ReplySender};
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use std::time::Duration;

pub const LINE_API_BASE: &str = "https://api.line.me";

/// Default bound on one reply API call.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying base64(HMAC-SHA256(channel secret, body)).
pub const SIGNATURE_HEADER: &str = "X-Line-Signature";

/// One webhook event. Every field is optional so odd events are skipped rather than rejected.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: Option<LineSource>,
    #[serde(default)]
    pub message: Option<LineMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineSource {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LineMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl LineEvent {
    /// Text message events become [`InboundEvent`]s; everything else is ignored.
    pub fn to_inbound(&self) -> Option<InboundEvent> {
        if self.kind != "message" {
            return None;
        }
        let message = self.message.as_ref()?;
        if message.kind != "text" {
            return None;
        }
        let sender_id = self
            .source
            .as_ref()
            .and_then(|s| s.user_id.as_deref())
            .filter(|id| !id.is_empty())
            .unwrap_or(UNKNOWN_SENDER);
        Some(InboundEvent::new(
            sender_id,
            message.text.clone().unwrap_or_default(),
            self.reply_token.clone().unwrap_or_default(),
        ))
    }
}

/// Parse a webhook body into text events. A missing `events` list is empty; events that do not
/// deserialize are logged and skipped. Only a body that is not JSON at all is an error.
pub fn parse_webhook_events(body: &[u8]) -> Result<Vec<InboundEvent>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    let events = match value.get("events").and_then(|e| e.as_array()) {
        Some(events) => events.clone(),
        None => return Ok(Vec::new()),
    };
    let mut out = Vec::with_capacity(events.len());
    for raw in events {
        match serde_json::from_value::<LineEvent>(raw) {
            Ok(ev) => out.extend(ev.to_inbound()),
            Err(e) => log::debug!("line: skipping malformed event: {}", e),
        }
    }
    Ok(out)
}

/// base64(HMAC-SHA256(secret, body)), the value LINE sends in [`SIGNATURE_HEADER`].
pub fn sign_body(channel_secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Constant-time check of a webhook signature.
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// LINE message object for a reply.
pub fn line_message(reply: &Reply) -> serde_json::Value {
    match reply {
        Reply::Text {
            text,
            quick_replies,
        } => {
            let mut msg = json!({ "type": "text", "text": text });
            if !quick_replies.is_empty() {
                let items: Vec<serde_json::Value> = quick_replies
                    .iter()
                    .map(|q| {
                        json!({
                            "type": "action",
                            "action": { "type": "message", "label": q.label, "text": q.text }
                        })
                    })
                    .collect();
                msg["quickReply"] = json!({ "items": items });
            }
            msg
        }
        Reply::Image {
            original_url,
            preview_url,
        } => json!({
            "type": "image",
            "originalContentUrl": original_url,
            "previewImageUrl": preview_url,
        }),
        Reply::Location {
            title,
            address,
            latitude,
            longitude,
        } => json!({
            "type": "location",
            "title": title,
            "address": address,
            "latitude": latitude,
            "longitude": longitude,
        }),
    }
}

/// Reply client for the LINE Messaging API.
pub struct LineChannel {
    id: String,
    api_base: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl LineChannel {
    /// `timeout` bounds each reply call, connect included.
    pub fn new(
        access_token: Option<String>,
        api_base: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| LINE_API_BASE.to_string());
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            id: "line".to_string(),
            api_base,
            access_token,
            client,
        })
    }

    /// POST /v2/bot/message/reply with a single message.
    pub async fn reply_message(&self, reply_token: &str, reply: &Reply) -> Result<(), ChannelError> {
        let token = self
            .access_token
            .as_ref()
            .ok_or(ChannelError::NotConfigured("line channel access token"))?;
        let url = format!("{}/v2/bot/message/reply", self.api_base);
        let body = json!({
            "replyToken": reply_token,
            "messages": [line_message(reply)],
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("reply failed: {} {}", status, body)));
        }
        Ok(())
    }
}

#[async_trait]
impl ReplySender for LineChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_reply(&self, reply_token: &str, reply: &Reply) -> Result<(), ChannelError> {
        self.reply_message(reply_token, reply).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::QuickReply;

    #[test]
    fn parses_text_events_and_ignores_the_rest() {
        let body = r#"{
            "destination": "U0",
            "events": [
                { "type": "message", "replyToken": "r1", "source": { "userId": "U1" },
                  "message": { "type": "text", "text": "  営業時間 " } },
                { "type": "message", "replyToken": "r2", "source": { "userId": "U2" },
                  "message": { "type": "sticker" } },
                { "type": "follow", "replyToken": "r3", "source": { "userId": "U3" } },
                { "type": "message", "replyToken": "r4", "message": { "type": "text", "text": "hi" } },
                { "type": "message", "message": "not an object" }
            ]
        }"#;
        let events = parse_webhook_events(body.as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![
                InboundEvent::new("U1", "営業時間", "r1"),
                InboundEvent::new("unknown", "hi", "r4"),
            ]
        );
    }

    #[test]
    fn missing_event_list_is_empty() {
        assert!(parse_webhook_events(b"{}").unwrap().is_empty());
        assert!(parse_webhook_events(br#"{"events": null}"#).unwrap().is_empty());
        assert!(parse_webhook_events(b"not json").is_err());
    }

    #[test]
    fn signature_roundtrip_and_tamper() {
        let body = br#"{"events":[]}"#;
        let sig = sign_body("secret", body);
        assert!(verify_signature("secret", body, &sig));
        assert!(!verify_signature("other", body, &sig));
        assert!(!verify_signature("secret", br#"{"events":[1]}"#, &sig));
        assert!(!verify_signature("secret", body, "%%%"));
    }

    #[test]
    fn text_with_quick_replies_wire_format() {
        let reply = Reply::Text {
            text: "welcome".to_string(),
            quick_replies: vec![QuickReply {
                label: "ランチ".to_string(),
                text: "ランチ".to_string(),
            }],
        };
        let msg = line_message(&reply);
        assert_eq!(msg["type"], "text");
        assert_eq!(msg["quickReply"]["items"][0]["type"], "action");
        assert_eq!(msg["quickReply"]["items"][0]["action"]["type"], "message");
        assert_eq!(msg["quickReply"]["items"][0]["action"]["label"], "ランチ");
        assert!(line_message(&Reply::text("x")).get("quickReply").is_none());
    }

    #[test]
    fn image_and_location_wire_format() {
        let img = line_message(&Reply::Image {
            original_url: "https://e/menu.png".to_string(),
            preview_url: "https://e/menu.png".to_string(),
        });
        assert_eq!(img["originalContentUrl"], "https://e/menu.png");
        assert_eq!(img["previewImageUrl"], "https://e/menu.png");

        let loc = line_message(&Reply::Location {
            title: "t".to_string(),
            address: "a".to_string(),
            latitude: 34.5,
            longitude: 135.25,
        });
        assert_eq!(loc["type"], "location");
        assert_eq!(loc["latitude"], 34.5);
        assert_eq!(loc["longitude"], 135.25);
    }

    #[tokio::test]
    async fn reply_without_token_is_not_configured() {
        let ch = LineChannel::new(None, None, DEFAULT_REPLY_TIMEOUT).unwrap();
        let err = ch.reply_message("r", &Reply::text("x")).await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn stalled_reply_api_times_out() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                held.push(sock);
            }
        });

        let ch = LineChannel::new(
            Some("token".to_string()),
            Some(format!("http://{}", addr)),
            Duration::from_millis(200),
        )
        .unwrap();
        let started = std::time::Instant::now();
        let err = ch.reply_message("r", &Reply::text("x")).await.unwrap_err();
        assert!(matches!(err, ChannelError::Request(ref e) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
