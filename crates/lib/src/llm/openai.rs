//! OpenAI Responses API client (POST {base}/responses, non-streaming).

use crate::llm::{ChatMessage, CompletionBackend, CompletionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Client for the Responses endpoint. Cheap to clone.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// `timeout` bounds the whole request, connect included.
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            api_key,
            model: model.into(),
            temperature,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// POST /responses and pull the output text out of the reply.
    pub async fn create_response(
        &self,
        messages: &[ChatMessage],
    ) -> Result<Option<String>, CompletionError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(CompletionError::NotConfigured("api key"))?;
        let url = format!("{}/responses", self.base_url);
        let body = ResponsesRequest {
            model: &self.model,
            temperature: self.temperature,
            input: messages,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(CompletionError::Api(format!("{} {}", status, body)));
        }
        let raw = res.text().await?;
        match serde_json::from_str::<ResponsesResponse>(&raw) {
            Ok(data) => Ok(data.output_text()),
            Err(e) => {
                log::warn!("openai: unparsable response body: {}", e);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>, CompletionError> {
        self.create_response(messages).await
    }
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    temperature: f32,
    input: &'a [ChatMessage],
}

#[derive(Debug, Default, Deserialize)]
struct ResponsesResponse {
    /// Convenience aggregate some servers include.
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(default)]
    text: Option<OutputText>,
}

/// Plain string, or the older `{ "value": ... }` shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OutputText {
    Plain(String),
    Annotated { value: String },
}

impl OutputText {
    fn as_str(&self) -> &str {
        match self {
            OutputText::Plain(s) => s,
            OutputText::Annotated { value } => value,
        }
    }
}

impl ResponsesResponse {
    /// `output_text` when non-empty, else the first non-empty content text.
    fn output_text(&self) -> Option<String> {
        if let Some(t) = self.output_text.as_deref().map(str::trim) {
            if !t.is_empty() {
                return Some(t.to_string());
            }
        }
        self.output
            .iter()
            .flat_map(|item| item.content.iter())
            .filter_map(|c| c.text.as_ref())
            .map(|t| t.as_str().trim())
            .find(|t| !t.is_empty())
            .map(str::to_string)
    }
}
