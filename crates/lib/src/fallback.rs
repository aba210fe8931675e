//! Completion fallback: answer unmatched questions from the profile's facts only.

use crate::llm::{ChatMessage, CompletionBackend, CompletionError};
use crate::profile::{AssistantPrompt, StoreProfile};
use std::sync::Arc;

/// Completion backend plus the fixed prompt material of one profile.
#[derive(Clone)]
pub struct Fallback {
    backend: Arc<dyn CompletionBackend>,
    assistant: AssistantPrompt,
    facts: String,
    apology: String,
}

impl Fallback {
    pub fn new(backend: Arc<dyn CompletionBackend>, profile: &StoreProfile) -> Self {
        Self {
            backend,
            assistant: profile.assistant.clone(),
            facts: profile.facts_text(),
            apology: profile.messages.completion_empty.clone(),
        }
    }

    /// The facts block embedded in every prompt.
    pub fn facts(&self) -> &str {
        &self.facts
    }

    /// System instruction, then one user turn: preamble, facts, and the question under its heading.
    pub fn prompt(&self, user_text: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        let system = self.assistant.system_prompt.trim();
        if !system.is_empty() {
            messages.push(ChatMessage::system(system));
        }
        let question = if self.assistant.question_heading.is_empty() {
            user_text.to_string()
        } else {
            format!("{}\n{}", self.assistant.question_heading, user_text)
        };
        let parts: Vec<&str> = [
            self.assistant.facts_preamble.as_str(),
            self.facts.as_str(),
            question.as_str(),
        ]
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect();
        messages.push(ChatMessage::user(parts.join("\n\n")));
        messages
    }

    /// Ask the backend. Empty output becomes the profile's apology; service failures are returned
    /// for the caller to replace with its error text.
    pub async fn complete(&self, user_text: &str) -> Result<String, CompletionError> {
        let messages = self.prompt(user_text);
        match self.backend.complete(&messages).await? {
            Some(text) => Ok(text),
            None => {
                log::debug!("fallback: empty completion, using apology");
                Ok(self.apology.clone())
            }
        }
    }
}
