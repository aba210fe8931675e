//! Store profile: everything the bot says and recognizes for one business.
//!
//! A profile is plain JSON (camelCase). Two presets are bundled (`cafe`, `polyphony`);
//! any other deployment supplies its own file via `profile.path` in the config.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

static CAFE_PRESET: &str = include_str!("../config/presets/cafe.json");
static POLYPHONY_PRESET: &str = include_str!("../config/presets/polyphony.json");

/// Names accepted by [`StoreProfile::preset`].
pub const PRESET_NAMES: &[&str] = &["cafe", "polyphony"];

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("unknown profile preset: {0} (available: cafe, polyphony)")]
    UnknownPreset(String),
    #[error("reading profile {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing profile: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("rule {rule}: invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("{rule} refers to unknown answer {key:?}")]
    MissingAnswer { rule: String, key: String },
    #[error("profile has {0} patterns but no {0} content")]
    MissingContent(&'static str),
}

/// All content and patterns for one business.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreProfile {
    pub store_name: String,
    /// Fixed answers keyed by topic (also matched verbatim as a last resort).
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    #[serde(default)]
    pub rules: RuleSpec,
    #[serde(default)]
    pub welcome: Welcome,
    #[serde(default)]
    pub place: Option<Place>,
    #[serde(default)]
    pub menu_image: Option<MenuImage>,
    #[serde(default)]
    pub related_terms: RelatedTerms,
    #[serde(default)]
    pub facts: Facts,
    #[serde(default)]
    pub assistant: AssistantPrompt,
    pub messages: Messages,
}

/// Regex sources per rule group, tested against normalized text. An empty group never matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    #[serde(default)]
    pub handoff_end: Vec<String>,
    #[serde(default)]
    pub greeting: Vec<String>,
    #[serde(default)]
    pub place: Vec<String>,
    #[serde(default)]
    pub menu_image: Vec<String>,
    #[serde(default)]
    pub handoff_start: Vec<String>,
    /// Evaluated in order; the first matching topic wins.
    #[serde(default)]
    pub topics: Vec<TopicRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRule {
    pub name: String,
    pub patterns: Vec<String>,
    pub reply: TopicReply,
}

/// `{"answer": "<key>"}` or `"relatedTerms"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TopicReply {
    Answer(String),
    RelatedTerms,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub quick_replies: Vec<QuickReply>,
}

/// A quick-reply button that sends `text` back as the user's message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickReply {
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub title: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuImage {
    pub original_content_url: String,
    /// Defaults to the original URL when absent.
    #[serde(default)]
    pub preview_image_url: Option<String>,
}

impl MenuImage {
    pub fn preview_url(&self) -> &str {
        self.preview_image_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(self.original_content_url.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelatedTerms {
    #[serde(default)]
    pub heading: String,
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    pub footer: String,
}

impl RelatedTerms {
    /// Heading, one bullet per term, then the footer after a blank line.
    pub fn render(&self) -> String {
        let bullets: Vec<String> = self.terms.iter().map(|t| format!("・{}", t)).collect();
        let mut out = format!("{}\n{}", self.heading, bullets.join("\n"));
        if !self.footer.is_empty() {
            out.push_str("\n\n");
            out.push_str(&self.footer);
        }
        out
    }
}

/// Facts handed to the completion service: answer excerpts plus ground rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Facts {
    #[serde(default)]
    pub sections: Vec<FactSection>,
    #[serde(default)]
    pub rules: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactSection {
    #[serde(default)]
    pub label: Option<String>,
    pub topic: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantPrompt {
    #[serde(default)]
    pub system_prompt: String,
    /// Instruction placed before the facts block in the user turn.
    #[serde(default)]
    pub facts_preamble: String,
    /// Line placed directly above the user's question.
    #[serde(default)]
    pub question_heading: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Messages {
    #[serde(default)]
    pub handoff_start: String,
    #[serde(default)]
    pub handoff_end: String,
    pub completion_error: String,
    pub completion_empty: String,
}

impl StoreProfile {
    /// Load a bundled preset by name.
    pub fn preset(name: &str) -> Result<Self, ProfileError> {
        let raw = preset_json(name).ok_or_else(|| ProfileError::UnknownPreset(name.to_string()))?;
        Self::from_json_str(raw)
    }

    /// Load a profile from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let s = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&s)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ProfileError> {
        let profile: StoreProfile = serde_json::from_str(s)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Cross-reference checks serde cannot express. Pattern syntax is checked when the router compiles.
    pub fn validate(&self) -> Result<(), ProfileError> {
        for topic in &self.rules.topics {
            if let TopicReply::Answer(key) = &topic.reply {
                if !self.answers.contains_key(key) {
                    return Err(ProfileError::MissingAnswer {
                        rule: format!("topic {}", topic.name),
                        key: key.clone(),
                    });
                }
            }
        }
        for section in &self.facts.sections {
            if !self.answers.contains_key(&section.topic) {
                return Err(ProfileError::MissingAnswer {
                    rule: "facts".to_string(),
                    key: section.topic.clone(),
                });
            }
        }
        if !self.rules.greeting.is_empty() && self.welcome.text.trim().is_empty() {
            return Err(ProfileError::MissingContent("greeting"));
        }
        if !self.rules.place.is_empty() && self.place.is_none() {
            return Err(ProfileError::MissingContent("place"));
        }
        if !self.rules.menu_image.is_empty() && self.menu_image.is_none() {
            return Err(ProfileError::MissingContent("menuImage"));
        }
        if !self.rules.handoff_start.is_empty() && self.messages.handoff_start.trim().is_empty() {
            return Err(ProfileError::MissingContent("handoffStart"));
        }
        if !self.rules.handoff_end.is_empty() && self.messages.handoff_end.trim().is_empty() {
            return Err(ProfileError::MissingContent("handoffEnd"));
        }
        Ok(())
    }

    /// Replace the place coordinates where an override is given.
    pub fn with_coordinates(mut self, latitude: Option<f64>, longitude: Option<f64>) -> Self {
        if let Some(place) = self.place.as_mut() {
            if let Some(lat) = latitude {
                place.latitude = lat;
            }
            if let Some(lng) = longitude {
                place.longitude = lng;
            }
        }
        self
    }

    /// Facts block for the completion prompt: `【label】answer` lines, then the rules. Empty when nothing is configured.
    pub fn facts_text(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        for section in &self.facts.sections {
            let Some(value) = self.answers.get(&section.topic) else {
                continue;
            };
            match section.label.as_deref() {
                Some(label) if !label.is_empty() => lines.push(format!("【{}】{}", label, value)),
                _ => lines.push(value.clone()),
            }
        }
        let mut out = lines.join("\n");
        if !self.facts.rules.is_empty() {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str("【ルール】\n");
            let rules: Vec<String> = self.facts.rules.iter().map(|r| format!("- {}", r)).collect();
            out.push_str(&rules.join("\n"));
        }
        out
    }
}

/// Raw JSON of a bundled preset (used by `init` to seed an editable profile file).
pub fn preset_json(name: &str) -> Option<&'static str> {
    match name.trim().to_lowercase().as_str() {
        "cafe" => Some(CAFE_PRESET),
        "polyphony" => Some(POLYPHONY_PRESET),
        _ => None,
    }
}
