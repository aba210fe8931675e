//! Intent router: ordered regex rules over normalized text.
//!
//! Rules are evaluated strictly in this order, first match wins:
//! hand-off end, greeting, place, menu image, hand-off start, the topic table,
//! then an exact match of the trimmed text against the fixed answers.
//! Patterns overlap on purpose (e.g. "メニュー" is both a menu-image request
//! and a lunch-menu topic), so the order is the behavior.

use crate::normalize::normalize;
use crate::profile::{ProfileError, StoreProfile, TopicReply};
use regex::Regex;
use std::collections::BTreeMap;

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// A hand-off termination phrase. Only meaningful while a hand-off is active.
    EndHandoff,
    Action(Action),
}

/// Something the bot answers on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Greeting,
    Place,
    MenuImage,
    StartHandoff,
    /// A fixed answer, by key into the profile's answer table.
    Answer { topic: String },
    RelatedTerms,
}

/// Any-of regex set.
#[derive(Debug, Clone)]
struct Matcher {
    patterns: Vec<Regex>,
}

impl Matcher {
    fn compile(rule: &str, sources: &[String]) -> Result<Self, ProfileError> {
        let patterns = sources
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|source| ProfileError::InvalidPattern {
                    rule: rule.to_string(),
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    fn is_match(&self, normalized: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(normalized))
    }
}

#[derive(Debug, Clone)]
struct Rule {
    name: String,
    matcher: Matcher,
    action: Action,
}

/// Compiled rule table for one profile.
#[derive(Debug, Clone)]
pub struct Router {
    handoff_end: Matcher,
    rules: Vec<Rule>,
    answers: BTreeMap<String, String>,
}

impl Router {
    /// Compile the profile's rule groups in priority order. Fails on the first invalid pattern.
    pub fn from_profile(profile: &StoreProfile) -> Result<Self, ProfileError> {
        let spec = &profile.rules;
        let handoff_end = Matcher::compile("handoffEnd", &spec.handoff_end)?;
        let groups: [(&str, &[String], Action); 4] = [
            ("greeting", &spec.greeting, Action::Greeting),
            ("place", &spec.place, Action::Place),
            ("menuImage", &spec.menu_image, Action::MenuImage),
            ("handoffStart", &spec.handoff_start, Action::StartHandoff),
        ];
        let mut rules = Vec::with_capacity(groups.len() + spec.topics.len());
        for (name, sources, action) in groups {
            rules.push(Rule {
                name: name.to_string(),
                matcher: Matcher::compile(name, sources)?,
                action,
            });
        }
        for topic in &spec.topics {
            let action = match &topic.reply {
                TopicReply::Answer(key) => Action::Answer { topic: key.clone() },
                TopicReply::RelatedTerms => Action::RelatedTerms,
            };
            rules.push(Rule {
                name: topic.name.clone(),
                matcher: Matcher::compile(&topic.name, &topic.patterns)?,
                action,
            });
        }
        Ok(Self {
            handoff_end,
            rules,
            answers: profile.answers.clone(),
        })
    }

    /// Classify `text`. `None` means no rule matched and the completion fallback should answer.
    pub fn classify(&self, text: &str) -> Option<Intent> {
        if self.handoff_end.is_match(&normalize(text)) {
            log::debug!("router: rule handoffEnd matched");
            return Some(Intent::EndHandoff);
        }
        self.classify_automated(text).map(Intent::Action)
    }

    /// Same as [`Router::classify`] with the hand-off end group skipped; used when no hand-off is active.
    pub fn classify_automated(&self, text: &str) -> Option<Action> {
        let normalized = normalize(text);
        if let Some(rule) = self.rules.iter().find(|r| r.matcher.is_match(&normalized)) {
            log::debug!("router: rule {} matched", rule.name);
            return Some(rule.action.clone());
        }
        let exact = text.trim();
        if self.answers.contains_key(exact) {
            log::debug!("router: exact answer {}", exact);
            return Some(Action::Answer {
                topic: exact.to_string(),
            });
        }
        None
    }
}
