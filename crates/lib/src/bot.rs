//! Reply dispatch: hand-off check, intent routing, then one reply (or deliberate silence).
//!
//! Per event: look up the sender's hand-off; an end phrase during a hand-off clears it and
//! answers once; any other text during a hand-off is swallowed. Otherwise the router's intent
//! picks the reply, and unmatched text goes to the completion fallback.

use crate::channels::{InboundEvent, Reply, ReplySender};
use crate::fallback::Fallback;
use crate::handoff::{ttl_from_minutes, HandoffStore, DEFAULT_TTL_MINUTES};
use crate::intent::{Action, Intent, Router};
use crate::llm::CompletionBackend;
use crate::profile::{ProfileError, StoreProfile};
use std::sync::Arc;
use std::time::Duration;

/// Default bound on one completion call.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(20);

/// Runtime knobs that are not part of the profile.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub handoff_ttl: Duration,
    pub completion_timeout: Duration,
    /// Deployment build id, logged with location replies.
    pub build: String,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            handoff_ttl: ttl_from_minutes(DEFAULT_TTL_MINUTES),
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
            build: "local".to_string(),
        }
    }
}

/// One profile's bot: router, hand-off store and fallback wired together.
pub struct Bot {
    profile: Arc<StoreProfile>,
    router: Router,
    handoff: Arc<dyn HandoffStore>,
    fallback: Fallback,
    settings: BotSettings,
}

impl Bot {
    /// Compiles the profile's rules; fails on an invalid pattern.
    pub fn new(
        profile: StoreProfile,
        handoff: Arc<dyn HandoffStore>,
        completion: Arc<dyn CompletionBackend>,
        settings: BotSettings,
    ) -> Result<Self, ProfileError> {
        let router = Router::from_profile(&profile)?;
        let fallback = Fallback::new(completion, &profile);
        Ok(Self {
            profile: Arc::new(profile),
            router,
            handoff,
            fallback,
            settings,
        })
    }

    pub fn profile(&self) -> &StoreProfile {
        &self.profile
    }

    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    /// Decide the reply for one event. `None` means stay silent (hand-off active).
    pub async fn respond(&self, event: &InboundEvent) -> Option<Reply> {
        let user = event.sender_id.as_str();
        log::info!("bot: recv {:?} user={}", event.text, user);

        let live = self.handoff.get(user).await;
        let action = match self.router.classify(&event.text) {
            Some(Intent::EndHandoff) if live.is_some() => {
                self.handoff.clear(user).await;
                log::info!("handoff: end user={}", user);
                return Some(Reply::text(&self.profile.messages.handoff_end));
            }
            Some(Intent::EndHandoff) => self.router.classify_automated(&event.text),
            Some(Intent::Action(action)) => Some(action),
            None => None,
        };
        if let Some(entry) = live {
            log::info!(
                "handoff: silent (until {}) user={}",
                entry.expires_at_rfc3339(),
                user
            );
            return None;
        }

        let routed = match action {
            Some(action) => self.reply_for(&action, user).await,
            None => None,
        };
        match routed {
            Some(reply) => Some(reply),
            None => Some(self.fallback_reply(&event.text).await),
        }
    }

    async fn reply_for(&self, action: &Action, user: &str) -> Option<Reply> {
        let profile = &self.profile;
        match action {
            Action::Greeting => Some(Reply::Text {
                text: profile.welcome.text.clone(),
                quick_replies: profile.welcome.quick_replies.clone(),
            }),
            Action::Place => {
                let place = profile.place.as_ref()?;
                log::info!(
                    "bot: place build={} lat={} lng={}",
                    self.settings.build,
                    place.latitude,
                    place.longitude
                );
                Some(Reply::Location {
                    title: place.title.clone(),
                    address: place.address.clone(),
                    latitude: place.latitude,
                    longitude: place.longitude,
                })
            }
            Action::MenuImage => {
                let image = profile.menu_image.as_ref()?;
                log::info!("bot: menu image {}", image.original_content_url);
                Some(Reply::Image {
                    original_url: image.original_content_url.clone(),
                    preview_url: image.preview_url().to_string(),
                })
            }
            Action::StartHandoff => {
                let entry = self.handoff.set(user, self.settings.handoff_ttl).await;
                log::info!(
                    "handoff: start user={} ttlMin={} until={}",
                    user,
                    self.settings.handoff_ttl.as_secs() / 60,
                    entry.expires_at_rfc3339()
                );
                Some(Reply::text(&profile.messages.handoff_start))
            }
            Action::Answer { topic } => profile.answers.get(topic).map(Reply::text),
            Action::RelatedTerms => Some(Reply::text(profile.related_terms.render())),
        }
    }

    /// Completion answer, or the profile's error text when the service fails or times out.
    async fn fallback_reply(&self, text: &str) -> Reply {
        let error_text = &self.profile.messages.completion_error;
        match tokio::time::timeout(self.settings.completion_timeout, self.fallback.complete(text))
            .await
        {
            Ok(Ok(answer)) => Reply::text(answer),
            Ok(Err(e)) => {
                log::error!("fallback: completion failed ({}): {}", e.kind(), e);
                Reply::text(error_text)
            }
            Err(_) => {
                log::error!(
                    "fallback: completion timed out after {:?}",
                    self.settings.completion_timeout
                );
                Reply::text(error_text)
            }
        }
    }

    /// Respond to one event and deliver the reply. Send failures are logged.
    pub async fn handle_event(&self, sender: &dyn ReplySender, event: &InboundEvent) {
        let Some(reply) = self.respond(event).await else {
            return;
        };
        if let Err(e) = sender.send_reply(&event.reply_token, &reply).await {
            log::warn!(
                "bot: {} {} reply failed user={}: {}",
                sender.id(),
                reply.kind(),
                event.sender_id,
                e
            );
        }
    }

    /// Handle a webhook batch: senders run concurrently, each sender's events in order.
    /// A failing or panicking sender task is logged and does not affect the others.
    pub async fn handle_batch(self: &Arc<Self>, sender: Arc<dyn ReplySender>, events: Vec<InboundEvent>) {
        let groups = group_by_sender(events);
        let tasks = groups.into_iter().map(|(sender_id, events)| {
            let bot = Arc::clone(self);
            let out = Arc::clone(&sender);
            let handle = tokio::spawn(async move {
                for event in &events {
                    bot.handle_event(out.as_ref(), event).await;
                }
            });
            async move { (sender_id, handle.await) }
        });
        for (sender_id, result) in futures_util::future::join_all(tasks).await {
            if let Err(e) = result {
                log::error!("bot: event task for user={} failed: {}", sender_id, e);
            }
        }
    }
}

/// Split events by sender, keeping first-seen sender order and per-sender delivery order.
fn group_by_sender(events: Vec<InboundEvent>) -> Vec<(String, Vec<InboundEvent>)> {
    let mut groups: Vec<(String, Vec<InboundEvent>)> = Vec::new();
    for event in events {
        match groups.iter_mut().find(|(id, _)| *id == event.sender_id) {
            Some((_, list)) => list.push(event),
            None => groups.push((event.sender_id.clone(), vec![event])),
        }
    }
    groups
}
