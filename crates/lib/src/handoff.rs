//! Hand-off state: sender id -> expiry of "a human is handling this conversation".
//!
//! While an entry is live the bot stays silent for that sender. Entries expire
//! lazily: the first lookup at or after the expiry removes them.
//! The in-memory store forgets everything on restart.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Default hand-off lifetime (90 minutes).
pub const DEFAULT_TTL_MINUTES: u64 = 90;

/// A live hand-off for one sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffEntry {
    pub sender_id: String,
    /// Unix epoch milliseconds at which the entry stops counting.
    pub expires_at_ms: i64,
}

impl HandoffEntry {
    /// Expiry as RFC 3339 for logs.
    pub fn expires_at_rfc3339(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.expires_at_ms)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| self.expires_at_ms.to_string())
    }
}

/// Millisecond wall clock, injectable for tests.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Real time via chrono.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Keyed hand-off store. At most one entry per sender; `set` overwrites.
#[async_trait]
pub trait HandoffStore: Send + Sync {
    /// Live entry for the sender, or None (an expired entry is removed and reported as None).
    async fn get(&self, sender_id: &str) -> Option<HandoffEntry>;
    /// Start (or restart) a hand-off lasting `ttl` from now.
    async fn set(&self, sender_id: &str, ttl: Duration) -> HandoffEntry;
    /// Remove the sender's entry; true when one existed.
    async fn clear(&self, sender_id: &str) -> bool;
}

/// Process-local store backed by a map.
pub struct MemoryHandoffStore {
    inner: Arc<RwLock<HashMap<String, HandoffEntry>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryHandoffStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHandoffStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Number of entries currently held, expired ones included until looked up.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl HandoffStore for MemoryHandoffStore {
    async fn get(&self, sender_id: &str) -> Option<HandoffEntry> {
        let now = self.clock.now_ms();
        {
            let g = self.inner.read().await;
            match g.get(sender_id) {
                None => return None,
                Some(entry) if now < entry.expires_at_ms => return Some(entry.clone()),
                Some(_) => {}
            }
        }
        // Expired: re-check under the write lock so a concurrent `set` is not lost.
        let mut g = self.inner.write().await;
        if let Some(entry) = g.get(sender_id) {
            if now >= entry.expires_at_ms {
                g.remove(sender_id);
                log::debug!("handoff: entry for {} expired", sender_id);
            } else {
                return Some(entry.clone());
            }
        }
        None
    }

    async fn set(&self, sender_id: &str, ttl: Duration) -> HandoffEntry {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let entry = HandoffEntry {
            sender_id: sender_id.to_string(),
            expires_at_ms: self.clock.now_ms().saturating_add(ttl_ms),
        };
        self.inner
            .write()
            .await
            .insert(sender_id.to_string(), entry.clone());
        entry
    }

    async fn clear(&self, sender_id: &str) -> bool {
        self.inner.write().await.remove(sender_id).is_some()
    }
}

/// Minutes to a `Duration`.
pub fn ttl_from_minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

/// Settable clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: std::sync::atomic::AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: std::sync::atomic::AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(std::sync::atomic::Ordering::SeqCst)
    }
}
