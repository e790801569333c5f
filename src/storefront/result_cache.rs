//! In-memory store of per-turn analytics results.
//!
//! The cache maps a request id to a [`CacheEntry`] and is the only state shared between
//! the chat handler (seeds entries), the orchestrator (merges results), the poll
//! endpoint (reads and marks delivery) and the janitor (evicts). Every operation takes
//! the single map lock for its whole duration, so a reader sees an entry either before
//! or after a merge, never halfway through one. The lock is never held across `.await`.
//!
//! # Eviction
//!
//! Entries leave the cache exactly once, by one of two paths:
//!
//! - **TTL**: an entry that has not been delivered within `ttl` of its creation is removed
//!   by [`ResultCache::sweep_expired`] (driven by the [`CacheJanitor`](crate::janitor::CacheJanitor)).
//! - **Grace**: the first read that sees an entry ready marks it delivered and schedules
//!   its removal `grace` later, so retries within that window still get the payload.
//!   Reads that arrive after the window treat the entry as gone even if the scheduled
//!   removal has not run yet.
//!
//! Grace removals made by the scheduled task are reported to the handler attached with
//! [`ResultCache::with_event_handler`]. A removal made by a read is flagged on the
//! returned [`CacheSnapshot`] so the caller can report it.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use storefront_llm::result_cache::ResultCache;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cache = ResultCache::new(Duration::from_secs(300), Duration::from_secs(10));
//! assert!(cache.create("msg_1"));
//! assert!(!cache.read("msg_1").ready);
//!
//! cache.update("msg_1", Some(json!({"intent": "recommendation"})), None);
//! let snapshot = cache.read("msg_1");
//! assert!(snapshot.ready);
//! assert!(snapshot.newly_delivered);
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::Instant;

use crate::storefront::config::StorefrontConfig;
use crate::storefront::event::{AnalyticsEvent, EventHandler};

/// Why an entry was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Not delivered before the TTL elapsed.
    Expired,
    /// Delivered, and the post-delivery grace period elapsed.
    Delivered,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionReason::Expired => f.write_str("ttl expired"),
            EvictionReason::Delivered => f.write_str("delivered"),
        }
    }
}

/// Analytics results for one user turn.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub id: String,
    /// Output of the interaction agent, absent on failure.
    pub interaction_result: Option<Value>,
    /// Output of the funnel agent, absent on failure or when no event was detected.
    pub funnel_result: Option<Value>,
    /// Flips to `true` once, when the orchestration run settles.
    pub ready: bool,
    /// Flips to `true` once, on the first read that observes `ready`.
    pub delivered: bool,
    /// Monotonic creation time; TTL is measured from here.
    pub created_at: Instant,
    /// Wall-clock creation time, for diagnostics.
    pub created_utc: DateTime<Utc>,
    pub delivered_at: Option<Instant>,
}

impl CacheEntry {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            interaction_result: None,
            funnel_result: None,
            ready: false,
            delivered: false,
            created_at: Instant::now(),
            created_utc: Utc::now(),
            delivered_at: None,
        }
    }

    fn ttl_elapsed(&self, now: Instant, ttl: Duration) -> bool {
        !self.delivered && now.saturating_duration_since(self.created_at) > ttl
    }

    fn grace_elapsed(&self, now: Instant, grace: Duration) -> bool {
        match self.delivered_at {
            Some(at) => now.saturating_duration_since(at) >= grace,
            None => false,
        }
    }

    fn snapshot(&self, newly_delivered: bool) -> CacheSnapshot {
        CacheSnapshot {
            exists: true,
            ready: self.ready,
            interaction: self.interaction_result.clone(),
            funnel: self.funnel_result.clone(),
            newly_delivered,
            evicted: false,
        }
    }
}

/// Immutable view of an entry at the time of a read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    pub exists: bool,
    pub ready: bool,
    pub interaction: Option<Value>,
    pub funnel: Option<Value>,
    /// `true` only for the read that marked the entry delivered.
    pub newly_delivered: bool,
    /// `true` when this read removed the entry because its grace period had passed.
    pub evicted: bool,
}

type EntryMap = HashMap<String, CacheEntry>;

/// Concurrency-safe request id → [`CacheEntry`] store with TTL and grace eviction.
pub struct ResultCache {
    entries: Arc<Mutex<EntryMap>>,
    ttl: Duration,
    grace: Duration,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl ResultCache {
    pub fn new(ttl: Duration, grace: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            grace,
            event_handler: None,
        }
    }

    /// Reports removals made by the scheduled grace eviction.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn from_config(config: &StorefrontConfig) -> Self {
        Self::new(config.entry_ttl, config.delivery_grace)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    fn lock(&self) -> MutexGuard<'_, EntryMap> {
        // Entries are plain data; a panic elsewhere cannot leave one half-written.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds a not-ready entry. Returns `false` (and changes nothing) if `id` exists.
    pub fn create(&self, id: &str) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(id) {
            log::warn!("ResultCache::create: duplicate request id {}", id);
            return false;
        }
        entries.insert(id.to_string(), CacheEntry::new(id));
        true
    }

    /// Merges agent results and flips the entry to ready.
    ///
    /// An entry that is already ready is left untouched. A missing entry is created
    /// directly in the ready state instead of dropping the results. Returns whether
    /// this call flipped `ready`.
    pub fn update(&self, id: &str, interaction: Option<Value>, funnel: Option<Value>) -> bool {
        let mut entries = self.lock();
        match entries.get_mut(id) {
            Some(entry) if entry.ready => {
                log::warn!("ResultCache::update: {} is already ready; ignoring", id);
                false
            }
            Some(entry) => {
                entry.interaction_result = interaction;
                entry.funnel_result = funnel;
                entry.ready = true;
                true
            }
            None => {
                log::warn!(
                    "ResultCache::update: no entry for {}; inserting it as ready",
                    id
                );
                let mut entry = CacheEntry::new(id);
                entry.interaction_result = interaction;
                entry.funnel_result = funnel;
                entry.ready = true;
                entries.insert(id.to_string(), entry);
                true
            }
        }
    }

    /// Reads an entry. Missing entries read as not ready. The first read that finds the
    /// entry ready marks it delivered and schedules its grace eviction.
    pub fn read(&self, id: &str) -> CacheSnapshot {
        let now = Instant::now();
        let snapshot = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(id) else {
                return CacheSnapshot::default();
            };

            if entry.grace_elapsed(now, self.grace) {
                entries.remove(id);
                log::debug!("ResultCache::read: {} past its grace period; evicted", id);
                return CacheSnapshot {
                    evicted: true,
                    ..CacheSnapshot::default()
                };
            }

            let newly_delivered = entry.ready && !entry.delivered;
            if newly_delivered {
                entry.delivered = true;
                entry.delivered_at = Some(now);
            }
            entry.snapshot(newly_delivered)
        };

        if snapshot.newly_delivered {
            self.schedule_eviction(id);
        }
        snapshot
    }

    /// Reads an entry without any delivery side effect.
    pub fn peek(&self, id: &str) -> CacheSnapshot {
        self.lock()
            .get(id)
            .map(|entry| entry.snapshot(false))
            .unwrap_or_default()
    }

    /// Marks a ready entry delivered. Returns `false` if it is missing, not ready, or
    /// already delivered.
    pub fn mark_delivered(&self, id: &str) -> bool {
        let marked = {
            let mut entries = self.lock();
            match entries.get_mut(id) {
                Some(entry) if entry.ready && !entry.delivered => {
                    entry.delivered = true;
                    entry.delivered_at = Some(Instant::now());
                    true
                }
                _ => false,
            }
        };

        if marked {
            self.schedule_eviction(id);
        }
        marked
    }

    /// Removes `id` once its grace period has passed. The task holds only a weak
    /// reference to the store, so it never keeps a dropped cache alive.
    fn schedule_eviction(&self, id: &str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::debug!(
                "ResultCache: no runtime to schedule eviction of {}; the janitor will sweep it",
                id
            );
            return;
        };

        let store = Arc::downgrade(&self.entries);
        let grace = self.grace;
        let handler = self.event_handler.clone();
        let id = id.to_string();
        handle.spawn(async move {
            tokio::time::sleep(grace).await;
            let Some(store) = store.upgrade() else {
                return;
            };
            let removed = {
                let mut entries = store.lock().unwrap_or_else(PoisonError::into_inner);
                let elapsed = entries
                    .get(&id)
                    .map(|entry| entry.grace_elapsed(Instant::now(), grace))
                    .unwrap_or(false);
                elapsed && entries.remove(&id).is_some()
            };
            if !removed {
                return;
            }
            log::debug!("ResultCache: evicted delivered entry {}", id);
            if let Some(handler) = handler {
                handler
                    .on_analytics_event(&AnalyticsEvent::EntryEvicted {
                        request_id: id,
                        reason: EvictionReason::Delivered,
                    })
                    .await;
            }
        });
    }

    /// Removes undelivered entries older than the TTL and delivered entries past their
    /// grace period. Returns what was removed and why.
    pub fn sweep_expired(&self) -> Vec<(String, EvictionReason)> {
        let now = Instant::now();
        let mut evicted = Vec::new();

        self.lock().retain(|id, entry| {
            let reason = if entry.grace_elapsed(now, self.grace) {
                Some(EvictionReason::Delivered)
            } else if entry.ttl_elapsed(now, self.ttl) {
                Some(EvictionReason::Expired)
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    evicted.push((id.clone(), reason));
                    false
                }
                None => true,
            }
        });

        evicted
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for ResultCache {
    /// Five minute TTL, ten second delivery grace.
    fn default() -> Self {
        Self::new(Duration::from_secs(300), Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_rejects_duplicates() {
        let cache = ResultCache::default();
        assert!(cache.create("msg_1"));
        assert!(!cache.create("msg_1"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_missing_entry_reads_as_not_ready() {
        let cache = ResultCache::default();
        let snapshot = cache.read("nope");
        assert!(!snapshot.exists);
        assert!(!snapshot.ready);
        assert_eq!(snapshot, CacheSnapshot::default());
    }

    #[tokio::test]
    async fn test_update_without_entry_creates_ready_entry() {
        let cache = ResultCache::default();
        assert!(cache.update("orphan", Some(json!({"intent": "other"})), None));
        let snapshot = cache.peek("orphan");
        assert!(snapshot.exists);
        assert!(snapshot.ready);
        assert_eq!(snapshot.interaction, Some(json!({"intent": "other"})));
    }

    #[tokio::test]
    async fn test_ready_flips_only_once() {
        let cache = ResultCache::default();
        cache.create("msg_1");
        assert!(cache.update("msg_1", Some(json!(1)), Some(json!(2))));
        assert!(!cache.update("msg_1", None, None));

        let snapshot = cache.peek("msg_1");
        assert_eq!(snapshot.interaction, Some(json!(1)));
        assert_eq!(snapshot.funnel, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_only_first_ready_read_is_delivery() {
        let cache = ResultCache::default();
        cache.create("msg_1");
        assert!(!cache.read("msg_1").newly_delivered);
        cache.update("msg_1", None, None);

        assert!(cache.read("msg_1").newly_delivered);
        assert!(!cache.read("msg_1").newly_delivered);
        assert!(!cache.mark_delivered("msg_1"));
    }

    #[test]
    fn test_read_past_grace_reports_eviction() {
        // no runtime: nothing is scheduled, so only the read can remove the entry
        let cache = ResultCache::new(Duration::from_secs(300), Duration::ZERO);
        cache.create("msg_1");
        cache.update("msg_1", None, None);
        assert!(cache.read("msg_1").newly_delivered);

        let snapshot = cache.read("msg_1");
        assert!(snapshot.evicted);
        assert!(!snapshot.exists);
        assert!(cache.is_empty());
        assert!(!cache.read("msg_1").evicted);
    }

    #[test]
    fn test_mark_delivered_requires_ready() {
        let cache = ResultCache::default();
        cache.create("msg_1");
        assert!(!cache.mark_delivered("msg_1"));
        assert!(!cache.mark_delivered("missing"));
    }
}
