//! Periodic TTL sweep over the [`ResultCache`].
//!
//! The janitor is started once at service start and ticks at a fixed interval for as
//! long as the cache exists. It only holds a [`Weak`] reference, so dropping the last
//! `Arc<ResultCache>` ends the loop instead of keeping the cache alive.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::storefront::event::{AnalyticsEvent, EventHandler};
use crate::storefront::result_cache::{EvictionReason, ResultCache};

/// Evicts abandoned cache entries on a fixed schedule.
pub struct CacheJanitor {
    cache: Weak<ResultCache>,
    interval: Duration,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl CacheJanitor {
    pub fn new(cache: &Arc<ResultCache>, interval: Duration) -> Self {
        Self {
            cache: Arc::downgrade(cache),
            // tokio intervals must be non-zero
            interval: interval.max(Duration::from_millis(1)),
            event_handler: None,
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Runs one sweep now. Returns the evicted ids, or `None` once the cache is gone.
    pub async fn sweep_once(&self) -> Option<Vec<(String, EvictionReason)>> {
        let cache = self.cache.upgrade()?;
        let evicted = cache.sweep_expired();
        drop(cache);

        if !evicted.is_empty() {
            log::info!("CacheJanitor: evicted {} entries", evicted.len());
        }
        if let Some(handler) = &self.event_handler {
            for (request_id, reason) in &evicted {
                handler
                    .on_analytics_event(&AnalyticsEvent::EntryEvicted {
                        request_id: request_id.clone(),
                        reason: *reason,
                    })
                    .await;
            }
        }
        Some(evicted)
    }

    /// Spawns the sweep loop. The first sweep happens one interval after start.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            log::debug!("CacheJanitor: sweeping every {:?}", self.interval);

            loop {
                ticker.tick().await;
                if self.sweep_once().await.is_none() {
                    log::debug!("CacheJanitor: cache dropped; stopping");
                    break;
                }
            }
        })
    }
}
