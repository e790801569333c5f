//! Read side of the analytics cache.
//!
//! Callers poll with the request id returned by the chat hand-off until `ready` is
//! `true`. A ready payload stays readable for the grace period after the first ready
//! poll; afterwards the id reads as `{ready: false}` again, which is indistinguishable
//! from an id that never existed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storefront::event::{AnalyticsEvent, EventHandler};
use crate::storefront::result_cache::{CacheSnapshot, EvictionReason, ResultCache};

/// Wire shape of a poll: `{ready, interaction, analytics}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    pub ready: bool,
    pub interaction: Option<Value>,
    /// The funnel agent's payload.
    pub analytics: Option<Value>,
}

impl PollResponse {
    pub fn not_ready() -> Self {
        Self {
            ready: false,
            interaction: None,
            analytics: None,
        }
    }
}

impl From<CacheSnapshot> for PollResponse {
    fn from(snapshot: CacheSnapshot) -> Self {
        if !snapshot.ready {
            return Self::not_ready();
        }
        Self {
            ready: true,
            interaction: snapshot.interaction,
            analytics: snapshot.funnel,
        }
    }
}

/// Serves polls from a shared [`ResultCache`].
pub struct PollEndpoint {
    cache: Arc<ResultCache>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl PollEndpoint {
    pub fn new(cache: Arc<ResultCache>) -> Self {
        Self {
            cache,
            event_handler: None,
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Returns the entry for `id`; the first ready poll marks it delivered. A poll that
    /// finds the entry past its grace period removes it and reports the eviction.
    pub async fn poll(&self, id: &str) -> PollResponse {
        let snapshot = self.cache.read(id);

        if snapshot.newly_delivered {
            log::debug!("PollEndpoint: delivered {}", id);
            if let Some(handler) = &self.event_handler {
                handler
                    .on_analytics_event(&AnalyticsEvent::EntryDelivered {
                        request_id: id.to_string(),
                    })
                    .await;
            }
        }

        if snapshot.evicted {
            if let Some(handler) = &self.event_handler {
                handler
                    .on_analytics_event(&AnalyticsEvent::EntryEvicted {
                        request_id: id.to_string(),
                        reason: EvictionReason::Delivered,
                    })
                    .await;
            }
        }

        snapshot.into()
    }
}
