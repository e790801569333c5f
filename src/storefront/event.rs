//! Analytics lifecycle event system.
//!
//! Provides a callback-based observability layer for the analytics subsystem.
//! Implement [`EventHandler`] to receive notifications about:
//!
//! - **Hand-off**: a user turn was handed to the background orchestrator
//! - **Agents**: each agent invocation settling, with success or the failure reason
//! - **Cache lifecycle**: an entry becoming ready, being delivered, being evicted
//!
//! The single trait method has a default no-op implementation, so you only override
//! what you care about. The handler is wrapped in `Arc<dyn EventHandler>` and shared by
//! the [`BackgroundOrchestrator`](crate::orchestrator::BackgroundOrchestrator), the
//! [`PollEndpoint`](crate::poll::PollEndpoint), the
//! [`CacheJanitor`](crate::janitor::CacheJanitor) and the
//! [`ResultCache`](crate::result_cache::ResultCache) itself. Attach it to all four to see
//! every eviction.
//!
//! # Example
//!
//! ```rust,no_run
//! use storefront_llm::event::{AnalyticsEvent, EventHandler};
//! use async_trait::async_trait;
//!
//! struct Counter;
//!
//! #[async_trait]
//! impl EventHandler for Counter {
//!     async fn on_analytics_event(&self, event: &AnalyticsEvent) {
//!         if let AnalyticsEvent::AgentFailed { request_id, role, reason } = event {
//!             eprintln!("{} agent failed for {}: {}", role, request_id, reason);
//!         }
//!     }
//! }
//! ```

use crate::storefront::agent_invoker::AgentRole;
use crate::storefront::result_cache::EvictionReason;
use async_trait::async_trait;

/// Events emitted while a user turn's analytics move through the pipeline.
///
/// ```text
/// TurnHandedOff
///   ├─ AgentSucceeded | AgentFailed   (interaction)
///   └─ AgentSucceeded | AgentFailed   (funnel)
/// EntryReady
/// EntryDelivered        (first poll that sees it ready)
/// EntryEvicted          (TTL sweep or post-delivery grace)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyticsEvent {
    /// A not-ready entry was seeded and the orchestration run was scheduled.
    TurnHandedOff {
        request_id: String,
    },

    /// An agent produced a structured payload.
    AgentSucceeded {
        request_id: String,
        role: AgentRole,
    },

    /// An agent settled without a payload. `reason` is the rendered
    /// [`AgentError`](crate::agent_invoker::AgentError), or the join error if the
    /// task panicked.
    AgentFailed {
        request_id: String,
        role: AgentRole,
        reason: String,
    },

    /// Results were merged and the entry flipped to ready.
    EntryReady {
        request_id: String,
        /// Whether the interaction payload is present.
        has_interaction: bool,
        /// Whether the funnel payload is present.
        has_funnel: bool,
    },

    /// The first ready-observing poll marked the entry delivered.
    EntryDelivered {
        request_id: String,
    },

    /// The entry left the cache. Reported once, by whichever component removed it:
    /// the janitor's sweep, the cache's scheduled grace eviction, or a poll that found
    /// the grace period over.
    EntryEvicted {
        request_id: String,
        reason: EvictionReason,
    },
}

impl AnalyticsEvent {
    /// The request id every variant carries.
    pub fn request_id(&self) -> &str {
        match self {
            AnalyticsEvent::TurnHandedOff { request_id }
            | AnalyticsEvent::AgentSucceeded { request_id, .. }
            | AnalyticsEvent::AgentFailed { request_id, .. }
            | AnalyticsEvent::EntryReady { request_id, .. }
            | AnalyticsEvent::EntryDelivered { request_id }
            | AnalyticsEvent::EntryEvicted { request_id, .. } => request_id,
        }
    }
}

/// Receives [`AnalyticsEvent`]s. Implementations must be cheap or hand work off;
/// they are awaited inline by the component emitting the event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_analytics_event(&self, _event: &AnalyticsEvent) {}
}
