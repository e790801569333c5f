//! Background analytics orchestration.
//!
//! After the primary reply has been produced, [`BackgroundOrchestrator::hand_off`] seeds a
//! not-ready cache entry and spawns an orchestration run without waiting for it. The run
//! starts the interaction and funnel agents as two independent tokio tasks, waits for
//! both to settle, and merges whatever they produced into the cache in a single update
//! that also flips the entry to ready.
//!
//! A run never fails outward: agent errors, timeouts and even panics inside an agent
//! task are turned into an absent result for that agent before the join, so the entry
//! always becomes ready and pollers are never left waiting.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use storefront_llm::agent_invoker::{AgentInvoker, TurnContext};
//! use storefront_llm::clients::openai::{Model, OpenAIClient};
//! use storefront_llm::orchestrator::BackgroundOrchestrator;
//! use storefront_llm::result_cache::ResultCache;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let client = Arc::new(OpenAIClient::new_with_model_enum("sk-...", Model::GPT4oMini));
//! let orchestrator = BackgroundOrchestrator::new(
//!     Arc::new(ResultCache::default()),
//!     Arc::new(AgentInvoker::new(client)),
//! );
//!
//! let request_id = orchestrator.hand_off(TurnContext::new(
//!     "Do you have a Boston shaker?",
//!     "Yes! The steel Boston shaker is $24.",
//! ));
//! println!("poll /api/analytics/{}", request_id);
//! # }
//! ```

use std::sync::Arc;

use serde_json::Value;
use tokio::task::{JoinError, JoinHandle};

use crate::storefront::agent_invoker::{AgentError, AgentInvoker, AgentRole, TurnContext};
use crate::storefront::event::{AnalyticsEvent, EventHandler};
use crate::storefront::request_id::generate_request_id;
use crate::storefront::result_cache::ResultCache;

/// Schedules and runs the two-agent analytics pipeline for each user turn.
///
/// Cheap to clone; clones share the cache, invoker and event handler.
#[derive(Clone)]
pub struct BackgroundOrchestrator {
    cache: Arc<ResultCache>,
    invoker: Arc<AgentInvoker>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl BackgroundOrchestrator {
    pub fn new(cache: Arc<ResultCache>, invoker: Arc<AgentInvoker>) -> Self {
        Self {
            cache,
            invoker,
            event_handler: None,
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    async fn emit(&self, event: AnalyticsEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_analytics_event(&event).await;
        }
    }

    /// Generates a request id, seeds its not-ready entry, and schedules the run.
    ///
    /// Returns immediately; the run's outcome is only observable through the cache.
    /// Must be called from within a tokio runtime.
    pub fn hand_off(&self, turn: TurnContext) -> String {
        let request_id = generate_request_id();
        self.cache.create(&request_id);
        // The handle is dropped: the run is detached and reports through the cache.
        let _ = self.spawn(request_id.clone(), turn);
        log::info!("BackgroundOrchestrator: handed off turn {}", request_id);
        request_id
    }

    /// Spawns an orchestration run for an already-seeded `request_id`.
    pub fn spawn(&self, request_id: String, turn: TurnContext) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            this.emit(AnalyticsEvent::TurnHandedOff {
                request_id: request_id.clone(),
            })
            .await;
            this.run(&request_id, turn).await;
        })
    }

    /// Runs both agents concurrently, waits for both to settle, and merges the results.
    ///
    /// Per-agent events are reported after the entry is ready, so a slow handler never
    /// delays readiness.
    pub async fn run(&self, request_id: &str, turn: TurnContext) {
        let turn = Arc::new(turn);
        let interaction = self.spawn_agent(AgentRole::Interaction, Arc::clone(&turn));
        let funnel = self.spawn_agent(AgentRole::Funnel, turn);

        let (interaction, funnel) = tokio::join!(interaction, funnel);
        let (interaction, interaction_event) =
            settle(request_id, AgentRole::Interaction, interaction);
        let (funnel, funnel_event) = settle(request_id, AgentRole::Funnel, funnel);

        let has_interaction = interaction.is_some();
        let has_funnel = funnel.is_some();
        self.cache.update(request_id, interaction, funnel);
        log::info!(
            "BackgroundOrchestrator: {} ready (interaction: {}, funnel: {})",
            request_id,
            has_interaction,
            has_funnel
        );

        self.emit(interaction_event).await;
        self.emit(funnel_event).await;
        self.emit(AnalyticsEvent::EntryReady {
            request_id: request_id.to_string(),
            has_interaction,
            has_funnel,
        })
        .await;
    }

    fn spawn_agent(
        &self,
        role: AgentRole,
        turn: Arc<TurnContext>,
    ) -> JoinHandle<Result<Value, AgentError>> {
        let invoker = Arc::clone(&self.invoker);
        tokio::spawn(async move { invoker.try_invoke(role, &turn).await })
    }
}

/// Converts one agent's outcome into an optional payload and the event describing it.
fn settle(
    request_id: &str,
    role: AgentRole,
    outcome: Result<Result<Value, AgentError>, JoinError>,
) -> (Option<Value>, AnalyticsEvent) {
    let failure = match outcome {
        Ok(Ok(payload)) => {
            let event = AnalyticsEvent::AgentSucceeded {
                request_id: request_id.to_string(),
                role,
            };
            return (Some(payload), event);
        }
        Ok(Err(AgentError::NoEvent)) => {
            log::debug!("BackgroundOrchestrator: {} {} agent: no event", request_id, role);
            AgentError::NoEvent.to_string()
        }
        Ok(Err(err)) => {
            log::warn!(
                "BackgroundOrchestrator: {} {} agent failed: {}",
                request_id,
                role,
                err
            );
            err.to_string()
        }
        Err(join_err) => {
            log::error!(
                "BackgroundOrchestrator: {} {} agent task aborted: {}",
                request_id,
                role,
                join_err
            );
            join_err.to_string()
        }
    };

    let event = AnalyticsEvent::AgentFailed {
        request_id: request_id.to_string(),
        role,
        reason: failure,
    };
    (None, event)
}
