//! # storefront-llm
//!
//! Backend for a storefront's embedded shopping assistant. The assistant's reply comes
//! from an external completion service and is returned to the shopper right away; each
//! turn is then classified in the background by two analytics agents whose results are
//! cached until the client polls for them.
//!
//! The crate is layered like this:
//!
//! * **Completion clients**: the [`ClientWrapper`] trait with an OpenAI Chat Completions
//!   client and an Assistants API client whose run polling is bounded
//! * **Agents**: [`agent_invoker::AgentInvoker`] sends a role-specific prompt
//!   (`interaction` or `funnel`) and parses the reply, tolerating fenced or chatty output
//! * **Cache**: [`result_cache::ResultCache`], a single-lock map of request id → results
//!   with TTL eviction for abandoned entries and grace eviction after delivery
//! * **Orchestration**: [`orchestrator::BackgroundOrchestrator`] runs both agents
//!   concurrently in detached tasks and always marks the entry ready, whatever failed
//! * **Maintenance**: [`janitor::CacheJanitor`] sweeps expired entries on an interval
//! * **Delivery**: [`poll::PollEndpoint`] and, with the `server` feature, the axum routes
//!   in `server`
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use storefront_llm::agent_invoker::{AgentInvoker, TurnContext};
//! use storefront_llm::clients::openai::{Model, OpenAIClient};
//! use storefront_llm::janitor::CacheJanitor;
//! use storefront_llm::orchestrator::BackgroundOrchestrator;
//! use storefront_llm::poll::PollEndpoint;
//! use storefront_llm::result_cache::ResultCache;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     storefront_llm::init_logger();
//!
//!     let api_key = std::env::var("OPENAI_API_KEY")?;
//!     let client = Arc::new(OpenAIClient::new_with_model_enum(&api_key, Model::GPT4oMini));
//!
//!     let cache = Arc::new(ResultCache::default());
//!     CacheJanitor::new(&cache, Duration::from_secs(60)).start();
//!
//!     let orchestrator =
//!         BackgroundOrchestrator::new(Arc::clone(&cache), Arc::new(AgentInvoker::new(client)));
//!     let poll = PollEndpoint::new(cache);
//!
//!     let id = orchestrator.hand_off(TurnContext::new(
//!         "Which gin works for a negroni?",
//!         "A London Dry like our Citadelle is a classic choice.",
//!     ));
//!
//!     loop {
//!         let response = poll.poll(&id).await;
//!         if response.ready {
//!             println!("interaction: {:?}", response.interaction);
//!             println!("funnel: {:?}", response.analytics);
//!             break;
//!         }
//!         tokio::time::sleep(Duration::from_millis(500)).await;
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding the crate can opt in to `RUST_LOG` driven diagnostics
/// without choosing a logging backend upfront.
///
/// ```rust
/// storefront_llm::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `storefront` module.
pub mod storefront;

// Re-exporting key items for easier external access.
pub use storefront::agent_invoker;
pub use storefront::agent_invoker::{AgentInvoker, AgentRole, ItemDetails, TurnContext};
pub use storefront::chat;
pub use storefront::chat::{PrimaryReply, ReplyPipeline};
pub use storefront::client_wrapper;
pub use storefront::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
pub use storefront::clients;
pub use storefront::config::StorefrontConfig;
pub use storefront::event;
pub use storefront::event::{AnalyticsEvent, EventHandler};
pub use storefront::janitor;
pub use storefront::orchestrator;
pub use storefront::orchestrator::BackgroundOrchestrator;
pub use storefront::poll;
pub use storefront::poll::{PollEndpoint, PollResponse};
pub use storefront::request_id;
pub use storefront::result_cache;
pub use storefront::result_cache::ResultCache;
#[cfg(feature = "server")]
pub use storefront::server;
