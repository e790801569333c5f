//! `storefrontd`: the storefront assistant HTTP server.
//!
//! Reads its configuration from the environment (see
//! [`StorefrontConfig`](storefront_llm::StorefrontConfig)); `OPENAI_API_KEY` and
//! `ASSISTANT_ID` are required. A `.env` file in the working directory (or a parent)
//! is loaded first; variables already set in the process win over the file.

use std::error::Error;
use std::sync::Arc;

use storefront_llm::agent_invoker::AgentInvoker;
use storefront_llm::client_wrapper::ClientWrapper;
use storefront_llm::clients::assistants::AssistantsClient;
use storefront_llm::clients::openai::OpenAIClient;
use storefront_llm::janitor::CacheJanitor;
use storefront_llm::orchestrator::BackgroundOrchestrator;
use storefront_llm::result_cache::ResultCache;
use storefront_llm::server::{self, AppState};
use storefront_llm::StorefrontConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // before the logger, so RUST_LOG may come from .env too
    let dotenv_path = dotenvy::dotenv().ok();
    storefront_llm::init_logger();
    if let Some(path) = dotenv_path {
        log::info!("storefrontd: loaded {}", path.display());
    }

    let config = StorefrontConfig::from_env()?;
    let api_key = config
        .api_key
        .clone()
        .ok_or("OPENAI_API_KEY is not set")?;
    let assistant_id = config
        .assistant_id
        .clone()
        .ok_or("ASSISTANT_ID is not set")?;
    log::info!("storefrontd: primary assistant {}", assistant_id);

    let replies = Arc::new(
        AssistantsClient::new(&api_key, &assistant_id)
            .with_base_url(&config.base_url)
            .with_run_polling(config.run_poll_interval, config.max_run_polls),
    );

    let analytics_client: Arc<dyn ClientWrapper> = match &config.analytics_assistant_id {
        Some(id) => Arc::new(
            AssistantsClient::new(&api_key, id)
                .with_base_url(&config.base_url)
                .with_run_polling(config.run_poll_interval, config.max_run_polls),
        ),
        None => Arc::new(OpenAIClient::new_with_base_url(
            &api_key,
            &config.analytics_model,
            &config.base_url,
        )),
    };
    log::info!(
        "storefrontd: analytics agents use {}",
        analytics_client.model_name()
    );

    let cache = Arc::new(ResultCache::from_config(&config));
    CacheJanitor::new(&cache, config.sweep_interval).start();

    let invoker = AgentInvoker::new(analytics_client).with_timeout(config.agent_timeout);
    let orchestrator = BackgroundOrchestrator::new(cache, Arc::new(invoker));

    server::serve(config.bind_addr, AppState::new(orchestrator, replies)).await
}
