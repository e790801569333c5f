//! The `OpenAIClient` struct implements `ClientWrapper` for OpenAI's Chat Completions API,
//! capturing both the assistant response and token usage (input vs output).
//!
//! # Example
//!
//! ```rust,no_run
//! use storefront_llm::clients::openai::{Model, OpenAIClient};
//! use storefront_llm::client_wrapper::{ClientWrapper, Message, Role};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let secret_key = std::env::var("OPENAI_API_KEY")?;
//!     let client = OpenAIClient::new_with_model_enum(&secret_key, Model::GPT4oMini);
//!
//!     let resp = client
//!         .send_message(&[
//!             Message::new(Role::System, "You are terse."),
//!             Message::new(Role::User, "Recommend a gin."),
//!         ])
//!         .await?;
//!     println!("Assistant: {}", resp.content);
//!
//!     if let Some(usage) = client.get_last_usage().await {
//!         println!("total tokens: {}", usage.total_tokens);
//!     }
//!     Ok(())
//! }
//! ```
use std::error::Error;

use async_trait::async_trait;
use openai_rust::chat;
use openai_rust2 as openai_rust;
use tokio::sync::Mutex;

use crate::storefront::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
use crate::storefront::clients::common::{
    chat_completions_path, get_shared_http_client, send_and_track, OPENAI_BASE_URL,
};

/// Model identifiers commonly used for storefront chat and classification.
pub enum Model {
    /// `gpt-4o` – Omni model with text + image inputs.
    GPT4o,
    /// `gpt-4o-mini` – cost effective GPT-4o derivative.
    GPT4oMini,
    /// `gpt-4.1` – general availability GPT-4.1.
    GPT41,
    /// `gpt-4.1-mini` – reduced cost GPT-4.1 tier.
    GPT41Mini,
    /// `gpt-4.1-nano` – ultra low cost GPT-4.1 derivative.
    GPT41Nano,
}

/// Convert a [`Model`] variant into the string identifier expected by the REST API.
pub fn model_to_string(model: Model) -> String {
    match model {
        Model::GPT4o => "gpt-4o".to_string(),
        Model::GPT4oMini => "gpt-4o-mini".to_string(),
        Model::GPT41 => "gpt-4.1".to_string(),
        Model::GPT41Mini => "gpt-4.1-mini".to_string(),
        Model::GPT41Nano => "gpt-4.1-nano".to_string(),
    }
}

/// Client wrapper for OpenAI's Chat Completions API.
///
/// Works against any OpenAI compatible endpoint via [`OpenAIClient::new_with_base_url`].
/// It reuses the shared HTTP client configured in
/// [`crate::storefront::clients::common`].
pub struct OpenAIClient {
    /// Underlying SDK client pointing at the REST endpoint.
    client: openai_rust::Client,
    /// Path of the chat completions endpoint under the configured base URL.
    url_path: String,
    /// Model name that will be injected into each request.
    model: String,
    /// Storage for the token usage returned by the most recent request.
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    /// Construct a new client using the provided API key and [`Model`] variant.
    pub fn new_with_model_enum(secret_key: &str, model: Model) -> Self {
        Self::new_with_model_string(secret_key, &model_to_string(model))
    }

    /// Construct a new client using the provided API key and explicit model name.
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, OPENAI_BASE_URL)
    }

    /// Construct a client targeting a custom OpenAI compatible base URL, e.g.
    /// `http://localhost:8080/v1`.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        OpenAIClient {
            client: openai_rust::Client::new_with_client_and_base_url(
                secret_key,
                get_shared_http_client().clone(),
                base_url,
            ),
            url_path: chat_completions_path(base_url),
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    async fn send_message(
        &self,
        messages: &[Message],
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        // Convert the provided messages into the format expected by openai_rust
        let formatted_messages = messages
            .iter()
            .map(|msg| chat::Message {
                role: msg.role.as_str().to_owned(),
                content: msg.content.clone(),
            })
            .collect();

        let result = send_and_track(
            &self.client,
            &self.model,
            formatted_messages,
            Some(self.url_path.clone()),
            &self.token_usage,
        )
        .await;

        match result {
            Ok(content) => Ok(Message::new(Role::Assistant, content)),
            Err(err) => {
                if log::log_enabled!(log::Level::Error) {
                    log::error!(
                        "OpenAIClient::send_message(...): OpenAI API Error: {}",
                        err
                    );
                }
                Err(Box::new(err))
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_names() {
        assert_eq!(model_to_string(Model::GPT4oMini), "gpt-4o-mini");
        assert_eq!(model_to_string(Model::GPT41Nano), "gpt-4.1-nano");
    }

    #[test]
    fn test_client_targets_base_url_path() {
        let client = OpenAIClient::new_with_base_url("sk-test", "gpt-4o-mini", "http://127.0.0.1:9000/v1/");
        assert_eq!(client.url_path, "/v1/chat/completions");
        assert_eq!(client.model_name(), "gpt-4o-mini");
    }
}
