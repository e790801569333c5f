use async_trait::async_trait;
use std::error::Error;
use tokio::sync::Mutex;

/// A ClientWrapper is a wrapper around a specific completion service.
/// It provides a common interface to send a prompt and receive freeform text.
/// It does not keep track of the conversation; the primary reply pipeline and the
/// analytics agents each decide what context goes into a call.
// src/storefront/client_wrapper.rs

/// Represents the possible roles for a message.
#[derive(Clone, Debug, PartialEq)]
pub enum Role {
    System,
    // steers the model's responses (agent instruction blocks live here)
    User,
    // a message sent by a shopper, or the context block an agent classifies
    Assistant, // content generated by the completion service
}

impl Role {
    /// Wire name used by OpenAI-compatible APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Represents a generic message sent to or received from a completion service.
#[derive(Clone, Debug)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Trait defining the interface to interact with a completion service.
///
/// Implementations must be `Send + Sync` so a single client can be shared by every
/// background orchestration run through an `Arc<dyn ClientWrapper>`.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send the messages to the completion service and get the assistant's reply.
    async fn send_message(
        &self,
        messages: &[Message],
    ) -> Result<Message, Box<dyn Error + Send + Sync>>;

    /// Model (or assistant) identifier used for logging.
    fn model_name(&self) -> &str;

    /// Hook to retrieve usage from the *last* send_message() call.
    /// Default impl reads the usage slot, if the client exposes one.
    async fn get_last_usage(&self) -> Option<TokenUsage> {
        match self.usage_slot() {
            Some(slot) => slot.lock().await.clone(),
            None => None,
        }
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        // Clients supporting TokenUsage tracking return their slot by overriding this method.
        None
    }
}
