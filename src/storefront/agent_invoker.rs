//! Role-specific classification calls against the completion service.
//!
//! Each user turn is classified twice: once by the **interaction** agent (what kind of
//! conversation this was) and once by the **funnel** agent (whether the turn moved the
//! shopper along the purchase funnel). Both agents receive the same context block:
//! the shopper's message, the assistant's reply and any structured item data.
//!
//! Output handling is forgiving. Models often wrap JSON in a fenced code
//! block or add a sentence around it, so the invoker:
//!
//! 1. strips surrounding fenced-code markers (```` ```json ... ``` ````),
//! 2. parses the remainder as JSON,
//! 3. failing that, parses the first balanced `{...}` object found in the text.
//!
//! Failures never escape [`AgentInvoker::invoke`]; they collapse into `None`.
//! [`AgentInvoker::try_invoke`] keeps the reason for logging and events.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storefront::client_wrapper::{ClientWrapper, Message, Role};

/// Which classification an invocation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Interaction,
    Funnel,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Interaction => "interaction",
            AgentRole::Funnel => "funnel",
        }
    }

    /// The fixed instruction block sent as the system message for this role.
    pub fn instructions(&self) -> &'static str {
        match self {
            AgentRole::Interaction => INTERACTION_INSTRUCTIONS,
            AgentRole::Funnel => FUNNEL_INSTRUCTIONS,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const INTERACTION_INSTRUCTIONS: &str = r#"You are an analytics classifier for an online store's shopping assistant.
Read the conversation turn below and describe the interaction.
Respond with a single JSON object and nothing else, using exactly these keys:
{
  "intent": "product_search" | "product_question" | "recommendation" | "order_support" | "small_talk" | "other",
  "sentiment": "positive" | "neutral" | "negative",
  "topics": [short strings],
  "products_mentioned": [product names or ids],
  "assistant_resolved": true | false
}"#;

const FUNNEL_INSTRUCTIONS: &str = r#"You detect e-commerce funnel events in a conversation between a shopper and a store assistant.
If the turn below shows a funnel step, respond with a single JSON object and nothing else:
{
  "event": "view_item_list" | "view_item" | "add_to_cart" | "begin_checkout" | "purchase_intent",
  "items": [{"item_id": string, "item_name": string, "price": number, "quantity": number}],
  "confidence": number between 0 and 1
}
Take items from the item details when they are provided.
If no funnel event is present, respond exactly with {"event": null}."#;

/// Structured product data attached to a turn: one item or a list of items.
///
/// Deserializes from either a JSON array (`List`) or any other JSON value (`Single`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemDetails {
    List(Vec<Value>),
    Single(Value),
}

impl ItemDetails {
    pub fn len(&self) -> usize {
        match self {
            ItemDetails::List(items) => items.len(),
            ItemDetails::Single(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything both agents need to classify one user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnContext {
    pub user_message: String,
    pub assistant_reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_details: Option<ItemDetails>,
}

impl TurnContext {
    pub fn new(user_message: impl Into<String>, assistant_reply: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            assistant_reply: assistant_reply.into(),
            item_details: None,
        }
    }

    pub fn with_item_details(mut self, items: ItemDetails) -> Self {
        self.item_details = Some(items);
        self
    }

    /// Renders the context block embedded in every agent prompt.
    pub fn to_prompt(&self) -> String {
        let items = match &self.item_details {
            Some(items) => serde_json::to_string_pretty(items).unwrap_or_else(|_| "none".into()),
            None => "none".to_string(),
        };
        format!(
            "User message:\n{}\n\nAssistant reply:\n{}\n\nItem details:\n{}",
            self.user_message, self.assistant_reply, items
        )
    }
}

/// Why an agent invocation produced no payload.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentError {
    /// Network failure, non-success status, failed run or exhausted run polling.
    Remote(String),
    /// The invocation did not settle within the configured bound.
    Timeout(Duration),
    /// The completion text was not structured data, even after fence stripping.
    MalformedPayload(String),
    /// The funnel agent reported that no funnel event happened.
    NoEvent,
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Remote(msg) => write!(f, "Remote invocation failed: {}", msg),
            AgentError::Timeout(limit) => write!(f, "Agent timed out after {:?}", limit),
            AgentError::MalformedPayload(msg) => write!(f, "Malformed payload: {}", msg),
            AgentError::NoEvent => write!(f, "No event detected"),
        }
    }
}

impl Error for AgentError {}

/// Invokes the completion service for one agent role and parses the result.
pub struct AgentInvoker {
    client: Arc<dyn ClientWrapper>,
    timeout: Duration,
}

impl AgentInvoker {
    /// Wraps `client`; each invocation is capped at 90 seconds.
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(90),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The messages sent for `role`: the role's instructions, then the turn context.
    pub fn build_messages(role: AgentRole, turn: &TurnContext) -> Vec<Message> {
        vec![
            Message::new(Role::System, role.instructions()),
            Message::new(Role::User, turn.to_prompt()),
        ]
    }

    /// Runs the agent and keeps the failure reason.
    pub async fn try_invoke(&self, role: AgentRole, turn: &TurnContext) -> Result<Value, AgentError> {
        let messages = Self::build_messages(role, turn);
        log::debug!(
            "AgentInvoker: invoking {} agent on {}",
            role,
            self.client.model_name()
        );

        let reply = match tokio::time::timeout(self.timeout, self.client.send_message(&messages)).await {
            Err(_) => return Err(AgentError::Timeout(self.timeout)),
            Ok(Err(err)) => return Err(AgentError::Remote(err.to_string())),
            Ok(Ok(reply)) => reply,
        };

        parse_agent_output(role, &reply.content)
    }

    /// Runs the agent; any failure is logged and reported as `None`.
    pub async fn invoke(&self, role: AgentRole, turn: &TurnContext) -> Option<Value> {
        match self.try_invoke(role, turn).await {
            Ok(payload) => Some(payload),
            Err(AgentError::NoEvent) => None,
            Err(err) => {
                log::warn!("AgentInvoker: {} agent produced no result: {}", role, err);
                None
            }
        }
    }
}

/// Parses completion text for `role`. Funnel payloads that signal "no event" are
/// reported as [`AgentError::NoEvent`].
pub fn parse_agent_output(role: AgentRole, text: &str) -> Result<Value, AgentError> {
    let cleaned = strip_code_fences(text);
    let value = match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => value,
        Err(err) => extract_embedded_object(cleaned)
            .ok_or_else(|| AgentError::MalformedPayload(err.to_string()))?,
    };

    if role == AgentRole::Funnel && signals_no_event(&value) {
        return Err(AgentError::NoEvent);
    }
    Ok(value)
}

/// Removes surrounding fenced-code markers and the optional language tag.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        // single-line fence: ```json{...}```
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Finds the first balanced JSON object inside `text` and parses it.
fn extract_embedded_object(text: &str) -> Option<Value> {
    for (start, _) in text.match_indices('{') {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, ch) in text[start..].char_indices() {
            if in_string {
                match ch {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match ch {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &text[start..start + offset + 1];
                        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                            return Some(value);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// `null`, `{}`, or an object whose `event` is null, empty, `"none"` or `false`.
fn signals_no_event(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) if map.is_empty() => true,
        Value::Object(map) => match map.get("event") {
            Some(Value::Null) | Some(Value::Bool(false)) => true,
            Some(Value::String(event)) => {
                let event = event.trim();
                event.is_empty()
                    || event.eq_ignore_ascii_case("none")
                    || event.eq_ignore_ascii_case("null")
            }
            _ => false,
        },
        _ => false,
    }
}
