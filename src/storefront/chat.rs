//! The primary reply pipeline seam.
//!
//! The user-visible reply comes from an external assistant. This module defines the
//! trait the HTTP layer talks to and the helper that lifts structured product data out
//! of a reply so it can be handed to the analytics agents.

use std::error::Error;

use async_trait::async_trait;
use serde_json::Value;

use crate::storefront::agent_invoker::ItemDetails;

/// Returned to the shopper when the assistant completes without any text.
pub const FALLBACK_REPLY: &str = "Sorry, I couldn't get a response from the assistant right now.";

/// A finished primary reply.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryReply {
    pub text: String,
    /// Conversation thread the reply belongs to; the client sends it back next turn.
    pub thread_id: String,
    /// Product data the assistant attached to the reply, if any.
    pub items: Option<ItemDetails>,
}

/// Produces the user-visible reply for one shopper message.
#[async_trait]
pub trait ReplyPipeline: Send + Sync {
    /// Replies to `message`, continuing `thread_id` when given or starting a new thread.
    async fn reply(
        &self,
        thread_id: Option<&str>,
        message: &str,
    ) -> Result<PrimaryReply, Box<dyn Error + Send + Sync>>;
}

/// Finds a fenced JSON block carrying `"products": [...]` or `"product": {...}`.
pub fn extract_item_details(text: &str) -> Option<ItemDetails> {
    // Odd segments are the insides of fenced blocks.
    text.split("```")
        .skip(1)
        .step_by(2)
        .filter_map(|block| {
            let body = match block.split_once('\n') {
                Some((tag, rest)) if tag.trim().chars().all(|c| c.is_ascii_alphanumeric()) => rest,
                _ => block,
            };
            serde_json::from_str::<Value>(body.trim()).ok()
        })
        .find_map(|value| match value {
            Value::Object(mut map) => {
                if let Some(Value::Array(products)) = map.remove("products") {
                    Some(ItemDetails::List(products))
                } else {
                    map.remove("product")
                        .filter(|product| !product.is_null())
                        .map(ItemDetails::Single)
                }
            }
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_product_list() {
        let reply = "Here are two options:\n```json\n{\"products\": [{\"id\": 1}, {\"id\": 2}]}\n```\nEnjoy!";
        assert_eq!(
            extract_item_details(reply),
            Some(ItemDetails::List(vec![json!({"id": 1}), json!({"id": 2})]))
        );
    }

    #[test]
    fn test_extracts_single_product() {
        let reply = "```\n{\"product\": {\"id\": 9, \"name\": \"Muddler\"}}\n```";
        assert_eq!(
            extract_item_details(reply),
            Some(ItemDetails::Single(json!({"id": 9, "name": "Muddler"})))
        );
    }

    #[test]
    fn test_plain_reply_has_no_items() {
        assert_eq!(extract_item_details("We ship within 48 hours."), None);
        assert_eq!(extract_item_details("```json\nnot json\n```"), None);
        assert_eq!(extract_item_details("```json\n{\"other\": 1}\n```"), None);
    }
}
