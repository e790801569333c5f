use async_trait::async_trait;
use serde_json::json;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use storefront_llm::agent_invoker::{AgentError, AgentInvoker, AgentRole, TurnContext};
use storefront_llm::client_wrapper::{ClientWrapper, Message, Role};

struct MockClient {
    response: Result<&'static str, &'static str>,
    delay: Duration,
}

impl MockClient {
    fn replying(text: &'static str) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(text),
            delay: Duration::ZERO,
        })
    }

    fn failing(msg: &'static str) -> Arc<Self> {
        Arc::new(Self {
            response: Err(msg),
            delay: Duration::ZERO,
        })
    }
}

#[async_trait]
impl ClientWrapper for MockClient {
    async fn send_message(
        &self,
        _messages: &[Message],
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.response {
            Ok(text) => Ok(Message::new(Role::Assistant, text)),
            Err(msg) => Err(msg.into()),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

fn turn() -> TurnContext {
    TurnContext::new("What pairs with mezcal?", "Try grapefruit soda for a Paloma twist.")
}

#[tokio::test]
async fn test_fenced_interaction_output_is_parsed() {
    let invoker = AgentInvoker::new(MockClient::replying(
        "```json\n{\"intent\": \"recommendation\", \"topics\": [\"mezcal\"]}\n```",
    ));

    let payload = invoker.invoke(AgentRole::Interaction, &turn()).await;
    assert_eq!(
        payload,
        Some(json!({"intent": "recommendation", "topics": ["mezcal"]}))
    );
}

#[tokio::test]
async fn test_chatty_output_with_embedded_object_is_parsed() {
    let invoker = AgentInvoker::new(MockClient::replying(
        "Here is the classification: {\"intent\": \"question\", \"note\": \"uses {braces}\"} hope it helps",
    ));

    let payload = invoker.try_invoke(AgentRole::Interaction, &turn()).await;
    assert_eq!(
        payload,
        Ok(json!({"intent": "question", "note": "uses {braces}"}))
    );
}

#[tokio::test]
async fn test_remote_failure_is_absent_result() {
    let invoker = AgentInvoker::new(MockClient::failing("HTTP 500"));

    assert_eq!(invoker.invoke(AgentRole::Funnel, &turn()).await, None);
    match invoker.try_invoke(AgentRole::Funnel, &turn()).await {
        Err(AgentError::Remote(msg)) => assert!(msg.contains("HTTP 500")),
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_prose_output_is_malformed() {
    let invoker = AgentInvoker::new(MockClient::replying("No analytics today, sorry."));

    let result = invoker.try_invoke(AgentRole::Interaction, &turn()).await;
    assert!(matches!(result, Err(AgentError::MalformedPayload(_))));
}

#[tokio::test]
async fn test_funnel_none_event_is_no_event() {
    for text in ["null", "{}", r#"{"event": "none"}"#, r#"{"event": ""}"#] {
        let invoker = AgentInvoker::new(MockClient::replying(text));
        assert_eq!(
            invoker.try_invoke(AgentRole::Funnel, &turn()).await,
            Err(AgentError::NoEvent),
            "{} should mean no event",
            text
        );
    }
}

#[tokio::test]
async fn test_interaction_empty_object_is_kept() {
    let invoker = AgentInvoker::new(MockClient::replying("{}"));
    assert_eq!(
        invoker.invoke(AgentRole::Interaction, &turn()).await,
        Some(json!({}))
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_client_times_out() {
    let client = Arc::new(MockClient {
        response: Ok("{\"intent\": \"late\"}"),
        delay: Duration::from_secs(120),
    });
    let invoker = AgentInvoker::new(client).with_timeout(Duration::from_secs(90));

    assert_eq!(
        invoker.try_invoke(AgentRole::Interaction, &turn()).await,
        Err(AgentError::Timeout(Duration::from_secs(90)))
    );
}

#[test]
fn test_messages_carry_role_instructions_and_context() {
    let messages = AgentInvoker::build_messages(AgentRole::Funnel, &turn());
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[0].content, AgentRole::Funnel.instructions());
    assert!(messages[1].content.contains("What pairs with mezcal?"));
    assert!(messages[1].content.contains("Paloma"));
}
