//! Client for OpenAI's Assistants API (threads + runs).
//!
//! A turn is: make sure a thread exists, append the user's message, start a run of the
//! configured assistant, then poll the run status until it leaves `queued`/`in_progress`.
//! Polling happens at a fixed interval and is capped at `max_run_polls` attempts; a run
//! that is still pending after the cap is reported as [`ClientError::RunTimedOut`] so a
//! stuck remote run can never hold a task forever.
//!
//! The client serves two seams:
//! - [`ReplyPipeline`]: the storefront's primary reply, reusing the shopper's thread.
//! - [`ClientWrapper`]: one-shot completions for the analytics agents (fresh thread per
//!   call, system messages passed as `additional_instructions`).

use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::storefront::chat::{extract_item_details, PrimaryReply, ReplyPipeline, FALLBACK_REPLY};
use crate::storefront::client_wrapper::{ClientWrapper, Message, Role};
use crate::storefront::clients::common::{
    decode_json, get_shared_http_client, join_url, ClientError, OPENAI_BASE_URL,
};

#[derive(Deserialize)]
struct ThreadObject {
    id: String,
}

/// The subset of a run object the client needs.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RunObject {
    pub id: String,
    pub status: String,
}

impl RunObject {
    /// `queued` and `in_progress` runs are still being worked on by the service.
    pub fn is_pending(&self) -> bool {
        matches!(self.status.as_str(), "queued" | "in_progress")
    }
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    text: Option<TextPart>,
}

#[derive(Deserialize)]
struct TextPart {
    value: String,
}

/// Assistants API client with bounded run polling.
pub struct AssistantsClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    assistant_id: String,
    run_poll_interval: Duration,
    max_run_polls: u32,
    request_timeout: Duration,
}

impl AssistantsClient {
    /// Creates a client for `assistant_id`, polling runs every second for at most a minute.
    pub fn new(api_key: &str, assistant_id: &str) -> Self {
        Self {
            http: get_shared_http_client().clone(),
            api_key: api_key.to_string(),
            base_url: OPENAI_BASE_URL.to_string(),
            assistant_id: assistant_id.to_string(),
            run_poll_interval: Duration::from_secs(1),
            max_run_polls: 60,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    /// Sets the fixed backoff between run status polls and the maximum number of polls.
    pub fn with_run_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.run_poll_interval = interval;
        self.max_run_polls = max_polls;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(join_url(&self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .timeout(self.request_timeout)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(join_url(&self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .timeout(self.request_timeout)
    }

    async fn create_thread(&self) -> Result<String, ClientError> {
        let response = self.post("threads").json(&json!({})).send().await?;
        let thread: ThreadObject = decode_json(response).await?;
        log::debug!("AssistantsClient: created thread {}", thread.id);
        Ok(thread.id)
    }

    async fn add_message(&self, thread_id: &str, role: &Role, content: &str) -> Result<(), ClientError> {
        let path = format!("threads/{}/messages", urlencoding::encode(thread_id));
        let response = self
            .post(&path)
            .json(&json!({ "role": role.as_str(), "content": content }))
            .send()
            .await?;
        let _: serde_json::Value = decode_json(response).await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        additional_instructions: Option<&str>,
    ) -> Result<RunObject, ClientError> {
        let path = format!("threads/{}/runs", urlencoding::encode(thread_id));
        let mut body = json!({ "assistant_id": self.assistant_id });
        if let Some(instructions) = additional_instructions {
            body["additional_instructions"] = json!(instructions);
        }
        let response = self.post(&path).json(&body).send().await?;
        decode_json(response).await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<RunObject, ClientError> {
        let path = format!(
            "threads/{}/runs/{}",
            urlencoding::encode(thread_id),
            urlencoding::encode(run_id)
        );
        let response = self.get(&path).send().await?;
        decode_json(response).await
    }

    /// Polls `run` until it settles, at most `max_run_polls` times.
    pub async fn await_run(&self, thread_id: &str, mut run: RunObject) -> Result<RunObject, ClientError> {
        let mut attempts = 0;
        while run.is_pending() {
            if attempts >= self.max_run_polls {
                log::warn!(
                    "AssistantsClient: run {} on thread {} still {} after {} polls",
                    run.id,
                    thread_id,
                    run.status,
                    attempts
                );
                return Err(ClientError::RunTimedOut { attempts });
            }
            tokio::time::sleep(self.run_poll_interval).await;
            attempts += 1;
            run = self.retrieve_run(thread_id, &run.id).await?;
        }

        if run.status != "completed" {
            return Err(ClientError::RunFailed { status: run.status });
        }
        Ok(run)
    }

    /// Text of the newest assistant message produced by `run_id`.
    async fn latest_assistant_text(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<Option<String>, ClientError> {
        let path = format!("threads/{}/messages", urlencoding::encode(thread_id));
        let response = self
            .get(&path)
            .query(&[("limit", "10"), ("run_id", run_id)])
            .send()
            .await?;
        let list: MessageList = decode_json(response).await?;

        Ok(list
            .data
            .into_iter()
            .find(|m| m.role == "assistant")
            .and_then(|m| {
                m.content
                    .into_iter()
                    .find(|part| part.kind == "text")
                    .and_then(|part| part.text)
                    .map(|text| text.value)
            })
            .filter(|value| !value.is_empty()))
    }

    /// Runs one turn on `thread_id` (or a new thread) and returns the thread id with the
    /// assistant's text, if it produced any.
    pub async fn run_turn(
        &self,
        thread_id: Option<&str>,
        messages: &[Message],
        additional_instructions: Option<&str>,
    ) -> Result<(String, Option<String>), ClientError> {
        let thread_id = match thread_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.create_thread().await?,
        };

        for message in messages {
            self.add_message(&thread_id, &message.role, &message.content)
                .await?;
        }

        let run = self.create_run(&thread_id, additional_instructions).await?;
        let run = self.await_run(&thread_id, run).await?;
        let text = self.latest_assistant_text(&thread_id, &run.id).await?;
        Ok((thread_id, text))
    }
}

#[async_trait]
impl ClientWrapper for AssistantsClient {
    async fn send_message(
        &self,
        messages: &[Message],
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        let instructions: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let conversation: Vec<Message> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect();
        let additional = if instructions.is_empty() {
            None
        } else {
            Some(instructions.join("\n\n"))
        };

        match self.run_turn(None, &conversation, additional.as_deref()).await {
            Ok((_, Some(text))) => Ok(Message::new(Role::Assistant, text)),
            Ok((_, None)) => Err(Box::new(ClientError::EmptyResponse)),
            Err(err) => {
                if log::log_enabled!(log::Level::Error) {
                    log::error!("AssistantsClient::send_message(...): {}", err);
                }
                Err(Box::new(err))
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.assistant_id
    }
}

#[async_trait]
impl ReplyPipeline for AssistantsClient {
    async fn reply(
        &self,
        thread_id: Option<&str>,
        message: &str,
    ) -> Result<PrimaryReply, Box<dyn Error + Send + Sync>> {
        let user = [Message::new(Role::User, message)];
        let (thread_id, text) = self.run_turn(thread_id, &user, None).await?;
        let text = text.unwrap_or_else(|| FALLBACK_REPLY.to_string());
        let items = extract_item_details(&text);
        Ok(PrimaryReply {
            text,
            thread_id,
            items,
        })
    }
}
