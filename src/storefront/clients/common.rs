//! Plumbing shared by the HTTP clients: one pooled `reqwest::Client` per process, the
//! transport-level [`ClientError`], and the chat-completions call with usage tracking.

use once_cell::sync::Lazy;
use openai_rust::chat;
use openai_rust2 as openai_rust;
use serde::de::DeserializeOwned;
use std::error::Error;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::storefront::client_wrapper::TokenUsage;

/// Default base URL of the OpenAI REST API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Process-wide HTTP client. `reqwest::Client` is an `Arc` internally, so clones share
/// the same connection pool, DNS cache and TLS sessions.
static SHARED_HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::ClientBuilder::new()
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|err| {
            log::warn!(
                "storefront::clients::common: falling back to default HTTP client: {}",
                err
            );
            reqwest::Client::new()
        })
});

/// Returns the shared, pooled HTTP client.
pub fn get_shared_http_client() -> &'static reqwest::Client {
    &SHARED_HTTP_CLIENT
}

/// Errors raised while talking to a completion service.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientError {
    /// The request never produced a response (DNS, connect, timeout, body read).
    Http(String),
    /// The chat-completions SDK reported a failure, with the service's error text.
    Api(String),
    /// The service answered with a non-2xx status.
    Status { status: u16, body: String },
    /// The response body did not have the expected shape.
    Decode(String),
    /// An assistant run finished in a non-`completed` state.
    RunFailed { status: String },
    /// An assistant run was still pending after the poll budget was spent.
    RunTimedOut { attempts: u32 },
    /// The service completed but returned no text.
    EmptyResponse,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Http(msg) => write!(f, "HTTP request failed: {}", msg),
            ClientError::Api(msg) => write!(f, "OpenAI API error: {}", msg),
            ClientError::Status { status, body } => {
                write!(f, "Service returned status {}: {}", status, body)
            }
            ClientError::Decode(msg) => write!(f, "Failed to decode response: {}", msg),
            ClientError::RunFailed { status } => write!(f, "Run ended with status: {}", status),
            ClientError::RunTimedOut { attempts } => {
                write!(f, "Run still pending after {} status polls", attempts)
            }
            ClientError::EmptyResponse => write!(f, "Service returned an empty response"),
        }
    }
}

impl Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(err.to_string())
    }
}

/// Turns a response into `T`, mapping non-success statuses to [`ClientError::Status`].
pub async fn decode_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        if log::log_enabled!(log::Level::Error) {
            log::error!(
                "storefront::clients::common::decode_json(...): status {} body {}",
                status.as_u16(),
                body
            );
        }
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Send a chat request, record its usage, and return the assistant's content.
pub async fn send_and_track(
    api: &openai_rust::Client,
    model: &str,
    formatted_msgs: Vec<chat::Message>,
    url_path: Option<String>,
    usage_slot: &Mutex<Option<TokenUsage>>,
) -> Result<String, ClientError> {
    let chat_arguments = chat::ChatArguments::new(model, formatted_msgs);

    let response = match api.create_chat(chat_arguments, url_path).await {
        Ok(response) => response,
        Err(err) => {
            log::error!(
                "storefront::clients::common::send_and_track(...): OpenAI API Error: {}",
                err
            );
            return Err(ClientError::Api(err.to_string()));
        }
    };

    // Store it for get_last_usage()
    *usage_slot.lock().await = Some(TokenUsage {
        input_tokens: response.usage.prompt_tokens as usize,
        output_tokens: response.usage.completion_tokens as usize,
        total_tokens: response.usage.total_tokens as usize,
    });

    response
        .choices
        .first()
        .map(|choice| choice.message.content.clone())
        .filter(|content| !content.trim().is_empty())
        .ok_or(ClientError::EmptyResponse)
}

/// Absolute path of the chat completions endpoint under `base_url`:
/// `https://api.openai.com/v1` gives `/v1/chat/completions`.
pub fn chat_completions_path(base_url: &str) -> String {
    let prefix = reqwest::Url::parse(base_url)
        .map(|url| url.path().trim_end_matches('/').to_string())
        .unwrap_or_default();
    format!("{}/chat/completions", prefix)
}

/// Joins a base URL and a path without doubling or dropping the separator.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_http_client_is_singleton() {
        let a = get_shared_http_client() as *const _;
        let b = get_shared_http_client() as *const _;
        assert_eq!(a, b);
    }

    #[test]
    fn test_join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://api.openai.com/v1/", "/threads"),
            "https://api.openai.com/v1/threads"
        );
        assert_eq!(
            join_url("http://127.0.0.1:9000/v1", "chat/completions"),
            "http://127.0.0.1:9000/v1/chat/completions"
        );
    }

    #[test]
    fn test_chat_completions_path_follows_base_url() {
        assert_eq!(chat_completions_path(OPENAI_BASE_URL), "/v1/chat/completions");
        assert_eq!(
            chat_completions_path("http://127.0.0.1:9000/proxy/v1/"),
            "/proxy/v1/chat/completions"
        );
        assert_eq!(chat_completions_path("https://example.com"), "/chat/completions");
    }

    #[test]
    fn test_client_error_display() {
        let err = ClientError::RunTimedOut { attempts: 3 };
        assert_eq!(err.to_string(), "Run still pending after 3 status polls");
        let err = ClientError::Status {
            status: 429,
            body: "slow down".into(),
        };
        assert_eq!(err.to_string(), "Service returned status 429: slow down");
    }
}
