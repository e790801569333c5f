//! Configuration for the storefront backend.
//!
//! [`StorefrontConfig`] is a plain struct: construct it by hand, start from
//! [`Default`], or read it from the process environment with
//! [`StorefrontConfig::from_env`]. The `storefrontd` binary loads a `.env` file into the
//! process environment with `dotenvy` before calling `from_env`.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use storefront_llm::StorefrontConfig;
//!
//! let config = StorefrontConfig {
//!     entry_ttl: Duration::from_secs(120),
//!     ..StorefrontConfig::default()
//! };
//! assert_eq!(config.delivery_grace, Duration::from_secs(10));
//! ```
//!
//! # Environment
//!
//! | variable | field | default |
//! |---|---|---|
//! | `PORT` | `bind_addr` port | `3001` |
//! | `OPENAI_API_KEY` | `api_key` | unset |
//! | `OPENAI_BASE_URL` | `base_url` | `https://api.openai.com/v1` |
//! | `ASSISTANT_ID` | `assistant_id` | unset |
//! | `ANALYTICS_MODEL` | `analytics_model` | `gpt-4o-mini` |
//! | `ANALYTICS_ASSISTANT_ID` | `analytics_assistant_id` | unset |
//! | `ANALYTICS_TTL_SECS` | `entry_ttl` | `300` |
//! | `ANALYTICS_GRACE_SECS` | `delivery_grace` | `10` |
//! | `ANALYTICS_SWEEP_SECS` | `sweep_interval` | `60` |
//! | `RUN_POLL_INTERVAL_MS` | `run_poll_interval` | `1000` |
//! | `RUN_MAX_POLLS` | `max_run_polls` | `60` |
//! | `AGENT_TIMEOUT_SECS` | `agent_timeout` | `90` |

use std::error::Error;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::storefront::clients::common::OPENAI_BASE_URL;

/// A configuration value that could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub variable: String,
    pub value: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid value for {}: {:?}", self.variable, self.value)
    }
}

impl Error for ConfigError {}

/// Settings for the cache lifecycle, agent bounds and the completion service.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// API key for the completion service.
    pub api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Assistant that produces the primary, user-visible reply.
    pub assistant_id: Option<String>,
    /// Chat Completions model used by the analytics agents.
    pub analytics_model: String,
    /// When set, analytics agents run through this assistant instead of Chat Completions.
    pub analytics_assistant_id: Option<String>,
    /// Maximum age of an undelivered cache entry.
    pub entry_ttl: Duration,
    /// How long a delivered entry stays readable.
    pub delivery_grace: Duration,
    /// Interval between janitor sweeps.
    pub sweep_interval: Duration,
    /// Fixed backoff between assistant run status polls.
    pub run_poll_interval: Duration,
    /// Maximum number of run status polls before the run counts as failed.
    pub max_run_polls: u32,
    /// Upper bound on a single agent invocation.
    pub agent_timeout: Duration,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 3001)),
            api_key: None,
            base_url: OPENAI_BASE_URL.to_string(),
            assistant_id: None,
            analytics_model: "gpt-4o-mini".to_string(),
            analytics_assistant_id: None,
            entry_ttl: Duration::from_secs(300),
            delivery_grace: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(60),
            run_poll_interval: Duration::from_secs(1),
            max_run_polls: 60,
            agent_timeout: Duration::from_secs(90),
        }
    }
}

impl StorefrontConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from `lookup`, falling back to defaults for unset or
    /// blank variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(port) = parse_var::<u16>(&get, "PORT")? {
            config.bind_addr.set_port(port);
        }
        config.api_key = get("OPENAI_API_KEY");
        if let Some(base_url) = get("OPENAI_BASE_URL") {
            config.base_url = base_url;
        }
        config.assistant_id = get("ASSISTANT_ID");
        if let Some(model) = get("ANALYTICS_MODEL") {
            config.analytics_model = model;
        }
        config.analytics_assistant_id = get("ANALYTICS_ASSISTANT_ID");

        if let Some(secs) = parse_var::<u64>(&get, "ANALYTICS_TTL_SECS")? {
            config.entry_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&get, "ANALYTICS_GRACE_SECS")? {
            config.delivery_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&get, "ANALYTICS_SWEEP_SECS")? {
            config.sweep_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(ms) = parse_var::<u64>(&get, "RUN_POLL_INTERVAL_MS")? {
            config.run_poll_interval = Duration::from_millis(ms);
        }
        if let Some(polls) = parse_var::<u32>(&get, "RUN_MAX_POLLS")? {
            config.max_run_polls = polls;
        }
        if let Some(secs) = parse_var::<u64>(&get, "AGENT_TIMEOUT_SECS")? {
            config.agent_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    match get(name) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| ConfigError {
            variable: name.to_string(),
            value: raw,
        }),
    }
}
