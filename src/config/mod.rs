//! Relay configuration (layered: code > env > config file).
//!
//! A [`RelayConfig`] is an immutable value handed to every session. Nothing
//! here is process-global: two sessions built from different configs never
//! observe each other.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::util::retry::RetryPolicy;

/// Default tool the agent uses to speak to the user.
pub const DEFAULT_ASSISTANT_TOOL: &str = "send_message";
/// Default argument of [`DEFAULT_ASSISTANT_TOOL`] carrying the text.
pub const DEFAULT_ASSISTANT_KWARG: &str = "message";

/// Credential presented to the agent service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", content = "secret", rename_all = "snake_case")]
pub enum Credential {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// `X-BARE-PASSWORD: password <secret>` for password-protected servers.
    BarePassword(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(..)"),
            Self::BarePassword(_) => f.write_str("BarePassword(..)"),
        }
    }
}

/// Static configuration for talking to one provisioned agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub base_url: String,
    pub agent_id: String,
    pub credential: Option<Credential>,
    /// Delay between successful polls.
    #[serde(rename = "poll_interval_ms", with = "crate::util::duration_ms")]
    pub poll_interval: Duration,
    /// Backoff applied to failed polls.
    pub retry: RetryPolicy,
    #[serde(rename = "request_timeout_ms", with = "crate::util::duration_ms")]
    pub request_timeout: Duration,
    #[serde(rename = "turn_timeout_ms", with = "crate::util::opt_duration_ms")]
    pub turn_timeout: Option<Duration>,
    pub max_polls: Option<u32>,
    /// Envelopes requested per poll.
    pub page_limit: u32,
    pub assistant_message_tool_name: String,
    pub assistant_message_tool_kwarg: String,
    /// Emit `chat_start` once the turn has been accepted.
    pub announce_start: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8283".to_string(),
            agent_id: String::new(),
            credential: None,
            poll_interval: Duration::from_millis(500),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            turn_timeout: Some(Duration::from_secs(300)),
            max_polls: None,
            page_limit: 50,
            assistant_message_tool_name: DEFAULT_ASSISTANT_TOOL.to_string(),
            assistant_message_tool_kwarg: DEFAULT_ASSISTANT_KWARG.to_string(),
            announce_start: false,
        }
    }
}

impl RelayConfig {
    pub fn new(base_url: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            agent_id: agent_id.into(),
            ..Default::default()
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn with_max_polls(mut self, max_polls: Option<u32>) -> Self {
        self.max_polls = max_polls;
        self
    }

    pub fn with_announce_start(mut self, announce: bool) -> Self {
        self.announce_start = announce;
        self
    }

    /// Load from environment variables (`LETTA_BASE_URL`, `LETTA_AGENT_ID`, ...).
    ///
    /// A `.env` file is read first when present.
    pub fn from_env() -> Result<Self, RelayError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::default().merge_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from an environment lookup onto `self`.
    pub fn merge_env<F>(mut self, lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("LETTA_BASE_URL") {
            self.base_url = url;
        }
        if let Some(id) = lookup("LETTA_AGENT_ID") {
            self.agent_id = id;
        }
        if let Some(key) = lookup("LETTA_API_KEY").filter(|k| !k.is_empty()) {
            self.credential = Some(Credential::Bearer(key));
        } else if let Some(pw) = lookup("LETTA_PASSWORD").filter(|p| !p.is_empty()) {
            self.credential = Some(Credential::BarePassword(pw));
        }
        if let Some(ms) = parse_env_u64(&lookup, "LETTA_POLL_INTERVAL_MS")? {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse_env_u64(&lookup, "LETTA_MAX_RETRIES")? {
            self.retry.max_attempts = n as u32;
        }
        if let Some(ms) = parse_env_u64(&lookup, "LETTA_MAX_BACKOFF_MS")? {
            self.retry.max_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env_u64(&lookup, "LETTA_REQUEST_TIMEOUT_MS")? {
            self.request_timeout = Duration::from_millis(ms);
        }
        Ok(self)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, RelayError> {
        Ok(toml::from_str(raw)?)
    }

    /// Read a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// `<config dir>/letta-relay/config.toml`, when a home directory exists.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "letta-relay")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reject configurations no session could run with.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.base_url.trim().is_empty() {
            return Err(RelayError::Configuration("base_url is empty".into()));
        }
        if self.agent_id.trim().is_empty() {
            return Err(RelayError::Configuration("agent_id is empty".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(RelayError::Configuration(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.page_limit == 0 {
            return Err(RelayError::Configuration("page_limit must be at least 1".into()));
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

fn parse_env_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>, RelayError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| RelayError::Configuration(format!("{key} must be an integer, got '{raw}'"))),
    }
}
