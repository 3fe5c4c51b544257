use std::env;
use std::fmt;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_NVIDIA_API_URL: &str = "https://integrate.api.nvidia.com/v1/chat/completions";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a warm, supportive mental wellness companion. \
Listen carefully, respond with empathy and practical coping ideas, and keep answers short. \
You are not a therapist: if someone mentions self-harm or a crisis, gently encourage them \
to contact local emergency services or a crisis hotline right away.";

const DEFAULT_ATTEMPT_TIMEOUT_SECONDS: u64 = 8;

/// How a successful upstream response is delivered to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Preamble line followed by upstream bytes as they arrive
    Streaming,
    /// Full upstream JSON read, text extracted, one JSON object returned
    Buffered,
}

impl RelayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayMode::Streaming => "streaming",
            RelayMode::Buffered => "buffered",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "streaming" | "stream" => Some(RelayMode::Streaming),
            "buffered" | "buffer" | "json" => Some(RelayMode::Buffered),
            _ => None,
        }
    }
}

impl fmt::Display for RelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proxy configuration, normalized once and passed down explicitly.
///
/// Every string value has already been trimmed and stripped of surrounding
/// quotes; empty values are `None`.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Option<String>,
    pub gemini_api_key: Option<String>,
    pub nvidia_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub nvidia_model: Option<String>,
    pub system_prompt: Option<String>,
    pub gemini_api_base: String,
    pub nvidia_api_url: String,
    pub relay_mode: RelayMode,
    pub attempt_timeout: Duration,
    pub discover_gemini_models: bool,
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Build the configuration from process environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).and_then(|raw| clean_value(&raw));

        let relay_mode = match get("RELAY_MODE") {
            Some(raw) => RelayMode::parse(&raw).unwrap_or_else(|| {
                warn!("⚠️  Unknown RELAY_MODE '{}', using streaming", raw);
                RelayMode::Streaming
            }),
            None => RelayMode::Streaming,
        };

        let attempt_timeout_seconds = match get("ATTEMPT_TIMEOUT_SECONDS") {
            Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
                warn!(
                    "⚠️  Invalid ATTEMPT_TIMEOUT_SECONDS '{}', using {}",
                    raw, DEFAULT_ATTEMPT_TIMEOUT_SECONDS
                );
                DEFAULT_ATTEMPT_TIMEOUT_SECONDS
            }),
            None => DEFAULT_ATTEMPT_TIMEOUT_SECONDS,
        };

        let discover_gemini_models = get("GEMINI_DISCOVER_MODELS")
            .map(|s| s.to_lowercase() != "false" && s != "0")
            .unwrap_or(true);

        let port = match get("PROXY_PORT") {
            Some(raw) => raw.parse::<u16>().unwrap_or_else(|_| {
                warn!("⚠️  Invalid PROXY_PORT '{}', using 3001", raw);
                3001
            }),
            None => 3001,
        };

        Self {
            provider: get("AI_PROVIDER").map(|s| s.to_lowercase()),
            gemini_api_key: get("GEMINI_API_KEY"),
            nvidia_api_key: get("NVIDIA_API_KEY"),
            gemini_model: get("GEMINI_MODEL"),
            nvidia_model: get("NVIDIA_MODEL"),
            system_prompt: get("SYSTEM_PROMPT"),
            gemini_api_base: get("GEMINI_API_BASE")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            nvidia_api_url: get("NVIDIA_API_URL")
                .unwrap_or_else(|| DEFAULT_NVIDIA_API_URL.to_string()),
            relay_mode,
            attempt_timeout: Duration::from_secs(attempt_timeout_seconds),
            discover_gemini_models,
            host: get("PROXY_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
        }
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject settings the proxy cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.attempt_timeout.is_zero() {
            return Err("ATTEMPT_TIMEOUT_SECONDS must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Trim a raw value and strip one layer of matching surrounding quotes.
///
/// Dashboards and `.env` files frequently store `"sk-..."` with the quotes
/// included; those must never reach an upstream header.
pub fn clean_value(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|&q| {
            trimmed
                .strip_prefix(q)
                .and_then(|rest| rest.strip_suffix(q))
        })
        .unwrap_or(trimmed)
        .trim();

    if unquoted.is_empty() {
        None
    } else {
        Some(unquoted.to_string())
    }
}
