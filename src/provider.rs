use reqwest::{RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ChatError;
use crate::payload::ChatPayloads;

/// Gemini models tried in order when no override succeeds
pub const GEMINI_PREFERRED_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
];

/// NVIDIA NIM models tried in order when no override succeeds
pub const NVIDIA_PREFERRED_MODELS: &[&str] = &[
    "meta/llama-3.1-8b-instruct",
    "meta/llama-3.1-70b-instruct",
    "mistralai/mistral-7b-instruct-v0.3",
];

const NVIDIA_TEMPERATURE: f64 = 0.7;

/// A chat completion backend.
///
/// The dispatcher drives every provider through this trait, so fallback and
/// error classification are written once.
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fixed fallback order
    fn preferred_models(&self) -> &'static [&'static str];

    /// Model configured to be tried before the preference list
    fn model_override(&self) -> Option<&str>;

    fn endpoint_for(&self, model: &str, stream: bool) -> String;

    /// Attach credentials to an outbound request
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder;

    fn build_body(&self, payloads: &ChatPayloads, model: &str, stream: bool) -> Value;

    /// Pull the generated text out of a buffered response
    fn extract_text(&self, raw: &Value) -> Option<String>;

    /// Whether this status means "this model is unusable, try the next one"
    fn is_retryable_status(&self, status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        )
    }

    /// Endpoint listing available models, if the provider supports discovery
    fn listing_url(&self) -> Option<String> {
        None
    }
}

pub struct GeminiProvider {
    api_key: String,
    api_base: String,
    model_override: Option<String>,
}

impl GeminiProvider {
    pub fn new(api_key: String, api_base: String, model_override: Option<String>) -> Self {
        Self {
            api_key,
            api_base,
            model_override,
        }
    }
}

impl ChatProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn preferred_models(&self) -> &'static [&'static str] {
        GEMINI_PREFERRED_MODELS
    }

    fn model_override(&self) -> Option<&str> {
        self.model_override.as_deref()
    }

    fn endpoint_for(&self, model: &str, stream: bool) -> String {
        let method = if stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        format!("{}/{}:{}", self.api_base, model, method)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("X-goog-api-key", &self.api_key)
    }

    fn build_body(&self, payloads: &ChatPayloads, _model: &str, _stream: bool) -> Value {
        json!({ "contents": payloads.gemini_contents })
    }

    fn extract_text(&self, raw: &Value) -> Option<String> {
        raw.pointer("/candidates/0/content/parts/0/text")
            .and_then(|t| t.as_str())
            .map(|t| t.to_string())
    }

    fn listing_url(&self) -> Option<String> {
        Some(self.api_base.clone())
    }
}

pub struct NvidiaProvider {
    api_key: String,
    api_url: String,
    model_override: Option<String>,
}

impl NvidiaProvider {
    pub fn new(api_key: String, api_url: String, model_override: Option<String>) -> Self {
        Self {
            api_key,
            api_url,
            model_override,
        }
    }
}

impl ChatProvider for NvidiaProvider {
    fn name(&self) -> &'static str {
        "nvidia"
    }

    fn preferred_models(&self) -> &'static [&'static str] {
        NVIDIA_PREFERRED_MODELS
    }

    fn model_override(&self) -> Option<&str> {
        self.model_override.as_deref()
    }

    fn endpoint_for(&self, _model: &str, _stream: bool) -> String {
        self.api_url.clone()
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.api_key)
    }

    fn build_body(&self, payloads: &ChatPayloads, model: &str, stream: bool) -> Value {
        let mut body = json!({
            "model": model,
            "messages": payloads.openai_messages,
            "temperature": NVIDIA_TEMPERATURE,
        });
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }

    fn extract_text(&self, raw: &Value) -> Option<String> {
        raw.pointer("/choices/0/message/content")
            .and_then(|t| t.as_str())
            .map(|t| t.to_string())
    }
}

/// Which provider a configuration resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    Nvidia,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Nvidia => "nvidia",
        }
    }
}

/// NVIDIA is only used when explicitly selected and keyed; otherwise Gemini
/// is used whenever its key is present.
pub fn resolve_provider_kind(config: &Config) -> Option<ProviderKind> {
    let wants_nvidia = config.provider.as_deref() == Some("nvidia");
    if wants_nvidia && config.nvidia_api_key.is_some() {
        Some(ProviderKind::Nvidia)
    } else if config.gemini_api_key.is_some() {
        Some(ProviderKind::Gemini)
    } else {
        None
    }
}

/// Pick and build the provider for this request
pub fn select_provider(config: &Config) -> Result<Box<dyn ChatProvider>, ChatError> {
    let wants_nvidia = config.provider.as_deref() == Some("nvidia");
    if wants_nvidia && config.nvidia_api_key.is_none() {
        warn!("⚠️  AI_PROVIDER=nvidia but NVIDIA_API_KEY is not set");
    } else if !wants_nvidia && config.nvidia_api_key.is_some() {
        debug!("NVIDIA_API_KEY is set but AI_PROVIDER is not 'nvidia'; ignoring it");
    }

    match (resolve_provider_kind(config), &config.nvidia_api_key, &config.gemini_api_key) {
        (Some(ProviderKind::Nvidia), Some(key), _) => {
            info!("🎛️  Provider: nvidia");
            Ok(Box::new(NvidiaProvider::new(
                key.clone(),
                config.nvidia_api_url.clone(),
                config.nvidia_model.clone(),
            )))
        }
        (Some(ProviderKind::Gemini), _, Some(key)) => {
            info!("🎛️  Provider: gemini");
            Ok(Box::new(GeminiProvider::new(
                key.clone(),
                config.gemini_api_base.clone(),
                config.gemini_model.clone(),
            )))
        }
        _ => Err(ChatError::Unconfigured(
            "No AI provider API key is set.".to_string(),
        )),
    }
}
