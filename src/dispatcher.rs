use reqwest::StatusCode;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::ChatError;
use crate::model_catalog;
use crate::payload::ChatPayloads;
use crate::provider::ChatProvider;

/// A model that answered with a 2xx status.
///
/// The body has not been read yet, so the relay can either stream it or
/// buffer it.
pub struct DispatchSuccess {
    pub provider: &'static str,
    pub model: String,
    pub response: reqwest::Response,
    pub tried: Vec<String>,
}

/// Runs one chat request against a provider's ordered model candidates
#[derive(Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    attempt_timeout: Duration,
    discover_models: bool,
}

impl Dispatcher {
    pub fn new(client: reqwest::Client, attempt_timeout: Duration, discover_models: bool) -> Self {
        Self {
            client,
            attempt_timeout,
            discover_models,
        }
    }

    /// Try each candidate model in order until one succeeds.
    ///
    /// 400/403/404, transport errors and timeouts move on to the next
    /// candidate. Any other failure status stops immediately.
    pub async fn dispatch(
        &self,
        provider: &dyn ChatProvider,
        payloads: &ChatPayloads,
        stream: bool,
    ) -> Result<DispatchSuccess, ChatError> {
        let candidates = model_catalog::candidate_models(
            &self.client,
            provider,
            self.discover_models,
            self.attempt_timeout,
        )
        .await;

        info!(
            "🧭 {} candidate(s) for {}: {}",
            candidates.len(),
            provider.name(),
            candidates.join(", ")
        );

        let mut tried: Vec<String> = Vec::with_capacity(candidates.len());
        let mut last_detail = format!("No {} models available", provider.name());

        for (idx, model) in candidates.iter().enumerate() {
            tried.push(model.clone());
            let url = provider.endpoint_for(model, stream);
            let body = provider.build_body(payloads, model, stream);

            info!(
                "🚀 Attempt {}/{}: {} model {}",
                idx + 1,
                candidates.len(),
                provider.name(),
                model
            );
            debug!("   Endpoint: {}", url);

            let request = provider.authorize(self.client.post(&url)).json(&body).send();
            let start = Instant::now();

            let response = match tokio::time::timeout(self.attempt_timeout, request).await {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => {
                    warn!("⚠️  {} transport error: {}, trying next model", model, e);
                    last_detail = format!("{}: {}", model, e);
                    continue;
                }
                Err(_) => {
                    warn!(
                        "⏱️  {} did not respond within {:?}, trying next model",
                        model, self.attempt_timeout
                    );
                    last_detail = format!(
                        "{}: no response within {}s",
                        model,
                        self.attempt_timeout.as_secs()
                    );
                    continue;
                }
            };

            let status = response.status();
            info!("📬 {} responded {} in {:?}", model, status, start.elapsed());

            if status.is_success() {
                return Ok(DispatchSuccess {
                    provider: provider.name(),
                    model: model.clone(),
                    response,
                    tried,
                });
            }

            let detail = self.read_error_detail(response, status).await;
            last_detail = format!("{} returned {}: {}", model, status.as_u16(), detail);

            if provider.is_retryable_status(status) {
                warn!("⚠️  {}, trying next model", last_detail);
                continue;
            }

            error!("❌ {}, not retrying", last_detail);
            return Err(ChatError::Upstream {
                status: Some(status),
                detail: last_detail,
                tried,
            });
        }

        error!(
            "❌ All {} model(s) failed for {}: {}",
            tried.len(),
            provider.name(),
            last_detail
        );
        // Model-unavailable statuses stay internal; exhaustion is a gateway failure
        Err(ChatError::Upstream {
            status: None,
            detail: last_detail,
            tried,
        })
    }

    async fn read_error_detail(&self, response: reqwest::Response, status: StatusCode) -> String {
        let text = match tokio::time::timeout(self.attempt_timeout, response.text()).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                debug!("   Could not read error body: {}", e);
                String::new()
            }
            Err(_) => String::new(),
        };
        extract_error_detail(&text, status)
    }
}

/// Human-readable reason from an upstream error body.
///
/// Prefers the nested `error.message` both providers use, then top-level
/// `message`/`detail`, then the raw text.
pub fn extract_error_detail(body: &str, status: StatusCode) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let message = json
            .pointer("/error/message")
            .or_else(|| json.get("message"))
            .or_else(|| json.get("detail"))
            .or_else(|| json.get("error"))
            .and_then(|m| m.as_str());
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_prefers_nested_message() {
        let body = r#"{"error":{"code":404,"message":"models/x is not found","status":"NOT_FOUND"}}"#;
        assert_eq!(
            extract_error_detail(body, StatusCode::NOT_FOUND),
            "models/x is not found"
        );
    }

    #[test]
    fn test_detail_top_level_fields() {
        assert_eq!(
            extract_error_detail(r#"{"message":"bad key"}"#, StatusCode::UNAUTHORIZED),
            "bad key"
        );
        assert_eq!(
            extract_error_detail(r#"{"detail":"Function not found"}"#, StatusCode::NOT_FOUND),
            "Function not found"
        );
        assert_eq!(
            extract_error_detail(r#"{"error":"quota"}"#, StatusCode::TOO_MANY_REQUESTS),
            "quota"
        );
    }

    #[test]
    fn test_detail_falls_back_to_raw_text() {
        assert_eq!(
            extract_error_detail("  upstream exploded \n", StatusCode::BAD_GATEWAY),
            "upstream exploded"
        );
        assert_eq!(
            extract_error_detail(r#"{"unexpected":true}"#, StatusCode::BAD_GATEWAY),
            r#"{"unexpected":true}"#
        );
    }

    #[test]
    fn test_detail_empty_body_uses_reason() {
        assert_eq!(
            extract_error_detail("", StatusCode::SERVICE_UNAVAILABLE),
            "Service Unavailable"
        );
    }
}
