use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::provider::ChatProvider;

const GENERATE_METHOD: &str = "generateContent";

/// Model listing as returned by the Gemini `models` endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListModelsResponse {
    #[serde(default)]
    pub models: Vec<ListedModel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedModel {
    pub name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ListedModel {
    /// Model id without the `models/` resource prefix
    pub fn id(&self) -> &str {
        self.name.strip_prefix("models/").unwrap_or(&self.name)
    }

    pub fn supports_generation(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == GENERATE_METHOD)
    }
}

/// Candidate order from the static configuration: override first, then the
/// preference list, without duplicates
pub fn static_candidates(model_override: Option<&str>, preferred: &[&str]) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::with_capacity(preferred.len() + 1);
    for model in model_override.into_iter().chain(preferred.iter().copied()) {
        push_unique(&mut candidates, model);
    }
    candidates
}

/// Candidate order when the provider advertised which models it serves.
///
/// The override always leads. Available models from the preference list come
/// next in preference order, followed by any other available models in the
/// order the provider listed them.
pub fn discovered_candidates(
    model_override: Option<&str>,
    preferred: &[&str],
    available: &[String],
) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::with_capacity(available.len() + 1);
    if let Some(model) = model_override {
        push_unique(&mut candidates, model);
    }
    for model in preferred {
        if available.iter().any(|a| a == model) {
            push_unique(&mut candidates, model);
        }
    }
    for model in available {
        push_unique(&mut candidates, model);
    }
    candidates
}

fn push_unique(candidates: &mut Vec<String>, model: &str) {
    if !candidates.iter().any(|c| c == model) {
        candidates.push(model.to_string());
    }
}

/// Ask the provider which models can generate content.
///
/// Returns the generation-capable model ids in listing order.
pub async fn fetch_generation_models(
    client: &reqwest::Client,
    provider: &dyn ChatProvider,
    timeout: Duration,
) -> Result<Vec<String>, String> {
    let url = provider
        .listing_url()
        .ok_or_else(|| format!("{} does not support model listing", provider.name()))?;

    debug!("📚 Listing {} models from {}", provider.name(), url);

    let request = provider.authorize(client.get(&url)).send();
    let response = tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| format!("Model listing timed out after {:?}", timeout))?
        .map_err(|e| format!("Failed to list models: {}", e))?;

    if !response.status().is_success() {
        return Err(format!("Model listing returned error: {}", response.status()));
    }

    let listing = tokio::time::timeout(timeout, response.json::<ListModelsResponse>())
        .await
        .map_err(|_| format!("Model listing timed out after {:?}", timeout))?
        .map_err(|e| format!("Failed to parse model listing: {}", e))?;

    let models: Vec<String> = listing
        .models
        .iter()
        .filter(|m| m.supports_generation())
        .map(|m| m.id().to_string())
        .collect();

    debug!("   {} of {} listed models support generation", models.len(), listing.models.len());
    Ok(models)
}

/// Candidate list for one request, consulting the provider's listing when
/// enabled and falling back to the static order on any failure
pub async fn candidate_models(
    client: &reqwest::Client,
    provider: &dyn ChatProvider,
    discover: bool,
    timeout: Duration,
) -> Vec<String> {
    let fallback = || static_candidates(provider.model_override(), provider.preferred_models());

    if !discover || provider.listing_url().is_none() {
        return fallback();
    }

    match fetch_generation_models(client, provider, timeout).await {
        Ok(available) if !available.is_empty() => discovered_candidates(
            provider.model_override(),
            provider.preferred_models(),
            &available,
        ),
        Ok(_) => {
            warn!("⚠️  {} listed no generation models, using static list", provider.name());
            fallback()
        }
        Err(e) => {
            warn!("⚠️  {}, using static model list", e);
            fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_static_candidates_override_first() {
        assert_eq!(
            static_candidates(Some("custom"), &["a", "b"]),
            strings(&["custom", "a", "b"])
        );
    }

    #[test]
    fn test_static_candidates_dedupes_override() {
        assert_eq!(
            static_candidates(Some("b"), &["a", "b", "c"]),
            strings(&["b", "a", "c"])
        );
        assert_eq!(static_candidates(None, &["a", "a", "b"]), strings(&["a", "b"]));
    }

    #[test]
    fn test_discovered_candidates_ordering() {
        let available = strings(&["z-model", "b", "y-model", "a"]);
        assert_eq!(
            discovered_candidates(Some("custom"), &["a", "b", "c"], &available),
            strings(&["custom", "a", "b", "z-model", "y-model"])
        );
    }

    #[test]
    fn test_discovered_candidates_override_already_available() {
        let available = strings(&["a", "b"]);
        assert_eq!(
            discovered_candidates(Some("b"), &["a", "b"], &available),
            strings(&["b", "a"])
        );
    }

    #[test]
    fn test_listing_parse_and_filter() {
        let listing: ListModelsResponse = serde_json::from_value(json!({
            "models": [
                {
                    "name": "models/gemini-2.0-flash",
                    "supportedGenerationMethods": ["generateContent", "countTokens"]
                },
                {
                    "name": "models/text-embedding-004",
                    "supportedGenerationMethods": ["embedContent"]
                },
                { "name": "models/no-methods" }
            ]
        }))
        .unwrap();

        let ids: Vec<&str> = listing
            .models
            .iter()
            .filter(|m| m.supports_generation())
            .map(|m| m.id())
            .collect();
        assert_eq!(ids, vec!["gemini-2.0-flash"]);
    }

    #[test]
    fn test_listing_without_models_field() {
        let listing: ListModelsResponse = serde_json::from_value(json!({})).unwrap();
        assert!(listing.models.is_empty());
    }
}
