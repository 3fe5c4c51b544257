use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, Method, Response, StatusCode},
    middleware::{self, Next},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::config::{Config, RelayMode};
use crate::dispatcher::Dispatcher;
use crate::error::ChatError;
use crate::payload::build_payloads;
use crate::provider::{resolve_provider_kind, select_provider};
use crate::relay;
use crate::request::{parse_chat_request, MAX_BODY_BYTES};

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<Config>,
    pub dispatcher: Dispatcher,
    pub started_at: DateTime<Utc>,
}

impl ProxyState {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.attempt_timeout)
            .build()?;
        let dispatcher = Dispatcher::new(
            client,
            config.attempt_timeout,
            config.discover_gemini_models,
        );

        Ok(Self {
            config: Arc::new(config),
            dispatcher,
            started_at: Utc::now(),
        })
    }
}

/// Build the HTTP router: `/api/chat` and `/health`
pub fn router(state: ProxyState) -> Router {
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id
        )
    });

    Router::new()
        .route("/api/chat", any(chat_handler))
        .route("/health", get(health_handler))
        .layer(trace_layer)
        .layer(middleware::from_fn(attach_request_id))
        .with_state(state)
}

/// Reuse the caller's `x-request-id` or mint one, and echo it on the response
async fn attach_request_id(mut req: Request, next: Next) -> Response<Body> {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
        let mut response = next.run(req).await;
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
        return response;
    }
    next.run(req).await
}

pub async fn chat_handler(State(state): State<ProxyState>, req: Request) -> Response<Body> {
    let method = req.method().clone();
    info!("📨 Incoming request: {} {}", method, req.uri().path());

    if method != Method::POST {
        warn!("Rejecting {} on chat endpoint", method);
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(axum::http::header::ALLOW, "POST")],
            Json(json!({ "error": "Method not allowed" })),
        )
            .into_response();
    }

    let body_bytes = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!("Rejecting request body over {} bytes", MAX_BODY_BYTES);
            return ChatError::PayloadTooLarge {
                limit: MAX_BODY_BYTES,
            }
            .into_response();
        }
        Err(e) => {
            error!("Failed to read request body: {}", e);
            return ChatError::Internal(format!("Failed to read request body: {}", e))
                .into_response();
        }
    };

    match handle_chat(&state, &body_bytes).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Chat request failed with {}: {}", e.status(), e);
            e.into_response()
        }
    }
}

async fn handle_chat(state: &ProxyState, body: &[u8]) -> Result<Response<Body>, ChatError> {
    let chat = parse_chat_request(body)?;
    info!(
        "💬 Prompt of {} chars with {} history turn(s)",
        chat.prompt.chars().count(),
        chat.history.len()
    );

    let provider = select_provider(&state.config)?;
    let payloads = build_payloads(&chat, state.config.system_prompt());

    let mode = state.config.relay_mode;
    let success = state
        .dispatcher
        .dispatch(provider.as_ref(), &payloads, mode == RelayMode::Streaming)
        .await?;

    if success.tried.len() > 1 {
        info!(
            "🔁 {} answered after {} attempt(s)",
            success.model,
            success.tried.len()
        );
    }

    match mode {
        RelayMode::Streaming => relay::stream_response(success),
        RelayMode::Buffered => {
            relay::buffered_response(provider.as_ref(), success, state.config.attempt_timeout)
                .await
        }
    }
}

async fn health_handler(State(state): State<ProxyState>) -> impl IntoResponse {
    let provider = resolve_provider_kind(&state.config).map(|k| k.name());
    Json(json!({
        "status": "ok",
        "provider": provider,
        "relay_mode": state.config.relay_mode.as_str(),
        "started_at": state.started_at.to_rfc3339(),
    }))
}
