use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::dispatcher::DispatchSuccess;
use crate::error::ChatError;
use crate::provider::ChatProvider;

const STREAM_CHANNEL_CAPACITY: usize = 100;

/// Buffered-mode reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
    pub raw: Value,
    pub model: String,
    pub provider: String,
}

/// First line of a streamed reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamPreamble {
    pub model: String,
    pub provider: String,
}

/// Read the whole upstream JSON and answer with `{text, raw, model, provider}`.
///
/// The body read is bounded by `read_timeout`; a model that sends headers and
/// then stalls ends the request with a 502.
pub async fn buffered_response(
    provider: &dyn ChatProvider,
    success: DispatchSuccess,
    read_timeout: Duration,
) -> Result<Response<Body>, ChatError> {
    let DispatchSuccess {
        provider: provider_name,
        model,
        response,
        tried,
    } = success;

    let raw: Value = match tokio::time::timeout(read_timeout, response.json::<Value>()).await {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => {
            error!("Failed to parse {} response from {}: {}", provider_name, model, e);
            return Err(ChatError::Upstream {
                status: None,
                detail: format!("{} returned an unreadable response: {}", model, e),
                tried,
            });
        }
        Err(_) => {
            error!(
                "⏱️  {} response body from {} stalled for {:?}",
                provider_name, model, read_timeout
            );
            return Err(ChatError::Upstream {
                status: None,
                detail: format!(
                    "{}: response body not received within {}s",
                    model,
                    read_timeout.as_secs()
                ),
                tried,
            });
        }
    };

    let text = match provider.extract_text(&raw) {
        Some(text) => text,
        None => {
            warn!("⚠️  No text found in {} response from {}", provider_name, model);
            String::new()
        }
    };

    info!(
        "✅ Replying with {} chars from {} ({})",
        text.chars().count(),
        model,
        provider_name
    );

    let reply = ChatReply {
        text,
        raw,
        model,
        provider: provider_name.to_string(),
    };
    Ok(Json(reply).into_response())
}

/// Answer with the preamble line, then relay upstream bytes as they arrive.
///
/// Once this returns the status is committed: a failure while relaying can
/// only cut the stream short, it cannot become a JSON error.
pub fn stream_response(success: DispatchSuccess) -> Result<Response<Body>, ChatError> {
    let preamble = StreamPreamble {
        model: success.model.clone(),
        provider: success.provider.to_string(),
    };
    let mut preamble_line = serde_json::to_vec(&preamble)
        .map_err(|e| ChatError::Internal(format!("Failed to encode stream preamble: {}", e)))?;
    preamble_line.push(b'\n');

    info!("🌊 Streaming {} ({})", success.model, success.provider);

    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(STREAM_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        if let Err(e) = relay_upstream(success, Bytes::from(preamble_line), tx).await {
            warn!("⚠️  Stream relay ended early: {}", e);
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .map_err(|e| {
            error!("Failed to build streaming response: {}", e);
            ChatError::Internal(format!("Failed to build streaming response: {}", e))
        })
}

/// Forward upstream chunks into the client channel.
///
/// Stops reading upstream as soon as the client goes away, which drops the
/// upstream connection with it.
async fn relay_upstream(
    success: DispatchSuccess,
    preamble: Bytes,
    tx: mpsc::Sender<Result<Bytes, std::io::Error>>,
) -> Result<(), String> {
    use futures::StreamExt;

    let start_time = std::time::Instant::now();
    let model = success.model;

    if tx.send(Ok(preamble)).await.is_err() {
        return Err("Client disconnected before preamble".to_string());
    }

    let mut stream = success.response.bytes_stream();
    let mut chunk_count = 0usize;
    let mut total_bytes = 0usize;

    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            _ = tx.closed() => {
                return Err(format!(
                    "Client disconnected after {} chunks, aborting {}",
                    chunk_count, model
                ));
            }
        };

        match next {
            Some(Ok(chunk)) => {
                chunk_count += 1;
                total_bytes += chunk.len();
                debug!("📦 Chunk #{}: {} bytes", chunk_count, chunk.len());

                if tx.send(Ok(chunk)).await.is_err() {
                    return Err(format!(
                        "Client disconnected after {} chunks, aborting {}",
                        chunk_count, model
                    ));
                }
            }
            Some(Err(e)) => {
                error!("❌ Upstream stream error on chunk #{}: {}", chunk_count + 1, e);
                let _ = tx
                    .send(Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        e.to_string(),
                    )))
                    .await;
                return Err(format!("Upstream stream from {} failed: {}", model, e));
            }
            None => break,
        }
    }

    info!(
        "✅ Stream from {} completed: {} chunks, {} bytes in {:?}",
        model,
        chunk_count,
        total_bytes,
        start_time.elapsed()
    );
    Ok(())
}
