use axum::serve;
use chat_proxy::config::Config;
use chat_proxy::provider::resolve_provider_kind;
use chat_proxy::proxy::{self, ProxyState};
use std::io;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    config
        .validate()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let bind_addr = config.bind_addr();

    info!("Starting Chat Proxy");
    info!("Listening on: {}", bind_addr);
    info!("Relay mode: {}", config.relay_mode);
    info!("Per-attempt timeout: {:?}", config.attempt_timeout);
    match resolve_provider_kind(&config) {
        Some(kind) => info!("Provider: {}", kind.name()),
        None => warn!("⚠️  No AI provider API key is set; chat requests will fail with 500"),
    }
    if let Some(model) = &config.gemini_model {
        info!("  Gemini model override: {}", model);
    }
    if let Some(model) = &config.nvidia_model {
        info!("  NVIDIA model override: {}", model);
    }
    info!("  Gemini model discovery: {}", config.discover_gemini_models);

    let state = ProxyState::new(config)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("Failed to build HTTP client: {}", e)))?;

    let app = proxy::router(state);

    let listener = TcpListener::bind(&bind_addr).await?;

    info!("Chat Proxy is ready");

    serve(listener, app).await
}
