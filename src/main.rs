use std::sync::Arc;

use tokio::{net::TcpListener, sync::Semaphore, time::Duration};
use tracing::info;

use media_relay::{
    config::{AppConfig, CONNECT_TIMEOUT_SECONDS, MAX_CONCURRENT_RELAYS, non_empty},
    error::ApiError,
    handlers::{self, AppState},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "media_relay=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let config = AppConfig::from_env()?;
    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECONDS))
        .build()
        .map_err(|error| ApiError::internal(format!("could not build HTTP client: {error}")))?;

    let state = AppState {
        config: Arc::new(config),
        http_client,
        relay_semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_RELAYS)),
    };

    let app = handlers::router(state);
    let addr = resolve_bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|error| ApiError::internal(format!("could not bind {addr}: {error}")))?;

    info!("media relay listening on http://{addr}");

    axum::serve(listener, app)
        .await
        .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}

fn resolve_bind_addr() -> String {
    if let Some(configured) = std::env::var("APP_ADDR")
        .ok()
        .and_then(|value| non_empty(&value).map(ToString::to_string))
    {
        return configured;
    }

    if let Some(port) = std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
    {
        return format!("0.0.0.0:{port}");
    }

    "127.0.0.1:8787".to_string()
}
