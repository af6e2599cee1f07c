use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::select::QualityOption;
use crate::{extract, relay, select};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub http_client: reqwest::Client,
    pub relay_semaphore: Arc<Semaphore>,
}

/// Permissive CORS is deliberate: the caller is a browser-hosted front end
/// served from a different origin.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/download", get(download))
        .route("/stream-download", get(stream_download))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    url: Option<String>,
    title: Option<String>,
    ext: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    formats: Vec<QualityOption>,
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "running",
        "message": "media extraction service is up",
    }))
}

async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let url = required_url(query.url.as_deref())?;
    if state.config.is_blocked_source(url) {
        return Err(ApiError::unsupported_source(
            "Downloads from this source are not supported",
        ));
    }

    let info = extract::fetch_media_info(&state.config, url).await?;

    let mut formats = select::video_options(&info.formats);
    if formats.is_empty() {
        // No progressive variant survived selection; ask the extractor for
        // its own best pick instead of returning an empty list.
        let best = extract::fetch_best_format(&state.config, url).await?;
        if let Some(option) = select::best_quality_option(&best) {
            formats.push(option);
        }
    }
    if let Some(audio) = select::audio_option(&info.formats) {
        formats.push(audio);
    }

    info!(url, options = formats.len(), "resolved media page");

    Ok(Json(DownloadResponse {
        title: info.title,
        duration: info.duration,
        thumbnail: info.thumbnail,
        formats,
    }))
}

async fn stream_download(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    let url = required_url(query.url.as_deref())?;
    let title = query.title.as_deref().unwrap_or("video");
    let ext = query.ext.as_deref().unwrap_or("mp4");

    let permit = state
        .relay_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ApiError::internal("could not reserve relay capacity"))?;

    let (headers, body) = relay::relay(&state.http_client, url, title, ext, permit).await?;
    Ok((headers, body).into_response())
}

fn required_url(raw: Option<&str>) -> Result<&str, ApiError> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::invalid_input("No URL provided"))
}
