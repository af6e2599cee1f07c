//! Adapter around the external `yt-dlp` binary. All extractor output is
//! decoded into typed structs here, once, so selection logic downstream never
//! pokes at loosely-typed JSON.

use std::collections::HashMap;
use std::io::ErrorKind;

use serde::Deserialize;
use tokio::{
    process::Command,
    time::{Duration, timeout},
};
use tracing::warn;

use crate::config::{AppConfig, EXTRACT_TIMEOUT_SECONDS};
use crate::error::ApiError;

/// One playable variant as reported by the extractor. Immutable after decode.
#[derive(Debug, Clone, Deserialize)]
pub struct FormatDescriptor {
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub height: Option<u32>,
    /// Total / video-only / audio-only bitrate estimates, kbps. Ranking only.
    pub tbr: Option<f64>,
    pub vbr: Option<f64>,
    pub abr: Option<f64>,
    #[serde(default = "default_ext")]
    pub ext: String,
    pub url: Option<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
    /// Headers the origin expects on a direct fetch of `url`.
    #[serde(default)]
    pub http_headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct MediaInfo {
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub formats: Vec<FormatDescriptor>,
}

/// Top-level result of a `-f best` pass, where the extractor resolves its own
/// preferred muxed format and reports its URL directly.
#[derive(Debug, Deserialize)]
pub struct BestFormat {
    pub url: Option<String>,
    #[serde(default = "default_ext")]
    pub ext: String,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
}

fn default_ext() -> String {
    "mp4".to_string()
}

fn default_protocol() -> String {
    "https".to_string()
}

/// Fetch full metadata for a page URL. Each configured client identity is
/// tried in order; the first successful extraction wins and the last failure
/// is reported if none succeed. No retries beyond that single pass.
pub async fn fetch_media_info(config: &AppConfig, url: &str) -> Result<MediaInfo, ApiError> {
    let mut last_error: Option<ApiError> = None;

    for client in client_attempts(&config.client_identities) {
        let mut args = base_args(config);
        args.push("-J".to_string());
        if let Some(client) = &client {
            args.push("--extractor-args".to_string());
            args.push(format!("youtube:player_client={client}"));
        }
        args.push(url.to_string());

        match run_yt_dlp(args).await {
            Ok(output) => match serde_json::from_slice::<MediaInfo>(&output.stdout) {
                Ok(info) => return Ok(info),
                Err(error) => {
                    warn!(url, "could not decode extractor output: {error}");
                    last_error = Some(ApiError::extraction_failure(format!(
                        "could not decode extractor output: {error}"
                    )));
                }
            },
            Err(error) => {
                if let Some(client) = &client {
                    warn!(url, client = %client, "extraction attempt failed: {}", error.message);
                }
                last_error = Some(error);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| ApiError::extraction_failure("no extraction attempt was made")))
}

/// Secondary pass asking the extractor for its own "best" format selection.
/// Used only when no progressive format survived selection.
pub async fn fetch_best_format(config: &AppConfig, url: &str) -> Result<BestFormat, ApiError> {
    let mut args = base_args(config);
    args.push("-f".to_string());
    args.push("best".to_string());
    args.push("-j".to_string());
    args.push(url.to_string());

    let output = run_yt_dlp(args).await?;
    serde_json::from_slice(&output.stdout).map_err(|error| {
        ApiError::extraction_failure(format!("could not decode extractor output: {error}"))
    })
}

fn base_args(config: &AppConfig) -> Vec<String> {
    let mut args = vec![
        "--quiet".to_string(),
        "--no-warnings".to_string(),
        "--no-playlist".to_string(),
    ];
    if let Some(path) = &config.cookie_file {
        args.push("--cookies".to_string());
        args.push(path.to_string_lossy().into_owned());
    }
    args
}

/// An empty identity list still gets one attempt with extractor defaults.
fn client_attempts(clients: &[String]) -> Vec<Option<String>> {
    if clients.is_empty() {
        vec![None]
    } else {
        clients.iter().cloned().map(Some).collect()
    }
}

async fn run_yt_dlp(args: Vec<String>) -> Result<std::process::Output, ApiError> {
    let command_future = Command::new("yt-dlp").args(&args).output();
    let output = timeout(Duration::from_secs(EXTRACT_TIMEOUT_SECONDS), command_future)
        .await
        .map_err(|_| ApiError::extraction_failure("extraction timed out"))?
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                ApiError::internal("yt-dlp is not installed on this system")
            } else {
                ApiError::internal(format!("could not run yt-dlp: {error}"))
            }
        })?;

    if !output.status.success() {
        return Err(ApiError::extraction_failure(stderr_message(&output.stderr)));
    }

    Ok(output)
}

/// The last non-empty stderr line carries the actual failure; earlier lines
/// are progress noise. The `ERROR:` prefix is dropped for the client.
fn stderr_message(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(|line| line.strip_prefix("ERROR:").unwrap_or(line).trim().to_string())
        .unwrap_or_else(|| "the extractor could not resolve this URL".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_representative_extractor_document() {
        let raw = r#"{
            "title": "Example Clip",
            "duration": 213.4,
            "thumbnail": "https://i.example.com/t.jpg",
            "formats": [
                {
                    "format_id": "18",
                    "vcodec": "avc1.42001E",
                    "acodec": "mp4a.40.2",
                    "height": 360,
                    "tbr": 520.3,
                    "ext": "mp4",
                    "url": "https://cdn.example.com/v.mp4",
                    "protocol": "https",
                    "filesize": 13631488,
                    "http_headers": {"User-Agent": "Mozilla/5.0"}
                },
                {
                    "format_id": "hls-720",
                    "vcodec": "avc1",
                    "acodec": "mp4a",
                    "height": 720,
                    "url": "https://cdn.example.com/v.m3u8",
                    "protocol": "m3u8_native"
                }
            ]
        }"#;

        let info: MediaInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.title.as_deref(), Some("Example Clip"));
        assert_eq!(info.duration, Some(213.4));
        assert_eq!(info.formats.len(), 2);
        assert_eq!(info.formats[0].height, Some(360));
        assert_eq!(info.formats[0].filesize, Some(13_631_488.0));
        assert_eq!(
            info.formats[0].http_headers.get("User-Agent").map(String::as_str),
            Some("Mozilla/5.0")
        );
        // Unspecified fields fall back instead of failing the decode.
        assert_eq!(info.formats[1].ext, "mp4");
        assert_eq!(info.formats[1].protocol, "m3u8_native");
    }

    #[test]
    fn decodes_best_format_document() {
        let raw = r#"{"url": "https://cdn.example.com/best.mp4", "ext": "mp4", "filesize_approx": 2097152}"#;
        let best: BestFormat = serde_json::from_str(raw).unwrap();
        assert_eq!(best.url.as_deref(), Some("https://cdn.example.com/best.mp4"));
        assert_eq!(best.filesize_approx, Some(2_097_152.0));
    }

    #[test]
    fn stderr_message_keeps_last_meaningful_line() {
        let stderr = b"[youtube] extracting\nWARNING: throttled\n\nERROR: Video unavailable\n";
        assert_eq!(stderr_message(stderr), "Video unavailable");
        assert_eq!(
            stderr_message(b""),
            "the extractor could not resolve this URL"
        );
    }

    #[test]
    fn empty_identity_list_still_makes_one_attempt() {
        assert_eq!(client_attempts(&[]), vec![None]);
        let clients = vec!["android".to_string(), "web".to_string()];
        assert_eq!(
            client_attempts(&clients),
            vec![Some("android".to_string()), Some("web".to_string())]
        );
    }
}
