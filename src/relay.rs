//! Streaming relay: fetches a direct media URL and re-emits the body to the
//! caller in fixed-size chunks with forced-download headers. The body is never
//! buffered whole; backpressure flows from the caller through the chunked
//! reader back to the origin connection, and dropping the body (caller
//! disconnect, stream end, read error) closes the origin connection with it.

use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderValue,
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
};
use futures::TryStreamExt;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::io::{ReaderStream, StreamReader};
use url::Url;

use crate::config::RELAY_CHUNK_BYTES;
use crate::error::ApiError;

/// Media CDNs routinely reject requests that do not look like a browser.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const DEFAULT_CONTENT_TYPE: &str = "video/mp4";
const DEFAULT_FILENAME_STEM: &str = "video";
const DEFAULT_EXTENSION: &str = "mp4";

/// Fetch `origin_url` and return download headers plus the chunked body.
/// The semaphore permit caps concurrent origin connections and is held until
/// the streamed body is dropped.
pub async fn relay(
    client: &reqwest::Client,
    origin_url: &str,
    filename_stem: &str,
    extension: &str,
    permit: OwnedSemaphorePermit,
) -> Result<(HeaderMap, Body), ApiError> {
    let parsed = validate_origin_url(origin_url)?;

    let response = client
        .get(parsed)
        .header(USER_AGENT, BROWSER_USER_AGENT)
        .header(ACCEPT, "*/*")
        .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        // Origin CDNs commonly reject requests lacking a matching referer.
        .header(REFERER, origin_url)
        .send()
        .await
        .map_err(|error| ApiError::fetch_failure(format!("could not reach origin: {error}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::fetch_failure(format!(
            "origin responded with status {status}"
        )));
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        response
            .headers()
            .get(CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );
    // Copied through only when the origin supplied one. Fabricating a length
    // here would lie whenever a redirect or transfer encoding changed it.
    if let Some(length) = response.headers().get(CONTENT_LENGTH) {
        headers.insert(CONTENT_LENGTH, length.clone());
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(filename_stem, extension))
            .map_err(|_| ApiError::internal("could not build download header"))?,
    );

    // Re-chunk the origin body into fixed-size reads. The permit rides inside
    // the stream so it is released exactly when the body is dropped.
    let reader = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
    let chunks = ReaderStream::with_capacity(reader, RELAY_CHUNK_BYTES).map_ok(move |chunk| {
        let _ = &permit;
        chunk
    });

    Ok((headers, Body::from_stream(chunks)))
}

/// Only plain http/https origins are relayed; anything else is rejected
/// before any network access happens.
pub fn validate_origin_url(raw: &str) -> Result<Url, ApiError> {
    let parsed =
        Url::parse(raw).map_err(|_| ApiError::invalid_input("Invalid URL"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::invalid_input(
            "Only http and https URLs are supported",
        ));
    }
    Ok(parsed)
}

fn content_disposition(filename_stem: &str, extension: &str) -> String {
    let stem = sanitize_filename_stem(filename_stem);
    let ext: String = extension
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let ext = if ext.is_empty() {
        DEFAULT_EXTENSION.to_string()
    } else {
        ext
    };
    format!("attachment; filename=\"{stem}.{ext}\"")
}

/// Keep `[A-Za-z0-9_- ]` only, trim, and join internal runs of spaces with
/// underscores. An empty result falls back to a fixed default.
pub fn sanitize_filename_stem(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ' '))
        .collect();
    let joined = kept.split_whitespace().collect::<Vec<_>>().join("_");
    if joined.is_empty() {
        DEFAULT_FILENAME_STEM.to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;

    #[test]
    fn rejects_non_http_schemes_before_any_network_call() {
        let error = validate_origin_url("ftp://example.com/file").unwrap_err();
        assert_eq!(error.status, StatusCode::BAD_REQUEST);

        let error = validate_origin_url("not a url").unwrap_err();
        assert_eq!(error.status, StatusCode::BAD_REQUEST);

        assert!(validate_origin_url("http://example.com/v.mp4").is_ok());
        assert!(validate_origin_url("https://example.com/v.mp4").is_ok());
    }

    #[test]
    fn stems_lose_punctuation_and_spaces_become_underscores() {
        assert_eq!(sanitize_filename_stem("My Video!!"), "My_Video");
        assert_eq!(sanitize_filename_stem("  spaced   out  "), "spaced_out");
        assert_eq!(sanitize_filename_stem("clip-01_final"), "clip-01_final");
        assert_eq!(sanitize_filename_stem("🎬🎬"), "video");
        assert_eq!(sanitize_filename_stem(""), "video");
    }

    #[test]
    fn disposition_defaults_extension_when_stripped_empty() {
        assert_eq!(
            content_disposition("My Video!!", "mp4"),
            "attachment; filename=\"My_Video.mp4\""
        );
        assert_eq!(
            content_disposition("a", "../;\""),
            "attachment; filename=\"a.mp4\""
        );
    }
}
