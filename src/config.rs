use std::path::PathBuf;

use tracing::{info, warn};
use url::Url;

use crate::error::ApiError;

/// Upper bound for one yt-dlp invocation, per client identity attempt.
pub const EXTRACT_TIMEOUT_SECONDS: u64 = 60;
/// Connect-phase timeout for outbound relay fetches. No total timeout is set
/// because a relayed body may legitimately stream for minutes.
pub const CONNECT_TIMEOUT_SECONDS: u64 = 30;
pub const RELAY_CHUNK_BYTES: usize = 64 * 1024;
pub const MAX_CONCURRENT_RELAYS: usize = 8;

const DEFAULT_CLIENT_IDENTITIES: [&str; 2] = ["android", "web"];

/// Process-wide configuration, built once in `main` before the router and
/// shared immutably through `AppState`. There is no lazily-initialized global
/// state anywhere else.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Extractor client identities tried in order until one succeeds.
    pub client_identities: Vec<String>,
    /// Netscape-format cookie jar handed to the extractor, if configured.
    pub cookie_file: Option<PathBuf>,
    /// Host suffixes rejected before any extraction attempt.
    pub blocked_sources: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ApiError> {
        let client_identities = read_list_env("EXTRACTOR_CLIENTS").unwrap_or_else(|| {
            DEFAULT_CLIENT_IDENTITIES
                .iter()
                .map(ToString::to_string)
                .collect()
        });
        let cookie_file = resolve_cookie_file()?;
        let blocked_sources = read_list_env("BLOCKED_SOURCES").unwrap_or_default();

        info!(
            "extractor clients: {:?}, cookies: {}",
            client_identities,
            match &cookie_file {
                Some(path) => format!("{}", path.display()),
                None => "none".to_string(),
            }
        );
        if !blocked_sources.is_empty() {
            info!("blocked source domains: {:?}", blocked_sources);
        }

        Ok(Self {
            client_identities,
            cookie_file,
            blocked_sources,
        })
    }

    pub fn is_blocked_source(&self, input: &str) -> bool {
        let Some(host) = Url::parse(input)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        else {
            return false;
        };

        self.blocked_sources
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
    }
}

/// Cookie jar resolution order: an explicit `COOKIES_FILE` path wins; else
/// inline `COOKIES_CONTENT` text is materialized to a process-lifetime file
/// under the system temp directory; else no cookies are used.
fn resolve_cookie_file() -> Result<Option<PathBuf>, ApiError> {
    if let Some(path) = std::env::var("COOKIES_FILE")
        .ok()
        .and_then(|value| non_empty(&value).map(ToString::to_string))
    {
        return Ok(Some(PathBuf::from(path)));
    }

    let Some(raw) = std::env::var("COOKIES_CONTENT")
        .ok()
        .and_then(|value| non_empty(&value).map(ToString::to_string))
    else {
        return Ok(None);
    };

    let path = std::env::temp_dir().join(format!("media-relay-cookies-{}.txt", std::process::id()));
    std::fs::write(&path, normalize_cookie_text(&raw)).map_err(|error| {
        ApiError::internal(format!("could not materialize cookie file: {error}"))
    })?;
    warn!("inline cookies materialized to {}", path.display());
    Ok(Some(path))
}

/// Inline cookie text often arrives with literal backslash escapes from the
/// deployment environment. Turn them back into real newlines and tabs.
pub fn normalize_cookie_text(raw: &str) -> String {
    raw.replace("\\n", "\n").replace("\\t", "\t")
}

fn read_list_env(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|value| parse_list(&value))
}

pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}
