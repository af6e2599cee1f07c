//! Turns the raw extractor format list into the ranked, deduplicated set of
//! quality options shown to the caller: one progressive option per distinct
//! height, descending, plus at most one audio-only option appended last.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::Serialize;

use crate::extract::{BestFormat, FormatDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityOption {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub url: String,
    pub ext: String,
    pub size: String,
    pub kind: OptionKind,
}

/// One option per distinct height, highest bitrate within each height bucket,
/// ordered by descending height. Only progressive video+audio formats with a
/// direct URL qualify.
pub fn video_options(formats: &[FormatDescriptor]) -> Vec<QualityOption> {
    let mut best_per_height: HashMap<u32, (f64, &FormatDescriptor)> = HashMap::new();

    for format in formats {
        if !is_combined(format) {
            continue;
        }
        let Some(height) = format.height else {
            continue;
        };
        let score = video_bitrate(format);
        match best_per_height.entry(height) {
            Entry::Occupied(mut slot) => {
                // Ties go to the later entry, matching extractor output order.
                if score >= slot.get().0 {
                    slot.insert((score, format));
                }
            }
            Entry::Vacant(slot) => {
                slot.insert((score, format));
            }
        }
    }

    let mut heights: Vec<u32> = best_per_height.keys().copied().collect();
    heights.sort_unstable_by(|a, b| b.cmp(a));

    heights
        .into_iter()
        .filter_map(|height| {
            let (_, format) = best_per_height.get(&height)?;
            let url = format.url.clone()?;
            Some(QualityOption {
                label: quality_label(height),
                height: Some(height),
                url,
                ext: format.ext.clone(),
                size: approx_size(format.filesize.or(format.filesize_approx)),
                kind: OptionKind::Video,
            })
        })
        .collect()
}

/// The single audio-only option, when any qualifies: highest bitrate wins,
/// ties to the later entry.
pub fn audio_option(formats: &[FormatDescriptor]) -> Option<QualityOption> {
    let mut best: Option<(f64, &FormatDescriptor)> = None;

    for format in formats {
        if !is_audio_only(format) {
            continue;
        }
        let score = audio_bitrate(format);
        if best.as_ref().is_none_or(|(top, _)| score >= *top) {
            best = Some((score, format));
        }
    }

    let (bitrate, format) = best?;
    let url = format.url.clone()?;
    let label = if bitrate > 0.0 {
        format!("Audio Only ({}kbps)", bitrate.round() as u64)
    } else {
        "Audio Only".to_string()
    };

    Some(QualityOption {
        label,
        height: None,
        url,
        ext: format.ext.clone(),
        size: approx_size(format.filesize.or(format.filesize_approx)),
        kind: OptionKind::Audio,
    })
}

/// Generic fallback built from the extractor's own "best" pick, for pages
/// exposing no progressive video+audio format at all.
pub fn best_quality_option(best: &BestFormat) -> Option<QualityOption> {
    let url = best.url.clone()?;
    Some(QualityOption {
        label: "Best Quality".to_string(),
        height: None,
        url,
        ext: best.ext.clone(),
        size: approx_size(best.filesize.or(best.filesize_approx)),
        kind: OptionKind::Video,
    })
}

pub fn quality_label(height: u32) -> String {
    match height {
        h if h >= 2160 => "4K (2160p)".to_string(),
        h if h >= 1440 => "2K (1440p)".to_string(),
        h if h >= 1080 => "Full HD (1080p)".to_string(),
        h if h >= 720 => "HD (720p)".to_string(),
        h if h >= 480 => "SD (480p)".to_string(),
        h if h >= 360 => "360p".to_string(),
        h if h >= 240 => "240p".to_string(),
        _ => format!("{height}p"),
    }
}

fn approx_size(bytes: Option<f64>) -> String {
    let Some(bytes) = bytes else {
        return "~".to_string();
    };
    if bytes >= 1_048_576.0 {
        format!("{} MB", (bytes / 1_048_576.0).round() as u64)
    } else {
        format!("{} KB", (bytes / 1024.0).round() as u64)
    }
}

fn video_bitrate(format: &FormatDescriptor) -> f64 {
    format.tbr.or(format.vbr).unwrap_or(0.0)
}

fn audio_bitrate(format: &FormatDescriptor) -> f64 {
    format.tbr.or(format.abr).unwrap_or(0.0)
}

fn has_video(format: &FormatDescriptor) -> bool {
    matches!(format.vcodec.as_deref(), Some(value) if value != "none")
}

fn has_audio(format: &FormatDescriptor) -> bool {
    matches!(format.acodec.as_deref(), Some(value) if value != "none")
}

fn is_combined(format: &FormatDescriptor) -> bool {
    has_video(format) && has_audio(format) && format.url.is_some() && is_progressive(format)
}

fn is_audio_only(format: &FormatDescriptor) -> bool {
    !has_video(format) && has_audio(format) && format.url.is_some() && is_progressive(format)
}

/// Adaptive manifest formats need client-side segment assembly and cannot be
/// relayed as a single body, so they never become quality options.
fn is_progressive(format: &FormatDescriptor) -> bool {
    let protocol = format.protocol.to_ascii_lowercase();
    if protocol.starts_with("m3u8") || protocol.contains("dash") || protocol == "ism" {
        return false;
    }
    if let Some(url) = &format.url {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.ends_with(".m3u8") || path.ends_with(".mpd") {
            return false;
        }
    }
    true
}
