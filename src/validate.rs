//! Request payloads and the URL shape check that runs before any extractor
//! process is started.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recognized hosting URL shapes. Scheme and `www.` are optional and a
/// trailing query string is tolerated.
static VIDEO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.)?(youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/|youtube\.com/shorts/)([\w-]+)([?&].*)?$",
    )
    .expect("video url pattern compiles")
});

pub const DEFAULT_QUALITY: &str = "best";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("URL is required")]
    MissingUrl,
    #[error("Please provide a valid YouTube URL")]
    UnsupportedUrl,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    #[default]
    Video,
    Audio,
}

impl MediaFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

/// Body of both `/api/videos/info` and `/api/download`. The info endpoint
/// only looks at `url`.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub format: MediaFormat,
    #[serde(default = "default_quality")]
    pub quality: String,
}

fn default_quality() -> String {
    DEFAULT_QUALITY.to_string()
}

impl DownloadRequest {
    /// Validates the URL and returns the form handed to the extractor.
    pub fn validated_url(&self) -> Result<String, ValidationError> {
        validate_video_url(&self.url)?;
        Ok(normalize_video_url(&self.url))
    }

    /// Blank quality strings mean the same thing as an omitted one.
    pub fn quality(&self) -> &str {
        let trimmed = self.quality.trim();
        if trimmed.is_empty() {
            DEFAULT_QUALITY
        } else {
            trimmed
        }
    }
}

pub fn validate_video_url(url: &str) -> Result<(), ValidationError> {
    if url.trim().is_empty() {
        return Err(ValidationError::MissingUrl);
    }
    if !VIDEO_URL.is_match(url) {
        return Err(ValidationError::UnsupportedUrl);
    }
    Ok(())
}

/// Shorts links are rewritten to the plain watch form, which the extractor
/// handles more reliably. Everything else passes through untouched.
pub fn normalize_video_url(url: &str) -> String {
    let Some(captures) = VIDEO_URL.captures(url) else {
        return url.to_string();
    };
    match (captures.get(3), captures.get(4)) {
        (Some(kind), Some(id)) if kind.as_str() == "youtube.com/shorts/" => {
            format!("https://www.youtube.com/watch?v={}", id.as_str())
        }
        _ => url.to_string(),
    }
}
