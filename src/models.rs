use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

/// Output container requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MediaFormat {
    #[default]
    Video,
    Audio,
}

impl MediaFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Audio => "mp3",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Video => "video/mp4",
            Self::Audio => "audio/mpeg",
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for MediaFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mp4" | "video" => Ok(Self::Video),
            "mp3" | "audio" => Ok(Self::Audio),
            _ => Err("Format must be either mp4 or mp3".to_string()),
        }
    }
}

/// Metadata surfaced by `/api/info`. Missing fields from the extractor are
/// replaced with placeholders before this is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub duration: u64,
    pub channel: String,
    pub view_count: u64,
}

impl Default for VideoInfo {
    fn default() -> Self {
        Self {
            title: "Unknown Title".to_string(),
            description: String::new(),
            thumbnail: String::new(),
            duration: 0,
            channel: "Unknown Channel".to_string(),
            view_count: 0,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum InfoResponse {
    Found {
        success: bool,
        #[serde(flatten)]
        info: VideoInfo,
    },
    Failed {
        success: bool,
        error: String,
    },
}

impl InfoResponse {
    pub fn found(info: VideoInfo) -> Self {
        Self::Found {
            success: true,
            info,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            success: false,
            error: error.into(),
        }
    }
}

/// A finished download sitting in the temp directory.
#[derive(Debug, Clone)]
pub struct DownloadedMedia {
    pub path: PathBuf,
    pub title: String,
    pub format: MediaFormat,
}

#[derive(Debug, Default, Deserialize)]
pub struct InfoParams {
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadParams {
    pub url: Option<String>,
    pub format: Option<String>,
}
