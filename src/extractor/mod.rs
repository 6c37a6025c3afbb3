// Extraction seam: everything that talks to the media backend goes through
// the `Extractor` trait so handlers and the ladder can be driven by a stub.

use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{error::FetchError, models::VideoInfo};

#[cfg(test)]
pub mod stub;
mod ytdlp;

pub use ytdlp::YtDlp;

/// Post-download audio conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConversion {
    pub codec: &'static str,
    /// Bitrate passed to the converter, e.g. `192K`. `None` keeps its default.
    pub quality: Option<&'static str>,
}

/// Everything one download attempt needs. Each attempt gets its own `id`,
/// which prefixes every file the backend writes for it.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub id: Uuid,
    pub output_dir: PathBuf,
    pub format_selector: String,
    pub merge_output_format: Option<&'static str>,
    pub audio: Option<AudioConversion>,
    pub user_agent: Option<&'static str>,
    pub extra_headers: Vec<(&'static str, &'static str)>,
    pub retries: Option<u32>,
    pub fragment_retries: Option<u32>,
}

impl DownloadOptions {
    pub fn new(id: Uuid, output_dir: PathBuf, format_selector: impl Into<String>) -> Self {
        Self {
            id,
            output_dir,
            format_selector: format_selector.into(),
            merge_output_format: None,
            audio: None,
            user_agent: None,
            extra_headers: Vec::new(),
            retries: None,
            fragment_retries: None,
        }
    }

    /// yt-dlp output template: `<dir>/<id>.%(ext)s`.
    pub fn output_template(&self) -> String {
        self.output_dir
            .join(format!("{}.%(ext)s", self.id))
            .to_string_lossy()
            .into_owned()
    }

    pub fn file_prefix(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub path: PathBuf,
    pub title: Option<String>,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Metadata only, no download.
    async fn fetch_info(&self, url: &str) -> Result<VideoInfo, FetchError>;

    /// Downloads `url` into `options.output_dir` and reports where it landed.
    async fn fetch_media(
        &self,
        url: &str,
        options: &DownloadOptions,
    ) -> Result<FetchedMedia, FetchError>;
}
