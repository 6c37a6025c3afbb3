use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::FetchError,
    extractor::{AudioConversion, DownloadOptions, Extractor},
    models::{DownloadedMedia, MediaFormat},
};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const BROWSER_HEADERS: [(&str, &str); 2] = [
    ("Accept-Language", "en-US,en;q=0.9"),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    ),
];
const MAX_VIDEO_HEIGHT: u32 = 720;
const PRIMARY_RETRIES: u32 = 10;
const PRIMARY_FRAGMENT_RETRIES: u32 = 10;
const AUDIO_BITRATE: &str = "192K";
const FALLBACK_TITLE: &str = "download";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Primary,
    Fallback,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }

    pub fn options(self, format: MediaFormat, id: Uuid, output_dir: PathBuf) -> DownloadOptions {
        match (self, format) {
            (Self::Primary, MediaFormat::Video) => {
                let mut options = DownloadOptions::new(
                    id,
                    output_dir,
                    format!(
                        "bestvideo[height<={MAX_VIDEO_HEIGHT}]+bestaudio/best[height<={MAX_VIDEO_HEIGHT}]/best"
                    ),
                );
                options.merge_output_format = Some("mp4");
                with_browser_tuning(options)
            }
            (Self::Primary, MediaFormat::Audio) => {
                let mut options = DownloadOptions::new(id, output_dir, "bestaudio/best");
                options.audio = Some(AudioConversion {
                    codec: "mp3",
                    quality: Some(AUDIO_BITRATE),
                });
                with_browser_tuning(options)
            }
            (Self::Fallback, MediaFormat::Video) => {
                let mut options = DownloadOptions::new(id, output_dir, "worst[ext=mp4]/worst");
                options.merge_output_format = Some("mp4");
                options
            }
            (Self::Fallback, MediaFormat::Audio) => {
                let mut options = DownloadOptions::new(id, output_dir, "worstaudio/worst");
                options.audio = Some(AudioConversion {
                    codec: "mp3",
                    quality: None,
                });
                options
            }
        }
    }
}

fn with_browser_tuning(mut options: DownloadOptions) -> DownloadOptions {
    options.user_agent = Some(BROWSER_USER_AGENT);
    options.extra_headers = BROWSER_HEADERS.to_vec();
    options.retries = Some(PRIMARY_RETRIES);
    options.fragment_retries = Some(PRIMARY_FRAGMENT_RETRIES);
    options
}

/// Runs download attempts in order until one succeeds. Every attempt gets a
/// fresh id, and whatever a failed attempt wrote is removed before moving on.
#[derive(Clone)]
pub struct DownloadLadder {
    extractor: Arc<dyn Extractor>,
    temp_dir: PathBuf,
    strategies: Vec<Strategy>,
}

impl DownloadLadder {
    pub fn new(extractor: Arc<dyn Extractor>, temp_dir: PathBuf) -> Self {
        Self {
            extractor,
            temp_dir,
            strategies: vec![Strategy::Primary, Strategy::Fallback],
        }
    }

    pub async fn download(
        &self,
        url: &str,
        format: MediaFormat,
    ) -> Result<DownloadedMedia, FetchError> {
        let mut last_error = None;

        for strategy in &self.strategies {
            let id = Uuid::new_v4();
            let options = strategy.options(format, id, self.temp_dir.clone());
            info!("Trying {} download of {} as {}", strategy.name(), url, format);

            match self.extractor.fetch_media(url, &options).await {
                Ok(media) => {
                    info!("{} download succeeded: {:?}", strategy.name(), media.path);
                    return Ok(DownloadedMedia {
                        path: media.path,
                        title: media
                            .title
                            .filter(|title| !title.trim().is_empty())
                            .unwrap_or_else(|| FALLBACK_TITLE.to_string()),
                        format,
                    });
                }
                Err(error) => {
                    warn!("{} download failed for {}: {}", strategy.name(), url, error);
                    remove_attempt_files(&self.temp_dir, &options.file_prefix()).await;
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) if !error.is_retryable() => Err(error),
            Some(error) => Err(FetchError::Backend(format!(
                "All download attempts failed. The host may be blocking requests from this server's IP range. Last error: {error}"
            ))),
            None => Err(FetchError::Backend(
                "No download strategy is configured".to_string(),
            )),
        }
    }
}

async fn remove_attempt_files(dir: &std::path::Path, prefix: &str) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) => {
            warn!("Could not open {:?} to clean a failed attempt: {error}", dir);
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(error) => {
                warn!("Could not list {:?} to clean a failed attempt: {error}", dir);
                break;
            }
        };

        let owned = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(prefix));
        if !owned {
            continue;
        }

        if let Err(error) = tokio::fs::remove_file(entry.path()).await
            && error.kind() != ErrorKind::NotFound
        {
            warn!("Could not remove partial file {:?}: {error}", entry.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::stub::{Step, StubExtractor};

    fn file_names(dir: &std::path::Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn primary_audio_converts_at_fixed_bitrate() {
        let options = Strategy::Primary.options(MediaFormat::Audio, Uuid::new_v4(), "/t".into());
        assert_eq!(options.format_selector, "bestaudio/best");
        assert_eq!(
            options.audio,
            Some(AudioConversion {
                codec: "mp3",
                quality: Some("192K")
            })
        );
        assert_eq!(options.user_agent, Some(BROWSER_USER_AGENT));
        assert_eq!(options.retries, Some(10));
    }

    #[test]
    fn primary_video_is_capped_and_merged() {
        let options = Strategy::Primary.options(MediaFormat::Video, Uuid::new_v4(), "/t".into());
        assert!(options.format_selector.contains("height<=720"));
        assert_eq!(options.merge_output_format, Some("mp4"));
        assert!(!options.extra_headers.is_empty());
    }

    #[test]
    fn fallback_is_minimal() {
        let options = Strategy::Fallback.options(MediaFormat::Video, Uuid::new_v4(), "/t".into());
        assert_eq!(options.format_selector, "worst[ext=mp4]/worst");
        assert_eq!(options.merge_output_format, Some("mp4"));
        assert!(options.user_agent.is_none());
        assert!(options.extra_headers.is_empty());
        assert!(options.retries.is_none());
        assert!(options.audio.is_none());
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let stub = StubExtractor::new();
        let ladder = DownloadLadder::new(stub.clone(), dir.path().to_path_buf());

        let media = ladder
            .download("https://example.com/v", MediaFormat::Video)
            .await
            .unwrap();

        assert_eq!(stub.media_calls(), 1);
        assert_eq!(media.title, "Stub Title");
        assert_eq!(media.format, MediaFormat::Video);
        assert!(media.path.exists());
    }

    #[tokio::test]
    async fn primary_failure_falls_back_with_fresh_id() {
        let dir = tempfile::tempdir().unwrap();
        let stub = StubExtractor::with_steps([
            Step::Fail("HTTP Error 403: Forbidden".into()),
            Step::Succeed {
                title: Some("Recovered".into()),
                ext: "mp3".into(),
            },
        ]);
        let ladder = DownloadLadder::new(stub.clone(), dir.path().to_path_buf());

        let media = ladder
            .download("https://example.com/v", MediaFormat::Audio)
            .await
            .unwrap();

        assert_eq!(stub.media_calls(), 2);
        assert_eq!(media.title, "Recovered");

        let seen = stub.seen_options.lock().unwrap();
        assert_ne!(seen[0].id, seen[1].id);
        assert_eq!(seen[0].user_agent, Some(BROWSER_USER_AGENT));
        assert_eq!(seen[1].user_agent, None);

        // The primary attempt's partial output is gone.
        assert_eq!(file_names(dir.path()), vec![format!("{}.mp3", seen[1].id)]);
    }

    #[tokio::test]
    async fn all_failures_return_one_error_and_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let stub = StubExtractor::with_steps([
            Step::Fail("first".into()),
            Step::Fail("second".into()),
        ]);
        let ladder = DownloadLadder::new(stub.clone(), dir.path().to_path_buf());

        let error = ladder
            .download("https://example.com/v", MediaFormat::Video)
            .await
            .unwrap_err();

        assert_eq!(stub.media_calls(), 2);
        let message = error.to_string();
        assert!(message.contains("may be blocking"));
        assert!(message.contains("second"));
        assert!(file_names(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn empty_title_becomes_download() {
        let dir = tempfile::tempdir().unwrap();
        let stub = StubExtractor::with_steps([Step::Succeed {
            title: None,
            ext: "mp4".into(),
        }]);
        let ladder = DownloadLadder::new(stub, dir.path().to_path_buf());

        let media = ladder
            .download("https://example.com/v", MediaFormat::Video)
            .await
            .unwrap();
        assert_eq!(media.title, "download");
    }
}
