use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{process::Command, time::timeout};
use tracing::{debug, warn};

use super::{DownloadOptions, Extractor, FetchedMedia};
use crate::{error::FetchError, models::VideoInfo};

/// Adapter around the `yt-dlp` command line tool.
#[derive(Debug, Clone)]
pub struct YtDlp {
    bin: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct YtDlpVideoInfo {
    title: Option<String>,
    description: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    view_count: Option<u64>,
}

/// The subset of the post-move info dict printed by `--print after_move:%()j`.
#[derive(Debug, Deserialize)]
struct PrintedInfo {
    title: Option<String>,
    filepath: Option<String>,
}

impl YtDlp {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<std::process::Output, FetchError> {
        debug!("Running {} {:?}", self.bin, args);
        let command_future = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = timeout(self.timeout, command_future)
            .await
            .map_err(|_| FetchError::TimedOut(self.timeout.as_secs()))?
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    FetchError::ToolMissing
                } else {
                    FetchError::Backend(format!("Could not run yt-dlp: {error}"))
                }
            })?;

        if !output.status.success() {
            return Err(FetchError::Backend(run_error_message(&output.stderr)));
        }

        Ok(output)
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn fetch_info(&self, url: &str) -> Result<VideoInfo, FetchError> {
        ensure_url(url)?;
        let output = self
            .run(vec![
                "-J".to_string(),
                "--no-playlist".to_string(),
                "--no-warnings".to_string(),
                "--".to_string(),
                url.to_string(),
            ])
            .await?;

        let info: YtDlpVideoInfo = serde_json::from_slice(&output.stdout).map_err(|error| {
            FetchError::Backend(format!("Could not read metadata returned by yt-dlp: {error}"))
        })?;

        Ok(info.into())
    }

    async fn fetch_media(
        &self,
        url: &str,
        options: &DownloadOptions,
    ) -> Result<FetchedMedia, FetchError> {
        ensure_url(url)?;
        let output = self.run(build_download_args(url, options)).await?;

        let printed = extract_printed_line(&output.stdout)
            .and_then(|line| serde_json::from_str::<PrintedInfo>(&line).ok());
        let (title, printed_path) = match printed {
            Some(info) => (info.title, info.filepath),
            None => (None, None),
        };

        let path = resolve_downloaded_file(options, printed_path.as_deref()).await?;
        Ok(FetchedMedia { path, title })
    }
}

impl From<YtDlpVideoInfo> for VideoInfo {
    fn from(info: YtDlpVideoInfo) -> Self {
        let defaults = VideoInfo::default();

        Self {
            title: info
                .title
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.title),
            description: info.description.unwrap_or(defaults.description),
            thumbnail: info.thumbnail.unwrap_or(defaults.thumbnail),
            duration: info
                .duration
                .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
                .map(|seconds| seconds.round() as u64)
                .unwrap_or(defaults.duration),
            channel: info
                .uploader
                .or(info.channel)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.channel),
            view_count: info.view_count.unwrap_or(defaults.view_count),
        }
    }
}

fn ensure_url(url: &str) -> Result<(), FetchError> {
    if url.trim().is_empty() {
        return Err(FetchError::Invalid("URL parameter is required".to_string()));
    }
    Ok(())
}

fn build_download_args(url: &str, options: &DownloadOptions) -> Vec<String> {
    let mut args = vec![
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--newline".to_string(),
        "--print".to_string(),
        "after_move:%()j".to_string(),
        "-o".to_string(),
        options.output_template(),
        "-f".to_string(),
        options.format_selector.clone(),
    ];

    if let Some(container) = options.merge_output_format {
        args.push("--merge-output-format".to_string());
        args.push(container.to_string());
    }

    if let Some(audio) = &options.audio {
        args.push("-x".to_string());
        args.push("--audio-format".to_string());
        args.push(audio.codec.to_string());
        if let Some(quality) = audio.quality {
            args.push("--audio-quality".to_string());
            args.push(quality.to_string());
        }
    }

    if let Some(user_agent) = options.user_agent {
        args.push("--user-agent".to_string());
        args.push(user_agent.to_string());
    }

    for (name, value) in &options.extra_headers {
        args.push("--add-header".to_string());
        args.push(format!("{name}:{value}"));
    }

    if let Some(retries) = options.retries {
        args.push("--retries".to_string());
        args.push(retries.to_string());
    }

    if let Some(retries) = options.fragment_retries {
        args.push("--fragment-retries".to_string());
        args.push(retries.to_string());
    }

    // Keep URLs starting with '-' from being read as options.
    args.push("--".to_string());
    args.push(url.to_string());
    args
}

fn run_error_message(stderr: &[u8]) -> String {
    let message = String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp could not complete the operation")
        .to_string();

    if message.to_ascii_lowercase().contains("unsupported url") {
        "Unsupported or invalid URL for download.".to_string()
    } else {
        message
    }
}

fn extract_printed_line(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(ToString::to_string)
}

fn expected_extension(options: &DownloadOptions) -> Option<&'static str> {
    options
        .audio
        .as_ref()
        .map(|audio| audio.codec)
        .or(options.merge_output_format)
}

async fn resolve_downloaded_file(
    options: &DownloadOptions,
    printed_path: Option<&str>,
) -> Result<PathBuf, FetchError> {
    let canonical_dir = tokio::fs::canonicalize(&options.output_dir).await?;
    let prefix = options.file_prefix();

    if let Some(path_value) = printed_path {
        let path = PathBuf::from(path_value);
        if let Some(valid) = resolve_download_candidate(&canonical_dir, &prefix, &path).await? {
            return Ok(valid);
        }
    }

    let mut fallback = None;
    let mut entries = tokio::fs::read_dir(&options.output_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_partial(&path) {
            continue;
        }
        let Some(valid) = resolve_download_candidate(&canonical_dir, &prefix, &path).await? else {
            continue;
        };

        let extension = valid.extension().and_then(|ext| ext.to_str());
        if expected_extension(options).is_none() || extension == expected_extension(options) {
            return Ok(valid);
        }
        fallback.get_or_insert(valid);
    }

    fallback.ok_or_else(|| {
        FetchError::Backend(format!("Downloaded file not found for {prefix}"))
    })
}

async fn resolve_download_candidate(
    canonical_dir: &Path,
    prefix: &str,
    candidate: &Path,
) -> Result<Option<PathBuf>, FetchError> {
    let metadata = match tokio::fs::metadata(candidate).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };

    if !metadata.is_file() {
        return Ok(None);
    }

    let canonical = tokio::fs::canonicalize(candidate).await?;
    let inside_dir = canonical.parent() == Some(canonical_dir);
    let owned = canonical
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(prefix));

    if !inside_dir || !owned {
        warn!("Ignoring file outside this download's output: {:?}", canonical);
        return Ok(None);
    }

    Ok(Some(canonical))
}

fn is_partial(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("part" | "ytdl" | "temp")
    )
}
