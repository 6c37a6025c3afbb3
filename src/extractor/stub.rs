use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;

use super::{DownloadOptions, Extractor, FetchedMedia};
use crate::{error::FetchError, models::VideoInfo};

/// What the stub does for one `fetch_media` call.
#[derive(Debug, Clone)]
pub enum Step {
    /// Writes `<id>.<ext>` into the output directory and reports it.
    Succeed { title: Option<String>, ext: String },
    /// Leaves a partial `<id>.<ext>.part` behind and fails.
    Fail(String),
}

/// Scripted extractor for tests. Unscripted download calls succeed.
#[derive(Default)]
pub struct StubExtractor {
    info: Mutex<Option<Result<VideoInfo, String>>>,
    steps: Mutex<VecDeque<Step>>,
    info_calls: AtomicUsize,
    media_calls: AtomicUsize,
    pub seen_options: Mutex<Vec<DownloadOptions>>,
}

impl StubExtractor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_info(info: Result<VideoInfo, String>) -> Arc<Self> {
        let stub = Self::default();
        *stub.info.lock().unwrap() = Some(info);
        Arc::new(stub)
    }

    pub fn with_steps(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        let stub = Self::default();
        stub.steps.lock().unwrap().extend(steps);
        Arc::new(stub)
    }

    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }

    pub fn media_calls(&self) -> usize {
        self.media_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for StubExtractor {
    async fn fetch_info(&self, _url: &str) -> Result<VideoInfo, FetchError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        match self.info.lock().unwrap().clone() {
            Some(Ok(info)) => Ok(info),
            Some(Err(message)) => Err(FetchError::Backend(message)),
            None => Ok(VideoInfo::default()),
        }
    }

    async fn fetch_media(
        &self,
        _url: &str,
        options: &DownloadOptions,
    ) -> Result<FetchedMedia, FetchError> {
        self.media_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_options.lock().unwrap().push(options.clone());

        let default_ext = options
            .audio
            .as_ref()
            .map(|audio| audio.codec)
            .or(options.merge_output_format)
            .unwrap_or("mp4")
            .to_string();
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Succeed {
            title: Some("Stub Title".to_string()),
            ext: default_ext,
        });

        match step {
            Step::Succeed { title, ext } => {
                let path = options.output_dir.join(format!("{}.{ext}", options.id));
                tokio::fs::write(&path, b"stub media bytes").await?;
                Ok(FetchedMedia { path, title })
            }
            Step::Fail(message) => {
                let partial = options.output_dir.join(format!("{}.mp4.part", options.id));
                tokio::fs::write(&partial, b"partial").await?;
                Err(FetchError::Backend(message))
            }
        }
    }
}
