use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodically deletes regular files in `dir` older than `retention`.
#[derive(Debug, Clone)]
pub struct Sweeper {
    dir: PathBuf,
    retention: Duration,
    interval: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

impl Sweeper {
    pub fn new(dir: PathBuf, retention: Duration, interval: Duration) -> Self {
        Self {
            dir,
            retention,
            interval,
        }
    }

    /// Starts the sweep loop. The first pass runs immediately; the task ends
    /// once `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = sweep_once(&self.dir, self.retention, SystemTime::now()).await;
                        if report.removed > 0 || report.failed > 0 {
                            info!(
                                "Sweep of {:?} removed {} file(s), {} failure(s)",
                                self.dir, report.removed, report.failed
                            );
                        }
                    }
                }
            }
        })
    }
}

/// One pass over `dir`. Per-file problems are logged and skipped.
pub async fn sweep_once(dir: &Path, retention: Duration, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                warn!("Could not open temp directory for cleanup: {error}");
            }
            return report;
        }
    };

    loop {
        let maybe_entry = match entries.next_entry().await {
            Ok(value) => value,
            Err(error) => {
                warn!("Could not iterate temp directory for cleanup: {error}");
                break;
            }
        };

        let Some(entry) = maybe_entry else {
            break;
        };

        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!("Could not read metadata of {:?}: {error}", path);
                report.failed += 1;
                continue;
            }
        };

        if !metadata.is_file() {
            continue;
        }

        let modified_at = match metadata.modified() {
            Ok(value) => value,
            Err(error) => {
                warn!("Could not read modification time of {:?}: {error}", path);
                report.failed += 1;
                continue;
            }
        };

        // Clock skew can put mtime in the future; treat that as brand new.
        let age = now.duration_since(modified_at).unwrap_or(Duration::ZERO);
        if age < retention {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Cleaned up: {}", entry.file_name().to_string_lossy());
                report.removed += 1;
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => {
                warn!("Could not remove temp file {:?}: {error}", path);
                report.failed += 1;
            }
        }
    }

    report
}
