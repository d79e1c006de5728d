// Single-file media downloader: streams to a partial file and retries with a fixed delay.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::stats::StatsCollector;
use crate::config::PARTIAL_FILE_SUFFIX;
use crate::error::CacheError;
use crate::source::traits::MediaSource;

pub struct Downloader {
    source: Arc<dyn MediaSource>,
    stats: Arc<StatsCollector>,
    max_attempts: u32,
    retry_delay: Duration,
    shutdown_token: CancellationToken,
}

impl Downloader {
    pub fn new(
        source: Arc<dyn MediaSource>,
        stats: Arc<StatsCollector>,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            source,
            stats,
            max_attempts: max_attempts.max(1),
            retry_delay,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Stop retrying and abandon transfers that are waiting between attempts.
    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Path of the in-progress file for `target`.
    pub fn partial_path(target: &Path) -> PathBuf {
        let mut name = target.as_os_str().to_owned();
        name.push(PARTIAL_FILE_SUFFIX);
        PathBuf::from(name)
    }

    /// Download `url` into `target`, retrying up to the attempt bound.
    ///
    /// `target` only ever appears once a complete body has been written.
    pub async fn fetch_with_retry<F>(
        &self,
        key: &str,
        url: &str,
        target: &Path,
        progress: F,
    ) -> Result<u64, CacheError>
    where
        F: Fn(f32) + Send + Sync,
    {
        let partial = Self::partial_path(target);
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            if self.shutdown_token.is_cancelled() {
                return Err(self.failed(key, attempt - 1, "cache shut down"));
            }

            self.stats.record_attempt();
            match self.fetch_once(url, &partial, &progress).await {
                Ok(bytes) => {
                    fs::rename(&partial, target).await?;
                    self.stats.record_downloaded(bytes);
                    info!("{} downloaded ({} bytes, attempt {})", key, bytes, attempt);
                    return Ok(bytes);
                }
                Err(e) => {
                    let _ = fs::remove_file(&partial).await;
                    last_error = e.to_string();

                    if attempt < self.max_attempts {
                        warn!("{} download failed (attempt {}): {}", key, attempt, e);
                        tokio::select! {
                            _ = tokio::time::sleep(self.retry_delay) => {}
                            _ = self.shutdown_token.cancelled() => {
                                debug!("{} retry abandoned: shutdown", key);
                                return Err(self.failed(key, attempt, "cache shut down"));
                            }
                        }
                    } else {
                        warn!(
                            "{} download failed after {} attempts: {}",
                            key, self.max_attempts, e
                        );
                    }
                }
            }
        }

        self.stats.record_failure();
        Err(self.failed(key, self.max_attempts, &last_error))
    }

    fn failed(&self, key: &str, attempts: u32, reason: &str) -> CacheError {
        CacheError::DownloadFailed {
            key: key.to_string(),
            attempts,
            reason: reason.to_string(),
        }
    }

    async fn fetch_once(
        &self,
        url: &str,
        partial: &Path,
        progress: &(dyn Fn(f32) + Send + Sync),
    ) -> Result<u64> {
        let mut body = self.source.open(url).await?;
        let expected = body.content_length().filter(|len| *len > 0);

        let mut file = File::create(partial).await?;
        let mut written = 0u64;
        progress(0.0);

        while let Some(chunk) = body.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            if let Some(total) = expected {
                progress((written as f64 / total as f64).min(1.0) as f32);
            }
        }
        file.flush().await?;
        file.sync_all().await?;

        if written == 0 {
            return Err(anyhow!("empty response body"));
        }
        if let Some(total) = expected {
            if written != total {
                return Err(anyhow!(
                    "truncated body: received {} of {} bytes",
                    written,
                    total
                ));
            }
        }

        progress(1.0);
        Ok(written)
    }
}
