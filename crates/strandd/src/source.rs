//! Local unit source — feeds files from a directory into the strand as
//! opaque payload units, in lexical order, at a configured pace.
//!
//! What the bytes are (frames, segments, anything) is the consumer's
//! business; the relay never inspects them.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};

use strand_core::config::SourceConfig;

pub struct UnitSource {
    files: Vec<PathBuf>,
}

impl UnitSource {
    /// Scan the configured directory. Errors here are the "source
    /// acquisition failure" case: the caller logs and continues in
    /// pure-relay mode.
    pub async fn open(config: &SourceConfig) -> Result<Self> {
        let dir = config.path.clone();
        let mut files = Vec::new();

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("failed to open source directory {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        if files.is_empty() {
            bail!("source directory {} holds no files", dir.display());
        }

        tracing::info!(dir = %dir.display(), units = files.len(), "source ready");
        Ok(Self { files })
    }

    /// Originate one unit per file, then close the origin channel so the
    /// node emits the end-of-stream marker.
    pub async fn run(
        self,
        interval: Duration,
        origin_tx: mpsc::Sender<Bytes>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        for path in self.files {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("source shutting down");
                    return;
                }

                _ = ticker.tick() => {
                    let bytes = match tokio::fs::read(&path).await {
                        Ok(b) => Bytes::from(b),
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "unreadable unit, skipping");
                            continue;
                        }
                    };
                    tracing::debug!(path = %path.display(), bytes = bytes.len(), "originating unit");
                    if origin_tx.send(bytes).await.is_err() {
                        return;
                    }
                }
            }
        }
        tracing::info!("source exhausted, ending stream");
        // origin_tx drops here; the node emits STREAM_END
    }
}
