// src/tracker/tailer.rs

//! Per-job stdout follower.
//!
//! A [`LogTailer`] reads one job's append-only output stream line by line
//! and forwards each line as a [`TailEvent::Line`]. Lines that already
//! existed when the tailer attached are tagged `live = false`; once the
//! reader reaches the end of the stream for the first time every later line
//! is `live = true`. Read errors are retried by reopening the stream at the
//! last consumed offset; when retries run out the tailer emits
//! [`TailEvent::Closed`] and stops.

use std::fmt::Debug;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::types::JobId;

/// Events flowing from tailers into the registry's line consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    /// One complete line, without its line terminator.
    Line { id: JobId, text: String, live: bool },
    /// The stream failed permanently; the job should be dropped.
    Closed { id: JobId },
}

/// Resolves the output stream of a job.
pub trait StreamLocator: Send + Sync + Debug {
    fn stream_path(&self, id: JobId) -> PathBuf;
}

/// Production locator: the process's stdout as exposed by procfs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcFdLocator;

impl StreamLocator for ProcFdLocator {
    fn stream_path(&self, id: JobId) -> PathBuf {
        PathBuf::from(format!("/proc/{id}/fd/1"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TailerOptions {
    /// Sleep between end-of-stream checks.
    pub poll_interval: Duration,
    /// Sleep before reopening after a read error.
    pub retry_backoff: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_retries: u32,
}

impl Default for TailerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(30),
            max_retries: 5,
        }
    }
}

impl From<&TrackerConfig> for TailerOptions {
    fn from(cfg: &TrackerConfig) -> Self {
        Self {
            poll_interval: cfg.tail_poll_interval,
            retry_backoff: cfg.tail_retry_backoff,
            max_retries: cfg.tail_max_retries,
        }
    }
}

/// Whether the reader is still replaying pre-existing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    CatchingUp,
    Live,
}

/// Why a read pass ended without an I/O error.
enum PassEnd {
    /// Nobody is listening any more.
    ReceiverGone,
}

#[derive(Debug)]
pub struct LogTailer {
    id: JobId,
    path: PathBuf,
    options: TailerOptions,
    state: ReaderState,
    offset: u64,
    pending: Vec<u8>,
    failures: u32,
}

impl LogTailer {
    pub fn new(id: JobId, path: impl Into<PathBuf>, options: TailerOptions) -> Self {
        Self {
            id,
            path: path.into(),
            options,
            state: ReaderState::CatchingUp,
            offset: 0,
            pending: Vec::new(),
            failures: 0,
        }
    }

    /// Follow the stream until it fails permanently or `tx` is closed.
    ///
    /// Sends [`TailEvent::Closed`] on permanent failure.
    pub async fn run(mut self, tx: mpsc::Sender<TailEvent>) {
        info!(pid = self.id, path = %self.path.display(), "attaching to job output");

        loop {
            let err = match self.open().await {
                Ok(reader) => match self.pump(reader, &tx).await {
                    Ok(PassEnd::ReceiverGone) => {
                        debug!(pid = self.id, "line receiver closed; tailer stopping");
                        return;
                    }
                    Err(e) => e,
                },
                Err(e) => e,
            };

            self.failures += 1;
            if self.failures > self.options.max_retries {
                warn!(
                    pid = self.id,
                    failures = self.failures,
                    error = %err,
                    "giving up on job output"
                );
                let _ = tx.send(TailEvent::Closed { id: self.id }).await;
                return;
            }

            warn!(
                pid = self.id,
                attempt = self.failures,
                max_retries = self.options.max_retries,
                error = %err,
                "error reading job output; retrying"
            );
            sleep(self.options.retry_backoff).await;
        }
    }

    async fn open(&self) -> Result<BufReader<File>> {
        let mut file = File::open(&self.path)
            .await
            .with_context(|| format!("opening {:?}", self.path))?;
        if self.offset > 0 {
            file.seek(SeekFrom::Start(self.offset))
                .await
                .with_context(|| format!("seeking {:?} to {}", self.path, self.offset))?;
        }
        Ok(BufReader::new(file))
    }

    /// Read until an I/O error, sleeping at end-of-stream.
    async fn pump(
        &mut self,
        mut reader: BufReader<File>,
        tx: &mpsc::Sender<TailEvent>,
    ) -> Result<PassEnd> {
        let mut chunk = Vec::new();

        loop {
            chunk.clear();
            let n = reader
                .read_until(b'\n', &mut chunk)
                .await
                .with_context(|| format!("reading {:?}", self.path))?;

            if n == 0 {
                if self.state == ReaderState::CatchingUp {
                    debug!(pid = self.id, offset = self.offset, "caught up; following live output");
                    self.state = ReaderState::Live;
                }
                sleep(self.options.poll_interval).await;
                continue;
            }

            self.offset += n as u64;
            self.failures = 0;
            self.pending.extend_from_slice(&chunk);

            if !self.pending.ends_with(b"\n") {
                // Partial line; wait for the rest.
                continue;
            }

            let raw = std::mem::take(&mut self.pending);
            let text = String::from_utf8_lossy(&raw)
                .trim_end_matches(['\r', '\n'])
                .to_string();

            let event = TailEvent::Line {
                id: self.id,
                text,
                live: self.state == ReaderState::Live,
            };
            if tx.send(event).await.is_err() {
                return Ok(PassEnd::ReceiverGone);
            }
        }
    }
}

/// Spawn a tailer task for `id` reading `path`.
pub fn spawn_tailer(
    id: JobId,
    path: PathBuf,
    options: TailerOptions,
    tx: mpsc::Sender<TailEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(LogTailer::new(id, path, options).run(tx))
}
