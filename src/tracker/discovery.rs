// src/tracker/discovery.rs

//! Finding running worker processes and keeping the registry in sync.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::tracker::registry::JobRegistry;
use crate::types::JobId;

/// Source of the ids of currently running worker processes.
pub trait ProcessDiscovery: Send + Sync {
    fn running_ids(&self) -> Pin<Box<dyn Future<Output = Result<Vec<JobId>>> + Send + '_>>;
}

/// Production discovery: `pgrep -f <signature>`.
#[derive(Debug, Clone)]
pub struct PgrepDiscovery {
    signature: String,
}

impl PgrepDiscovery {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
        }
    }
}

impl ProcessDiscovery for PgrepDiscovery {
    fn running_ids(&self) -> Pin<Box<dyn Future<Output = Result<Vec<JobId>>> + Send + '_>> {
        Box::pin(async move {
            let output = Command::new("pgrep")
                .arg("-f")
                .arg(&self.signature)
                .output()
                .await
                .context("running pgrep")?;

            // pgrep exits 1 when nothing matched.
            if !output.status.success() && output.status.code() != Some(1) {
                anyhow::bail!(
                    "pgrep failed ({}): {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }

            Ok(parse_pid_list(&String::from_utf8_lossy(&output.stdout)))
        })
    }
}

/// Parse newline-separated pids, skipping anything that isn't a positive id.
pub fn parse_pid_list(raw: &str) -> Vec<JobId> {
    raw.lines()
        .filter_map(|line| line.trim().parse::<JobId>().ok())
        .filter(|pid| *pid > 0)
        .collect()
}

/// Periodically discover new jobs and evict idle ones.
pub fn spawn_discovery_loop(
    registry: Arc<JobRegistry>,
    discovery: Arc<dyn ProcessDiscovery>,
    interval: Duration,
    max_idle: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match discovery.running_ids().await {
                Ok(ids) => {
                    debug!(count = ids.len(), "discovered running jobs");
                    registry.discover(ids);
                }
                Err(e) => {
                    warn!(error = %e, "process discovery failed; retrying next interval");
                }
            }

            registry.sweep(max_idle);
            sleep(interval).await;
        }
    })
}
