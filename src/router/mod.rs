// src/router/mod.rs

//! Output router: moves finished artifacts from staging directories into
//! capacity-checked final directories.
//!
//! One task per staging directory polls on an interval and is also woken
//! early by a `notify` watcher. All tasks share one [`OutputRouter`], so a
//! target's exclusivity flag is honoured across staging directories.

pub mod capacity;
pub mod relocate;
pub mod output;
pub mod target;
pub mod watcher;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub use capacity::{CapacityProbe, DriveUsage, Fs2Probe};
pub use relocate::{relocator_for, CopyRelocator, Relocator, RsyncRelocator};
pub use output::{MoveOutcome, OutputRouter, PollReport};
pub use target::{OutputTarget, TargetGuard};
pub use watcher::{is_arrival, spawn_staging_watcher, StagingWatcher};

/// Running router tasks. Dropping it stops the watcher but not the pollers.
#[derive(Debug)]
pub struct RouterHandle {
    pub pollers: Vec<JoinHandle<()>>,
    pub watcher: Option<StagingWatcher>,
}

/// Start one poller per staging directory plus the staging watcher.
///
/// A watcher that fails to start is logged; polling alone still routes
/// every artifact.
pub fn spawn_router(
    router: Arc<OutputRouter>,
    staging: Vec<PathBuf>,
    poll_interval: Duration,
) -> RouterHandle {
    let wakers: HashMap<PathBuf, Arc<Notify>> = staging
        .iter()
        .map(|dir| (dir.clone(), Arc::new(Notify::new())))
        .collect();

    let pollers = wakers
        .iter()
        .map(|(dir, waker)| {
            spawn_poller(
                Arc::clone(&router),
                dir.clone(),
                Arc::clone(waker),
                poll_interval,
            )
        })
        .collect();

    let watcher = match spawn_staging_watcher(wakers) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!(error = %e, "staging watcher unavailable; polling only");
            None
        }
    };

    RouterHandle { pollers, watcher }
}

fn spawn_poller(
    router: Arc<OutputRouter>,
    staging: PathBuf,
    wake: Arc<Notify>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(staging = %staging.display(), "router poller started");
        loop {
            let report = router.poll_staging(&staging).await;
            debug!(
                staging = %staging.display(),
                moved = report.moved.len(),
                skipped = report.skipped.len(),
                failed = report.failed.len(),
                "staging pass finished"
            );

            tokio::select! {
                _ = sleep(poll_interval) => {}
                _ = wake.notified() => {}
            }
        }
    })
}
