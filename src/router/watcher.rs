// src/router/watcher.rs

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Handle for the staging watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive. Dropping this handle
/// stops watching; pollers keep running on their interval.
pub struct StagingWatcher {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for StagingWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingWatcher").finish()
    }
}

/// Whether `kind` can mean a new file in a staging directory. Content
/// writes to a file still being copied in do not count.
pub fn is_arrival(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_)))
}

/// Watch each staging directory (non-recursively) and wake its poller when
/// a file is created or renamed into it.
///
/// `wakers` maps a staging directory to the `Notify` its poller waits on.
pub fn spawn_staging_watcher(wakers: HashMap<PathBuf, Arc<Notify>>) -> Result<StagingWatcher> {
    let dirs: Vec<PathBuf> = wakers.keys().cloned().collect();
    let wakers = Arc::new(wakers);

    let mut watcher = RecommendedWatcher::new(
        {
            let wakers = Arc::clone(&wakers);
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !is_arrival(&event.kind) {
                        return;
                    }
                    for path in &event.paths {
                        let Some(dir) = path.parent() else { continue };
                        if let Some(waker) = wakers.get(dir) {
                            debug!(path = %path.display(), "staging change; waking poller");
                            waker.notify_one();
                        }
                    }
                }
                Err(err) => warn!(error = %err, "staging watch error"),
            }
        },
        Config::default(),
    )?;

    for dir in &dirs {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
    }

    info!(dirs = ?dirs, "staging watcher started");
    Ok(StagingWatcher { _inner: watcher })
}
