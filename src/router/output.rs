// src/router/output.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use globset::{Glob, GlobMatcher};
use tracing::{debug, error, info, warn};

use crate::config::RouterConfig;
use crate::errors::{FarmError, Result};
use crate::fs::FileSystem;
use crate::metrics::MetricsSink;
use crate::router::capacity::CapacityProbe;
use crate::router::relocate::Relocator;
use crate::router::target::OutputTarget;

/// Result of routing one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Moved into the target at this path.
    Done(PathBuf),
    /// No target had room; the file stays in staging.
    Skipped,
    /// Relocation into a target failed; the file stays in staging.
    Failed,
}

/// Outcomes of one pass over a staging directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub moved: Vec<(PathBuf, PathBuf)>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Directory scans, metadata reads, deletes and capacity queries. These are
/// all blocking calls and run on the blocking pool.
#[derive(Debug)]
struct Storage {
    target_paths: Vec<PathBuf>,
    matcher: GlobMatcher,
    prune_cutoff: Option<SystemTime>,
    fs: Arc<dyn FileSystem>,
    capacity: Arc<dyn CapacityProbe>,
}

impl Storage {
    fn is_artifact(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.matcher.is_match(Path::new(name)))
    }

    fn artifacts_in(&self, dir: &Path) -> Vec<PathBuf> {
        match self.fs.read_dir(dir) {
            Ok(entries) => entries
                .into_iter()
                .filter(|p| self.fs.is_file(p) && self.is_artifact(p))
                .collect(),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to list directory");
                Vec::new()
            }
        }
    }

    /// Check `target` for `size` bytes, pruning up to `prune_retries` times.
    fn make_room(&self, target: &Path, size: u64, prune_retries: u32) -> bool {
        let mut attempts = 0;
        loop {
            let usage = match self.capacity.usage(target) {
                Ok(usage) => usage,
                Err(e) => {
                    warn!(target = %target.display(), error = %e, "capacity query failed");
                    return false;
                }
            };

            if usage.fits(size) {
                return true;
            }
            if attempts >= prune_retries {
                debug!(target = %target.display(), attempts, "prune budget spent");
                return false;
            }
            attempts += 1;

            if self.prune_oldest().is_none() {
                return false;
            }
        }
    }

    fn prune_oldest(&self) -> Option<PathBuf> {
        let cutoff = self.prune_cutoff?;

        let oldest = self
            .target_paths
            .iter()
            .flat_map(|target| self.artifacts_in(target))
            .filter_map(|path| {
                let modified = self.fs.metadata(&path).ok()?.modified;
                (modified < cutoff).then_some((modified, path))
            })
            .min_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, path)| path)?;

        match self.fs.remove_file(&oldest) {
            Ok(()) => {
                info!(file = %oldest.display(), "pruned old artifact");
                Some(oldest)
            }
            Err(e) => {
                warn!(file = %oldest.display(), error = %e, "failed to prune artifact");
                None
            }
        }
    }
}

/// Places finished artifacts into final storage.
///
/// Targets are tried in configured order. A target is used only if its
/// exclusivity flag can be taken without waiting and the artifact fits;
/// when it does not fit, up to `prune_retries` old artifacts are deleted
/// (one per attempt, oldest first across all targets) before moving on.
#[derive(Debug)]
pub struct OutputRouter {
    targets: Vec<OutputTarget>,
    prune_retries: u32,
    storage: Arc<Storage>,
    relocator: Arc<dyn Relocator>,
    metrics: Arc<dyn MetricsSink>,
}

impl OutputRouter {
    pub fn from_config(
        cfg: &RouterConfig,
        fs: Arc<dyn FileSystem>,
        capacity: Arc<dyn CapacityProbe>,
        relocator: Arc<dyn Relocator>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        let matcher = Glob::new(&cfg.artifact_pattern)
            .map_err(|e| {
                FarmError::ConfigError(format!(
                    "invalid artifact pattern '{}': {e}",
                    cfg.artifact_pattern
                ))
            })?
            .compile_matcher();

        Ok(Self {
            targets: cfg.final_paths.iter().map(OutputTarget::new).collect(),
            prune_retries: cfg.prune_retries,
            storage: Arc::new(Storage {
                target_paths: cfg.final_paths.clone(),
                matcher,
                prune_cutoff: cfg.prune_cutoff.map(SystemTime::from),
                fs,
                capacity,
            }),
            relocator,
            metrics,
        })
    }

    pub fn targets(&self) -> &[OutputTarget] {
        &self.targets
    }

    /// Whether `path`'s file name matches the artifact pattern.
    pub fn is_artifact(&self, path: &Path) -> bool {
        self.storage.is_artifact(path)
    }

    /// Run `op` against the storage on the blocking pool. `None` means the
    /// blocking task panicked or was cancelled.
    async fn blocking<T, F>(&self, op: F) -> Option<T>
    where
        F: FnOnce(&Storage) -> T + Send + 'static,
        T: Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        match tokio::task::spawn_blocking(move || op(&storage)).await {
            Ok(value) => Some(value),
            Err(e) => {
                error!(error = %e, "storage task failed");
                None
            }
        }
    }

    /// Route one artifact.
    pub async fn move_file(&self, file: &Path) -> MoveOutcome {
        let path = file.to_path_buf();
        let size = match self.blocking(move |s| s.fs.metadata(&path)).await {
            Some(Ok(meta)) => meta.len,
            Some(Err(e)) => {
                debug!(file = %file.display(), error = %e, "artifact vanished before routing");
                return MoveOutcome::Skipped;
            }
            None => return MoveOutcome::Skipped,
        };

        for target in &self.targets {
            let Some(guard) = target.try_acquire() else {
                debug!(target = %target.path().display(), "target busy; trying next");
                continue;
            };

            let dest = guard.path().to_path_buf();
            let retries = self.prune_retries;
            let fits = self
                .blocking(move |s| s.make_room(&dest, size, retries))
                .await
                .unwrap_or(false);
            if !fits {
                continue;
            }

            info!(
                file = %file.display(),
                target = %guard.path().display(),
                size,
                "moving artifact"
            );
            return match self.relocator.relocate(file, guard.path()).await {
                Ok(()) => {
                    info!(file = %file.display(), target = %guard.path().display(), "artifact moved");
                    MoveOutcome::Done(guard.path().to_path_buf())
                }
                Err(e) => {
                    error!(
                        file = %file.display(),
                        target = %guard.path().display(),
                        error = %e,
                        "relocation failed; leaving artifact in staging"
                    );
                    MoveOutcome::Failed
                }
            };
        }

        warn!(file = %file.display(), size, "no target has room; leaving artifact in staging");
        MoveOutcome::Skipped
    }

    /// Delete the single oldest artifact older than the prune cutoff across
    /// all targets. Returns the deleted path.
    pub async fn prune_oldest(&self) -> Option<PathBuf> {
        self.blocking(Storage::prune_oldest).await.flatten()
    }

    /// Route every artifact currently in `staging`, then report per-target
    /// artifact counts.
    pub async fn poll_staging(&self, staging: &Path) -> PollReport {
        let mut report = PollReport::default();
        let dir = staging.to_path_buf();
        let mut files = self
            .blocking(move |s| s.artifacts_in(&dir))
            .await
            .unwrap_or_default();
        files.sort();

        for file in files {
            match self.move_file(&file).await {
                MoveOutcome::Done(target) => report.moved.push((file, target)),
                MoveOutcome::Skipped => report.skipped.push(file),
                MoveOutcome::Failed => report.failed.push(file),
            }
        }

        self.report_counts().await;
        report
    }

    pub async fn report_counts(&self) {
        let counts = self
            .blocking(|s| {
                s.target_paths
                    .iter()
                    .map(|dir| (dir.clone(), s.artifacts_in(dir).len()))
                    .collect::<Vec<_>>()
            })
            .await
            .unwrap_or_default();

        for (dir, count) in counts {
            self.metrics.artifact_count(&dir, count);
        }
    }
}
