//! Recording fakes for the farm's collaborators.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use plotfarm::errors::Result;
use plotfarm::exec::{LaunchBackend, LaunchCommand};
use plotfarm::fs::MockFileSystem;
use plotfarm::metrics::MetricsSink;
use plotfarm::router::{CapacityProbe, DriveUsage, Relocator};
use plotfarm::tracker::{Job, PhaseSample, ProcessDiscovery, StreamLocator};
use plotfarm::types::JobId;

/// Launch backend that records every command instead of running it.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    launched: Arc<Mutex<Vec<LaunchCommand>>>,
    fail: Arc<Mutex<bool>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following launch fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn launched(&self) -> Vec<LaunchCommand> {
        self.launched.lock().unwrap().clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launched.lock().unwrap().len()
    }
}

impl LaunchBackend for FakeLauncher {
    fn launch<'a>(
        &'a mut self,
        command: &'a LaunchCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if *self.fail.lock().unwrap() {
                return Err(anyhow::anyhow!("fake launch failure for {}", command.group).into());
            }
            self.launched.lock().unwrap().push(command.clone());
            Ok(())
        })
    }
}

/// One recorded metric call.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    Progress { id: JobId, value: f64 },
    PhaseDuration { id: JobId, sample: PhaseSample },
    Completed { id: JobId, completions: u32 },
    Cleared { id: JobId },
    Launched { group: String, run_tag: String },
    ArtifactCount { dir: PathBuf, count: usize },
}

/// Metrics sink that keeps every call for later inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingMetrics {
    events: Arc<Mutex<Vec<MetricEvent>>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: MetricEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl MetricsSink for RecordingMetrics {
    fn job_progress(&self, job: &Job) {
        self.push(MetricEvent::Progress {
            id: job.id(),
            value: job.progress(),
        });
    }

    fn phase_duration(&self, job: &Job, sample: &PhaseSample) {
        self.push(MetricEvent::PhaseDuration {
            id: job.id(),
            sample: sample.clone(),
        });
    }

    fn job_completed(&self, job: &Job) {
        self.push(MetricEvent::Completed {
            id: job.id(),
            completions: job.completions(),
        });
    }

    fn job_cleared(&self, id: JobId) {
        self.push(MetricEvent::Cleared { id });
    }

    fn group_launched(&self, group: &str, run_tag: &str) {
        self.push(MetricEvent::Launched {
            group: group.to_string(),
            run_tag: run_tag.to_string(),
        });
    }

    fn artifact_count(&self, dir: &Path, count: usize) {
        self.push(MetricEvent::ArtifactCount {
            dir: dir.to_path_buf(),
            count,
        });
    }
}

/// Capacity probe with a settable `available` per path. Unknown paths
/// fail, like an unmounted drive.
#[derive(Debug, Clone, Default)]
pub struct FakeCapacity {
    available: Arc<Mutex<HashMap<PathBuf, u64>>>,
    queries: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeCapacity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, path: impl AsRef<Path>, bytes: u64) {
        self.available
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), bytes);
    }

    pub fn queries(&self) -> Vec<PathBuf> {
        self.queries.lock().unwrap().clone()
    }
}

impl CapacityProbe for FakeCapacity {
    fn usage(&self, path: &Path) -> anyhow::Result<DriveUsage> {
        self.queries.lock().unwrap().push(path.to_path_buf());
        let available = self
            .available
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no such drive: {:?}", path))?;
        Ok(DriveUsage::new(available * 2, available, available))
    }
}

/// Relocator that moves entries inside a `MockFileSystem` and records
/// every move. Optionally fails, and can track how many moves target each
/// directory at once.
#[derive(Debug, Clone, Default)]
pub struct MockRelocator {
    fs: MockFileSystem,
    moves: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
    in_flight: Arc<Mutex<HashMap<PathBuf, usize>>>,
    max_in_flight: Arc<Mutex<usize>>,
    fail: bool,
    delay: Option<std::time::Duration>,
}

impl MockRelocator {
    pub fn new(fs: MockFileSystem) -> Self {
        Self {
            fs,
            ..Self::default()
        }
    }

    pub fn failing(fs: MockFileSystem) -> Self {
        Self {
            fail: true,
            ..Self::new(fs)
        }
    }

    /// Hold every move open for `delay` so concurrent moves overlap.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn moves(&self) -> Vec<(PathBuf, PathBuf)> {
        self.moves.lock().unwrap().clone()
    }

    /// Highest number of simultaneous moves into any single directory.
    pub fn max_concurrent_per_target(&self) -> usize {
        *self.max_in_flight.lock().unwrap()
    }
}

impl Relocator for MockRelocator {
    fn relocate<'a>(
        &'a self,
        src: &'a Path,
        dest_dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail {
                anyhow::bail!("fake relocation failure for {:?}", src);
            }

            {
                let mut in_flight = self.in_flight.lock().unwrap();
                let n = in_flight.entry(dest_dir.to_path_buf()).or_insert(0);
                *n += 1;
                let mut max = self.max_in_flight.lock().unwrap();
                *max = (*max).max(*n);
            }

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let result = self.fs.move_file(src, dest_dir);

            if let Some(n) = self.in_flight.lock().unwrap().get_mut(dest_dir) {
                *n -= 1;
            }

            result?;
            self.moves
                .lock()
                .unwrap()
                .push((src.to_path_buf(), dest_dir.to_path_buf()));
            Ok(())
        })
    }
}

/// Discovery that returns whatever ids the test has set.
#[derive(Debug, Clone, Default)]
pub struct FakeDiscovery {
    ids: Arc<Mutex<Vec<JobId>>>,
}

impl FakeDiscovery {
    pub fn new(ids: Vec<JobId>) -> Self {
        Self {
            ids: Arc::new(Mutex::new(ids)),
        }
    }

    pub fn set(&self, ids: Vec<JobId>) {
        *self.ids.lock().unwrap() = ids;
    }
}

impl ProcessDiscovery for FakeDiscovery {
    fn running_ids(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<JobId>>> + Send + '_>> {
        let ids = self.ids.lock().unwrap().clone();
        Box::pin(async move { Ok(ids) })
    }
}

/// Locates job `N`'s output at `<dir>/N.log`.
#[derive(Debug, Clone)]
pub struct DirLocator {
    dir: PathBuf,
}

impl DirLocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl StreamLocator for DirLocator {
    fn stream_path(&self, id: JobId) -> PathBuf {
        self.dir.join(format!("{id}.log"))
    }
}
