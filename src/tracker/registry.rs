// src/tracker/registry.rs

//! Job registry: the single owner of all tracked job state.
//!
//! Locking is two-level:
//! - one coarse lock over the id -> slot map, held only for membership
//!   changes and to clone slot handles;
//! - one lock per job, held while a line is applied to that job.
//!
//! The coarse lock is never held while a per-job lock is taken, so
//! independent jobs update in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics::MetricsSink;
use crate::tracker::job::Job;
use crate::tracker::rules::RuleTable;
use crate::tracker::tailer::{spawn_tailer, StreamLocator, TailEvent, TailerOptions};
use crate::types::JobId;

/// Starts a tailer for each newly discovered job.
#[derive(Debug, Clone)]
pub struct TailerSpawner {
    locator: Arc<dyn StreamLocator>,
    options: TailerOptions,
    tx: mpsc::Sender<TailEvent>,
}

impl TailerSpawner {
    pub fn new(
        locator: Arc<dyn StreamLocator>,
        options: TailerOptions,
        tx: mpsc::Sender<TailEvent>,
    ) -> Self {
        Self {
            locator,
            options,
            tx,
        }
    }

    fn spawn(&self, id: JobId) -> JoinHandle<()> {
        spawn_tailer(
            id,
            self.locator.stream_path(id),
            self.options,
            self.tx.clone(),
        )
    }
}

#[derive(Debug)]
struct JobSlot {
    job: Mutex<Job>,
    tailer: Option<JoinHandle<()>>,
}

impl JobSlot {
    fn lock(&self) -> MutexGuard<'_, Job> {
        // A panic while holding a job lock leaves the job readable.
        self.job.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.tailer.take() {
            handle.abort();
        }
    }
}

#[derive(Debug)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, Arc<JobSlot>>>,
    rules: &'static RuleTable,
    metrics: Arc<dyn MetricsSink>,
    tailers: Option<TailerSpawner>,
}

impl JobRegistry {
    /// Registry that does not attach tailers; lines are fed via [`update`].
    ///
    /// [`update`]: JobRegistry::update
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            rules: RuleTable::standard(),
            metrics,
            tailers: None,
        }
    }

    /// Registry that starts a tailer for every discovered job.
    pub fn with_tailers(metrics: Arc<dyn MetricsSink>, tailers: TailerSpawner) -> Self {
        Self {
            tailers: Some(tailers),
            ..Self::new(metrics)
        }
    }

    fn members(&self) -> MutexGuard<'_, HashMap<JobId, Arc<JobSlot>>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot(&self, id: JobId) -> Option<Arc<JobSlot>> {
        self.members().get(&id).cloned()
    }

    /// Track every id not tracked yet. Returns the newly created ids.
    ///
    /// New jobs start at `phase = "init"`, `table = "0"`.
    pub fn discover<I>(&self, ids: I) -> Vec<JobId>
    where
        I: IntoIterator<Item = JobId>,
    {
        let now = Instant::now();
        let mut created = Vec::new();
        let mut members = self.members();

        for id in ids {
            if members.contains_key(&id) {
                continue;
            }

            let tailer = self.tailers.as_ref().map(|t| t.spawn(id));
            members.insert(
                id,
                Arc::new(JobSlot {
                    job: Mutex::new(Job::new(id, now)),
                    tailer,
                }),
            );
            created.push(id);
        }
        drop(members);

        if !created.is_empty() {
            info!(pids = ?created, "started monitoring jobs");
        }
        created
    }

    /// Apply one line to a job. Returns false when `id` is not tracked.
    pub fn update(&self, id: JobId, line: &str, live: bool) -> bool {
        let Some(slot) = self.slot(id) else {
            debug!(pid = id, "line for untracked job dropped");
            return false;
        };

        let mut job = slot.lock();
        let effects = job.apply_line(self.rules, line, live, Instant::now());

        if live {
            if let Some(sample) = &effects.sample {
                self.metrics.phase_duration(&job, sample);
            }
            if effects.completed {
                info!(pid = id, completions = job.completions(), "job finished a run");
                self.metrics.job_completed(&job);
            }
            if effects.touched_progress() {
                self.metrics.job_progress(&job);
            }
        }
        true
    }

    /// Drop a job and stop its tailer. Returns false when `id` was unknown.
    pub fn remove(&self, id: JobId) -> bool {
        let removed = self.members().remove(&id);
        match removed {
            Some(_slot) => {
                info!(pid = id, "stopped monitoring job");
                self.metrics.job_cleared(id);
                true
            }
            None => false,
        }
    }

    /// Evict every job whose last parsed line is older than `max_idle`.
    pub fn sweep(&self, max_idle: Duration) -> Vec<JobId> {
        self.sweep_at(Instant::now(), max_idle)
    }

    /// [`sweep`](JobRegistry::sweep) against an explicit clock reading.
    pub fn sweep_at(&self, now: Instant, max_idle: Duration) -> Vec<JobId> {
        let slots: Vec<(JobId, Arc<JobSlot>)> = self
            .members()
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect();

        let stale: Vec<JobId> = slots
            .into_iter()
            .filter(|(_, slot)| now.saturating_duration_since(slot.lock().last_seen()) > max_idle)
            .map(|(id, _)| id)
            .collect();

        let mut removed = Vec::new();
        for id in stale {
            warn!(pid = id, idle = ?max_idle, "evicting job after inactivity");
            if self.remove(id) {
                removed.push(id);
            }
        }
        removed
    }

    /// Copy of every tracked job, ordered by id.
    pub fn snapshot(&self) -> Vec<Job> {
        let slots: Vec<Arc<JobSlot>> = self.members().values().cloned().collect();
        let mut jobs: Vec<Job> = slots.iter().map(|slot| slot.lock().clone()).collect();
        jobs.sort_by_key(Job::id);
        jobs
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.slot(id).map(|slot| slot.lock().clone())
    }

    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members().is_empty()
    }
}

/// Drain tailer events into the registry. Lines for one job arrive in file
/// order because each job has exactly one tailer and the channel is FIFO.
pub fn spawn_line_consumer(
    registry: Arc<JobRegistry>,
    mut rx: mpsc::Receiver<TailEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("line consumer started");
        while let Some(event) = rx.recv().await {
            match event {
                TailEvent::Line { id, text, live } => {
                    registry.update(id, &text, live);
                }
                TailEvent::Closed { id } => {
                    registry.remove(id);
                }
            }
        }
        debug!("line consumer finished (channel closed)");
    })
}
