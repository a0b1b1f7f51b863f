// src/scheduler/runner.rs

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::exec::{run_tag, CommandBuilder, LaunchBackend};
use crate::metrics::MetricsSink;
use crate::scheduler::admission::{active_jobs, Admission, AdmissionController, Gate};
use crate::tracker::{Job, JobRegistry};

/// What one scheduler cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// `(group tag, run tag)` for every launch that started.
    pub launched: Vec<(String, String)>,
    /// Groups skipped this cycle and the gate that stopped them.
    pub blocked: Vec<(String, Gate)>,
    /// Groups whose launch command failed to start.
    pub failed: Vec<String>,
}

/// Async shell around [`AdmissionController`].
///
/// Each cycle evaluates every group against a registry snapshot and hands
/// admitted groups to the `LaunchBackend`. Only launches the backend
/// reports as started update the group's cooldown clock.
pub struct Scheduler<L: LaunchBackend> {
    controller: AdmissionController,
    commands: CommandBuilder,
    launcher: L,
    metrics: Arc<dyn MetricsSink>,
}

impl<L: LaunchBackend> fmt::Debug for Scheduler<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("controller", &self.controller)
            .field("commands", &self.commands)
            .finish_non_exhaustive()
    }
}

impl<L: LaunchBackend> Scheduler<L> {
    pub fn new(
        controller: AdmissionController,
        commands: CommandBuilder,
        launcher: L,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            controller,
            commands,
            launcher,
            metrics,
        }
    }

    pub fn controller(&self) -> &AdmissionController {
        &self.controller
    }

    /// Evaluate every group once against `jobs` at time `now`.
    pub async fn run_cycle(&mut self, jobs: &[Job], now: Instant) -> CycleReport {
        let mut report = CycleReport::default();

        for index in 0..self.controller.len() {
            let Some(group) = self.controller.group(index).cloned() else {
                continue;
            };

            for job in active_jobs(&group, jobs) {
                debug!(
                    group = %group.tag,
                    pid = job.id(),
                    phase = %job.phase(),
                    progress = job.progress(),
                    "active job"
                );
            }

            match self.controller.evaluate(index, jobs, now) {
                Admission::Blocked(gate) => {
                    info!(group = %group.tag, reason = %gate, "launch deferred");
                    report.blocked.push((group.tag.clone(), gate));
                }
                Admission::Launch => {
                    let tag = run_tag(&group.tag, Utc::now());
                    let command = self.commands.build(&group, &tag);
                    debug!(group = %group.tag, script = %command.script, "launching");

                    match self.launcher.launch(&command).await {
                        Ok(()) => {
                            self.controller.record_launch(index, now);
                            self.metrics.group_launched(&group.tag, &tag);
                            info!(group = %group.tag, run_tag = %tag, "launched new job");
                            report.launched.push((group.tag.clone(), tag));
                        }
                        Err(e) => {
                            error!(group = %group.tag, error = %e, "launch failed; cooldown unchanged");
                            report.failed.push(group.tag.clone());
                        }
                    }
                }
            }
        }

        report
    }

    /// Wait `initial_delay`, restart the start-delay clock, then run a cycle
    /// every `interval` forever.
    pub async fn run(
        mut self,
        registry: Arc<JobRegistry>,
        interval: Duration,
        initial_delay: Duration,
    ) {
        info!(
            groups = self.controller.len(),
            interval = ?interval,
            initial_delay = ?initial_delay,
            "scheduler started"
        );
        sleep(initial_delay).await;
        self.controller.reset_start(Instant::now());

        loop {
            let jobs = registry.snapshot();
            let report = self.run_cycle(&jobs, Instant::now()).await;
            debug!(
                launched = report.launched.len(),
                blocked = report.blocked.len(),
                failed = report.failed.len(),
                "scheduler cycle finished"
            );
            sleep(interval).await;
        }
    }
}

/// Spawn [`Scheduler::run`] on the runtime.
pub fn spawn_scheduler<L>(
    scheduler: Scheduler<L>,
    registry: Arc<JobRegistry>,
    interval: Duration,
    initial_delay: Duration,
) -> JoinHandle<()>
where
    L: LaunchBackend + 'static,
{
    tokio::spawn(scheduler.run(registry, interval, initial_delay))
}
