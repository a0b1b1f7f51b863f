// src/metrics.rs

//! One-way metrics sink.
//!
//! The tracker, scheduler and router push values into a [`MetricsSink`];
//! nothing is ever read back. Exposition (HTTP, registry) is the sink's
//! business. The production sink, [`LogMetrics`], turns every value into a
//! structured `tracing` event under the `plotfarm::metrics` target.

use std::fmt::Debug;
use std::path::Path;

use tracing::info;

use crate::tracker::job::{Job, PhaseSample};
use crate::tracker::rules::Field;
use crate::types::JobId;

pub trait MetricsSink: Send + Sync + Debug {
    /// Per-job phase/table/progress gauge.
    fn job_progress(&self, job: &Job);

    /// A phase-duration sample was recorded for `job`.
    fn phase_duration(&self, job: &Job, sample: &PhaseSample);

    /// `job` finished a run.
    fn job_completed(&self, job: &Job);

    /// `id` left the registry; its gauges should stop reporting.
    fn job_cleared(&self, id: JobId);

    /// A job was launched for `group`.
    fn group_launched(&self, group: &str, run_tag: &str);

    /// Number of artifacts currently stored in `dir`.
    fn artifact_count(&self, dir: &Path, count: usize);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogMetrics;

impl MetricsSink for LogMetrics {
    fn job_progress(&self, job: &Job) {
        info!(
            target: "plotfarm::metrics",
            metric = "plotter_state",
            pid = job.id(),
            phase = %job.phase(),
            table = job.field(Field::Table).unwrap_or("0"),
            tag = %job.tag(),
            value = job.progress()
        );
    }

    fn phase_duration(&self, job: &Job, sample: &PhaseSample) {
        info!(
            target: "plotfarm::metrics",
            metric = "phase_timings",
            pid = job.id(),
            id = job.field(Field::PlotId).unwrap_or(""),
            drive = job.field(Field::TempDrive).unwrap_or(""),
            phase = %sample.phase,
            run = sample.run,
            value = sample.duration.as_secs_f64()
        );
    }

    fn job_completed(&self, job: &Job) {
        info!(
            target: "plotfarm::metrics",
            metric = "completed_plots",
            pid = job.id(),
            tag = %job.tag(),
            id = job.field(Field::PlotId).unwrap_or(""),
            value = job.completions()
        );
    }

    fn job_cleared(&self, id: JobId) {
        info!(target: "plotfarm::metrics", metric = "plotter_state", pid = id, "cleared");
    }

    fn group_launched(&self, group: &str, run_tag: &str) {
        info!(
            target: "plotfarm::metrics",
            metric = "plotter_launches",
            group,
            run_tag,
            value = 1
        );
    }

    fn artifact_count(&self, dir: &Path, count: usize) {
        info!(
            target: "plotfarm::metrics",
            metric = "plot_count",
            path = %dir.display(),
            value = count
        );
    }
}

/// Drops everything; used when `[farm].metrics_enabled = false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn job_progress(&self, _job: &Job) {}
    fn phase_duration(&self, _job: &Job, _sample: &PhaseSample) {}
    fn job_completed(&self, _job: &Job) {}
    fn job_cleared(&self, _id: JobId) {}
    fn group_launched(&self, _group: &str, _run_tag: &str) {}
    fn artifact_count(&self, _dir: &Path, _count: usize) {}
}
