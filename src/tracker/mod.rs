// src/tracker/mod.rs

//! Job state tracking.
//!
//! - [`rules`] is the declarative table that turns stdout lines into field
//!   updates and duration markers.
//! - [`job`] holds per-job state and the progress formula.
//! - [`tailer`] follows one job's output stream (replay, then live).
//! - [`registry`] owns all jobs behind two-level locking and drains tailer
//!   output.
//! - [`discovery`] finds running worker processes and evicts idle jobs.

pub mod discovery;
pub mod job;
pub mod registry;
pub mod rules;
pub mod tailer;

pub use discovery::{spawn_discovery_loop, PgrepDiscovery, ProcessDiscovery};
pub use job::{compute_progress, Job, LineEffects, PhaseSample};
pub use registry::{spawn_line_consumer, JobRegistry, TailerSpawner};
pub use rules::{Field, Marker, MarkerKind, RuleTable};
pub use tailer::{
    spawn_tailer, LogTailer, ProcFdLocator, ReaderState, StreamLocator, TailEvent, TailerOptions,
};
