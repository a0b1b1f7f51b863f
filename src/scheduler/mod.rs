// src/scheduler/mod.rs

//! Admission-control scheduler.
//!
//! - [`admission`] is the pure gate logic (start delay, concurrency,
//!   phase-1 cap, cooldown), evaluated against an explicit clock.
//! - [`runner`] is the periodic async loop that launches admitted groups.

pub mod admission;
pub mod runner;

pub use admission::{active_jobs, Admission, AdmissionController, Gate, GroupLoad};
pub use runner::{spawn_scheduler, CycleReport, Scheduler};
