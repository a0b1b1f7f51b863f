// src/scheduler/admission.rs

//! Pure admission control.
//!
//! [`AdmissionController`] holds the launch groups and their mutable
//! `last_launched_at` timestamps. It never touches the clock or the
//! filesystem: every decision takes the job snapshot and `now` explicitly,
//! which keeps the gates deterministic under test.

use std::fmt;
use std::time::{Duration, Instant};

use crate::config::GroupConfig;
use crate::tracker::Job;

/// A reason a group may not launch this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// The scheduler has not been running for the group's `start_delay`.
    StartDelay { remaining: Duration },
    /// The group already has `cap` active jobs.
    Concurrency { active: usize, cap: usize },
    /// The group already has `cap` jobs in phase 1.
    Phase1 { in_phase1: usize, cap: usize },
    /// The last launch was less than `cooldown` ago.
    Cooldown { remaining: Duration },
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::StartDelay { remaining } => {
                write!(f, "start delay not reached ({}s left)", remaining.as_secs())
            }
            Gate::Concurrency { active, cap } => {
                write!(f, "max plotters reached [{active}/{cap}]")
            }
            Gate::Phase1 { in_phase1, cap } => {
                write!(f, "max phase 1 plotters reached [{in_phase1}/{cap}]")
            }
            Gate::Cooldown { remaining } => {
                write!(f, "cooldown not reached ({}s left)", remaining.as_secs())
            }
        }
    }
}

/// Outcome of evaluating one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Launch,
    Blocked(Gate),
}

/// Active jobs attributed to a group, split by phase class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupLoad {
    pub active: usize,
    pub in_phase1: usize,
}

impl GroupLoad {
    /// Count the snapshot jobs whose group key is `group.temp_path`.
    pub fn of(group: &GroupConfig, jobs: &[Job]) -> Self {
        active_jobs(group, jobs).fold(Self::default(), |mut load, job| {
            load.active += 1;
            if job.phase() == "1" {
                load.in_phase1 += 1;
            }
            load
        })
    }
}

/// Snapshot jobs attributed to `group`.
pub fn active_jobs<'a>(group: &'a GroupConfig, jobs: &'a [Job]) -> impl Iterator<Item = &'a Job> {
    jobs.iter()
        .filter(move |job| job.group_key().as_deref() == Some(group.temp_path.as_path()))
}

#[derive(Debug, Clone)]
struct GroupState {
    config: GroupConfig,
    last_launched_at: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct AdmissionController {
    groups: Vec<GroupState>,
    started_at: Instant,
}

impl AdmissionController {
    pub fn new(groups: Vec<GroupConfig>, started_at: Instant) -> Self {
        Self {
            groups: groups
                .into_iter()
                .map(|config| GroupState {
                    config,
                    last_launched_at: None,
                })
                .collect(),
            started_at,
        }
    }

    /// Restart the start-delay clock.
    pub fn reset_start(&mut self, started_at: Instant) {
        self.started_at = started_at;
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group(&self, index: usize) -> Option<&GroupConfig> {
        self.groups.get(index).map(|g| &g.config)
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupConfig> {
        self.groups.iter().map(|g| &g.config)
    }

    pub fn last_launched_at(&self, index: usize) -> Option<Instant> {
        self.groups.get(index).and_then(|g| g.last_launched_at)
    }

    /// Run the gates for group `index` in order, stopping at the first one
    /// that blocks.
    ///
    /// Unknown indices are treated as blocked by concurrency with a zero cap.
    pub fn evaluate(&self, index: usize, jobs: &[Job], now: Instant) -> Admission {
        let Some(state) = self.groups.get(index) else {
            return Admission::Blocked(Gate::Concurrency { active: 0, cap: 0 });
        };
        let group = &state.config;

        let running_for = now.saturating_duration_since(self.started_at);
        if running_for < group.start_delay {
            return Admission::Blocked(Gate::StartDelay {
                remaining: group.start_delay - running_for,
            });
        }

        let load = GroupLoad::of(group, jobs);
        if load.active >= group.max_active {
            return Admission::Blocked(Gate::Concurrency {
                active: load.active,
                cap: group.max_active,
            });
        }

        if load.in_phase1 >= group.max_phase1 {
            return Admission::Blocked(Gate::Phase1 {
                in_phase1: load.in_phase1,
                cap: group.max_phase1,
            });
        }

        if let Some(last) = state.last_launched_at {
            let since = now.saturating_duration_since(last);
            if since < group.cooldown {
                return Admission::Blocked(Gate::Cooldown {
                    remaining: group.cooldown - since,
                });
            }
        }

        Admission::Launch
    }

    /// Record a successful launch. Failed launches must not be recorded.
    pub fn record_launch(&mut self, index: usize, now: Instant) {
        if let Some(state) = self.groups.get_mut(index) {
            state.last_launched_at = Some(now);
        }
    }
}
