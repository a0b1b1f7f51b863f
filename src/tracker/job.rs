// src/tracker/job.rs

//! Per-job state and the progress formula.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::config::clean_path;
use crate::tracker::rules::{Field, Marker, MarkerKind, RuleTable};
use crate::types::JobId;

/// Phase labels that short-circuit the progress formula.
pub const PHASE_COPY: &str = "copy";
pub const PHASE_FINAL: &str = "final";
pub const PHASE_INIT: &str = "init";

const TABLES_PER_PHASE: f64 = 7.0;
const PERCENT_PER_PHASE: f64 = 30.0;
const PERCENT_PER_TABLE_BUCKETS: f64 = 4.28571428571;
const DEFAULT_BUCKET_COUNT: f64 = 128.0;

static RUN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)_\d+").expect("run tag pattern must compile"));

/// One recorded phase duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSample {
    /// `"1"`..`"4"`, `"total"` or `"copy"`.
    pub phase: String,
    /// Completed runs of this process when the sample was taken.
    pub run: u32,
    pub duration: Duration,
}

/// What a single line changed, used for metric emission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineEffects {
    /// Fields captured by extraction rules (excluding `last`).
    pub fields: Vec<Field>,
    /// Sample appended for a live duration marker.
    pub sample: Option<PhaseSample>,
    /// True when this line finished a run.
    pub completed: bool,
}

impl LineEffects {
    /// Whether the progress-relevant state changed.
    pub fn touched_progress(&self) -> bool {
        self.sample.is_some()
            || self.fields.iter().any(|f| {
                matches!(
                    f,
                    Field::Phase | Field::Table | Field::Bucket | Field::BucketSize
                )
            })
    }
}

/// State of one monitored worker process.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    fields: BTreeMap<Field, String>,
    completions: u32,
    phase_history: Vec<PhaseSample>,
    last_seen: Instant,
    completed_at: Option<DateTime<Utc>>,
    progress: f64,
}

impl Job {
    pub fn new(id: JobId, now: Instant) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(Field::Phase, PHASE_INIT.to_string());
        fields.insert(Field::Table, "0".to_string());

        let mut job = Self {
            id,
            fields,
            completions: 0,
            phase_history: Vec::new(),
            last_seen: now,
            completed_at: None,
            progress: 0.0,
        };
        job.refresh_progress();
        job
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn field(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<Field, String> {
        &self.fields
    }

    pub fn phase(&self) -> &str {
        self.field(Field::Phase).unwrap_or(PHASE_INIT)
    }

    pub fn completions(&self) -> u32 {
        self.completions
    }

    pub fn phase_history(&self) -> &[PhaseSample] {
        &self.phase_history
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Launch group key: the parent directory of the job's temp dir.
    pub fn group_key(&self) -> Option<PathBuf> {
        let temp = self.field(Field::TempDrive)?.trim();
        if temp.is_empty() {
            return None;
        }
        clean_path(temp).parent().map(Path::to_path_buf)
    }

    /// Launch tag parsed from a `<tag>_<digits>` temp dir name, or `""`.
    pub fn tag(&self) -> String {
        self.field(Field::TempDrive)
            .and_then(|temp| {
                let base = clean_path(temp.trim())
                    .file_name()?
                    .to_string_lossy()
                    .into_owned();
                RUN_TAG
                    .captures(&base)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .unwrap_or_default()
    }

    /// Apply one stdout line.
    ///
    /// Field rules always apply; duration markers only apply when `live`,
    /// so history replayed at attach time does not re-record samples or
    /// completions.
    pub fn apply_line(&mut self, rules: &RuleTable, line: &str, live: bool, now: Instant) -> LineEffects {
        self.last_seen = now;
        let mut effects = LineEffects::default();

        for (field, value) in rules.extract(line) {
            self.set_field(field, value);
            effects.fields.push(field);
        }

        if live {
            if let Some(marker) = rules.marker(line) {
                self.apply_marker(marker, &mut effects);
            }
        }

        self.fields.insert(Field::Last, line.to_string());
        self.refresh_progress();
        effects
    }

    fn apply_marker(&mut self, marker: Marker, effects: &mut LineEffects) {
        let run = self.completions;
        let label = match &marker.kind {
            MarkerKind::PhaseEnd { phase } => phase.clone(),
            MarkerKind::RunEnd => "total".to_string(),
            MarkerKind::CopyEnd => PHASE_COPY.to_string(),
        };

        match marker.kind {
            MarkerKind::PhaseEnd { .. } => {}
            MarkerKind::RunEnd => {
                self.completions += 1;
                self.completed_at = Some(Utc::now());
                self.set_field(Field::Phase, PHASE_COPY.to_string());
                effects.completed = true;
            }
            MarkerKind::CopyEnd => {
                self.set_field(Field::Phase, PHASE_FINAL.to_string());
            }
        }

        let sample = PhaseSample {
            phase: label,
            run,
            duration: marker.duration,
        };
        self.phase_history.push(sample.clone());
        effects.sample = Some(sample);
    }

    /// Store a field value, resetting its dependents first.
    fn set_field(&mut self, field: Field, value: String) {
        for reset in field.resets() {
            self.fields.insert(*reset, "0".to_string());
        }
        self.fields.insert(field, value);
    }

    fn refresh_progress(&mut self) {
        self.progress = compute_progress(
            self.phase(),
            self.field(Field::Table).unwrap_or(""),
            self.field(Field::Bucket).unwrap_or(""),
            self.field(Field::BucketSize).unwrap_or(""),
        );
    }
}

/// Progress percentage for the given raw field values.
///
/// `copy` and `final` are fixed at 95 and 99. Otherwise
/// `(p - 1) * 30 + (t / 7) * 30 + (b / n) * 4.28571428571`, where values
/// that do not parse fall back to 1 (`n` falls back to 128).
pub fn compute_progress(phase: &str, table: &str, bucket: &str, bucket_count: &str) -> f64 {
    match phase {
        PHASE_COPY => 95.0,
        PHASE_FINAL => 99.0,
        _ => {
            let p = parse_or(phase, 1.0);
            let t = parse_or(table, 1.0);
            let b = parse_or(bucket, 1.0);
            let n = parse_or(bucket_count, DEFAULT_BUCKET_COUNT);
            (p - 1.0) * PERCENT_PER_PHASE
                + (t / TABLES_PER_PHASE) * PERCENT_PER_PHASE
                + (b / n) * PERCENT_PER_TABLE_BUCKETS
        }
    }
}

fn parse_or(raw: &str, fallback: f64) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(fallback)
}
