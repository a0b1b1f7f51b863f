// src/tracker/rules.rs

//! Declarative extraction rules for worker stdout.
//!
//! Each [`ExtractionRule`] maps one or more regex alternatives to a
//! [`Field`]; the first capture group becomes the field value. Duration
//! markers ("Time for phase N = S", "Copy time = S", "Total time = S") are
//! matched separately because they drive bookkeeping rather than plain
//! field updates.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

/// Fixed vocabulary of per-job fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    PlotSize,
    MaxRam,
    BucketSize,
    Phase,
    Table,
    Bucket,
    TempDrive,
    PlotId,
    /// Most recent raw line, set on every update.
    Last,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::PlotSize => "plotSize",
            Field::MaxRam => "maxRam",
            Field::BucketSize => "bucketSize",
            Field::Phase => "phase",
            Field::Table => "table",
            Field::Bucket => "bucket",
            Field::TempDrive => "tempDrive",
            Field::PlotId => "plotId",
            Field::Last => "last",
        }
    }

    /// Fields reset to `"0"` whenever this field is written.
    pub fn resets(self) -> &'static [Field] {
        match self {
            Field::Phase => &[Field::Table, Field::Bucket],
            Field::Table => &[Field::Bucket],
            _ => &[],
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the rule table.
#[derive(Debug)]
pub struct ExtractionRule {
    pub field: Field,
    patterns: Vec<Regex>,
}

impl ExtractionRule {
    fn new(field: Field, patterns: &[&str]) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p).expect("built-in extraction pattern must compile"))
            .collect();
        Self { field, patterns }
    }

    /// First capture of the first matching alternative.
    pub fn capture(&self, line: &str) -> Option<String> {
        self.patterns
            .iter()
            .find_map(|re| re.captures(line))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// What a duration marker line reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerKind {
    /// "Time for phase N = S seconds".
    PhaseEnd { phase: String },
    /// "Copy time = S seconds".
    CopyEnd,
    /// "Total time = S seconds": the run finished.
    RunEnd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub duration: Duration,
}

/// The full rule table: field rules in evaluation order plus the markers.
#[derive(Debug)]
pub struct RuleTable {
    rules: Vec<ExtractionRule>,
    phase_time: Regex,
    copy_time: Regex,
    total_time: Regex,
}

static STANDARD: LazyLock<RuleTable> = LazyLock::new(RuleTable::build);

impl RuleTable {
    /// The rule table for the plotter's stdout format.
    pub fn standard() -> &'static RuleTable {
        &STANDARD
    }

    fn build() -> Self {
        let rules = vec![
            ExtractionRule::new(Field::PlotSize, &[r"Plot size is: (\d+)"]),
            ExtractionRule::new(Field::MaxRam, &[r"Buffer size is: (\d+)MiB"]),
            ExtractionRule::new(Field::BucketSize, &[r"Using (\d+) buckets"]),
            ExtractionRule::new(Field::Phase, &[r"Starting phase (\d)/"]),
            ExtractionRule::new(
                Field::Table,
                &[r"Computing table (\d+)", r"Compressing tables (\d+)"],
            ),
            ExtractionRule::new(Field::Bucket, &[r"Bucket (\d+)"]),
            ExtractionRule::new(
                Field::TempDrive,
                &[r"Starting plotting progress into temporary dirs: (.*) and"],
            ),
            ExtractionRule::new(Field::PlotId, &[r"ID: (\w+)"]),
        ];

        let marker = |p: &str| Regex::new(p).expect("built-in marker pattern must compile");

        Self {
            rules,
            phase_time: marker(r"Time for phase (\d) = (\d+)"),
            copy_time: marker(r"Copy time = (\d+)"),
            total_time: marker(r"Total time = (\d+)"),
        }
    }

    pub fn rules(&self) -> &[ExtractionRule] {
        &self.rules
    }

    /// All field updates carried by `line`, in rule order.
    pub fn extract(&self, line: &str) -> Vec<(Field, String)> {
        self.rules
            .iter()
            .filter_map(|rule| rule.capture(line).map(|v| (rule.field, v)))
            .collect()
    }

    /// The duration marker carried by `line`, if any.
    pub fn marker(&self, line: &str) -> Option<Marker> {
        if let Some(caps) = self.phase_time.captures(line) {
            return Some(Marker {
                kind: MarkerKind::PhaseEnd {
                    phase: caps[1].to_string(),
                },
                duration: seconds(&caps[2]),
            });
        }
        if let Some(caps) = self.total_time.captures(line) {
            return Some(Marker {
                kind: MarkerKind::RunEnd,
                duration: seconds(&caps[1]),
            });
        }
        self.copy_time.captures(line).map(|caps| Marker {
            kind: MarkerKind::CopyEnd,
            duration: seconds(&caps[1]),
        })
    }
}

fn seconds(digits: &str) -> Duration {
    Duration::from_secs(digits.parse().unwrap_or(0))
}
