// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::RelocateMethod;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [farm]
/// working_dir = "/opt/chia-blockchain"
///
/// [[group]]
/// tag = "nvme0"
/// temp_path = "/mnt/nvme0"
/// final_path = "/mnt/staging"
/// max_active = 4
/// max_phase1 = 2
/// cooldown = "30m"
///
/// [router]
/// staging_paths = ["/mnt/staging"]
/// final_paths = ["/mnt/hdd0", "/mnt/hdd1"]
/// prune_date = "6-1-2021"
/// ```
///
/// All sections are optional and have reasonable defaults. This is the raw
/// serde shape; it is turned into a [`ConfigFile`] by validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub farm: FarmSection,

    #[serde(default)]
    pub tracker: RawTrackerSection,

    #[serde(default)]
    pub scheduler: RawSchedulerSection,

    /// All launch groups from `[[group]]`.
    #[serde(default, rename = "group")]
    pub groups: Vec<RawGroupConfig>,

    #[serde(default)]
    pub router: RawRouterSection,
}

/// `[farm]` section: subsystem toggles and the worker's install directory.
#[derive(Debug, Clone, Deserialize)]
pub struct FarmSection {
    #[serde(default = "default_true")]
    pub tracker_enabled: bool,

    #[serde(default = "default_true")]
    pub scheduler_enabled: bool,

    #[serde(default = "default_true")]
    pub router_enabled: bool,

    /// When false, metric events are dropped instead of logged.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Directory launched commands run in (the worker's install dir).
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Default for FarmSection {
    fn default() -> Self {
        Self {
            tracker_enabled: true,
            scheduler_enabled: true,
            router_enabled: true,
            metrics_enabled: true,
            working_dir: None,
        }
    }
}

/// `[tracker]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTrackerSection {
    /// Command-line fragment identifying worker processes (`pgrep -f`).
    #[serde(default = "default_process_signature")]
    pub process_signature: String,

    #[serde(default = "default_discovery_interval")]
    pub discovery_interval: String,

    /// Jobs with no parsed line for this long are evicted.
    #[serde(default = "default_max_idle")]
    pub max_idle: String,

    #[serde(default = "default_tail_poll_interval")]
    pub tail_poll_interval: String,

    #[serde(default = "default_tail_retry_backoff")]
    pub tail_retry_backoff: String,

    #[serde(default = "default_tail_max_retries")]
    pub tail_max_retries: u32,
}

impl Default for RawTrackerSection {
    fn default() -> Self {
        Self {
            process_signature: default_process_signature(),
            discovery_interval: default_discovery_interval(),
            max_idle: default_max_idle(),
            tail_poll_interval: default_tail_poll_interval(),
            tail_retry_backoff: default_tail_retry_backoff(),
            tail_max_retries: default_tail_max_retries(),
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSchedulerSection {
    #[serde(default = "default_scheduler_interval")]
    pub interval: String,

    #[serde(default = "default_initial_delay")]
    pub initial_delay: String,

    /// Directory that receives one log file per launched job.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_command_template")]
    pub command_template: String,

    /// Shell snippet run before the command, e.g. activating a virtualenv.
    #[serde(default = "default_launch_prelude")]
    pub launch_prelude: Option<String>,
}

impl Default for RawSchedulerSection {
    fn default() -> Self {
        Self {
            interval: default_scheduler_interval(),
            initial_delay: default_initial_delay(),
            log_dir: default_log_dir(),
            command_template: default_command_template(),
            launch_prelude: default_launch_prelude(),
        }
    }
}

/// `[[group]]` entry. Resource knobs left out fall back to the defaults
/// documented on each field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGroupConfig {
    /// Free-form tag, also the prefix of each generated run tag. Falls back
    /// to the basename of `temp_path`.
    #[serde(default)]
    pub tag: String,

    /// Falls back to `final_path` when empty.
    #[serde(default)]
    pub temp_path: String,

    #[serde(default)]
    pub final_path: String,

    /// Default 2.
    #[serde(default)]
    pub threads: Option<u32>,

    /// Default 4000.
    #[serde(default)]
    pub memory_mib: Option<u32>,

    /// Default 128.
    #[serde(default)]
    pub buckets: Option<u32>,

    #[serde(default)]
    pub pool_key: String,

    #[serde(default = "default_one")]
    pub max_active: usize,

    #[serde(default = "default_one")]
    pub max_phase1: usize,

    #[serde(default = "default_zero_duration")]
    pub cooldown: String,

    #[serde(default = "default_zero_duration")]
    pub start_delay: String,
}

/// `[router]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRouterSection {
    #[serde(default)]
    pub staging_paths: Vec<String>,

    #[serde(default)]
    pub final_paths: Vec<String>,

    /// Artifacts modified before this date (month-day-year) may be pruned.
    #[serde(default)]
    pub prune_date: Option<String>,

    #[serde(default = "default_router_poll_interval")]
    pub poll_interval: String,

    #[serde(default = "default_prune_retries")]
    pub prune_retries: u32,

    #[serde(default = "default_artifact_pattern")]
    pub artifact_pattern: String,

    #[serde(default)]
    pub relocate_method: RelocateMethod,

    #[serde(default = "default_relocate_timeout")]
    pub relocate_timeout: String,
}

impl Default for RawRouterSection {
    fn default() -> Self {
        Self {
            staging_paths: Vec::new(),
            final_paths: Vec::new(),
            prune_date: None,
            poll_interval: default_router_poll_interval(),
            prune_retries: default_prune_retries(),
            artifact_pattern: default_artifact_pattern(),
            relocate_method: RelocateMethod::default(),
            relocate_timeout: default_relocate_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_one() -> usize {
    1
}

fn default_zero_duration() -> String {
    "0s".to_string()
}

fn default_process_signature() -> String {
    "chia plots create".to_string()
}

fn default_discovery_interval() -> String {
    "30s".to_string()
}

fn default_max_idle() -> String {
    "60m".to_string()
}

fn default_tail_poll_interval() -> String {
    "5s".to_string()
}

fn default_tail_retry_backoff() -> String {
    "30s".to_string()
}

fn default_tail_max_retries() -> u32 {
    5
}

fn default_scheduler_interval() -> String {
    "5m".to_string()
}

fn default_initial_delay() -> String {
    "60s".to_string()
}

fn default_log_dir() -> String {
    "plotter_logs".to_string()
}

pub(crate) fn default_command_template() -> String {
    "chia plots create -n 1 -r {CORES} -k 32 -c {POOL_KEY} -u {BUCKETS} -b {RAM} \
     -t {TEMP_PATH} -d {FINAL_PATH} -x > {LOGFILE}.log 2>&1"
        .to_string()
}

fn default_launch_prelude() -> Option<String> {
    Some(". ./activate".to_string())
}

fn default_router_poll_interval() -> String {
    "30s".to_string()
}

fn default_prune_retries() -> u32 {
    2
}

fn default_artifact_pattern() -> String {
    "*.plot".to_string()
}

fn default_relocate_timeout() -> String {
    "12h".to_string()
}

pub const DEFAULT_THREADS: u32 = 2;
pub const DEFAULT_MEMORY_MIB: u32 = 4000;
pub const DEFAULT_BUCKETS: u32 = 128;

/// Validated, normalized configuration handed to the subsystems.
///
/// Every duration is parsed, every path is cleaned and every numeric knob
/// carries its default. Build one with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub farm: FarmSection,
    pub tracker: TrackerConfig,
    pub scheduler: SchedulerConfig,
    pub groups: Vec<GroupConfig>,
    pub router: RouterConfig,
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub process_signature: String,
    pub discovery_interval: Duration,
    pub max_idle: Duration,
    pub tail_poll_interval: Duration,
    pub tail_retry_backoff: Duration,
    pub tail_max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub initial_delay: Duration,
    pub log_dir: PathBuf,
    pub command_template: String,
    pub launch_prelude: Option<String>,
}

/// One launch group. `temp_path` is its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupConfig {
    pub tag: String,
    pub temp_path: PathBuf,
    pub final_path: PathBuf,
    pub threads: u32,
    pub memory_mib: u32,
    pub buckets: u32,
    pub pool_key: String,
    pub max_active: usize,
    pub max_phase1: usize,
    pub cooldown: Duration,
    pub start_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub staging_paths: Vec<PathBuf>,
    pub final_paths: Vec<PathBuf>,
    /// Start of the prune date (UTC midnight); `None` disables pruning.
    pub prune_cutoff: Option<DateTime<Utc>>,
    pub poll_interval: Duration,
    pub prune_retries: u32,
    pub artifact_pattern: String,
    pub relocate_method: RelocateMethod,
    pub relocate_timeout: Duration,
}
