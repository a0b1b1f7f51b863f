// tests/scheduler_cycle.rs

mod common;
use crate::common::builders::GroupConfigBuilder;
use crate::common::fakes::{FakeLauncher, MetricEvent, RecordingMetrics};
use crate::common::{init_tracing, jobs_with};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};

use plotfarm::config::GroupConfig;
use plotfarm::exec::{run_tag, CommandBuilder};
use plotfarm::scheduler::{AdmissionController, Gate, Scheduler};

const TEMPLATE: &str = "plot -r {CORES} -b {RAM} -u {BUCKETS} -c {POOL_KEY} -t {TEMP_PATH} -d {FINAL_PATH} > {LOGFILE}.log 2>&1";

fn scheduler(
    groups: Vec<GroupConfig>,
    launcher: FakeLauncher,
    metrics: RecordingMetrics,
) -> Scheduler<FakeLauncher> {
    Scheduler::new(
        AdmissionController::new(groups, Instant::now()),
        CommandBuilder::new(TEMPLATE, None, "/logs", None),
        launcher,
        Arc::new(metrics),
    )
}

#[tokio::test]
async fn full_group_launches_nothing() {
    init_tracing();
    let group = GroupConfigBuilder::new("nvme0", "/mnt/nvme0")
        .max_active(2)
        .max_phase1(2)
        .build();
    let jobs = jobs_with(&[(1, "/mnt/nvme0/nvme0_1", "3"), (2, "/mnt/nvme0/nvme0_2", "2")]);
    let launcher = FakeLauncher::new();
    let mut sched = scheduler(vec![group], launcher.clone(), RecordingMetrics::new());

    let report = sched.run_cycle(&jobs, Instant::now()).await;

    assert!(report.launched.is_empty());
    assert_eq!(
        report.blocked,
        vec![("nvme0".to_string(), Gate::Concurrency { active: 2, cap: 2 })]
    );
    assert_eq!(launcher.launch_count(), 0);
}

#[tokio::test]
async fn admitted_group_launches_rendered_command() {
    let group = GroupConfigBuilder::new("nvme0", "/mnt/nvme0")
        .final_path("/mnt/staging")
        .resources(4, 6000, 64)
        .pool_key("xch1pool")
        .build();
    let launcher = FakeLauncher::new();
    let metrics = RecordingMetrics::new();
    let mut sched = scheduler(vec![group], launcher.clone(), metrics.clone());

    let report = sched.run_cycle(&[], Instant::now()).await;
    assert_eq!(report.launched.len(), 1);

    let launched = launcher.launched();
    let cmd = &launched[0];
    assert_eq!(cmd.group, "nvme0");
    assert!(cmd.run_tag.starts_with("nvme0_"));
    assert_eq!(cmd.temp_dir, PathBuf::from("/mnt/nvme0").join(&cmd.run_tag));
    assert_eq!(
        cmd.script,
        format!(
            "plot -r 4 -b 6000 -u 64 -c xch1pool -t /mnt/nvme0/{tag} -d /mnt/staging > /logs/{tag}.log 2>&1",
            tag = cmd.run_tag
        )
    );
    assert!(metrics.events().iter().any(|e| matches!(
        e,
        MetricEvent::Launched { group, .. } if group == "nvme0"
    )));
}

#[tokio::test]
async fn failed_launch_keeps_cooldown_unchanged() {
    let group = GroupConfigBuilder::new("nvme0", "/mnt/nvme0")
        .max_active(5)
        .cooldown(Duration::from_secs(3600))
        .build();
    let launcher = FakeLauncher::new();
    launcher.set_failing(true);
    let mut sched = scheduler(vec![group], launcher.clone(), RecordingMetrics::new());

    let now = Instant::now();
    let report = sched.run_cycle(&[], now).await;
    assert_eq!(report.failed, vec!["nvme0".to_string()]);
    assert_eq!(sched.controller().last_launched_at(0), None);

    // Next cycle retries immediately; no cooldown was started.
    launcher.set_failing(false);
    let report = sched.run_cycle(&[], now + Duration::from_secs(1)).await;
    assert_eq!(report.launched.len(), 1);
    assert_eq!(
        sched.controller().last_launched_at(0),
        Some(now + Duration::from_secs(1))
    );

    // And now the cooldown holds.
    let report = sched.run_cycle(&[], now + Duration::from_secs(2)).await;
    assert!(matches!(report.blocked[0].1, Gate::Cooldown { .. }));
    assert_eq!(launcher.launch_count(), 1);
}

#[tokio::test]
async fn each_group_is_evaluated() {
    let a = GroupConfigBuilder::new("a", "/mnt/a").build();
    let b = GroupConfigBuilder::new("b", "/mnt/b").build();
    let jobs = jobs_with(&[(1, "/mnt/a/a_1", "2")]);
    let launcher = FakeLauncher::new();
    let mut sched = scheduler(vec![a, b], launcher.clone(), RecordingMetrics::new());

    let report = sched.run_cycle(&jobs, Instant::now()).await;

    assert_eq!(report.blocked.len(), 1);
    assert_eq!(report.blocked[0].0, "a");
    assert_eq!(report.launched.len(), 1);
    assert_eq!(report.launched[0].0, "b");
}

#[test]
fn prelude_is_prepended() {
    let group = GroupConfigBuilder::new("nvme0", "/mnt/nvme0").build();
    let builder = CommandBuilder::new(
        "plot -t {TEMP_PATH}",
        Some(". ./activate".to_string()),
        "/logs",
        Some(PathBuf::from("/opt/chia")),
    );

    let cmd = builder.build(&group, "nvme0_1");
    assert_eq!(cmd.script, ". ./activate; plot -t /mnt/nvme0/nvme0_1");
    assert_eq!(cmd.working_dir, Some(PathBuf::from("/opt/chia")));
    assert_eq!(cmd.log_file, PathBuf::from("/logs/nvme0_1"));
}

#[test]
fn run_tag_uses_unix_seconds() {
    let at = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
    assert_eq!(run_tag("nvme0", at), "nvme0_1622505600");
}
