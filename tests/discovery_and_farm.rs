// tests/discovery_and_farm.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, GroupConfigBuilder};
use crate::common::fakes::{
    DirLocator, FakeCapacity, FakeDiscovery, FakeLauncher, MockRelocator, RecordingMetrics,
};
use crate::common::init_tracing;

use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;
use tokio::time::{sleep, timeout};

use plotfarm::engine::{self, Collaborators};
use plotfarm::fs::MockFileSystem;
use plotfarm::tracker::discovery::parse_pid_list;
use plotfarm::tracker::Field;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn pid_list_parsing_skips_noise() {
    assert_eq!(parse_pid_list("123\n 456 \n\nabc\n0\n"), vec![123, 456]);
    assert!(parse_pid_list("").is_empty());
}

/// Last argv entry of a live process, if it is still around.
#[cfg(target_os = "linux")]
fn last_arg(pid: u32) -> Option<String> {
    let cmdline = std::fs::read(format!("/proc/{pid}/cmdline")).ok()?;
    cmdline
        .split(|b| *b == 0)
        .filter(|arg| !arg.is_empty())
        .next_back()
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn launch_shell_is_not_discovered_as_a_job() -> TestResult {
    use plotfarm::exec::{LaunchBackend, LaunchCommand, ShellLauncher};
    use plotfarm::tracker::{PgrepDiscovery, ProcessDiscovery};

    init_tracing();
    let dir = tempdir()?;
    let signature = format!("plotfarm_worker_sig_{}", std::process::id());

    // The script starts a child whose own argv carries the signature, the
    // way a real worker does. The launch shell must not match.
    let command = LaunchCommand {
        group: "nvme0".to_string(),
        run_tag: "nvme0_1".to_string(),
        temp_dir: dir.path().join("nvme0_1"),
        log_file: dir.path().join("logs/nvme0_1"),
        script: format!("sh -c 'sleep 2; true' {signature}; true"),
        working_dir: None,
    };
    let mut launcher = ShellLauncher;
    launcher.launch(&command).await?;

    let discovery = PgrepDiscovery::new(signature.clone());
    let mut found = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        found = discovery.running_ids().await?;
        if found.iter().any(|pid| last_arg(*pid).as_deref() == Some(signature.as_str())) {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(found.len(), 1, "expected only the worker, got {found:?}");
    assert_eq!(last_arg(found[0]).as_deref(), Some(signature.as_str()));
    Ok(())
}

/// Poll `check` every 20ms until it holds or five seconds pass.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    timeout(Duration::from_secs(5), async {
        while !check() {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}

#[tokio::test]
async fn farm_tracks_discovered_jobs_from_their_output() -> TestResult {
    init_tracing();
    let logs = tempdir()?;
    let mut out = std::fs::File::create(logs.path().join("100.log"))?;
    writeln!(out, "Starting plotting progress into temporary dirs: /mnt/nvme0/nvme0_1 and /mnt/nvme0/nvme0_1")?;
    writeln!(out, "Starting phase 1/4: Forward Propagation")?;
    writeln!(out, "Computing table 2")?;
    out.flush()?;

    let cfg = ConfigFileBuilder::new()
        .scheduler_enabled(false)
        .router_enabled(false)
        .tracker_timing(Duration::from_millis(20), Duration::from_millis(20))
        .build();

    let discovery = FakeDiscovery::new(vec![100]);
    let fs = MockFileSystem::new();
    let collab = Collaborators {
        discovery: Arc::new(discovery.clone()),
        locator: Arc::new(DirLocator::new(logs.path())),
        capacity: Arc::new(FakeCapacity::new()),
        relocator: Arc::new(MockRelocator::new(fs.clone())),
        fs: Arc::new(fs),
        metrics: Arc::new(RecordingMetrics::new()),
    };

    let farm = engine::start(&cfg, collab, FakeLauncher::new())?;
    let registry = Arc::clone(farm.registry());

    assert!(
        eventually(|| {
            registry
                .get(100)
                .is_some_and(|job| job.field(Field::Table) == Some("2"))
        })
        .await
    );
    let job = registry.get(100).unwrap();
    assert_eq!(job.phase(), "1");
    assert_eq!(job.tag(), "nvme0");

    // Live output keeps flowing into the same job.
    writeln!(out, "Starting phase 2/4: Backpropagation")?;
    out.flush()?;
    assert!(eventually(|| registry.get(100).is_some_and(|job| job.phase() == "2")).await);

    farm.shutdown();
    Ok(())
}

#[tokio::test]
async fn farm_launches_and_routes() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/hdd0");
    fs.add_file("/staging/done.plot", 100);
    let capacity = FakeCapacity::new();
    capacity.set_available("/hdd0", 10_000);

    let cfg = ConfigFileBuilder::new()
        .tracker_enabled(false)
        .scheduler_timing(Duration::from_millis(20), Duration::ZERO)
        .with_group(GroupConfigBuilder::new("nvme0", "/mnt/nvme0").max_active(3).raw())
        .staging("/staging")
        .final_path("/hdd0")
        .router_poll_interval(Duration::from_millis(20))
        .build();

    let launcher = FakeLauncher::new();
    let collab = Collaborators {
        discovery: Arc::new(FakeDiscovery::default()),
        locator: Arc::new(DirLocator::new("/unused")),
        capacity: Arc::new(capacity),
        relocator: Arc::new(MockRelocator::new(fs.clone())),
        fs: Arc::new(fs.clone()),
        metrics: Arc::new(RecordingMetrics::new()),
    };

    let farm = engine::start(&cfg, collab, launcher.clone())?;

    assert!(eventually(|| fs.exists("/hdd0/done.plot")).await);
    // With no tracked jobs the cap never binds; zero cooldown lets every
    // cycle launch.
    assert!(eventually(|| launcher.launch_count() >= 2).await);

    farm.shutdown();
    Ok(())
}
