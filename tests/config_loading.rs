// tests/config_loading.rs

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tempfile::NamedTempFile;

use plotfarm::config::{clean_path, load_and_validate, parse_duration, ConfigFile};
use plotfarm::errors::FarmError;
use plotfarm::types::RelocateMethod;

fn load(toml: &str) -> Result<ConfigFile, FarmError> {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{toml}").unwrap();
    load_and_validate(file.path())
}

#[test]
fn empty_file_gets_defaults() {
    let cfg = load("").unwrap();

    assert!(cfg.farm.tracker_enabled);
    assert!(cfg.farm.scheduler_enabled);
    assert!(cfg.farm.router_enabled);
    assert!(cfg.farm.metrics_enabled);
    assert_eq!(cfg.tracker.process_signature, "chia plots create");
    assert_eq!(cfg.tracker.discovery_interval, Duration::from_secs(30));
    assert_eq!(cfg.tracker.max_idle, Duration::from_secs(3600));
    assert_eq!(cfg.tracker.tail_max_retries, 5);
    assert_eq!(cfg.scheduler.interval, Duration::from_secs(300));
    assert_eq!(cfg.scheduler.initial_delay, Duration::from_secs(60));
    assert_eq!(cfg.scheduler.launch_prelude.as_deref(), Some(". ./activate"));
    assert!(cfg.scheduler.command_template.contains("{TEMP_PATH}"));
    assert!(cfg.groups.is_empty());
    assert_eq!(cfg.router.poll_interval, Duration::from_secs(30));
    assert_eq!(cfg.router.prune_retries, 2);
    assert_eq!(cfg.router.artifact_pattern, "*.plot");
    assert_eq!(cfg.router.relocate_method, RelocateMethod::Rsync);
    assert_eq!(cfg.router.relocate_timeout, Duration::from_secs(12 * 3600));
    assert_eq!(cfg.router.prune_cutoff, None);
}

#[test]
fn sample_config_loads() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/plotfarm.toml");
    let cfg = load_and_validate(&path).unwrap();

    assert_eq!(cfg.groups.len(), 2);
    assert_eq!(cfg.groups[0].tag, "nvme0");
    assert_eq!(cfg.groups[0].threads, 4);
    assert_eq!(cfg.groups[0].buckets, 128);
    assert_eq!(cfg.groups[0].cooldown, Duration::from_secs(30 * 60));

    // Tag falls back to the temp dir name; trailing slash is cleaned away.
    assert_eq!(cfg.groups[1].tag, "nvme1");
    assert_eq!(cfg.groups[1].temp_path, PathBuf::from("/mnt/nvme1"));
    assert_eq!(cfg.groups[1].memory_mib, 4000);
    assert_eq!(cfg.groups[1].start_delay, Duration::from_secs(20 * 60));

    assert_eq!(cfg.router.final_paths.len(), 2);
    assert_eq!(
        cfg.router.prune_cutoff,
        Some(Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap())
    );
    assert_eq!(cfg.farm.working_dir, Some(PathBuf::from("/opt/chia-blockchain")));
}

#[test]
fn temp_path_falls_back_to_final_path() {
    let cfg = load(
        r#"
[[group]]
final_path = "/mnt/ssd"
"#,
    )
    .unwrap();

    assert_eq!(cfg.groups[0].temp_path, PathBuf::from("/mnt/ssd"));
    assert_eq!(cfg.groups[0].tag, "ssd");
    assert_eq!(cfg.groups[0].max_active, 1);
    assert_eq!(cfg.groups[0].max_phase1, 1);
}

#[test]
fn duplicate_temp_path_is_rejected() {
    let err = load(
        r#"
[[group]]
tag = "a"
temp_path = "/mnt/nvme0"

[[group]]
tag = "b"
temp_path = "/mnt/nvme0/"
"#,
    )
    .unwrap_err();

    match err {
        FarmError::ConfigError(msg) => assert!(msg.contains("temp_path"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn duplicate_fallback_tag_is_rejected() {
    // Both tags fall back to "tmp"; run tags and log files would collide.
    let err = load(
        r#"
[[group]]
temp_path = "/mnt/a/tmp"

[[group]]
temp_path = "/mnt/b/tmp"
"#,
    )
    .unwrap_err();

    match err {
        FarmError::ConfigError(msg) => assert!(msg.contains("tag 'tmp'"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }

    // Distinct explicit tags make the same layout valid.
    let cfg = load(
        r#"
[[group]]
tag = "a"
temp_path = "/mnt/a/tmp"

[[group]]
tag = "b"
temp_path = "/mnt/b/tmp"
"#,
    )
    .unwrap();
    assert_ne!(cfg.groups[0].tag, cfg.groups[1].tag);
}

#[test]
fn zero_caps_are_rejected() {
    assert!(matches!(
        load("[[group]]\ntemp_path = \"/t\"\nmax_active = 0\n"),
        Err(FarmError::ConfigError(_))
    ));
    assert!(matches!(
        load("[[group]]\ntemp_path = \"/t\"\nmax_phase1 = 0\n"),
        Err(FarmError::ConfigError(_))
    ));
}

#[test]
fn group_without_paths_is_rejected() {
    assert!(matches!(
        load("[[group]]\ntag = \"x\"\n"),
        Err(FarmError::ConfigError(_))
    ));
}

#[test]
fn bad_duration_is_rejected() {
    let err = load("[scheduler]\ninterval = \"5 minutes\"\n").unwrap_err();
    assert!(matches!(err, FarmError::InvalidDuration { .. }), "{err:?}");
}

#[test]
fn zero_loop_intervals_are_rejected() {
    for toml in [
        "[tracker]\ndiscovery_interval = \"0s\"\n",
        "[tracker]\ntail_poll_interval = \"0ms\"\n",
        "[scheduler]\ninterval = \"0\"\n",
        "[router]\npoll_interval = \"0m\"\n",
    ] {
        let err = load(toml).unwrap_err();
        match err {
            FarmError::ConfigError(msg) => assert!(msg.contains("greater than zero"), "{msg}"),
            other => panic!("expected ConfigError for {toml:?}, got {other:?}"),
        }
    }

    // A zero initial delay or cooldown is not a loop period.
    let cfg = load("[scheduler]\ninitial_delay = \"0s\"\n").unwrap();
    assert_eq!(cfg.scheduler.initial_delay, Duration::ZERO);
}

#[test]
fn bad_prune_date_is_rejected() {
    let err = load("[router]\nprune_date = \"2021-06-01\"\n").unwrap_err();
    assert!(matches!(err, FarmError::InvalidDate(_)), "{err:?}");
}

#[test]
fn staging_without_final_paths_is_rejected() {
    let err = load("[router]\nstaging_paths = [\"/mnt/staging\"]\n").unwrap_err();
    assert!(matches!(err, FarmError::ConfigError(_)), "{err:?}");

    // Fine once the router is switched off.
    load("[farm]\nrouter_enabled = false\n[router]\nstaging_paths = [\"/mnt/staging\"]\n")
        .unwrap();
}

#[test]
fn staging_dir_cannot_be_a_final_path() {
    let err = load(
        r#"
[router]
staging_paths = ["/mnt/staging"]
final_paths = ["/mnt/hdd0", "/mnt/staging/"]
"#,
    )
    .unwrap_err();

    match err {
        FarmError::ConfigError(msg) => assert!(msg.contains("both staging_paths and final_paths"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn invalid_artifact_pattern_is_rejected() {
    let err = load("[router]\nartifact_pattern = \"[*.plot\"\n").unwrap_err();
    assert!(matches!(err, FarmError::ConfigError(_)), "{err:?}");
}

#[test]
fn zero_tail_retries_is_rejected() {
    let err = load("[tracker]\ntail_max_retries = 0\n").unwrap_err();
    assert!(matches!(err, FarmError::ConfigError(_)), "{err:?}");
}

#[test]
fn template_must_place_the_temp_dir() {
    let err = load("[scheduler]\ncommand_template = \"plot -d {FINAL_PATH}\"\n").unwrap_err();
    assert!(matches!(err, FarmError::ConfigError(_)), "{err:?}");
}

#[test]
fn unknown_relocate_method_is_a_toml_error() {
    let err = load("[router]\nrelocate_method = \"ftp\"\n").unwrap_err();
    assert!(matches!(err, FarmError::TomlError(_)), "{err:?}");
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/plotfarm.toml").unwrap_err();
    assert!(matches!(err, FarmError::IoError(_)), "{err:?}");
}

#[test]
fn durations_parse() {
    assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
    assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
    assert_eq!(parse_duration(" 2h ").unwrap(), Duration::from_secs(7200));
    assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    assert!(parse_duration("").is_err());
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("3d").is_err());
}

#[test]
fn oversized_durations_are_errors_not_overflows() {
    let err = parse_duration("18446744073709551615h").unwrap_err();
    assert!(matches!(err, FarmError::InvalidDuration { .. }), "{err:?}");
    assert!(parse_duration("18446744073709551615m").is_err());
    assert_eq!(
        parse_duration("18446744073709551615s").unwrap(),
        Duration::from_secs(u64::MAX)
    );
}

#[test]
fn paths_are_cleaned_lexically() {
    assert_eq!(clean_path("/mnt//nvme0/./"), PathBuf::from("/mnt/nvme0"));
    assert_eq!(clean_path("/mnt/nvme0/../nvme1"), PathBuf::from("/mnt/nvme1"));
    assert_eq!(clean_path("a/../../b"), PathBuf::from("../b"));
    assert_eq!(clean_path(""), PathBuf::from("."));
}
