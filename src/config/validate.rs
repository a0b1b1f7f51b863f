// src/config/validate.rs

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use globset::Glob;

use crate::config::duration::parse_duration;
use crate::config::model::{
    ConfigFile, DEFAULT_BUCKETS, DEFAULT_MEMORY_MIB, DEFAULT_THREADS, GroupConfig, RawConfigFile,
    RawGroupConfig, RawRouterSection, RawSchedulerSection, RawTrackerSection, RouterConfig,
    SchedulerConfig, TrackerConfig,
};
use crate::errors::{FarmError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::FarmError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let tracker = validate_tracker(&raw.tracker)?;
        let scheduler = validate_scheduler(&raw.scheduler)?;
        let groups = validate_groups(&raw.groups)?;
        let router = validate_router(&raw.router)?;

        if raw.farm.router_enabled && router.final_paths.is_empty() && !router.staging_paths.is_empty() {
            return Err(FarmError::ConfigError(
                "[router] has staging_paths but no final_paths to move artifacts into".to_string(),
            ));
        }
        if let Some(dir) = router
            .staging_paths
            .iter()
            .find(|p| router.final_paths.contains(p))
        {
            return Err(FarmError::ConfigError(format!(
                "[router] {dir:?} is listed in both staging_paths and final_paths"
            )));
        }

        Ok(ConfigFile {
            farm: raw.farm,
            tracker,
            scheduler,
            groups,
            router,
        })
    }
}

fn validate_tracker(raw: &RawTrackerSection) -> Result<TrackerConfig> {
    if raw.tail_max_retries == 0 {
        return Err(FarmError::ConfigError(
            "[tracker].tail_max_retries must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.process_signature.trim().is_empty() {
        return Err(FarmError::ConfigError(
            "[tracker].process_signature must not be empty".to_string(),
        ));
    }

    Ok(TrackerConfig {
        process_signature: raw.process_signature.trim().to_string(),
        discovery_interval: parse_interval("[tracker].discovery_interval", &raw.discovery_interval)?,
        max_idle: parse_duration(&raw.max_idle)?,
        tail_poll_interval: parse_interval("[tracker].tail_poll_interval", &raw.tail_poll_interval)?,
        tail_retry_backoff: parse_duration(&raw.tail_retry_backoff)?,
        tail_max_retries: raw.tail_max_retries,
    })
}

fn validate_scheduler(raw: &RawSchedulerSection) -> Result<SchedulerConfig> {
    if !raw.command_template.contains("{TEMP_PATH}") {
        return Err(FarmError::ConfigError(
            "[scheduler].command_template must contain {TEMP_PATH}".to_string(),
        ));
    }

    Ok(SchedulerConfig {
        interval: parse_interval("[scheduler].interval", &raw.interval)?,
        initial_delay: parse_duration(&raw.initial_delay)?,
        log_dir: clean_path(&raw.log_dir),
        command_template: raw.command_template.clone(),
        launch_prelude: raw
            .launch_prelude
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    })
}

fn validate_groups(raw: &[RawGroupConfig]) -> Result<Vec<GroupConfig>> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut tags: HashSet<String> = HashSet::new();
    let mut groups = Vec::with_capacity(raw.len());

    for (idx, g) in raw.iter().enumerate() {
        let group = normalize_group(idx, g)?;
        if !seen.insert(group.temp_path.clone()) {
            return Err(FarmError::ConfigError(format!(
                "group '{}' reuses temp_path {:?}; each group needs its own temp_path",
                group.tag, group.temp_path
            )));
        }
        // Run tags and log files are derived from the tag.
        if !tags.insert(group.tag.clone()) {
            return Err(FarmError::ConfigError(format!(
                "group tag '{}' (temp_path {:?}) is used by another group; set a distinct tag",
                group.tag, group.temp_path
            )));
        }
        groups.push(group);
    }

    Ok(groups)
}

fn normalize_group(idx: usize, raw: &RawGroupConfig) -> Result<GroupConfig> {
    if raw.temp_path.trim().is_empty() && raw.final_path.trim().is_empty() {
        return Err(FarmError::ConfigError(format!(
            "group #{idx} needs a temp_path or a final_path"
        )));
    }

    let final_path = clean_path(&raw.final_path);
    let temp_path = if raw.temp_path.trim().is_empty() {
        final_path.clone()
    } else {
        clean_path(&raw.temp_path)
    };

    let tag = if raw.tag.trim().is_empty() {
        temp_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("group{idx}"))
    } else {
        raw.tag.trim().to_string()
    };

    if raw.max_active == 0 {
        return Err(FarmError::ConfigError(format!(
            "group '{tag}': max_active must be >= 1 (got 0)"
        )));
    }
    if raw.max_phase1 == 0 {
        return Err(FarmError::ConfigError(format!(
            "group '{tag}': max_phase1 must be >= 1 (got 0)"
        )));
    }

    Ok(GroupConfig {
        tag,
        temp_path,
        final_path,
        threads: raw.threads.unwrap_or(DEFAULT_THREADS),
        memory_mib: raw.memory_mib.unwrap_or(DEFAULT_MEMORY_MIB),
        buckets: raw.buckets.unwrap_or(DEFAULT_BUCKETS),
        pool_key: raw.pool_key.trim().to_string(),
        max_active: raw.max_active,
        max_phase1: raw.max_phase1,
        cooldown: parse_duration(&raw.cooldown)?,
        start_delay: parse_duration(&raw.start_delay)?,
    })
}

fn validate_router(raw: &RawRouterSection) -> Result<RouterConfig> {
    Glob::new(&raw.artifact_pattern).map_err(|e| {
        FarmError::ConfigError(format!(
            "[router].artifact_pattern '{}' is not a valid glob: {e}",
            raw.artifact_pattern
        ))
    })?;

    let prune_cutoff = match raw.prune_date.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Some(parse_prune_date(s)?),
        _ => None,
    };

    Ok(RouterConfig {
        staging_paths: raw.staging_paths.iter().map(|p| clean_path(p)).collect(),
        final_paths: raw.final_paths.iter().map(|p| clean_path(p)).collect(),
        prune_cutoff,
        poll_interval: parse_interval("[router].poll_interval", &raw.poll_interval)?,
        prune_retries: raw.prune_retries,
        artifact_pattern: raw.artifact_pattern.clone(),
        relocate_method: raw.relocate_method,
        relocate_timeout: parse_duration(&raw.relocate_timeout)?,
    })
}

/// Loop period: a zero value would spin the loop.
fn parse_interval(field: &str, raw: &str) -> Result<Duration> {
    let interval = parse_duration(raw)?;
    if interval.is_zero() {
        return Err(FarmError::ConfigError(format!(
            "{field} must be greater than zero (got '{raw}')"
        )));
    }
    Ok(interval)
}

/// Parse a `month-day-year` date such as `6-1-2021` into UTC midnight.
fn parse_prune_date(s: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, "%m-%d-%Y")
        .map_err(|_| FarmError::InvalidDate(s.to_string()))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| FarmError::InvalidDate(s.to_string()))?;
    Ok(midnight.and_utc())
}

/// Lexically clean a path: drop `.` components and trailing separators and
/// resolve `..` against preceding normal components. The filesystem is not
/// consulted.
pub fn clean_path(raw: impl AsRef<Path>) -> PathBuf {
    let mut out = PathBuf::new();
    for component in raw.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if last_is_normal {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }

    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}
