#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use plotfarm::config::{ConfigFile, GroupConfig, RawConfigFile, RawGroupConfig};
use plotfarm::types::RelocateMethod;

fn duration_str(d: Duration) -> String {
    format!("{}ms", d.as_millis())
}

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the same defaults a blank TOML file would get, with every
/// subsystem enabled.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_group(mut self, group: RawGroupConfig) -> Self {
        self.config.groups.push(group);
        self
    }

    pub fn tracker_enabled(mut self, val: bool) -> Self {
        self.config.farm.tracker_enabled = val;
        self
    }

    pub fn scheduler_enabled(mut self, val: bool) -> Self {
        self.config.farm.scheduler_enabled = val;
        self
    }

    pub fn router_enabled(mut self, val: bool) -> Self {
        self.config.farm.router_enabled = val;
        self
    }

    pub fn scheduler_timing(mut self, interval: Duration, initial_delay: Duration) -> Self {
        self.config.scheduler.interval = duration_str(interval);
        self.config.scheduler.initial_delay = duration_str(initial_delay);
        self
    }

    pub fn tracker_timing(mut self, discovery: Duration, tail_poll: Duration) -> Self {
        self.config.tracker.discovery_interval = duration_str(discovery);
        self.config.tracker.tail_poll_interval = duration_str(tail_poll);
        self
    }

    pub fn log_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.scheduler.log_dir = dir.as_ref().display().to_string();
        self
    }

    pub fn command_template(mut self, template: &str) -> Self {
        self.config.scheduler.command_template = template.to_string();
        self
    }

    pub fn launch_prelude(mut self, prelude: Option<&str>) -> Self {
        self.config.scheduler.launch_prelude = prelude.map(str::to_string);
        self
    }

    pub fn staging(mut self, dir: impl AsRef<Path>) -> Self {
        self.config
            .router
            .staging_paths
            .push(dir.as_ref().display().to_string());
        self
    }

    pub fn final_path(mut self, dir: impl AsRef<Path>) -> Self {
        self.config
            .router
            .final_paths
            .push(dir.as_ref().display().to_string());
        self
    }

    pub fn prune_date(mut self, date: &str) -> Self {
        self.config.router.prune_date = Some(date.to_string());
        self
    }

    pub fn prune_retries(mut self, retries: u32) -> Self {
        self.config.router.prune_retries = retries;
        self
    }

    pub fn router_poll_interval(mut self, interval: Duration) -> Self {
        self.config.router.poll_interval = duration_str(interval);
        self
    }

    pub fn relocate_method(mut self, method: RelocateMethod) -> Self {
        self.config.router.relocate_method = method;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a launch group. `build()` goes through config validation so
/// the result is normalized exactly like a loaded config.
pub struct GroupConfigBuilder {
    group: RawGroupConfig,
}

impl GroupConfigBuilder {
    pub fn new(tag: &str, temp_path: impl AsRef<Path>) -> Self {
        Self {
            group: RawGroupConfig {
                tag: tag.to_string(),
                temp_path: temp_path.as_ref().display().to_string(),
                final_path: "/final".to_string(),
                threads: None,
                memory_mib: None,
                buckets: None,
                pool_key: "pool".to_string(),
                max_active: 1,
                max_phase1: 1,
                cooldown: "0s".to_string(),
                start_delay: "0s".to_string(),
            },
        }
    }

    pub fn final_path(mut self, path: impl AsRef<Path>) -> Self {
        self.group.final_path = path.as_ref().display().to_string();
        self
    }

    pub fn max_active(mut self, cap: usize) -> Self {
        self.group.max_active = cap;
        self
    }

    pub fn max_phase1(mut self, cap: usize) -> Self {
        self.group.max_phase1 = cap;
        self
    }

    pub fn cooldown(mut self, d: Duration) -> Self {
        self.group.cooldown = duration_str(d);
        self
    }

    pub fn start_delay(mut self, d: Duration) -> Self {
        self.group.start_delay = duration_str(d);
        self
    }

    pub fn resources(mut self, threads: u32, memory_mib: u32, buckets: u32) -> Self {
        self.group.threads = Some(threads);
        self.group.memory_mib = Some(memory_mib);
        self.group.buckets = Some(buckets);
        self
    }

    pub fn pool_key(mut self, key: &str) -> Self {
        self.group.pool_key = key.to_string();
        self
    }

    pub fn raw(self) -> RawGroupConfig {
        self.group
    }

    pub fn build(self) -> GroupConfig {
        let cfg = ConfigFileBuilder::new().with_group(self.group).build();
        cfg.groups
            .into_iter()
            .next()
            .expect("builder config has one group")
    }
}
