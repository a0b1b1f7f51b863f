// src/exec/template.rs

//! Rendering the job-start command for a launch group.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::{ConfigFile, GroupConfig};

/// A fully rendered launch, ready for a [`LaunchBackend`].
///
/// [`LaunchBackend`]: crate::exec::LaunchBackend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Tag of the group this launch belongs to.
    pub group: String,
    /// Unique `<tag>_<unix seconds>` name of this run.
    pub run_tag: String,
    /// Per-run temp directory handed to the worker.
    pub temp_dir: PathBuf,
    /// Log file stem; the template appends its own extension.
    pub log_file: PathBuf,
    /// Shell script fed to the launch shell.
    pub script: String,
    pub working_dir: Option<PathBuf>,
}

/// Builds [`LaunchCommand`]s from the configured template.
///
/// Placeholders: `{CORES}`, `{RAM}`, `{BUCKETS}`, `{POOL_KEY}`,
/// `{TEMP_PATH}`, `{FINAL_PATH}`, `{LOGFILE}`.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    template: String,
    prelude: Option<String>,
    log_dir: PathBuf,
    working_dir: Option<PathBuf>,
}

impl CommandBuilder {
    pub fn new(
        template: impl Into<String>,
        prelude: Option<String>,
        log_dir: impl Into<PathBuf>,
        working_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            template: template.into(),
            prelude,
            log_dir: log_dir.into(),
            working_dir,
        }
    }

    /// Builder for a validated config. A relative `log_dir` is anchored at
    /// the current directory so it does not depend on `working_dir`.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let log_dir = if cfg.scheduler.log_dir.is_absolute() {
            cfg.scheduler.log_dir.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(&cfg.scheduler.log_dir)
        };

        Self::new(
            cfg.scheduler.command_template.clone(),
            cfg.scheduler.launch_prelude.clone(),
            log_dir,
            cfg.farm.working_dir.clone(),
        )
    }

    pub fn build(&self, group: &GroupConfig, run_tag: &str) -> LaunchCommand {
        let temp_dir = group.temp_path.join(run_tag);
        let log_file = self.log_dir.join(run_tag);
        let rendered = self.render(group, &temp_dir, &log_file);

        let script = match &self.prelude {
            Some(prelude) => format!("{prelude}; {rendered}"),
            None => rendered,
        };

        LaunchCommand {
            group: group.tag.clone(),
            run_tag: run_tag.to_string(),
            temp_dir,
            log_file,
            script,
            working_dir: self.working_dir.clone(),
        }
    }

    fn render(&self, group: &GroupConfig, temp_dir: &Path, log_file: &Path) -> String {
        self.template
            .replace("{CORES}", &group.threads.to_string())
            .replace("{BUCKETS}", &group.buckets.to_string())
            .replace("{RAM}", &group.memory_mib.to_string())
            .replace("{TEMP_PATH}", &temp_dir.display().to_string())
            .replace("{FINAL_PATH}", &group.final_path.display().to_string())
            .replace("{LOGFILE}", &log_file.display().to_string())
            .replace("{POOL_KEY}", &group.pool_key)
    }
}

/// `<group tag>_<unix seconds>`.
pub fn run_tag(group_tag: &str, at: DateTime<Utc>) -> String {
    format!("{group_tag}_{}", at.timestamp())
}
