// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod metrics;
pub mod router;
pub mod scheduler;
pub mod tracker;
pub mod types;

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, ConfigFile};
use crate::engine::Collaborators;
use crate::exec::{run_tag, CommandBuilder, ShellLauncher};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (errors here are fatal, before anything starts)
/// - tracker / scheduler / router, per the `[farm]` toggles
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let collab = Collaborators::production(&cfg);
    let farm = engine::start(&cfg, collab, ShellLauncher)?;

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received; shutting down");
    farm.shutdown();
    Ok(())
}

/// Simple dry-run output: print the toggles, groups and the command each
/// group would launch.
fn print_dry_run(cfg: &ConfigFile) {
    println!("plotfarm dry-run");
    println!("  farm.tracker_enabled = {}", cfg.farm.tracker_enabled);
    println!("  farm.scheduler_enabled = {}", cfg.farm.scheduler_enabled);
    println!("  farm.router_enabled = {}", cfg.farm.router_enabled);
    println!("  farm.metrics_enabled = {}", cfg.farm.metrics_enabled);
    println!(
        "  scheduler.interval = {:?}, initial_delay = {:?}",
        cfg.scheduler.interval, cfg.scheduler.initial_delay
    );
    println!();

    let commands = CommandBuilder::from_config(cfg);
    let now = Utc::now();

    println!("groups ({}):", cfg.groups.len());
    for group in &cfg.groups {
        println!("  - {}", group.tag);
        println!("      temp: {}", group.temp_path.display());
        println!("      final: {}", group.final_path.display());
        println!(
            "      max_active: {}, max_phase1: {}",
            group.max_active, group.max_phase1
        );
        println!(
            "      cooldown: {:?}, start_delay: {:?}",
            group.cooldown, group.start_delay
        );
        let command = commands.build(group, &run_tag(&group.tag, now));
        println!("      cmd: {}", command.script);
    }

    if !cfg.router.staging_paths.is_empty() {
        println!();
        println!("router:");
        println!("  staging: {:?}", cfg.router.staging_paths);
        println!("  final: {:?}", cfg.router.final_paths);
        println!("  relocate: {:?}", cfg.router.relocate_method);
        if let Some(cutoff) = cfg.router.prune_cutoff {
            println!("  prune before: {}", cutoff.format("%Y-%m-%d"));
        }
    }

    debug!("dry-run complete (no execution)");
}
