// src/engine/mod.rs

//! Wires the tracker, scheduler and router into one running farm.
//!
//! Every external effect goes through a collaborator in [`Collaborators`],
//! so the whole farm can be started against fakes in tests.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ConfigFile;
use crate::errors::Result;
use crate::exec::{CommandBuilder, LaunchBackend};
use crate::fs::{FileSystem, RealFileSystem};
use crate::metrics::{LogMetrics, MetricsSink, NoopMetrics};
use crate::router::{
    relocator_for, spawn_router, CapacityProbe, Fs2Probe, OutputRouter, Relocator, RouterHandle,
};
use crate::scheduler::{spawn_scheduler, AdmissionController, Scheduler};
use crate::tracker::{
    spawn_discovery_loop, spawn_line_consumer, JobRegistry, PgrepDiscovery, ProcFdLocator,
    ProcessDiscovery, StreamLocator, TailEvent, TailerOptions, TailerSpawner,
};

const TAIL_CHANNEL_CAPACITY: usize = 1024;

/// External collaborators used by the farm.
#[derive(Clone)]
pub struct Collaborators {
    pub discovery: Arc<dyn ProcessDiscovery>,
    pub locator: Arc<dyn StreamLocator>,
    pub capacity: Arc<dyn CapacityProbe>,
    pub relocator: Arc<dyn Relocator>,
    pub fs: Arc<dyn FileSystem>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("locator", &self.locator)
            .field("capacity", &self.capacity)
            .field("relocator", &self.relocator)
            .field("fs", &self.fs)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    /// The real implementations: `pgrep`, procfs, `statvfs`, rsync/copy,
    /// `std::fs` and either the log sink or nothing.
    pub fn production(cfg: &ConfigFile) -> Self {
        let metrics: Arc<dyn MetricsSink> = if cfg.farm.metrics_enabled {
            Arc::new(LogMetrics)
        } else {
            Arc::new(NoopMetrics)
        };

        Self {
            discovery: Arc::new(PgrepDiscovery::new(&cfg.tracker.process_signature)),
            locator: Arc::new(ProcFdLocator),
            capacity: Arc::new(Fs2Probe),
            relocator: relocator_for(cfg.router.relocate_method, cfg.router.relocate_timeout),
            fs: Arc::new(RealFileSystem),
            metrics,
        }
    }
}

/// A running farm. Dropping it leaves the tasks running; call
/// [`FarmHandle::shutdown`] to stop them.
#[derive(Debug)]
pub struct FarmHandle {
    registry: Arc<JobRegistry>,
    tasks: Vec<JoinHandle<()>>,
    router: Option<RouterHandle>,
}

impl FarmHandle {
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Abort every background task and stop the staging watcher.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        if let Some(router) = self.router {
            for poller in &router.pollers {
                poller.abort();
            }
        }
        info!("farm stopped");
    }
}

/// Start every enabled subsystem.
///
/// The registry always exists; with the tracker disabled it simply stays
/// empty, and the scheduler sees no active jobs.
pub fn start<L>(cfg: &ConfigFile, collab: Collaborators, launcher: L) -> Result<FarmHandle>
where
    L: LaunchBackend + 'static,
{
    let mut tasks = Vec::new();

    let registry = if cfg.farm.tracker_enabled {
        let (tx, rx) = mpsc::channel::<TailEvent>(TAIL_CHANNEL_CAPACITY);
        let spawner = TailerSpawner::new(
            Arc::clone(&collab.locator),
            TailerOptions::from(&cfg.tracker),
            tx,
        );
        let registry = Arc::new(JobRegistry::with_tailers(Arc::clone(&collab.metrics), spawner));

        tasks.push(spawn_line_consumer(Arc::clone(&registry), rx));
        tasks.push(spawn_discovery_loop(
            Arc::clone(&registry),
            Arc::clone(&collab.discovery),
            cfg.tracker.discovery_interval,
            cfg.tracker.max_idle,
        ));
        info!(signature = %cfg.tracker.process_signature, "tracker started");
        registry
    } else {
        Arc::new(JobRegistry::new(Arc::clone(&collab.metrics)))
    };

    if cfg.farm.scheduler_enabled && !cfg.groups.is_empty() {
        let scheduler = Scheduler::new(
            AdmissionController::new(cfg.groups.clone(), Instant::now()),
            CommandBuilder::from_config(cfg),
            launcher,
            Arc::clone(&collab.metrics),
        );
        tasks.push(spawn_scheduler(
            scheduler,
            Arc::clone(&registry),
            cfg.scheduler.interval,
            cfg.scheduler.initial_delay,
        ));
    }

    let router = if cfg.farm.router_enabled && !cfg.router.staging_paths.is_empty() {
        let router = OutputRouter::from_config(
            &cfg.router,
            Arc::clone(&collab.fs),
            Arc::clone(&collab.capacity),
            Arc::clone(&collab.relocator),
            Arc::clone(&collab.metrics),
        )?;
        Some(spawn_router(
            Arc::new(router),
            cfg.router.staging_paths.clone(),
            cfg.router.poll_interval,
        ))
    } else {
        None
    };

    info!(
        tracker = cfg.farm.tracker_enabled,
        scheduler = cfg.farm.scheduler_enabled,
        router = router.is_some(),
        "farm started"
    );

    Ok(FarmHandle {
        registry,
        tasks,
        router,
    })
}
