#![allow(dead_code, unused_imports)]

pub use plotfarm_test_utils::builders;
pub use plotfarm_test_utils::fakes;
pub use plotfarm_test_utils::{init_tracing, with_timeout};

use std::sync::Arc;

use plotfarm::metrics::NoopMetrics;
use plotfarm::tracker::{Job, JobRegistry};
use plotfarm::types::JobId;

/// A registry holding one job per `(id, temp dir, phase)` entry, fed the
/// lines a real worker would print.
pub fn jobs_with(entries: &[(JobId, &str, &str)]) -> Vec<Job> {
    let registry = JobRegistry::new(Arc::new(NoopMetrics));
    for (id, temp_dir, phase) in entries {
        registry.discover([*id]);
        registry.update(
            *id,
            &format!("Starting plotting progress into temporary dirs: {temp_dir} and {temp_dir}"),
            false,
        );
        registry.update(*id, &format!("Starting phase {phase}/4: Forward Propagation"), false);
    }
    registry.snapshot()
}
