// src/router/capacity.rs

use std::fmt::Debug;
use std::path::Path;

use anyhow::{Context, Result};

/// Disk usage of the filesystem holding a path, in bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveUsage {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub percent: f64,
}

impl DriveUsage {
    pub fn new(total: u64, free: u64, available: u64) -> Self {
        let used = total.saturating_sub(free);
        let percent = if total == 0 {
            0.0
        } else {
            used as f64 / total as f64 * 100.0
        };
        Self {
            total,
            used,
            available,
            percent,
        }
    }

    /// Whether a file of `size` bytes fits.
    pub fn fits(&self, size: u64) -> bool {
        self.available > size
    }
}

/// Capacity query for a destination. Implementations must not cache: every
/// call reflects the current state of the disk.
pub trait CapacityProbe: Send + Sync + Debug {
    fn usage(&self, path: &Path) -> Result<DriveUsage>;
}

/// Production probe backed by `statvfs` through the `fs2` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fs2Probe;

impl CapacityProbe for Fs2Probe {
    fn usage(&self, path: &Path) -> Result<DriveUsage> {
        let total = fs2::total_space(path).with_context(|| format!("total space of {:?}", path))?;
        let free = fs2::free_space(path).with_context(|| format!("free space of {:?}", path))?;
        let available = fs2::available_space(path)
            .with_context(|| format!("available space of {:?}", path))?;
        Ok(DriveUsage::new(total, free, available))
    }
}
