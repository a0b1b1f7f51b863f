// src/router/target.rs

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// A final-storage directory with a non-blocking exclusivity flag.
///
/// At most one move may target a directory at a time. Acquisition never
/// waits: a busy target means "try the next one".
#[derive(Debug)]
pub struct OutputTarget {
    path: PathBuf,
    locked: AtomicBool,
}

impl OutputTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            locked: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Take the flag if it is free. The flag is released when the returned
    /// guard is dropped.
    pub fn try_acquire(&self) -> Option<TargetGuard<'_>> {
        self.locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TargetGuard { target: self })
    }
}

/// Held while a move into the target is in progress.
#[derive(Debug)]
pub struct TargetGuard<'a> {
    target: &'a OutputTarget,
}

impl TargetGuard<'_> {
    pub fn path(&self) -> &Path {
        self.target.path()
    }
}

impl Drop for TargetGuard<'_> {
    fn drop(&mut self) {
        self.target.locked.store(false, Ordering::Release);
    }
}
