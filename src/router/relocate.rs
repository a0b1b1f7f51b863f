// src/router/relocate.rs

//! Moving an artifact from staging into a final directory.
//!
//! Both strategies delete the source only after the destination copy is
//! complete, and both are bounded by a timeout.

use std::fmt::Debug;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::types::RelocateMethod;

pub trait Relocator: Send + Sync + Debug {
    /// Move `src` into `dest_dir`, keeping the file name.
    fn relocate<'a>(
        &'a self,
        src: &'a Path,
        dest_dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// `rsync --remove-source-files <src> <dest_dir>`.
#[derive(Debug, Clone)]
pub struct RsyncRelocator {
    timeout: Duration,
}

impl RsyncRelocator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Relocator for RsyncRelocator {
    fn relocate<'a>(
        &'a self,
        src: &'a Path,
        dest_dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            debug!(src = %src.display(), dest = %dest_dir.display(), "rsync starting");

            let mut cmd = Command::new("rsync");
            cmd.arg("--remove-source-files")
                .arg(src)
                .arg(dest_dir)
                .kill_on_drop(true);

            let status = timeout(self.timeout, cmd.status())
                .await
                .map_err(|_| anyhow!("rsync of {:?} timed out after {:?}", src, self.timeout))?
                .context("running rsync")?;

            if !status.success() {
                bail!("rsync of {:?} to {:?} exited with {}", src, dest_dir, status);
            }
            Ok(())
        })
    }
}

/// Rename, falling back to copy + remove when the rename crosses devices.
#[derive(Debug, Clone)]
pub struct CopyRelocator {
    timeout: Duration,
}

impl CopyRelocator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn copy_then_remove(src: &Path, dest: &Path) -> Result<()> {
        if let Err(e) = tokio::fs::copy(src, dest).await {
            let _ = tokio::fs::remove_file(dest).await;
            return Err(e).with_context(|| format!("copying {:?} to {:?}", src, dest));
        }
        tokio::fs::remove_file(src)
            .await
            .with_context(|| format!("removing source {:?}", src))
    }
}

impl Relocator for CopyRelocator {
    fn relocate<'a>(
        &'a self,
        src: &'a Path,
        dest_dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let dest = destination(src, dest_dir)?;

            let moved = async {
                match tokio::fs::rename(src, &dest).await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        debug!(error = %e, "rename failed; copying instead");
                        Self::copy_then_remove(src, &dest).await
                    }
                }
            };

            match timeout(self.timeout, moved).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(src = %src.display(), "copy timed out; removing partial destination");
                    let _ = tokio::fs::remove_file(&dest).await;
                    bail!("copy of {:?} timed out after {:?}", src, self.timeout)
                }
            }
        })
    }
}

fn destination(src: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| anyhow!("artifact path has no file name: {:?}", src))?;
    Ok(dest_dir.join(name))
}

/// Production relocator for the configured method.
pub fn relocator_for(method: RelocateMethod, timeout: Duration) -> Arc<dyn Relocator> {
    match method {
        RelocateMethod::Rsync => Arc::new(RsyncRelocator::new(timeout)),
        RelocateMethod::Copy => Arc::new(CopyRelocator::new(timeout)),
    }
}
