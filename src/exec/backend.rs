// src/exec/backend.rs

//! Pluggable launch backend.
//!
//! The scheduler talks to a `LaunchBackend` instead of spawning processes
//! itself, so tests can swap in a recording fake.
//!
//! The contract is fire-and-forget: `launch` reports whether the command
//! *started*. Nothing waits for the job; it is picked up again later by
//! process discovery.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::template::LaunchCommand;

/// Trait abstracting how launch commands are started.
pub trait LaunchBackend: Send {
    /// Start `command` detached. `Ok` means the process was spawned.
    fn launch<'a>(
        &'a mut self,
        command: &'a LaunchCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Production backend: a bare `sh` in its own process group that reads the
/// script from stdin, with null stdout and stderr. The script never appears
/// on the shell's command line, so process discovery only matches the
/// worker itself. A background task reaps the shell when it exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellLauncher;

impl LaunchBackend for ShellLauncher {
    fn launch<'a>(
        &'a mut self,
        command: &'a LaunchCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(parent) = command.log_file.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating log dir {:?}", parent))?;
            }

            let mut cmd = Command::new("sh");
            cmd.stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null());

            if let Some(dir) = &command.working_dir {
                cmd.current_dir(dir);
            }

            #[cfg(unix)]
            cmd.process_group(0);

            let mut child = cmd
                .spawn()
                .with_context(|| format!("spawning launch for group '{}'", command.group))?;

            let mut stdin = child
                .stdin
                .take()
                .context("launch shell has no stdin pipe")?;
            let fed = async {
                stdin.write_all(command.script.as_bytes()).await?;
                stdin.write_all(b"\n").await?;
                stdin.shutdown().await
            }
            .await;
            // Closing stdin is the shell's end of input.
            drop(stdin);
            if let Err(e) = fed {
                let _ = child.start_kill();
                return Err(anyhow::Error::new(e)
                    .context(format!("feeding launch script for group '{}'", command.group))
                    .into());
            }

            info!(
                group = %command.group,
                run_tag = %command.run_tag,
                shell_pid = ?child.id(),
                "launch command started"
            );

            let run_tag = command.run_tag.clone();
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => debug!(run_tag = %run_tag, %status, "launch shell exited"),
                    Err(e) => warn!(run_tag = %run_tag, error = %e, "failed to reap launch shell"),
                }
            });

            Ok(())
        })
    }
}
