// src/exec/mod.rs

//! Job launch layer.
//!
//! - [`template`] renders a group's knobs into the job-start command.
//! - [`backend`] provides the `LaunchBackend` trait and the production
//!   `ShellLauncher`, which starts the command detached and never waits on
//!   it.

pub mod backend;
pub mod template;

pub use backend::{LaunchBackend, ShellLauncher};
pub use template::{run_tag, CommandBuilder, LaunchCommand};
