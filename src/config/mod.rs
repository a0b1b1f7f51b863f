// src/config/mod.rs

//! Configuration loading and validation for plotfarm.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate and normalize it into a [`ConfigFile`] (`validate.rs`).
//!
//! The subsystems only ever see a validated `ConfigFile`.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{load_and_validate, load_from_path};
pub use model::{
    ConfigFile, FarmSection, GroupConfig, RawConfigFile, RawGroupConfig, RawRouterSection,
    RawSchedulerSection, RawTrackerSection, RouterConfig, SchedulerConfig, TrackerConfig,
};
pub use validate::clean_path;
