//! Command-line front end for the ring visualizer.
//!
//! Provides commands for:
//! - Laying out a saved service state
//! - Explaining a node or key placement
//! - Driving the in-process service through a session
//! - Fetching from and comparing algorithms on a running service

pub mod commands;
pub mod config;
pub mod telemetry;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
