//! Command-line configuration.

use crate::commands::{self, Command, CommandResult};
use crate::telemetry;
use anyhow::Context;
use clap::Parser;
use ring_layout::LayoutConfig;
use std::path::PathBuf;

/// Global flags plus the command to run.
#[derive(Debug, Parser)]
#[command(
    name = "ring-viz",
    version,
    about = "Lay out and explain consistent hashing rings"
)]
pub struct CliConfig {
    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// JSON layout config file. Missing fields keep their defaults.
    #[arg(long, global = true)]
    pub layout_config: Option<PathBuf>,

    /// Drawing surface width (overrides the config file).
    #[arg(long, global = true)]
    pub width: Option<f64>,

    /// Drawing surface height (overrides the config file).
    #[arg(long, global = true)]
    pub height: Option<f64>,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// Layout config from the file (if any) with size overrides applied.
    pub fn layout(&self) -> anyhow::Result<LayoutConfig> {
        let mut config = match &self.layout_config {
            Some(path) => LayoutConfig::load(path)
                .with_context(|| format!("failed to load layout config {}", path.display()))?,
            None => LayoutConfig::default(),
        };
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        config.validate().context("invalid layout config")?;
        Ok(config)
    }

    /// Runs the selected command to completion.
    pub fn run(self) -> CommandResult {
        telemetry::init(&self.log_level);
        let layout = self.layout()?;
        let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
        runtime.block_on(commands::execute(self.command, layout))
    }
}
