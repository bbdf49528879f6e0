//! CLI entry point for ring-viz.

use clap::Parser;
use ring_viz::CliConfig;

fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();
    config.run()
}
