//! reportflow CLI: generate long-form reports from a folder of materials.
//!
//! Loads the materials, has a text generator analyze them and design an
//! outline, writes every section, and assembles a markdown report.

mod commands;
mod progress;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
