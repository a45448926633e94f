//! Supramolecular Explorer CLI: experiment results database for the SAMOSA
//! self-driving laboratory.
//!
//! Records reagents, experiments, candidate assemblies and processed spectra,
//! ingests raw instrument files, and scores MS evidence for each assembly.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;
use supramol_shared::LoggerSettings;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let settings = commands::resolve_settings(&cli)?;
    let logger = settings
        .as_ref()
        .map(|(s, _)| s.logger.clone())
        .unwrap_or_else(LoggerSettings::default);
    commands::init_tracing(&cli, &logger)?;
    commands::run(cli, settings).await
}
