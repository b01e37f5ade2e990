//! Tiki CLI: document metadata enrichment to DCAT-AP.
//!
//! Serves the HTTP API or runs the extraction and enrichment pipeline
//! against local files, then inspects and edits the resulting records.

mod commands;

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
