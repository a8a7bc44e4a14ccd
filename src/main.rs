use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use v0_core::cli::{self, Cli};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    cli::install_signal_handler()?;

    let cli = Cli::parse();
    cli::run(cli)
}
