//! Lunar command line
//!
//! Compiles Flow programs to Lua and runs them in the sandbox.

use clap::Parser;
use lunar_core::cli::{self, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let level = cli::default_log_level(&cli);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run_cli_with_args(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
