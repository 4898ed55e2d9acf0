//! Binary entry point for the telemetry agent daemon.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use telemetry_agent::cli_app::{self, Cli};

fn main() {
    // Diagnostics go to stderr; stdout is reserved for state dumps.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    std::process::exit(cli_app::run(&cli));
}
