//! onionlink - Tor process supervisor and single-session tunnel
//!
//! Launches a local tor binary against its own data directory, waits for
//! it to bootstrap, authenticates to its ControlPort and talks to a remote
//! endpoint through the SOCKS port. Tor is always stopped before exit.
//!
//! # Usage
//!
//! ```bash
//! # Validate configuration
//! onionlink --config ./onionlink.toml check-config
//!
//! # Start Tor and confirm the control port works
//! onionlink bootstrap
//!
//! # Exchange a message with an onion service, then rotate the circuit
//! onionlink run --address <56 chars>.onion --port 5001 --reset-circuit
//! ```

use anyhow::Result;
use onionlink::cli::{self, Commands};
use onionlink::{config, logging};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::parse();

    logging::init(cli.verbose);

    let config = match &cli.config {
        Some(path) => config::load_from_path(path)?,
        None => config::load_config()?,
    };

    match &cli.command {
        Commands::Run(args) => {
            info!("onionlink v{} starting", onionlink::VERSION);
            cli::run_session(&config, args).await?;
        },
        Commands::Bootstrap => {
            cli::run_bootstrap(&config).await?;
        },
        Commands::CheckConfig => {
            cli::run_check_config(&config)?;
        },
    }

    Ok(())
}
