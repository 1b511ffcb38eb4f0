//! Command-line interface for onionlink
//!
//! Provides main commands:
//! - `run` - Start Tor, talk to a remote endpoint through it, stop Tor
//! - `bootstrap` - Start Tor and authenticate, then stop it again
//! - `check-config` - Load and validate the configuration file

mod check;
mod run;

pub use check::run_check_config;
pub use run::{run_bootstrap, run_session};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// onionlink - Tunnel a TCP session through a supervised Tor daemon
#[derive(Parser, Debug)]
#[command(name = "onionlink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file (searches ./onionlink.toml and
    /// /etc/onionlink/config.toml when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// More output: -v for debug, -vv to also show Tor's own log lines
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a message to a remote endpoint through Tor and print the reply
    Run(RunArgs),

    /// Start Tor, wait for bootstrap and authenticate, then stop
    Bootstrap,

    /// Validate the configuration file
    CheckConfig,
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Remote address (defaults to target.address from the config)
    #[arg(long)]
    pub address: Option<String>,

    /// Remote port (defaults to target.port from the config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Payload sent after connecting
    #[arg(long, default_value = "Hello Onion!")]
    pub message: String,

    /// Rotate to a new circuit after the exchange
    #[arg(long, default_value_t = false)]
    pub reset_circuit: bool,
}

/// Parse command line arguments
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "onionlink",
            "-c",
            "/etc/onionlink/config.toml",
            "run",
            "--address",
            "example.onion",
            "--port",
            "5001",
            "--reset-circuit",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/etc/onionlink/config.toml")));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.address.as_deref(), Some("example.onion"));
                assert_eq!(args.port, Some(5001));
                assert_eq!(args.message, "Hello Onion!");
                assert!(args.reset_circuit);
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_config() {
        let cli = Cli::try_parse_from(["onionlink", "check-config"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckConfig));
        assert!(cli.config.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_parse_verbosity_count() {
        let cli = Cli::try_parse_from(["onionlink", "-vv", "bootstrap"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Bootstrap));
    }
}
