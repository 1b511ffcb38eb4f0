//! Configuration loading and validation
//!
//! Handles TOML configuration parsing with strict validation.
//! No runtime mutation - configuration is immutable after load.

pub mod file;
mod validation;

pub use file::{load_config, load_from_path};
pub use validation::{validate, validate_endpoint};

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub tor: TorConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Default remote endpoint for the `run` command
    pub target: Option<TargetConfig>,
}

/// Tor daemon launch and connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct TorConfig {
    /// Path to the tor executable
    pub binary_path: PathBuf,
    /// DataDirectory handed to tor; must contain a `torrc`
    pub data_dir: PathBuf,
    #[serde(default = "default_control_host")]
    pub control_host: String,
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    pub control_password: Option<String>,
    /// Refuse to authenticate to the control port without a password
    #[serde(default)]
    pub require_password: bool,
    #[serde(default = "default_socks_host")]
    pub socks_host: String,
    #[serde(default = "default_socks_port")]
    pub socks_port: u16,
    /// Maximum wait for "Bootstrapped 100%"
    #[serde(default = "default_bootstrap_timeout")]
    pub bootstrap_timeout_secs: u64,
    /// Maximum wait for a new circuit after NEWNYM
    #[serde(default = "default_circuit_timeout")]
    pub circuit_timeout_secs: u64,
    /// Grace period between SIGTERM and a hard kill
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_control_host() -> String {
    "127.0.0.1".to_string()
}
fn default_control_port() -> u16 {
    9051
}
fn default_socks_host() -> String {
    "localhost".to_string()
}
fn default_socks_port() -> u16 {
    9050
}
fn default_bootstrap_timeout() -> u64 {
    300
}
fn default_circuit_timeout() -> u64 {
    120
}
fn default_shutdown_timeout() -> u64 {
    10
}

impl TorConfig {
    /// Path of the torrc passed with `--torrc-file`
    pub fn torrc_path(&self) -> PathBuf {
        self.data_dir.join("torrc")
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_secs(self.bootstrap_timeout_secs)
    }

    pub fn circuit_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Proxied session settings
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Per-operation socket timeout; unset means block indefinitely
    pub io_timeout_secs: Option<u64>,
    #[serde(default = "default_receive_buffer")]
    pub receive_buffer: usize,
}

fn default_receive_buffer() -> usize {
    4096
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            io_timeout_secs: None,
            receive_buffer: default_receive_buffer(),
        }
    }
}

impl SessionConfig {
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_secs.map(Duration::from_secs)
    }
}

/// Remote endpoint reached through the SOCKS proxy
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub address: String,
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config: Config = toml::from_str(
            r#"
            [tor]
            binary_path = "/usr/bin/tor"
            data_dir = "/var/lib/onionlink"
            "#,
        )
        .unwrap();

        assert_eq!(config.tor.control_host, "127.0.0.1");
        assert_eq!(config.tor.control_port, 9051);
        assert_eq!(config.tor.socks_host, "localhost");
        assert_eq!(config.tor.socks_port, 9050);
        assert!(config.tor.control_password.is_none());
        assert!(!config.tor.require_password);
        assert_eq!(config.session.receive_buffer, 4096);
        assert!(config.session.io_timeout().is_none());
        assert!(config.target.is_none());
        assert_eq!(
            config.tor.torrc_path(),
            PathBuf::from("/var/lib/onionlink/torrc")
        );
    }
}
