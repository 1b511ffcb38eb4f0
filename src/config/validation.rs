//! Configuration validation
//!
//! Fail-fast validation of configuration invariants.

use super::Config;
use anyhow::{bail, Context, Result};

/// Validate configuration invariants
pub fn validate(config: &Config) -> Result<()> {
    validate_tor(config)?;
    validate_session(config)?;
    validate_target(config)?;
    Ok(())
}

fn validate_tor(config: &Config) -> Result<()> {
    let tor = &config.tor;

    if tor.binary_path.as_os_str().is_empty() {
        bail!("tor.binary_path cannot be empty");
    }
    if tor.data_dir.as_os_str().is_empty() {
        bail!("tor.data_dir cannot be empty");
    }
    if tor.control_host.is_empty() || tor.socks_host.is_empty() {
        bail!("tor.control_host and tor.socks_host cannot be empty");
    }

    if tor.control_port == 0 || tor.socks_port == 0 {
        bail!("tor.control_port and tor.socks_port cannot be 0");
    }
    if tor.control_port == tor.socks_port {
        bail!(
            "tor.control_port and tor.socks_port must differ (both {})",
            tor.control_port
        );
    }

    if tor.require_password && tor.control_password.is_none() {
        bail!("tor.require_password is set but tor.control_password is missing");
    }

    if tor.bootstrap_timeout_secs == 0
        || tor.circuit_timeout_secs == 0
        || tor.shutdown_timeout_secs == 0
    {
        bail!("tor timeouts must be greater than 0");
    }

    Ok(())
}

fn validate_session(config: &Config) -> Result<()> {
    if config.session.receive_buffer == 0 {
        bail!("session.receive_buffer cannot be 0");
    }
    if config.session.io_timeout_secs == Some(0) {
        bail!("session.io_timeout_secs must be greater than 0 when set");
    }
    Ok(())
}

fn validate_target(config: &Config) -> Result<()> {
    let Some(target) = &config.target else {
        return Ok(());
    };

    validate_endpoint(&target.address, target.port).context("Invalid [target] section")
}

/// Check a remote endpoint, wherever it came from
pub fn validate_endpoint(address: &str, port: u16) -> Result<()> {
    if address.is_empty() {
        bail!("address cannot be empty");
    }

    // v3 onion addresses are 56 chars + .onion
    if let Some(prefix) = address.strip_suffix(".onion") {
        if prefix.len() != 56 {
            bail!("{} is not a v3 address (56 chars before .onion)", address);
        }
    }

    if port == 0 {
        bail!("port cannot be 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Config {
        let text = format!(
            "[tor]\nbinary_path = \"/usr/bin/tor\"\ndata_dir = \"/tmp/onionlink\"\n{}",
            extra
        );
        toml::from_str(&text).unwrap()
    }

    #[test]
    fn test_valid_minimal() {
        assert!(validate(&parse("")).is_ok());
    }

    #[test]
    fn test_rejects_same_ports() {
        let config = parse("control_port = 9050\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = parse("circuit_timeout_secs = 0\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_require_password_needs_password() {
        let config = parse("require_password = true\n");
        assert!(validate(&config).is_err());

        let config = parse("require_password = true\ncontrol_password = \"x\"\n");
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_rejects_short_onion_target() {
        let config = parse("[target]\naddress = \"short.onion\"\nport = 80\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_endpoint() {
        let onion = format!("{}.onion", "a".repeat(56));
        assert!(validate_endpoint(&onion, 5001).is_ok());
        assert!(validate_endpoint("example.com", 80).is_ok());

        assert!(validate_endpoint("short.onion", 80).is_err());
        assert!(validate_endpoint(&onion, 0).is_err());
        assert!(validate_endpoint("", 80).is_err());
    }

    #[test]
    fn test_accepts_plain_hostname_target() {
        let config = parse("[target]\naddress = \"example.com\"\nport = 80\n");
        assert!(validate(&config).is_ok());
    }
}
