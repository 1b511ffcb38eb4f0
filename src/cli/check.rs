//! Check-config command - validate and summarize the configuration

use crate::config::Config;
use anyhow::Result;

/// Print a summary of an already validated configuration
pub fn run_check_config(config: &Config) -> Result<()> {
    let tor = &config.tor;

    println!("✓ Configuration is valid");
    println!("  Tor binary:     {}", tor.binary_path.display());
    println!("  Data directory: {}", tor.data_dir.display());
    println!("  torrc:          {}", tor.torrc_path().display());
    println!("  Control port:   {}:{}", tor.control_host, tor.control_port);
    println!(
        "  Control auth:   {}",
        if tor.control_password.is_some() {
            "password"
        } else {
            "cookie / none"
        }
    );
    println!("  SOCKS proxy:    {}:{}", tor.socks_host, tor.socks_port);
    println!(
        "  Timeouts:       bootstrap {}s, circuit {}s, shutdown {}s",
        tor.bootstrap_timeout_secs, tor.circuit_timeout_secs, tor.shutdown_timeout_secs
    );

    if !tor.torrc_path().exists() {
        println!("  ⚠ torrc not found; Tor will refuse to start");
    }
    if tor.control_password.is_none() {
        println!("  ⚠ No control password set; the control port is open to local users");
    }

    match &config.target {
        Some(target) => println!("  Target:         {}:{}", target.address, target.port),
        None => println!("  Target:         (none, pass --address/--port to run)"),
    }

    Ok(())
}
