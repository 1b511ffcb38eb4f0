//! Configuration file loading

use super::Config;
use anyhow::{Context, Result};
use std::path::Path;

/// Default config file locations
const CONFIG_PATHS: &[&str] = &["./onionlink.toml", "/etc/onionlink/config.toml"];

/// Load configuration from the first default location that exists
pub fn load_config() -> Result<Config> {
    let path = find_config_file()?;
    load_from_path(Path::new(path))
}

/// Find first existing config file
fn find_config_file() -> Result<&'static str> {
    for path in CONFIG_PATHS {
        if Path::new(path).exists() {
            return Ok(path);
        }
    }
    anyhow::bail!("No configuration file found. Tried: {:?}", CONFIG_PATHS)
}

/// Load and parse config from path
pub fn load_from_path(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    super::validate(&config)?;

    Ok(config)
}
