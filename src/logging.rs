//! Logging setup
//!
//! Tor's own output is forwarded at debug level under [`DAEMON_TARGET`], so
//! it can be shown or hidden independently of onionlink's messages. Logs go
//! to stderr; stdout carries only command output.

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Target used for lines forwarded from the Tor process
pub const DAEMON_TARGET: &str = "onionlink::daemon";

/// Filter directives for a `-v` count.
///
/// 0: lifecycle milestones. 1: onionlink debug output without Tor's lines.
/// 2 and up: everything, including Tor's lines.
pub fn directives(verbosity: u8) -> String {
    match verbosity {
        0 => "onionlink=info".to_string(),
        1 => format!("onionlink=debug,{}=off", DAEMON_TARGET),
        _ => "onionlink=debug".to_string(),
    }
}

/// `RUST_LOG` wins unless `-v` was given
pub fn filter(verbosity: u8) -> EnvFilter {
    if verbosity > 0 {
        return EnvFilter::new(directives(verbosity));
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(0)))
}

/// Install the global subscriber
pub fn init(verbosity: u8) {
    fmt()
        .with_env_filter(filter(verbosity))
        .with_writer(std::io::stderr)
        .with_target(verbosity > 0)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
