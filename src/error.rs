//! Error taxonomy for daemon supervision and tunnelled sessions

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Tor daemon is already running")]
    AlreadyRunning,

    #[error("Tor daemon exited before bootstrap completed: {0}")]
    StartupFailed(String),

    #[error("Tor daemon is not running")]
    NotRunning,

    #[error("Tor daemon exited while waiting for {0}")]
    DaemonExited(&'static str),

    #[error("Control port rejected authentication: {0}")]
    Authentication(String),

    #[error("Control connection is not authenticated")]
    NotAuthenticated,

    #[error("Control command failed: {0}")]
    Control(String),

    #[error("No TCP connection established")]
    NoConnection,

    #[error("Receive size must be at least one byte")]
    EmptyReceiveBuffer,

    #[error("SOCKS5 proxy error: {0}")]
    Proxy(String),

    #[error("Timed out after {waited:?} waiting for {what}")]
    Timeout { what: &'static str, waited: Duration },

    #[error("Cancelled while waiting for {0}")]
    Cancelled(&'static str),

    #[error("Failed to stop Tor daemon: {0}")]
    Shutdown(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TunnelError>;
