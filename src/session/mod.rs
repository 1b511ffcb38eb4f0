//! Proxied application session
//!
//! One TCP stream to a remote endpoint, carried through Tor's SOCKS port.

pub mod manager;
pub mod socks;

pub use manager::{ProxiedSocket, SessionManager, DEFAULT_RECEIVE_SIZE};
pub use socks::{Dialer, Socks5Dialer};
