//! onionlink library crate
//!
//! Supervises a local Tor daemon and carries one TCP session to a remote
//! (typically onion) endpoint through Tor's SOCKS port.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface (run, bootstrap, check-config)
//! - [`config`] - Configuration loading and validation
//! - [`coord`] - Lifecycle ordering across all components
//! - [`error`] - Error taxonomy
//! - [`session`] - SOCKS5 dialer and the single proxied session
//! - [`tor`] - Process supervision, control port, circuit rotation
//!
//! # Lifecycle
//!
//! ```no_run
//! # async fn demo(config: onionlink::config::Config) -> onionlink::error::Result<()> {
//! use onionlink::coord::Coordinator;
//!
//! let _reply = Coordinator::new(&config)
//!     .scoped(|tunnel| {
//!         Box::pin(async move {
//!             tunnel.connect("example.onion", 5001).await?;
//!             tunnel.send(b"Hello Onion!").await?;
//!             tunnel.receive_text(4096).await
//!         })
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::doc_markdown)] // Doc formatting is secondary
#![allow(clippy::uninlined_format_args)] // Format string style preference
#![allow(clippy::module_name_repetitions)] // Names read better in full
#![allow(clippy::cast_possible_wrap)] // Controlled context (pids)
#![allow(clippy::missing_errors_doc)] // Error taxonomy is documented once

pub mod cli;
pub mod config;
pub mod coord;
pub mod error;
pub mod logging;
pub mod session;
pub mod tor;

pub use coord::Coordinator;
pub use error::{Result, TunnelError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
