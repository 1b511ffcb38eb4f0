//! Circuit rotation
//!
//! A session never spans a rotation: the proxied connection is closed before
//! NEWNYM is sent.

use super::control::{ControlChannel, Signal};
use super::process::DaemonOutput;
use crate::error::{Result, TunnelError};
use crate::session::{Dialer, SessionManager};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Daemon log lines that mark a completed rotation
pub const ROTATION_MARKERS: &[&str] = &["New control connection opened", "New circuit"];

/// Sequences close → NEWNYM → wait for the daemon to report a new circuit
#[derive(Debug, Clone)]
pub struct CircuitCoordinator {
    timeout: Duration,
}

impl CircuitCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Rotate to a fresh circuit.
    ///
    /// Stale marker lines already buffered from the daemon also satisfy the
    /// wait.
    pub async fn reset_circuit<S, D>(
        &self,
        session: &mut SessionManager<D>,
        control: &mut ControlChannel<S>,
        output: &mut DaemonOutput,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        D: Dialer,
    {
        if !control.is_authenticated() {
            return Err(TunnelError::NotAuthenticated);
        }

        if let Err(e) = session.close().await {
            warn!("Ignoring error while closing session before circuit reset: {}", e);
        }

        control.signal(Signal::NewNym).await?;
        info!("Tor circuit reset. Waiting for new circuit...");

        match output
            .wait_for(ROTATION_MARKERS, self.timeout, cancel, "new circuit")
            .await?
        {
            Some(_) => {
                info!("New Tor circuit established");
                Ok(())
            },
            None => Err(TunnelError::DaemonExited("new circuit")),
        }
    }
}
