//! Lifecycle coordination
//!
//! Owns the daemon, its control session and the proxied session, and
//! enforces their ordering: no session before bootstrap, no signal before
//! authentication, no session across a circuit rotation.

use crate::config::Config;
use crate::error::{Result, TunnelError};
use crate::session::{Dialer, SessionManager, Socks5Dialer};
use crate::tor::{CircuitCoordinator, ControlChannel, DaemonSettings, ProcessSupervisor};
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Future returned by the body of [`Coordinator::scoped`]
pub type ScopedFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a>>;

/// Top-level owner of all tunnel components
pub struct Coordinator<D: Dialer = Socks5Dialer> {
    supervisor: ProcessSupervisor,
    control: ControlChannel,
    circuit: CircuitCoordinator,
    session: SessionManager<D>,
    control_password: Option<String>,
    cancel: CancellationToken,
}

impl Coordinator<Socks5Dialer> {
    /// Build a coordinator that dials through the configured SOCKS port
    pub fn new(config: &Config) -> Self {
        Self::with_dialer(config, Socks5Dialer::from_config(&config.tor))
    }
}

impl<D: Dialer> Coordinator<D> {
    pub fn with_dialer(config: &Config, dialer: D) -> Self {
        Self {
            supervisor: ProcessSupervisor::new(DaemonSettings::from_config(&config.tor)),
            control: ControlChannel::from_config(&config.tor),
            circuit: CircuitCoordinator::new(config.tor.circuit_timeout()),
            session: SessionManager::new(dialer).with_io_timeout(config.session.io_timeout()),
            control_password: config.tor.control_password.clone(),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts an in-flight bootstrap or rotation wait.
    ///
    /// Once cancelled, every later wait fails immediately.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    pub fn is_authenticated(&self) -> bool {
        self.control.is_authenticated()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn daemon_pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    /// Start the daemon, wait for bootstrap and authenticate
    pub async fn start(&mut self) -> Result<()> {
        self.supervisor.start(&self.cancel).await?;

        if let Err(e) = self
            .control
            .authenticate(self.control_password.as_deref())
            .await
        {
            warn!("Control authentication failed, stopping Tor: {}", e);
            if let Err(stop_err) = self.supervisor.stop().await {
                warn!("{}", stop_err);
            }
            return Err(e);
        }

        Ok(())
    }

    /// Open the proxied connection. No-op if one is already open.
    pub async fn connect(&mut self, remote_address: &str, remote_port: u16) -> Result<()> {
        if self.session.is_connected() {
            self.ensure_daemon_alive().await?;
            return self.session.connect(remote_address, remote_port).await;
        }
        if let Err(e) = self.supervisor.check_alive() {
            self.control.disconnect();
            return Err(e);
        }
        self.session.connect(remote_address, remote_port).await
    }

    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_daemon_alive().await?;
        self.session.send(data).await?;
        info!("Data sent");
        Ok(())
    }

    pub async fn receive(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        self.ensure_daemon_alive().await?;
        self.session.receive(max_bytes).await
    }

    pub async fn receive_text(&mut self, max_bytes: usize) -> Result<String> {
        self.ensure_daemon_alive().await?;
        self.session.receive_text(max_bytes).await
    }

    /// Close the session and rotate to a new circuit
    pub async fn reset_circuit(&mut self) -> Result<()> {
        if !self.control.is_authenticated() {
            return Err(TunnelError::NotAuthenticated);
        }
        self.ensure_daemon_alive().await?;
        let output = self.supervisor.output_mut()?;
        self.circuit
            .reset_circuit(&mut self.session, &mut self.control, output, &self.cancel)
            .await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.session.close().await
    }

    /// Close the session, drop the control session and stop the daemon.
    ///
    /// A failing session close is logged; only a failed daemon stop is
    /// returned.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Err(e) = self.session.close().await {
            warn!("Error closing TCP connection during shutdown: {}", e);
        }
        self.control.disconnect();
        self.supervisor.stop().await
    }

    /// Drop the session and control session if the daemon has exited.
    ///
    /// Without a daemon there is nothing to check; the session layer then
    /// reports its own state.
    async fn ensure_daemon_alive(&mut self) -> Result<()> {
        if !self.supervisor.is_running() {
            return Ok(());
        }
        if let Err(e) = self.supervisor.check_alive() {
            if let Err(close_err) = self.session.close().await {
                warn!("Error closing TCP connection after Tor exited: {}", close_err);
            }
            self.control.disconnect();
            return Err(e);
        }
        Ok(())
    }

    /// Run `body` between `start` and `shutdown`.
    ///
    /// Shutdown runs whatever `start` or `body` returned. The body's error
    /// wins over a shutdown error.
    pub async fn scoped<T, F>(mut self, body: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Self) -> ScopedFuture<'a, T>,
    {
        let result = match self.start().await {
            Ok(()) => body(&mut self).await,
            Err(e) => Err(e),
        };

        let stopped = self.shutdown().await;
        match (result, stopped) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(stop_err)) => {
                warn!("Shutdown also failed: {}", stop_err);
                Err(e)
            },
        }
    }
}
