//! Single proxied TCP session

use super::socks::Dialer;
use crate::error::{Result, TunnelError};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

/// Default receive buffer size
pub const DEFAULT_RECEIVE_SIZE: usize = 4096;

/// An open connection to the remote endpoint
pub struct ProxiedSocket<S> {
    pub remote_address: String,
    pub remote_port: u16,
    stream: S,
}

/// Owns at most one proxied connection
pub struct SessionManager<D: Dialer> {
    dialer: D,
    io_timeout: Option<Duration>,
    socket: Option<ProxiedSocket<D::Stream>>,
}

impl<D: Dialer> SessionManager<D> {
    pub fn new(dialer: D) -> Self {
        Self {
            dialer,
            io_timeout: None,
            socket: None,
        }
    }

    /// Bound every connect/send/receive by `timeout`
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Remote endpoint of the open connection
    pub fn remote(&self) -> Option<(&str, u16)> {
        self.socket
            .as_ref()
            .map(|s| (s.remote_address.as_str(), s.remote_port))
    }

    /// Open the connection. No-op if one is already open.
    pub async fn connect(&mut self, remote_address: &str, remote_port: u16) -> Result<()> {
        if let Some(socket) = &self.socket {
            info!(
                "TCP connection already established to {}:{}",
                socket.remote_address, socket.remote_port
            );
            return Ok(());
        }

        debug!("Connecting to {}:{}", remote_address, remote_port);
        let stream = bounded(
            self.io_timeout,
            "proxied connect",
            self.dialer.dial(remote_address, remote_port),
        )
        .await?;

        self.socket = Some(ProxiedSocket {
            remote_address: remote_address.to_string(),
            remote_port,
            stream,
        });
        info!("TCP connected to {}:{}", remote_address, remote_port);
        Ok(())
    }

    /// Write all of `data`
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let socket = self.socket.as_mut().ok_or(TunnelError::NoConnection)?;

        bounded(self.io_timeout, "send", async {
            socket.stream.write_all(data).await?;
            socket.stream.flush().await?;
            Ok::<_, TunnelError>(())
        })
        .await?;

        debug!("Sent {} bytes", data.len());
        Ok(())
    }

    /// Read one chunk of at most `max_bytes`; empty means the peer closed.
    ///
    /// `max_bytes` must be non-zero so that an empty chunk is unambiguous.
    pub async fn receive(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let socket = self.socket.as_mut().ok_or(TunnelError::NoConnection)?;
        if max_bytes == 0 {
            return Err(TunnelError::EmptyReceiveBuffer);
        }

        let mut buf = vec![0u8; max_bytes];
        let n = bounded(self.io_timeout, "receive", async {
            Ok::<_, TunnelError>(socket.stream.read(&mut buf).await?)
        })
        .await?;
        buf.truncate(n);

        if n == 0 {
            debug!("Peer closed the connection");
        }
        Ok(buf)
    }

    /// `receive`, decoded as UTF-8 (invalid sequences replaced)
    pub async fn receive_text(&mut self, max_bytes: usize) -> Result<String> {
        let bytes = self.receive(max_bytes).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Close the connection. No-op if none is open.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut socket) = self.socket.take() else {
            return Ok(());
        };

        // The stream is dropped either way
        let result = socket.stream.shutdown().await;
        info!(
            "TCP connection to {}:{} closed",
            socket.remote_address, socket.remote_port
        );
        match result {
            Err(e) if e.kind() != std::io::ErrorKind::NotConnected => Err(e.into()),
            _ => Ok(()),
        }
    }
}

async fn bounded<T, F>(timeout: Option<Duration>, what: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TunnelError::Timeout {
                what,
                waited: limit,
            })?,
    }
}
