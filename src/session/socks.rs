//! SOCKS5 dialer for Tor's proxy listener
//!
//! Each dialer carries its own proxy address; nothing process-wide is
//! changed when a connection is made.

use crate::config::TorConfig;
use crate::error::{Result, TunnelError};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Opens a byte stream to a remote endpoint
#[async_trait]
pub trait Dialer: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn dial(&self, host: &str, port: u16) -> Result<Self::Stream>;
}

/// Connects through a SOCKS5 proxy without authentication
#[derive(Debug, Clone)]
pub struct Socks5Dialer {
    proxy_host: String,
    proxy_port: u16,
}

impl Socks5Dialer {
    pub fn new(proxy_host: impl Into<String>, proxy_port: u16) -> Self {
        Self {
            proxy_host: proxy_host.into(),
            proxy_port,
        }
    }

    pub fn from_config(config: &TorConfig) -> Self {
        Self::new(config.socks_host.clone(), config.socks_port)
    }

    pub fn proxy_addr(&self) -> String {
        format!("{}:{}", self.proxy_host, self.proxy_port)
    }
}

#[async_trait]
impl Dialer for Socks5Dialer {
    type Stream = TcpStream;

    async fn dial(&self, host: &str, port: u16) -> Result<TcpStream> {
        let mut stream = TcpStream::connect(self.proxy_addr()).await?;
        stream.set_nodelay(true)?;
        handshake(&mut stream, host, port).await?;
        Ok(stream)
    }
}

/// Run the SOCKS5 greeting and CONNECT request on `stream`
pub async fn handshake<S>(stream: &mut S, host: &str, port: u16) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Greeting: version 5, one method, no authentication
    stream.write_all(&[0x05, 0x01, 0x00]).await?;

    let mut response = [0u8; 2];
    stream.read_exact(&mut response).await?;
    if response[0] != 0x05 || response[1] != 0x00 {
        return Err(TunnelError::Proxy(
            "SOCKS5 auth negotiation failed".to_string(),
        ));
    }

    // Always send a hostname so Tor resolves it (required for .onion)
    let host_bytes = host.as_bytes();
    let host_len = u8::try_from(host_bytes.len())
        .map_err(|_| TunnelError::Proxy(format!("hostname too long: {}", host)))?;

    let mut request = vec![
        0x05, // version
        0x01, // connect
        0x00, // reserved
        0x03, // domain name
        host_len,
    ];
    request.extend_from_slice(host_bytes);
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != 0x05 {
        return Err(TunnelError::Proxy(
            "Invalid SOCKS5 response version".to_string(),
        ));
    }
    if head[1] != 0x00 {
        return Err(TunnelError::Proxy(format!(
            "connect to {}:{} failed: {}",
            host,
            port,
            reply_reason(head[1])
        )));
    }

    // Bound address is unused but must be drained
    let addr_len = match head[3] {
        0x01 => 4,
        0x04 => 16,
        0x03 => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            usize::from(len[0])
        },
        other => {
            return Err(TunnelError::Proxy(format!(
                "unknown bound address type {:#04x}",
                other
            )))
        },
    };
    let mut bound = vec![0u8; addr_len + 2];
    stream.read_exact(&mut bound).await?;

    debug!("SOCKS5 connection established to {}:{}", host, port);
    Ok(())
}

fn reply_reason(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown error",
    }
}
