//! Tor Control Port client
//!
//! Only the two exchanges this crate needs are spoken: AUTHENTICATE and
//! SIGNAL. Replies are reduced to their status code and text.

use crate::config::TorConfig;
use crate::error::{Result, TunnelError};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Common cookie file locations, tried after the data directory's cookie
const COOKIE_PATHS: &[&str] = &[
    "/run/tor/control.authcookie",
    "/var/run/tor/control.authcookie",
    "/var/lib/tor/control_auth_cookie",
];

/// Upper bound on a single control round trip
const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Signals understood by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Switch to clean circuits for new connections
    NewNym,
}

impl Signal {
    pub fn keyword(self) -> &'static str {
        match self {
            Signal::NewNym => "NEWNYM",
        }
    }
}

/// Final reply to a control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        self.code == 250
    }

    pub fn message(&self) -> String {
        format!("{} {}", self.code, self.lines.join(" | "))
    }
}

/// Connection to the Tor control port
pub struct ControlChannel<S = TcpStream> {
    host: String,
    port: u16,
    require_password: bool,
    cookie_paths: Vec<PathBuf>,
    conn: Option<BufReader<S>>,
    authenticated: bool,
}

impl<S> ControlChannel<S> {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let cookie_paths = COOKIE_PATHS.iter().map(PathBuf::from).collect();
        Self {
            host: host.into(),
            port,
            require_password: false,
            cookie_paths,
            conn: None,
            authenticated: false,
        }
    }

    pub fn from_config(config: &TorConfig) -> Self {
        let mut channel = Self::new(config.control_host.clone(), config.control_port)
            .require_password(config.require_password);
        // Tor writes its cookie into the DataDirectory by default
        channel
            .cookie_paths
            .insert(0, config.data_dir.join("control_auth_cookie"));
        channel
    }

    /// Refuse password-less authentication
    pub fn require_password(mut self, required: bool) -> Self {
        self.require_password = required;
        self
    }

    /// Replace the cookie files tried when no password is given
    pub fn with_cookie_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.cookie_paths = paths;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Drop the control session; a new `authenticate` is needed afterwards
    pub fn disconnect(&mut self) {
        if self.conn.take().is_some() {
            debug!("Control connection to port {} dropped", self.port);
        }
        self.authenticated = false;
    }

    fn read_cookie(&self) -> Option<(PathBuf, Vec<u8>)> {
        self.cookie_paths
            .iter()
            .find_map(|path| std::fs::read(path).ok().map(|c| (path.clone(), c)))
    }
}

impl ControlChannel<TcpStream> {
    /// Connect to the control port and authenticate
    pub async fn authenticate(&mut self, password: Option<&str>) -> Result<()> {
        if password.is_none() && self.require_password {
            return Err(TunnelError::Authentication(
                "a control password is required by configuration".to_string(),
            ));
        }

        let addr = format!("{}:{}", self.host, self.port);
        debug!("Connecting to Tor control port: {}", addr);
        let stream = TcpStream::connect(&addr).await?;

        self.authenticate_over(stream, password).await
    }
}

impl<S> ControlChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Authenticate over an already-open control stream
    pub async fn authenticate_over(&mut self, stream: S, password: Option<&str>) -> Result<()> {
        self.disconnect();

        let command = match password {
            // Tor accepts the password hex-encoded
            Some(password) => format!(
                "AUTHENTICATE {}\r\n",
                data_encoding::HEXLOWER.encode(password.as_bytes())
            ),
            None => {
                if self.require_password {
                    return Err(TunnelError::Authentication(
                        "a control password is required by configuration".to_string(),
                    ));
                }
                warn!(
                    "Authenticating to control port {} without a password; \
                     anyone local can reconfigure Tor through it. Set a control password.",
                    self.port
                );
                match self.read_cookie() {
                    Some((path, cookie)) => {
                        debug!("Using control cookie from {}", path.display());
                        format!(
                            "AUTHENTICATE {}\r\n",
                            data_encoding::HEXLOWER.encode(&cookie)
                        )
                    },
                    None => "AUTHENTICATE\r\n".to_string(),
                }
            },
        };

        let mut conn = BufReader::new(stream);
        let reply = send_command(&mut conn, &command).await?;
        if !reply.is_ok() {
            return Err(TunnelError::Authentication(reply.message()));
        }

        self.conn = Some(conn);
        self.authenticated = true;
        info!("Logged into the control port {}", self.port);
        Ok(())
    }

    /// Send a signal to the daemon
    pub async fn signal(&mut self, signal: Signal) -> Result<()> {
        let conn = match self.conn.as_mut() {
            Some(conn) if self.authenticated => conn,
            _ => return Err(TunnelError::NotAuthenticated),
        };

        let reply = send_command(conn, &format!("SIGNAL {}\r\n", signal.keyword())).await?;
        if !reply.is_ok() {
            return Err(TunnelError::Control(reply.message()));
        }

        debug!("Signal {} accepted", signal.keyword());
        Ok(())
    }
}

/// Send a command and read its reply
async fn send_command<S>(conn: &mut BufReader<S>, cmd: &str) -> Result<Reply>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Never log credentials
    let verb = cmd.split_whitespace().next().unwrap_or_default();
    debug!("Sending Tor command: {}", verb);

    conn.get_mut().write_all(cmd.as_bytes()).await?;
    conn.get_mut().flush().await?;

    match tokio::time::timeout(REPLY_TIMEOUT, read_reply(conn)).await {
        Ok(reply) => reply,
        Err(_) => Err(TunnelError::Timeout {
            what: "control reply",
            waited: REPLY_TIMEOUT,
        }),
    }
}

/// Read reply lines up to the final `NNN <text>` line.
///
/// Mid lines (`NNN-`) are collected, data blocks (`NNN+` up to `.`) are
/// skipped.
async fn read_reply<R>(conn: &mut R) -> Result<Reply>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    let mut in_data_block = false;

    loop {
        let mut line = String::new();
        if conn.read_line(&mut line).await? == 0 {
            return Err(TunnelError::Control(
                "control connection closed mid-reply".to_string(),
            ));
        }
        let line = line.trim_end_matches(['\r', '\n']);

        if in_data_block {
            if line == "." {
                in_data_block = false;
            }
            continue;
        }

        let (code, sep, text) = match (line.get(..3), line.get(3..4), line.get(4..)) {
            (Some(code), Some(sep), Some(text)) => (code, sep, text),
            (Some(code), None, None) => (code, " ", ""),
            _ => {
                return Err(TunnelError::Control(format!(
                    "malformed reply line: {:?}",
                    line
                )))
            },
        };
        let code: u16 = code
            .parse()
            .map_err(|_| TunnelError::Control(format!("malformed reply line: {:?}", line)))?;

        lines.push(text.to_string());
        match sep {
            " " => return Ok(Reply { code, lines }),
            "+" => in_data_block = true,
            _ => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    /// Fake control port: records each command and answers with `reply`
    fn fake_tor(
        mut server: DuplexStream,
        reply: &'static str,
    ) -> tokio::task::JoinHandle<Vec<String>> {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            let mut buf = vec![0u8; 1024];
            loop {
                let n = server.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                seen.push(String::from_utf8_lossy(&buf[..n]).into_owned());
                if server.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
            seen
        })
    }

    fn channel() -> ControlChannel<DuplexStream> {
        ControlChannel::new("127.0.0.1", 9051).with_cookie_paths(Vec::new())
    }

    #[tokio::test]
    async fn test_signal_before_authenticate() {
        let mut control = channel();
        let err = control.signal(Signal::NewNym).await.unwrap_err();
        assert!(matches!(err, TunnelError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_password_is_hex_encoded() {
        let (client, server) = duplex(1024);
        let tor = fake_tor(server, "250 OK\r\n");

        let mut control = channel();
        control
            .authenticate_over(client, Some("passwd"))
            .await
            .unwrap();
        assert!(control.is_authenticated());

        control.signal(Signal::NewNym).await.unwrap();
        control.disconnect();

        let seen = tor.await.unwrap();
        assert_eq!(seen[0], "AUTHENTICATE 706173737764\r\n");
        assert_eq!(seen[1], "SIGNAL NEWNYM\r\n");
    }

    #[tokio::test]
    async fn test_null_authentication() {
        let (client, server) = duplex(1024);
        let tor = fake_tor(server, "250 OK\r\n");

        let mut control = channel();
        control.authenticate_over(client, None).await.unwrap();
        control.disconnect();

        assert_eq!(tor.await.unwrap()[0], "AUTHENTICATE\r\n");
    }

    #[tokio::test]
    async fn test_cookie_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let cookie = dir.path().join("control_auth_cookie");
        std::fs::write(&cookie, [0xab, 0xcd]).unwrap();

        let (client, server) = duplex(1024);
        let tor = fake_tor(server, "250 OK\r\n");

        let mut control = channel().with_cookie_paths(vec![cookie]);
        control.authenticate_over(client, None).await.unwrap();
        control.disconnect();

        assert_eq!(tor.await.unwrap()[0], "AUTHENTICATE abcd\r\n");
    }

    #[tokio::test]
    async fn test_rejected_password() {
        let (client, server) = duplex(1024);
        let _tor = fake_tor(
            server,
            "515 Authentication failed: Password did not match\r\n",
        );

        let mut control = channel();
        let err = control
            .authenticate_over(client, Some("wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Authentication(msg) if msg.contains("515")));
        assert!(!control.is_authenticated());
    }

    #[tokio::test]
    async fn test_required_password_policy() {
        let (client, _server) = duplex(1024);
        let mut control = channel().require_password(true);

        let err = control.authenticate_over(client, None).await.unwrap_err();
        assert!(matches!(err, TunnelError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_signal_rejected() {
        let (client, mut server) = duplex(1024);
        let tor = tokio::spawn(async move {
            let mut buf = vec![0u8; 256];
            let _ = server.read(&mut buf).await;
            server.write_all(b"250 OK\r\n").await.unwrap();
            let _ = server.read(&mut buf).await;
            server
                .write_all(b"552 Unrecognized signal\r\n")
                .await
                .unwrap();
            server
        });

        let mut control = channel();
        control.authenticate_over(client, Some("x")).await.unwrap();
        let err = control.signal(Signal::NewNym).await.unwrap_err();
        assert!(matches!(err, TunnelError::Control(msg) if msg.starts_with("552")));
        drop(tor.await.unwrap());
    }

    #[tokio::test]
    async fn test_read_reply_multiline() {
        let raw = "250-version=0.4.8.10\r\n250+config-text=\r\nSocksPort 9050\r\n.\r\n250 OK\r\n";
        let mut reader = BufReader::new(raw.as_bytes());

        let reply = read_reply(&mut reader).await.unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.lines, ["version=0.4.8.10", "config-text=", "OK"]);
    }

    #[tokio::test]
    async fn test_read_reply_closed() {
        let mut reader = BufReader::new("250-partial\r\n".as_bytes());
        assert!(matches!(
            read_reply(&mut reader).await,
            Err(TunnelError::Control(_))
        ));
    }
}
