//! Tor process supervision
//!
//! Launches tor as a child process, forwards its stdout/stderr line by line
//! and blocks until bootstrap completes.

use crate::config::TorConfig;
use crate::error::{Result, TunnelError};
use crate::logging::DAEMON_TARGET;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Line logged by tor once it is ready to carry traffic
pub const BOOTSTRAP_MARKER: &str = "Bootstrapped 100%";

/// Lines buffered between waits; older lines are dropped on overflow
const OUTPUT_CAPACITY: usize = 1024;

/// How to launch and stop the daemon
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub binary_path: PathBuf,
    pub data_dir: PathBuf,
    pub control_port: u16,
    pub bootstrap_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl DaemonSettings {
    pub fn from_config(config: &TorConfig) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            data_dir: config.data_dir.clone(),
            control_port: config.control_port,
            bootstrap_timeout: config.bootstrap_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }

    /// Arguments passed to the tor binary
    pub fn launch_args(&self) -> Vec<std::ffi::OsString> {
        vec![
            "--DataDirectory".into(),
            self.data_dir.clone().into_os_string(),
            "--ControlPort".into(),
            self.control_port.to_string().into(),
            "--torrc-file".into(),
            self.data_dir.join("torrc").into_os_string(),
        ]
    }
}

/// Combined, ordered view of the daemon's stdout and stderr
pub struct DaemonOutput {
    lines: broadcast::Receiver<String>,
}

impl DaemonOutput {
    pub(crate) fn new(lines: broadcast::Receiver<String>) -> Self {
        Self { lines }
    }

    /// Block until a line containing any of `markers` is seen.
    ///
    /// Returns `Ok(Some(line))` on a match and `Ok(None)` once every output
    /// stream has reached end-of-input.
    pub async fn wait_for(
        &mut self,
        markers: &[&str],
        timeout: Duration,
        cancel: &CancellationToken,
        what: &'static str,
    ) -> Result<Option<String>> {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TunnelError::Cancelled(what)),
                () = &mut deadline => {
                    return Err(TunnelError::Timeout { what, waited: timeout });
                },
                received = self.lines.recv() => match received {
                    Ok(line) => {
                        if markers.iter().any(|m| line.contains(m)) {
                            return Ok(Some(line));
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Dropped {} daemon output lines while waiting for {}", skipped, what);
                    },
                    Err(broadcast::error::RecvError::Closed) => return Ok(None),
                },
            }
        }
    }
}

/// Running tor child and its output plumbing
struct DaemonProcess {
    child: Child,
    output: DaemonOutput,
    readers: Vec<JoinHandle<()>>,
}

/// Owns the tor child process
pub struct ProcessSupervisor {
    settings: DaemonSettings,
    daemon: Option<DaemonProcess>,
}

impl ProcessSupervisor {
    pub fn new(settings: DaemonSettings) -> Self {
        Self {
            settings,
            daemon: None,
        }
    }

    pub fn settings(&self) -> &DaemonSettings {
        &self.settings
    }

    /// Whether a process handle is currently held
    pub fn is_running(&self) -> bool {
        self.daemon.is_some()
    }

    /// OS process id of the running daemon
    pub fn pid(&self) -> Option<u32> {
        self.daemon.as_ref().and_then(|d| d.child.id())
    }

    /// Output stream of the running daemon
    pub fn output_mut(&mut self) -> Result<&mut DaemonOutput> {
        self.daemon
            .as_mut()
            .map(|d| &mut d.output)
            .ok_or(TunnelError::NotRunning)
    }

    /// Start tor and block until it reports full bootstrap
    pub async fn start(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.daemon.is_some() {
            return Err(TunnelError::AlreadyRunning);
        }

        info!(
            "Starting Tor: {} (data dir {})",
            self.settings.binary_path.display(),
            self.settings.data_dir.display()
        );

        let mut child = Command::new(&self.settings.binary_path)
            .args(self.settings.launch_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (tx, rx) = broadcast::channel(OUTPUT_CAPACITY);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, tx.clone()));
        }
        // Output closes once both readers drop their senders
        drop(tx);

        let mut daemon = DaemonProcess {
            child,
            output: DaemonOutput::new(rx),
            readers,
        };

        let waited = daemon
            .output
            .wait_for(
                &[BOOTSTRAP_MARKER],
                self.settings.bootstrap_timeout,
                cancel,
                "bootstrap",
            )
            .await;

        match waited {
            Ok(Some(_)) => {
                info!("Tor is ready (pid {:?})", daemon.child.id());
                self.daemon = Some(daemon);
                Ok(())
            },
            Ok(None) => {
                let status = match tokio::time::timeout(
                    self.settings.shutdown_timeout,
                    daemon.child.wait(),
                )
                .await
                {
                    Ok(Ok(status)) => status.to_string(),
                    Ok(Err(e)) => format!("unknown exit status ({})", e),
                    Err(_) => {
                        let _ = daemon.child.kill().await;
                        "output closed but process kept running".to_string()
                    },
                };
                abort_readers(&daemon.readers);
                Err(TunnelError::StartupFailed(status))
            },
            Err(e) => {
                warn!("Bootstrap wait aborted, killing Tor: {}", e);
                let _ = daemon.child.kill().await;
                abort_readers(&daemon.readers);
                Err(e)
            },
        }
    }

    /// Reap the daemon if it exited on its own.
    ///
    /// Clears the handle and returns `DaemonExited` when the process is gone.
    pub fn check_alive(&mut self) -> Result<()> {
        let Some(daemon) = self.daemon.as_mut() else {
            return Err(TunnelError::NotRunning);
        };

        match daemon.child.try_wait()? {
            None => Ok(()),
            Some(status) => {
                warn!("Tor exited unexpectedly: {}", status);
                if let Some(daemon) = self.daemon.take() {
                    abort_readers(&daemon.readers);
                }
                Err(TunnelError::DaemonExited("liveness check"))
            },
        }
    }

    /// Terminate the daemon. No-op when nothing is running.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut daemon) = self.daemon.take() else {
            return Ok(());
        };

        request_termination(&mut daemon.child)?;

        let result =
            match tokio::time::timeout(self.settings.shutdown_timeout, daemon.child.wait()).await {
                Ok(Ok(status)) => {
                    debug!("Tor exited with {}", status);
                    Ok(())
                },
                Ok(Err(e)) => Err(TunnelError::Shutdown(e.to_string())),
                Err(_) => {
                    warn!(
                        "Tor did not exit within {:?}, killing it",
                        self.settings.shutdown_timeout
                    );
                    daemon
                        .child
                        .kill()
                        .await
                        .map_err(|e| TunnelError::Shutdown(e.to_string()))
                },
            };

        abort_readers(&daemon.readers);
        if result.is_ok() {
            info!("Tor process terminated");
        }
        result
    }
}

/// Ask the child to exit gracefully
#[cfg(unix)]
fn request_termination(child: &mut Child) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // Already reaped
    let Some(pid) = child.id() else {
        return Ok(());
    };

    termination_outcome(kill(Pid::from_raw(pid as i32), Signal::SIGTERM))
}

/// A daemon that is already gone counts as terminated
#[cfg(unix)]
fn termination_outcome(sent: nix::Result<()>) -> Result<()> {
    match sent {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(TunnelError::Shutdown(format!("SIGTERM failed: {}", e))),
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> Result<()> {
    child
        .start_kill()
        .map_err(|e| TunnelError::Shutdown(e.to_string()))
}

fn abort_readers(readers: &[JoinHandle<()>]) {
    for reader in readers {
        reader.abort();
    }
}

/// Forward every line of `stream` into the shared output channel
fn forward_lines<R>(stream: R, tx: broadcast::Sender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!(target: DAEMON_TARGET, "{}", line);
                    // No receiver just means nobody is waiting right now
                    let _ = tx.send(line);
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed reading Tor output: {}", e);
                    break;
                },
            }
        }
    })
}
