//! Process supervision against fake tor executables
//!
//! Each test writes a small shell script that mimics tor's log output.

#![cfg(unix)]

use onionlink::tor::{DaemonSettings, ProcessSupervisor};
use onionlink::TunnelError;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

// Writing a script while another test forks can fail exec with ETXTBSY
static SERIAL: Mutex<()> = Mutex::const_new(());

fn fake_tor(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-tor.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn settings(dir: &Path, body: &str) -> DaemonSettings {
    DaemonSettings {
        binary_path: fake_tor(dir, body),
        data_dir: dir.to_path_buf(),
        control_port: 9051,
        bootstrap_timeout: Duration::from_secs(10),
        shutdown_timeout: Duration::from_secs(5),
    }
}

const READY: &str = r#"echo "Nov 01 00:00:00.000 [notice] Bootstrapped 0% (starting): Starting"
echo "Nov 01 00:00:01.000 [notice] Bootstrapped 100% (done): Done"
exec sleep 30"#;

#[tokio::test]
async fn test_start_waits_for_bootstrap_substring() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let mut supervisor = ProcessSupervisor::new(settings(dir.path(), READY));

    supervisor.start(&CancellationToken::new()).await.unwrap();
    assert!(supervisor.is_running());
    assert!(supervisor.pid().is_some());

    supervisor.stop().await.unwrap();
    assert!(!supervisor.is_running());
}

#[tokio::test]
async fn test_launch_arguments() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let body = format!("echo \"$@\" > \"$2/args.txt\"\n{}", READY);
    let mut supervisor = ProcessSupervisor::new(settings(dir.path(), &body));

    supervisor.start(&CancellationToken::new()).await.unwrap();
    supervisor.stop().await.unwrap();

    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    let data_dir = dir.path().display();
    assert_eq!(
        args.trim(),
        format!(
            "--DataDirectory {} --ControlPort 9051 --torrc-file {}/torrc",
            data_dir, data_dir
        )
    );
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let mut supervisor = ProcessSupervisor::new(settings(dir.path(), READY));
    let cancel = CancellationToken::new();

    supervisor.start(&cancel).await.unwrap();
    let pid = supervisor.pid();

    let err = supervisor.start(&cancel).await.unwrap_err();
    assert!(matches!(err, TunnelError::AlreadyRunning));
    assert_eq!(supervisor.pid(), pid);
    assert!(supervisor.is_running());

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_exit_before_bootstrap_fails() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let body = r#"echo "[notice] Bootstrapped 5% (conn): Connecting to a relay"
echo "[err] Reading config failed--see warnings above."
exit 1"#;
    let mut supervisor = ProcessSupervisor::new(settings(dir.path(), body));

    let err = supervisor
        .start(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TunnelError::StartupFailed(_)));
    assert!(!supervisor.is_running());
}

#[tokio::test]
async fn test_bootstrap_marker_on_stderr() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let body = "echo \"[notice] Bootstrapped 100% (done): Done\" >&2\nexec sleep 30";
    let mut supervisor = ProcessSupervisor::new(settings(dir.path(), body));

    supervisor.start(&CancellationToken::new()).await.unwrap();
    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_bootstrap_timeout_kills_daemon() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let mut settings = settings(dir.path(), "echo \"Bootstrapped 50%\"\nexec sleep 30");
    settings.bootstrap_timeout = Duration::from_millis(300);
    let mut supervisor = ProcessSupervisor::new(settings);

    let err = supervisor
        .start(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TunnelError::Timeout { what: "bootstrap", .. }));
    assert!(!supervisor.is_running());
}

#[tokio::test]
async fn test_bootstrap_cancelled() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let mut supervisor = ProcessSupervisor::new(settings(dir.path(), "exec sleep 30"));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = supervisor.start(&cancel).await.unwrap_err();
    assert!(matches!(err, TunnelError::Cancelled("bootstrap")));
    assert!(!supervisor.is_running());
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let mut supervisor = ProcessSupervisor::new(settings(dir.path(), READY));

    supervisor.start(&CancellationToken::new()).await.unwrap();
    supervisor.stop().await.unwrap();
    supervisor.stop().await.unwrap();
    assert!(!supervisor.is_running());
}

#[tokio::test]
async fn test_stop_kills_daemon_ignoring_sigterm() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let body = r#"trap '' TERM
echo "Bootstrapped 100% (done): Done"
while true; do sleep 1; done"#;
    let mut settings = settings(dir.path(), body);
    settings.shutdown_timeout = Duration::from_millis(300);
    let mut supervisor = ProcessSupervisor::new(settings);

    supervisor.start(&CancellationToken::new()).await.unwrap();
    supervisor.stop().await.unwrap();
    assert!(!supervisor.is_running());
}

#[tokio::test]
async fn test_abnormal_exit_detected() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let body = "echo \"Bootstrapped 100% (done): Done\"\nsleep 0.2\nexit 3";
    let mut supervisor = ProcessSupervisor::new(settings(dir.path(), body));

    supervisor.start(&CancellationToken::new()).await.unwrap();

    let mut result = Ok(());
    for _ in 0..50 {
        result = supervisor.check_alive();
        if result.is_err() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert!(matches!(
        result,
        Err(TunnelError::DaemonExited("liveness check"))
    ));
    assert!(!supervisor.is_running());
    supervisor.stop().await.unwrap();
}
