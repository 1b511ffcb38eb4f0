//! Session commands - drive the full Tor lifecycle

use super::RunArgs;
use crate::config::{validate_endpoint, Config};
use crate::coord::Coordinator;
use crate::error::TunnelError;
use anyhow::{Context, Result};
use tracing::info;

/// Start Tor, exchange one message with the remote endpoint, stop Tor
pub async fn run_session(config: &Config, args: &RunArgs) -> Result<()> {
    let target = config.target.as_ref();
    let address = args
        .address
        .clone()
        .or_else(|| target.map(|t| t.address.clone()))
        .context("No remote address: pass --address or set target.address")?;
    let port = args
        .port
        .or_else(|| target.map(|t| t.port))
        .context("No remote port: pass --port or set target.port")?;
    validate_endpoint(&address, port).context("Invalid remote endpoint")?;

    let receive_size = config.session.receive_buffer;
    let message = args.message.clone();
    let reset = args.reset_circuit;

    let coordinator = Coordinator::new(config);
    let cancel = coordinator.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, aborting");
            cancel.cancel();
        }
    });

    let response = coordinator
        .scoped(|tunnel| {
            Box::pin(async move {
                tunnel.connect(&address, port).await?;
                tunnel.send(message.as_bytes()).await?;
                let response = tunnel.receive_text(receive_size).await?;

                if reset {
                    tunnel.reset_circuit().await?;
                }
                tunnel.close().await?;
                Ok::<_, TunnelError>(response)
            })
        })
        .await;
    ctrl_c.abort();

    let response = response.context("Tunnelled session failed")?;
    println!("[OUT] Data received: {}", response);
    Ok(())
}

/// Start Tor, authenticate, report and stop
pub async fn run_bootstrap(config: &Config) -> Result<()> {
    let mut coordinator = Coordinator::new(config);

    let started = coordinator.start().await;
    if started.is_ok() {
        println!(
            "✓ Tor bootstrapped (pid {}) and control port {} authenticated",
            coordinator
                .daemon_pid()
                .map_or_else(|| "unknown".to_string(), |p| p.to_string()),
            config.tor.control_port
        );
    }

    let stopped = coordinator.shutdown().await;
    started.context("Tor failed to start")?;
    stopped.context("Tor failed to stop cleanly")?;
    Ok(())
}
