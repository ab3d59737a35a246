//! `drpc-ctl serve` — host the echo module until Ctrl-C.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use drpc::{DomainSocketServer, ModuleRegistry};
use drpc_core::config::SocketConfig;

use crate::echo::EchoModule;

pub async fn cmd_serve(socket: &SocketConfig, echo_module: i32) -> Result<()> {
    let mut registry = ModuleRegistry::new();
    registry
        .register_module(EchoModule::new(echo_module))
        .context("failed to register echo module")?;

    let shutdown = CancellationToken::new();
    let server = DomainSocketServer::from_config(socket, registry)
        .start(shutdown.clone())
        .with_context(|| format!("failed to start server on {}", socket.path.display()))?;

    println!("Serving on {} (echo module {})", server.socket_path().display(), echo_module);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!(sessions = server.session_count(), "interrupt received, shutting down");
    shutdown.cancel();
    server.join().await;
    Ok(())
}
