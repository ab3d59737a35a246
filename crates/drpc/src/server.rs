//! dRPC server: listens on a Unix socket and runs one task per session.
//!
//! `DomainSocketServer` is the configured-but-not-listening state;
//! [`DomainSocketServer::start`] binds and returns a [`RunningServer`].
//! Cancelling the shutdown token stops the accept loop, removes the socket
//! file, and tells every session to close once its current call is answered.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use drpc_core::config::SocketConfig;

use crate::conn::{self, ProbeResult, SeqPacketConn, SeqPacketListener};
use crate::error::{DrpcError, Result};
use crate::module::Session;
use crate::registry::ModuleRegistry;
use crate::transport::{recv_message, send_message};

/// Pending connections the kernel queues before `accept`.
const LISTEN_BACKLOG: i32 = 128;

/// Live sessions by id, shared by the accept loop and every session task.
pub type SessionTable = Arc<DashMap<u64, Session>>;

/// A server that has not started listening yet.
#[derive(Debug)]
pub struct DomainSocketServer {
    socket_path: Option<PathBuf>,
    socket_mode: Option<u32>,
    registry: ModuleRegistry,
}

impl DomainSocketServer {
    pub fn new(registry: ModuleRegistry) -> Self {
        Self {
            socket_path: None,
            socket_mode: None,
            registry,
        }
    }

    pub fn from_config(config: &SocketConfig, registry: ModuleRegistry) -> Self {
        Self::new(registry)
            .socket_path(&config.path)
            .socket_mode(config.mode)
    }

    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    /// File mode applied to the socket after bind, e.g. `0o600`.
    pub fn socket_mode(mut self, mode: u32) -> Self {
        self.socket_mode = Some(mode);
        self
    }

    /// Bind the socket and spawn the accept loop. Must be called within a
    /// tokio runtime.
    pub fn start(self, shutdown: CancellationToken) -> Result<RunningServer> {
        let path = self.socket_path.ok_or(DrpcError::MissingSocketPath)?;
        let mode = self.socket_mode.ok_or(DrpcError::MissingSocketMode)?;

        match conn::probe(&path).map_err(bind_error(&path))? {
            ProbeResult::Live => return Err(DrpcError::SocketFileInUse(path)),
            ProbeResult::Stale => {
                tracing::info!(path = %path.display(), "removing stale socket file");
                std::fs::remove_file(&path).map_err(bind_error(&path))?;
            }
            ProbeResult::Absent => {}
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(bind_error(&path))?;
        }

        let listener = SeqPacketListener::bind(&path, LISTEN_BACKLOG).map_err(bind_error(&path))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(bind_error(&path))?;

        let registry = Arc::new(self.registry);
        tracing::info!(
            path = %path.display(),
            mode = %format!("{:04o}", mode),
            modules = ?registry.module_ids(),
            "drpc server listening"
        );

        let sessions: SessionTable = Arc::new(DashMap::new());
        let accept = tokio::spawn(accept_loop(
            listener,
            registry,
            sessions.clone(),
            shutdown,
        ));

        Ok(RunningServer {
            socket_path: path,
            sessions,
            accept,
        })
    }
}

/// A listening server. Dropping it does not stop it; cancel the shutdown
/// token and [`join`](RunningServer::join).
#[derive(Debug)]
pub struct RunningServer {
    socket_path: PathBuf,
    sessions: SessionTable,
    accept: JoinHandle<()>,
}

impl RunningServer {
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Wait until the accept loop and every session have exited.
    pub async fn join(self) {
        if let Err(e) = self.accept.await {
            tracing::error!(error = %e, "drpc accept loop panicked");
        }
    }
}

fn bind_error(path: &Path) -> impl FnOnce(std::io::Error) -> DrpcError {
    let path = path.to_path_buf();
    move |source| DrpcError::Bind { path, source }
}

async fn accept_loop(
    listener: SeqPacketListener,
    registry: Arc<ModuleRegistry>,
    sessions: SessionTable,
    shutdown: CancellationToken,
) {
    let mut tasks = JoinSet::new();
    let mut next_id = 0u64;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("drpc server shutting down");
                break;
            }

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "drpc session task panicked");
                }
            }

            accepted = listener.accept() => {
                let conn = match accepted {
                    Ok(c) => c,
                    Err(e) => {
                        if !shutdown.is_cancelled() {
                            tracing::error!(error = %e, "drpc accept failed, no longer accepting");
                        }
                        break;
                    }
                };

                next_id += 1;
                let peer = match conn.peer_credentials() {
                    Ok(cred) => Some(cred),
                    Err(e) => {
                        tracing::warn!(session = next_id, error = %e, "peer credentials unavailable");
                        None
                    }
                };
                let session = Session::new(next_id, peer);
                sessions.insert(next_id, session.clone());

                tracing::debug!(
                    session = next_id,
                    pid = peer.map(|p| p.pid),
                    uid = peer.map(|p| p.uid),
                    active = sessions.len(),
                    "drpc session opened"
                );

                tasks.spawn(run_session(
                    conn,
                    session,
                    registry.clone(),
                    sessions.clone(),
                    shutdown.clone(),
                ));
            }
        }
    }

    let path = listener.path().to_path_buf();
    drop(listener);
    if let Err(e) = std::fs::remove_file(&path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove socket file");
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "drpc session task panicked");
        }
    }
    tracing::info!(path = %path.display(), "drpc server stopped");
}

async fn run_session(
    conn: SeqPacketConn,
    session: Session,
    registry: Arc<ModuleRegistry>,
    sessions: SessionTable,
    shutdown: CancellationToken,
) {
    let id = session.id();

    loop {
        let raw_call = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                tracing::debug!(session = id, "closing session for shutdown");
                break;
            }
            received = recv_message(&conn) => match received {
                Ok(m) => m,
                Err(DrpcError::PeerClosed) => {
                    tracing::debug!(session = id, "peer disconnected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(session = id, error = %e, "receive failed, closing session");
                    break;
                }
            },
        };

        // Handlers may block; keep them off the runtime workers.
        let dispatch = {
            let registry = registry.clone();
            let session = session.clone();
            tokio::task::spawn_blocking(move || registry.process_message(&session, &raw_call))
        };
        let raw_response = match dispatch.await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                tracing::error!(session = id, error = %e, "failed to build response, closing session");
                break;
            }
            Err(e) => {
                tracing::error!(session = id, error = %e, "call handler panicked, closing session");
                break;
            }
        };

        if let Err(e) = send_message(&conn, &raw_response).await {
            tracing::warn!(session = id, error = %e, "send failed, closing session");
            break;
        }
    }

    sessions.remove(&id);
    if let Err(e) = conn.shutdown() {
        tracing::trace!(session = id, error = %e, "session socket already closed");
    }
    tracing::debug!(session = id, active = sessions.len(), "drpc session closed");
}
