//! dRPC integration test harness.
//!
//! Every test runs a real server on a seqpacket socket inside its own
//! temporary directory, so tests can run in parallel.
//!
//!   cargo test --test integration

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use drpc::{
    Call, ClientConnection, DomainSocketServer, Method, Module, ModuleError, ModuleRegistry,
    RunningServer, Session,
};

mod end_to_end;
mod sessions;

// ── Test module ───────────────────────────────────────────────────────────────

pub const TEST_MODULE: i32 = 42;

pub const ECHO: i32 = 1;
/// Sleeps for the number of milliseconds in the body, then echoes it.
pub const SLOW_ECHO: i32 = 2;
pub const FAIL: i32 = 3;
/// Returns the caller's uid as decimal text.
pub const PEER_UID: i32 = 4;

pub struct TestModule;

impl fmt::Display for TestModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("test")
    }
}

impl Module for TestModule {
    fn id(&self) -> i32 {
        TEST_MODULE
    }

    fn method(&self, id: i32) -> Result<Method, ModuleError> {
        let name = match id {
            ECHO => "echo",
            SLOW_ECHO => "slow_echo",
            FAIL => "fail",
            PEER_UID => "peer_uid",
            _ => {
                return Err(ModuleError::UnknownMethod {
                    module: TEST_MODULE,
                    method: id,
                })
            }
        };
        Ok(Method::new(TEST_MODULE, id, name))
    }

    fn handle_call(
        &self,
        session: &Session,
        method: &Method,
        body: &[u8],
    ) -> Result<Vec<u8>, ModuleError> {
        match method.id() {
            SLOW_ECHO => {
                let ms: u64 = std::str::from_utf8(body)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| anyhow::anyhow!("slow_echo body must be milliseconds"))?;
                std::thread::sleep(Duration::from_millis(ms));
                Ok(body.to_vec())
            }
            FAIL => Err(anyhow::anyhow!("asked to fail").into()),
            PEER_UID => {
                let peer = session
                    .peer()
                    .ok_or_else(|| anyhow::anyhow!("no peer credentials"))?;
                Ok(peer.uid.to_string().into_bytes())
            }
            _ => Ok(body.to_vec()),
        }
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

/// A running server plus the directory holding its socket.
pub struct TestServer {
    pub dir: TempDir,
    pub path: PathBuf,
    pub shutdown: CancellationToken,
    pub server: RunningServer,
}

pub fn test_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry
        .register_module(TestModule)
        .expect("test module registers once");
    registry
}

pub fn start_at(path: &Path, shutdown: CancellationToken) -> drpc::Result<RunningServer> {
    DomainSocketServer::new(test_registry())
        .socket_path(path)
        .socket_mode(0o600)
        .start(shutdown)
}

pub fn start_server() -> Result<TestServer> {
    let dir = TempDir::new().context("failed to create temp dir")?;
    let path = dir.path().join("drpc.sock");
    let shutdown = CancellationToken::new();
    let server = start_at(&path, shutdown.clone()).context("failed to start server")?;
    Ok(TestServer {
        dir,
        path,
        shutdown,
        server,
    })
}

impl TestServer {
    pub async fn client(&self) -> Result<ClientConnection> {
        let client = ClientConnection::new(&self.path);
        client
            .connect(&CancellationToken::new())
            .await
            .context("client failed to connect")?;
        Ok(client)
    }

    /// Cancel the shutdown token and wait for the server to finish. The
    /// directory is handed back so callers can inspect it afterwards.
    pub async fn stop(self) -> Result<TempDir> {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.server.join())
            .await
            .context("server did not stop within 5s")?;
        Ok(self.dir)
    }
}

/// Poll until `f` holds, for up to two seconds.
pub async fn wait_until(what: &str, mut f: impl FnMut() -> bool) -> Result<()> {
    for _ in 0..200 {
        if f() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("timed out waiting for {what}")
}

pub fn echo(body: &str) -> Call {
    Call::new(TEST_MODULE, ECHO, body.as_bytes())
}

pub fn slow_echo(ms: u64) -> Call {
    Call::new(TEST_MODULE, SLOW_ECHO, ms.to_string().into_bytes())
}
