//! Client side of a dRPC socket.
//!
//! One call at a time per connection: the mutex guarding the socket and
//! sequence counter is held for the whole exchange, so responses never
//! need to be matched to calls.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use drpc_core::envelope::{self, Call, Response};

use crate::conn::SeqPacketConn;
use crate::error::{DrpcError, Result};
use crate::transport::{recv_message, send_message};

#[derive(Debug, Default)]
struct ClientState {
    conn: Option<SeqPacketConn>,
    sequence: i64,
}

/// A connection to a dRPC server listening on a Unix socket.
///
/// `Disconnected -> Connected -> Disconnected`; a closed client can connect
/// again, which restarts its sequence numbers.
#[derive(Debug)]
pub struct ClientConnection {
    socket_path: PathBuf,
    state: Mutex<ClientState>,
}

impl ClientConnection {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            state: Mutex::new(ClientState::default()),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.conn.is_some()
    }

    /// Dial the server. Does nothing when already connected.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.conn.is_some() {
            return Ok(());
        }

        let conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DrpcError::Cancelled),
            res = SeqPacketConn::connect(&self.socket_path) => res.map_err(|source| DrpcError::Dial {
                path: self.socket_path.clone(),
                source,
            })?,
        };

        tracing::debug!(path = %self.socket_path.display(), "drpc client connected");
        state.conn = Some(conn);
        state.sequence = 0;
        Ok(())
    }

    /// Close the connection. Closing a disconnected client is a no-op.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(conn) = state.conn.take() else {
            return Ok(());
        };

        tracing::debug!(path = %self.socket_path.display(), "drpc client closing");
        close_conn(&conn).map_err(DrpcError::Close)
    }

    /// Send `call` and wait for its response.
    ///
    /// The call's sequence is overwritten with the next value for this
    /// connection. If `cancel` fires before the response arrives, the
    /// connection is torn down to abandon the exchange and the client is left
    /// disconnected.
    pub async fn send_msg(&self, cancel: &CancellationToken, mut call: Call) -> Result<Response> {
        let mut state = self.state.lock().await;
        if state.conn.is_none() {
            return Err(DrpcError::NotConnected);
        }

        state.sequence += 1;
        call.sequence = state.sequence;
        let raw_call = envelope::marshal(&call)?;

        let outcome = match state.conn.as_ref() {
            Some(conn) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    res = exchange(conn, &raw_call) => Some(res),
                }
            }
            None => return Err(DrpcError::NotConnected),
        };

        let Some(result) = outcome else {
            tracing::debug!(
                path = %self.socket_path.display(),
                sequence = call.sequence,
                "drpc call cancelled, dropping connection"
            );
            let closed = state.conn.take().map(|conn| close_conn(&conn));
            return match closed {
                Some(Err(e)) => Err(DrpcError::CancelledCloseFailed(e)),
                _ => Err(DrpcError::Cancelled),
            };
        };

        let raw_response = result?;
        let response = envelope::unmarshal_response(&raw_response)?;

        tracing::trace!(
            sequence = call.sequence,
            response_sequence = response.sequence,
            status = response.status,
            "drpc call complete"
        );
        Ok(response)
    }
}

async fn exchange(conn: &SeqPacketConn, raw_call: &[u8]) -> Result<Vec<u8>> {
    send_message(conn, raw_call).await?;
    recv_message(conn).await
}

/// Shut the socket down; a peer that already went away is not an error.
fn close_conn(conn: &SeqPacketConn) -> std::io::Result<()> {
    match conn.shutdown() {
        Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}
