//! Error types for the dRPC transport, client, and server.

use std::path::PathBuf;

use drpc_core::envelope::{DecodeError, EncodeError};
use drpc_core::wire::WireError;

pub type Result<T, E = DrpcError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum DrpcError {
    // ── transport ────────────────────────────────────────────────────────────
    #[error("malformed chunk: {0}")]
    Wire(#[from] WireError),

    #[error("lost chunk: expected index {expected}, got {got}")]
    LostChunk { expected: u32, got: u32 },

    #[error("first chunk declares zero total chunks")]
    ZeroTotalChunks,

    #[error("inconsistent total chunks: expected {expected}, got {got}")]
    InconsistentTotalChunks { expected: u32, got: u32 },

    #[error("inconsistent data size: expected {expected}, got {got}")]
    InconsistentDataSize { expected: usize, got: usize },

    #[error("chunk overflows message: {received} of {total} bytes received, chunk adds {chunk}")]
    DataOverflow {
        total: usize,
        received: usize,
        chunk: usize,
    },

    #[error("short message: expected {expected} bytes, got {got}")]
    ShortMessage { expected: usize, got: usize },

    #[error("failed to send chunk {index}: {source}")]
    SendChunk {
        index: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to receive chunk: {0}")]
    Recv(#[source] std::io::Error),

    #[error("peer closed the connection")]
    PeerClosed,

    // ── connection ───────────────────────────────────────────────────────────
    #[error("not connected")]
    NotConnected,

    #[error("failed to connect to {path}: {source}")]
    Dial {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to close connection: {0}")]
    Close(#[source] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation cancelled; closing the connection also failed: {0}")]
    CancelledCloseFailed(#[source] std::io::Error),

    // ── envelope ─────────────────────────────────────────────────────────────
    #[error("failed to marshal envelope: {0}")]
    Marshal(#[from] EncodeError),

    #[error("failed to unmarshal envelope: {0}")]
    Unmarshal(#[from] DecodeError),

    // ── startup ──────────────────────────────────────────────────────────────
    #[error("module {0} is already registered")]
    DuplicateModule(i32),

    #[error("socket path is not set")]
    MissingSocketPath,

    #[error("socket file mode is not set")]
    MissingSocketMode,

    #[error("socket {0} is already in use by a live listener")]
    SocketFileInUse(PathBuf),

    #[error("failed to listen on {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DrpcError {
    /// True for the cancellation outcomes of a client operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DrpcError::Cancelled | DrpcError::CancelledCloseFailed(_))
    }
}
