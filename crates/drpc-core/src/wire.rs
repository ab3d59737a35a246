//! dRPC wire format — the chunk header shared with the engine.
//!
//! This type IS the protocol. The engine reads the same bytes through its
//! C `struct drpc_header`, so every field width and its order is part of
//! the contract. Changing anything here breaks interop with the engine.
//!
//! The header is #[repr(C, packed)] and uses zerocopy derives for safe,
//! allocation-free conversion. Fields are in native byte order, matching
//! the peer's struct layout on the same host. There is no unsafe code in
//! this module.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Chunk Header ─────────────────────────────────────────────────────────────

/// Prefix of every datagram sent over a dRPC socket.
///
/// A logical message is split into `total_chunks` datagrams. Each one
/// carries its own position and the size of the whole message, so the
/// receiver can reassemble and validate without any side channel.
///
/// Wire size: 24 bytes on 64-bit hosts.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct ChunkHeader {
    /// Zero-based position of this chunk within the message.
    pub chunk_idx: u32,

    /// Number of chunks making up the message. Always at least 1.
    pub total_chunks: u32,

    /// Payload bytes following this header. At most [`MAX_DATA_SIZE`].
    /// `size_t` on the engine side.
    pub chunk_data_size: usize,

    /// Size of the reassembled message. `size_t` on the engine side.
    pub total_data_size: usize,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(ChunkHeader, [u8; HEADER_SIZE]);

// ── Constants ─────────────────────────────────────────────────────────────────

/// Largest datagram either side will send or accept, header included.
/// Mirrors the engine's `UNIXCOMM_MAXMSGSIZE`.
pub const MAX_CHUNK_SIZE: usize = 16384;

/// Bytes occupied by [`ChunkHeader`] on the wire.
pub const HEADER_SIZE: usize = 2 * std::mem::size_of::<u32>() + 2 * std::mem::size_of::<usize>();

/// Largest payload a single chunk can carry.
pub const MAX_DATA_SIZE: usize = MAX_CHUNK_SIZE - HEADER_SIZE;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting a received datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("buffer too small for chunk header: {0} bytes (need {})", HEADER_SIZE)]
    BufferTooSmall(usize),

    #[error("chunk data size {0} exceeds maximum {}", MAX_DATA_SIZE)]
    ChunkTooLarge(usize),

    #[error("chunk declares {declared} data bytes but only {available} are present")]
    Truncated { declared: usize, available: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
