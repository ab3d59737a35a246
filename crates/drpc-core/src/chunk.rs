//! Chunk codec. Splits messages into datagrams and parses them back.
//!
//! Pure functions, no I/O. The transport layer in the `drpc` crate drives
//! these over a socket.

use zerocopy::{AsBytes, FromBytes};

use crate::wire::{ChunkHeader, WireError, HEADER_SIZE, MAX_DATA_SIZE};

/// One parsed chunk, borrowing its data from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub index: u32,
    pub total_chunks: u32,
    pub total_data_size: usize,
    pub data: &'a [u8],
}

/// Number of chunks needed to carry a message of `message_size` bytes.
///
/// An empty message still travels as one chunk with no data.
pub fn num_chunks(message_size: usize) -> usize {
    if message_size == 0 {
        return 1;
    }
    message_size.div_ceil(MAX_DATA_SIZE)
}

/// Build the wire bytes for one chunk: header immediately followed by `data`.
///
/// `data` must not exceed [`MAX_DATA_SIZE`]; callers split with
/// [`split_message`] which guarantees it.
pub fn encode_chunk(
    data: &[u8],
    index: u32,
    total_chunks: u32,
    total_data_size: usize,
) -> Vec<u8> {
    debug_assert!(data.len() <= MAX_DATA_SIZE);

    let header = ChunkHeader {
        chunk_idx: index,
        total_chunks,
        chunk_data_size: data.len(),
        total_data_size,
    };

    let mut buf = Vec::with_capacity(HEADER_SIZE + data.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(data);
    buf
}

/// Parse one received datagram.
pub fn decode_chunk(buf: &[u8]) -> Result<Chunk<'_>, WireError> {
    if buf.len() < HEADER_SIZE {
        return Err(WireError::BufferTooSmall(buf.len()));
    }

    let header =
        ChunkHeader::read_from_prefix(buf).ok_or(WireError::BufferTooSmall(buf.len()))?;

    // Packed fields: copy to locals before use.
    let chunk_data_size = header.chunk_data_size;
    if chunk_data_size > MAX_DATA_SIZE {
        return Err(WireError::ChunkTooLarge(chunk_data_size));
    }

    let available = buf.len() - HEADER_SIZE;
    if chunk_data_size > available {
        return Err(WireError::Truncated {
            declared: chunk_data_size,
            available,
        });
    }

    Ok(Chunk {
        index: header.chunk_idx,
        total_chunks: header.total_chunks,
        total_data_size: header.total_data_size,
        data: &buf[HEADER_SIZE..HEADER_SIZE + chunk_data_size],
    })
}

/// Split `payload` into encoded chunks, in index order.
pub fn split_message(payload: &[u8]) -> impl Iterator<Item = Vec<u8>> + '_ {
    let total = num_chunks(payload.len());
    let total_data_size = payload.len();

    (0..total).map(move |i| {
        let start = i * MAX_DATA_SIZE;
        let end = usize::min(start + MAX_DATA_SIZE, total_data_size);
        encode_chunk(&payload[start..end], i as u32, total as u32, total_data_size)
    })
}
