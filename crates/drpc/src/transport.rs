//! Message transport: send and receive one logical message as a run of
//! chunks over a [`PacketConn`].

use drpc_core::chunk::{decode_chunk, split_message};
use drpc_core::wire::MAX_CHUNK_SIZE;

use crate::conn::PacketConn;
use crate::error::{DrpcError, Result};

/// Upper bound on the up-front allocation for a reassembly buffer. Larger
/// messages grow as chunks arrive, so a bogus `total_data_size` in chunk 0
/// cannot force a huge allocation.
const PREALLOC_LIMIT: usize = 1 << 20;

/// Send `payload` as one message. Stops at the first failed write.
pub async fn send_message<C: PacketConn>(conn: &C, payload: &[u8]) -> Result<()> {
    for (index, chunk) in split_message(payload).enumerate() {
        conn.send_packet(&chunk)
            .await
            .map_err(|source| DrpcError::SendChunk {
                index: index as u32,
                source,
            })?;
    }

    tracing::trace!(bytes = payload.len(), "message sent");
    Ok(())
}

/// Receive one message, validating every chunk against chunk 0.
pub async fn recv_message<C: PacketConn>(conn: &C) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; MAX_CHUNK_SIZE];

    let mut message = Vec::new();
    let mut expected_index = 0u32;
    let mut total_chunks = 0u32;
    let mut total_data_size = 0usize;

    loop {
        let len = conn.recv_packet(&mut buf).await.map_err(DrpcError::Recv)?;
        if len == 0 {
            return Err(DrpcError::PeerClosed);
        }

        let chunk = decode_chunk(&buf[..len])?;

        if chunk.index != expected_index {
            return Err(DrpcError::LostChunk {
                expected: expected_index,
                got: chunk.index,
            });
        }

        if expected_index == 0 {
            // Even an empty message is sent as one chunk.
            if chunk.total_chunks == 0 {
                return Err(DrpcError::ZeroTotalChunks);
            }
            total_chunks = chunk.total_chunks;
            total_data_size = chunk.total_data_size;
            message.reserve(usize::min(total_data_size, PREALLOC_LIMIT));
        } else {
            if chunk.total_chunks != total_chunks {
                return Err(DrpcError::InconsistentTotalChunks {
                    expected: total_chunks,
                    got: chunk.total_chunks,
                });
            }
            if chunk.total_data_size != total_data_size {
                return Err(DrpcError::InconsistentDataSize {
                    expected: total_data_size,
                    got: chunk.total_data_size,
                });
            }
        }

        if message.len() + chunk.data.len() > total_data_size {
            return Err(DrpcError::DataOverflow {
                total: total_data_size,
                received: message.len(),
                chunk: chunk.data.len(),
            });
        }
        message.extend_from_slice(chunk.data);

        expected_index += 1;
        if expected_index >= total_chunks {
            break;
        }
    }

    if message.len() != total_data_size {
        return Err(DrpcError::ShortMessage {
            expected: total_data_size,
            got: message.len(),
        });
    }

    tracing::trace!(bytes = message.len(), chunks = total_chunks, "message received");
    Ok(message)
}
