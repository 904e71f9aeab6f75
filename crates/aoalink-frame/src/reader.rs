use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::packet::{decode_packet, MediaPacket, DEFAULT_MAX_PAYLOAD};

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Reads complete media packets from any `Read` stream.
///
/// Used on the accessory side of the link; partial reads are buffered
/// internally so callers always get whole packets.
pub struct PacketReader<T> {
    inner: T,
    buf: BytesMut,
    max_payload_size: usize,
}

impl<T: Read> PacketReader<T> {
    /// Create a packet reader with the default payload limit.
    pub fn new(inner: T) -> Self {
        Self::with_max_payload(inner, DEFAULT_MAX_PAYLOAD)
    }

    /// Create a packet reader with an explicit payload limit.
    pub fn with_max_payload(inner: T, max_payload_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_payload_size,
        }
    }

    /// Read the next complete packet (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_packet(&mut self) -> Result<MediaPacket> {
        loop {
            if let Some(packet) = decode_packet(&mut self.buf, self.max_payload_size)? {
                trace!(
                    kind = packet.kind.name(),
                    pts = packet.pts,
                    size = packet.payload.len(),
                    "packet decoded"
                );
                return Ok(packet);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
