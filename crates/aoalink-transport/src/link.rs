use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::platform::{AccessoryHandle, AccessoryPlatform};
use crate::stream::AccessoryStream;

/// Upper bound on how long a blocked `read_byte` takes to notice `close()`.
const READ_POLL_SLICE: Duration = Duration::from_millis(50);

/// Upper bound on how long a stalled `write` takes to notice `abort_writes()`.
const WRITE_POLL_SLICE: Duration = Duration::from_millis(50);

/// Largest single write issued once the descriptor reports it is writable.
const WRITE_CHUNK: usize = 16 * 1024;

/// Exclusive owner of one open accessory descriptor.
///
/// The descriptor is duplicated into a read side, a write side, and a control
/// handle used only for shutdown. Reads and writes are independent (full
/// duplex); `close()` may be called from any thread while a read is blocked.
/// The descriptors are released when the link is dropped.
pub struct ByteLink {
    accessory: AccessoryHandle,
    reader: Mutex<AccessoryStream>,
    writer: Mutex<AccessoryStream>,
    control: AccessoryStream,
    closed: AtomicBool,
    writes_aborted: AtomicBool,
}

impl ByteLink {
    /// Open the duplex descriptor for `accessory` through `platform`.
    pub fn open(platform: &dyn AccessoryPlatform, accessory: &AccessoryHandle) -> Result<Self> {
        let stream = platform.open(accessory)?;
        Self::from_stream(accessory.clone(), stream)
    }

    /// Take ownership of an already opened stream.
    pub fn from_stream(accessory: AccessoryHandle, stream: AccessoryStream) -> Result<Self> {
        let reader = stream.try_clone()?;
        let writer = stream.try_clone()?;

        info!(accessory = %accessory, kind = stream.kind(), "accessory link opened");

        Ok(Self {
            accessory,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            control: stream,
            closed: AtomicBool::new(false),
            writes_aborted: AtomicBool::new(false),
        })
    }

    /// Blocking read of exactly one byte.
    ///
    /// EOF is reported as [`TransportError::Closed`]; the link has no framing to
    /// recover from, so callers treat it as terminal.
    pub fn read_byte(&self) -> Result<u8> {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let mut buf = [0u8; 1];

        loop {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }

            if !reader.wait_readable(READ_POLL_SLICE)? {
                continue;
            }

            match reader.read(&mut buf) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(_) => return Ok(buf[0]),
                Err(err)
                    if err.kind() == ErrorKind::Interrupted
                        || err.kind() == ErrorKind::WouldBlock =>
                {
                    continue
                }
                Err(_) if self.is_closed() => return Err(TransportError::Closed),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    /// Write a complete buffer, then flush.
    ///
    /// Any failure, including the peer having gone away, is returned as
    /// [`TransportError::WriteFailed`]. The link stays usable for reads and for
    /// `close()`. A write stalled on a peer that stopped reading gives up within
    /// one poll slice of [`ByteLink::abort_writes`] or `close()`.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_writable() {
            return Err(not_writable());
        }

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let mut offset = 0usize;
        while offset < bytes.len() {
            if !self.is_writable() {
                return Err(not_writable());
            }
            match writer.wait_writable(WRITE_POLL_SLICE) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(TransportError::Io(err)) => return Err(TransportError::WriteFailed(err)),
                Err(err) => return Err(err),
            }

            let end = bytes.len().min(offset + WRITE_CHUNK);
            match writer.write(&bytes[offset..end]) {
                Ok(0) => {
                    return Err(TransportError::WriteFailed(std::io::Error::from(
                        ErrorKind::WriteZero,
                    )))
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::WriteFailed(err)),
            }
        }

        loop {
            match writer.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::WriteFailed(err)),
            }
        }
    }

    /// Refuse further writes and make any in-flight write give up.
    ///
    /// Reads and the descriptor itself are unaffected; `close()` still has to
    /// be called. Idempotent.
    pub fn abort_writes(&self) {
        if !self.writes_aborted.swap(true, Ordering::SeqCst) {
            debug!(accessory = %self.accessory, "link writes aborted");
        }
    }

    /// Whether writes are still accepted.
    pub fn is_writable(&self) -> bool {
        !self.is_closed() && !self.writes_aborted.load(Ordering::SeqCst)
    }

    /// Close both directions. Idempotent and infallible.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!(accessory = %self.accessory, "link already closed");
            return;
        }

        if let Err(err) = self.control.shutdown() {
            debug!(accessory = %self.accessory, %err, "link shutdown failed");
        }

        info!(accessory = %self.accessory, "accessory link closed");
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The accessory this link was opened for.
    pub fn accessory(&self) -> &AccessoryHandle {
        &self.accessory
    }
}

impl std::fmt::Debug for ByteLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteLink")
            .field("accessory", &self.accessory)
            .field("kind", &self.control.kind())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn not_writable() -> TransportError {
    TransportError::WriteFailed(std::io::Error::new(
        ErrorKind::NotConnected,
        "link closed for writing",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::*;

    fn link_pair() -> (ByteLink, UnixStream) {
        let (local, peer) = UnixStream::pair().expect("socket pair should be creatable");
        let link = ByteLink::from_stream(
            AccessoryHandle::new("test-accessory"),
            AccessoryStream::from_unix(local),
        )
        .expect("link should wrap stream");
        (link, peer)
    }

    #[test]
    fn read_byte_returns_control_codes_in_order() {
        let (link, mut peer) = link_pair();
        peer.write_all(&[1, 2, 7]).unwrap();

        assert_eq!(link.read_byte().unwrap(), 1);
        assert_eq!(link.read_byte().unwrap(), 2);
        assert_eq!(link.read_byte().unwrap(), 7);
    }

    #[test]
    fn read_byte_on_peer_eof_is_closed() {
        let (link, peer) = link_pair();
        drop(peer);

        let err = link.read_byte().unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn close_unblocks_pending_reader() {
        let (link, _peer) = link_pair();
        let link = Arc::new(link);

        let reader_link = link.clone();
        let reader = std::thread::spawn(move || reader_link.read_byte());

        std::thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        link.close();

        let result = reader.join().expect("reader thread should not panic");
        assert!(matches!(result, Err(TransportError::Closed)));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn close_is_idempotent() {
        let (link, _peer) = link_pair();
        link.close();
        link.close();
        assert!(link.is_closed());
    }

    #[test]
    fn write_delivers_whole_buffer() {
        let (link, mut peer) = link_pair();
        let payload = vec![0x5A; 32 * 1024];

        let writer = std::thread::spawn(move || {
            link.write(&payload).unwrap();
            link
        });

        let mut received = vec![0u8; 32 * 1024];
        peer.read_exact(&mut received).unwrap();
        assert!(received.iter().all(|b| *b == 0x5A));
        let _ = writer.join().unwrap();
    }

    #[test]
    fn write_after_close_fails_without_panic() {
        let (link, _peer) = link_pair();
        link.close();
        let err = link.write(b"frame").unwrap_err();
        assert!(matches!(err, TransportError::WriteFailed(_)));
    }

    #[test]
    fn write_after_peer_gone_reports_write_failed() {
        let (link, peer) = link_pair();
        drop(peer);

        let err = link.write(b"frame").unwrap_err();
        assert!(matches!(err, TransportError::WriteFailed(_)));

        // Close still succeeds after a failed write.
        link.close();
        assert!(link.is_closed());
    }

    #[test]
    fn abort_releases_write_stalled_on_silent_peer() {
        let (link, _peer) = link_pair();
        let link = Arc::new(link);
        let writer = {
            let link = Arc::clone(&link);
            std::thread::spawn(move || link.write(&vec![0u8; 8 * 1024 * 1024]))
        };

        // The peer never reads, so the write stalls once the buffer fills.
        std::thread::sleep(Duration::from_millis(100));
        assert!(!writer.is_finished());

        let started = Instant::now();
        link.abort_writes();
        let result = writer.join().unwrap();
        assert!(matches!(result, Err(TransportError::WriteFailed(_))));
        assert!(started.elapsed() < Duration::from_millis(500));

        assert!(!link.is_writable());
        assert!(!link.is_closed());
        assert!(matches!(link.write(b"x"), Err(TransportError::WriteFailed(_))));
    }

    #[test]
    fn close_releases_stalled_write() {
        let (link, _peer) = link_pair();
        let link = Arc::new(link);
        let writer = {
            let link = Arc::clone(&link);
            std::thread::spawn(move || link.write(&vec![0u8; 8 * 1024 * 1024]))
        };

        std::thread::sleep(Duration::from_millis(100));
        link.close();
        assert!(writer.join().unwrap().is_err());
    }
}
