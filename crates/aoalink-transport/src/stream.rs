use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// An open duplex accessory descriptor. Implements Read + Write.
///
/// On an Android/Linux gadget this wraps the accessory device node. A
/// socket-bridged accessory (emulator, host-side relay) wraps a Unix stream.
pub struct AccessoryStream {
    inner: AccessoryStreamInner,
}

enum AccessoryStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    #[cfg(unix)]
    Device(std::fs::File),
}

impl Read for AccessoryStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            AccessoryStreamInner::Unix(stream) => stream.read(buf),
            #[cfg(unix)]
            AccessoryStreamInner::Device(file) => file.read(buf),
        }
    }
}

impl Write for AccessoryStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            AccessoryStreamInner::Unix(stream) => stream.write(buf),
            #[cfg(unix)]
            AccessoryStreamInner::Device(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            AccessoryStreamInner::Unix(stream) => stream.flush(),
            #[cfg(unix)]
            AccessoryStreamInner::Device(file) => file.flush(),
        }
    }
}

impl AccessoryStream {
    /// Wrap a connected Unix stream (socket-bridged accessory).
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: AccessoryStreamInner::Unix(stream),
        }
    }

    /// Wrap an opened accessory device node.
    #[cfg(unix)]
    pub fn from_device(file: std::fs::File) -> Self {
        Self {
            inner: AccessoryStreamInner::Device(file),
        }
    }

    /// Try to clone this stream (duplicates the file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            AccessoryStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
            #[cfg(unix)]
            AccessoryStreamInner::Device(file) => Ok(Self::from_device(file.try_clone()?)),
        }
    }

    /// Shut down both directions where the descriptor supports it.
    ///
    /// Device nodes have no shutdown primitive; readers on them rely on
    /// [`AccessoryStream::wait_readable`] slices to notice a close.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            AccessoryStreamInner::Unix(stream) => {
                match stream.shutdown(std::net::Shutdown::Both) {
                    Ok(()) => Ok(()),
                    // Peer already gone.
                    Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                    Err(err) => Err(err.into()),
                }
            }
            #[cfg(unix)]
            AccessoryStreamInner::Device(_) => Ok(()),
        }
    }

    /// Wait up to `timeout` for the descriptor to become readable.
    ///
    /// Returns `true` when a read will not block (data, EOF, or error pending).
    #[cfg(unix)]
    pub fn wait_readable(&self, timeout: Duration) -> Result<bool> {
        self.poll_ready(libc::POLLIN, timeout)
    }

    /// Wait up to `timeout` for the descriptor to accept more output.
    ///
    /// Also returns `true` when an error or hangup is pending, so the next
    /// write reports it instead of blocking.
    #[cfg(unix)]
    pub fn wait_writable(&self, timeout: Duration) -> Result<bool> {
        self.poll_ready(libc::POLLOUT, timeout)
    }

    #[cfg(unix)]
    fn poll_ready(&self, events: libc::c_short, timeout: Duration) -> Result<bool> {
        use std::os::fd::AsRawFd;

        let fd = match &self.inner {
            AccessoryStreamInner::Unix(stream) => stream.as_raw_fd(),
            AccessoryStreamInner::Device(file) => file.as_raw_fd(),
        };

        let mut pfd = libc::pollfd {
            fd,
            events,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: `pfd` is a valid, writable pollfd and the count matches.
        // `fd` stays open for the duration of the call because `self` is borrowed.
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };

        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err.into());
        }

        Ok(rc > 0 && pfd.revents != 0)
    }

    /// Wait up to `timeout` for the descriptor to become readable.
    #[cfg(not(unix))]
    pub fn wait_readable(&self, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    /// Wait up to `timeout` for the descriptor to accept more output.
    #[cfg(not(unix))]
    pub fn wait_writable(&self, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    /// Transport name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            AccessoryStreamInner::Unix(_) => "unix-socket",
            #[cfg(unix)]
            AccessoryStreamInner::Device(_) => "device-node",
        }
    }
}

impl std::fmt::Debug for AccessoryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessoryStream")
            .field("type", &self.kind())
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    use super::*;

    #[test]
    fn wait_readable_times_out_without_data() {
        let (local, _peer) = UnixStream::pair().unwrap();
        let stream = AccessoryStream::from_unix(local);
        assert!(!stream.wait_readable(Duration::from_millis(20)).unwrap());
    }

    #[test]
    fn wait_readable_sees_pending_byte() {
        let (local, mut peer) = UnixStream::pair().unwrap();
        let stream = AccessoryStream::from_unix(local);
        peer.write_all(&[2]).unwrap();
        assert!(stream.wait_readable(Duration::from_millis(200)).unwrap());
    }

    #[test]
    fn wait_writable_reports_full_buffer() {
        let (local, _peer) = UnixStream::pair().unwrap();
        local.set_nonblocking(true).unwrap();
        let mut filler = local.try_clone().unwrap();
        let stream = AccessoryStream::from_unix(local);
        assert!(stream.wait_writable(Duration::from_millis(20)).unwrap());

        let chunk = [0u8; 4096];
        while filler.write(&chunk).is_ok() {}
        assert!(!stream.wait_writable(Duration::from_millis(20)).unwrap());
    }

    #[test]
    fn shutdown_unblocks_clone_reader() {
        let (local, _peer) = UnixStream::pair().unwrap();
        let stream = AccessoryStream::from_unix(local);
        let mut reader = stream.try_clone().unwrap();

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 1];
            reader.read(&mut buf)
        });

        std::thread::sleep(Duration::from_millis(30));
        stream.shutdown().unwrap();

        let read = handle.join().unwrap().unwrap();
        assert_eq!(read, 0);
    }

    #[test]
    fn debug_reports_kind() {
        let (local, _peer) = UnixStream::pair().unwrap();
        let stream = AccessoryStream::from_unix(local);
        assert_eq!(format!("{stream:?}"), "AccessoryStream { type: \"unix-socket\" }");
    }
}
