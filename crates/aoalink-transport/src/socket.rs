use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::platform::{AccessoryHandle, AccessoryPlatform};
use crate::stream::AccessoryStream;

/// Maximum socket path length.
/// `sockaddr_un.sun_path` is 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// Accessory reached through a Unix socket bridge.
///
/// Used with the `aoalink emulate` accessory double and with host-side relays
/// that forward a USB accessory endpoint over a local socket. The accessory is
/// listed while the socket path exists.
pub struct SocketPlatform {
    path: PathBuf,
}

impl SocketPlatform {
    /// Bridge at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The bridge socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AccessoryPlatform for SocketPlatform {
    fn list_accessories(&self) -> Vec<AccessoryHandle> {
        match std::fs::symlink_metadata(&self.path) {
            Ok(meta) if meta.file_type().is_socket() => {
                vec![AccessoryHandle::new(self.path.display().to_string())
                    .with_description("socket bridge")]
            }
            _ => Vec::new(),
        }
    }

    fn has_permission(&self, _accessory: &AccessoryHandle) -> bool {
        match std::fs::metadata(&self.path) {
            // Connecting needs write permission on the socket file.
            Ok(meta) => meta.permissions().mode() & 0o222 != 0,
            Err(_) => false,
        }
    }

    fn open(&self, accessory: &AccessoryHandle) -> Result<AccessoryStream> {
        let stream = UnixStream::connect(&self.path).map_err(|source| TransportError::Open {
            accessory: accessory.id().to_string(),
            source,
        })?;
        debug!(path = ?self.path, "connected to accessory bridge");
        Ok(AccessoryStream::from_unix(stream))
    }

    fn name(&self) -> &'static str {
        "socket-bridge"
    }
}

/// Listening side of a socket bridge: plays the accessory.
///
/// The socket file is created on bind and removed on drop, unless the path was
/// replaced in the meantime.
pub struct AccessoryListener {
    listener: UnixListener,
    path: PathBuf,
    created_inode: (u64, u64),
}

impl AccessoryListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    /// Bind and listen at `path`, replacing a stale socket if present.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: MAX_PATH_LEN,
            });
        }

        let bind_err = |path: &Path, source: std::io::Error| TransportError::Bind {
            path: path.to_path_buf(),
            source,
        };

        // Never remove anything that is not a socket.
        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_err(
                    &path,
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                ));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(|e| bind_err(&path, e))?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| bind_err(&path, e))?;
        std::fs::set_permissions(
            &path,
            std::fs::Permissions::from_mode(Self::DEFAULT_SOCKET_MODE),
        )
        .map_err(|e| bind_err(&path, e))?;

        let created = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;

        info!(?path, "accessory bridge listening");

        Ok(Self {
            listener,
            path,
            created_inode: (created.dev(), created.ino()),
        })
    }

    /// Accept the next host connection (blocking).
    pub fn accept(&self) -> Result<AccessoryStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "host connected to accessory bridge");
        Ok(AccessoryStream::from_unix(stream))
    }

    /// The bound socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AccessoryListener {
    fn drop(&mut self) {
        let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        let (dev, ino) = self.created_inode;
        if metadata.file_type().is_socket() && metadata.dev() == dev && metadata.ino() == ino {
            debug!(path = ?self.path, "cleaning up socket file");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;
    use crate::link::ByteLink;

    fn sock_path(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/aoal-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("bridge.sock")
    }

    #[test]
    fn bridge_lists_opens_and_carries_bytes() {
        let path = sock_path("open");
        let listener = AccessoryListener::bind(&path).unwrap();

        let platform = SocketPlatform::new(&path);
        let accessories = platform.list_accessories();
        assert_eq!(accessories.len(), 1);
        assert!(platform.has_permission(&accessories[0]));

        let accessory = accessories[0].clone();
        let host = std::thread::spawn(move || {
            let link = ByteLink::open(&platform, &accessory).expect("bridge should open");
            let first = link.read_byte().expect("handshake byte");
            link.write(b"media").expect("write should succeed");
            first
        });

        let mut device = listener.accept().unwrap();
        device.write_all(&[1]).unwrap();
        let mut buf = [0u8; 5];
        device.read_exact(&mut buf).unwrap();

        assert_eq!(&buf, b"media");
        assert_eq!(host.join().unwrap(), 1);

        drop(listener);
        assert!(!path.exists(), "socket file should be cleaned up on drop");
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn missing_bridge_lists_nothing() {
        let platform = SocketPlatform::new("/tmp/aoalink-definitely-missing.sock");
        assert!(platform.list_accessories().is_empty());
    }

    #[test]
    fn bind_rejects_existing_regular_file() {
        let path = sock_path("file");
        std::fs::write(&path, b"regular-file").unwrap();

        let result = AccessoryListener::bind(&path);
        assert!(matches!(result, Err(TransportError::Bind { .. })));

        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn bind_rejects_overlong_path() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = AccessoryListener::bind(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn open_without_listener_is_open_error() {
        let path = sock_path("nolisten");
        let platform = SocketPlatform::new(&path);
        let handle = AccessoryHandle::new(path.display().to_string());
        assert!(matches!(
            platform.open(&handle),
            Err(TransportError::Open { .. })
        ));
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }
}
