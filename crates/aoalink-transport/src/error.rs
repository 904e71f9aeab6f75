use std::path::PathBuf;

/// Errors that can occur in accessory transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No accessory is currently attached.
    #[error("no accessory attached")]
    NoAccessory,

    /// The platform has not granted access to the accessory.
    #[error("permission denied for accessory {0}")]
    PermissionDenied(String),

    /// The platform refused to open the accessory, or it went away.
    #[error("failed to open accessory {accessory}: {source}")]
    Open {
        accessory: String,
        source: std::io::Error,
    },

    /// Failed to bind the emulator socket.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to a socket-bridged accessory.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The link was closed locally or by the peer (EOF).
    #[error("link closed")]
    Closed,

    /// A write did not complete; the link is degraded.
    #[error("link write failed: {0}")]
    WriteFailed(std::io::Error),

    /// An I/O error occurred on the link.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
