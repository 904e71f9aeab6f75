use crate::engine::EngineError;

/// Errors that can occur in connection lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No accessory is attached.
    #[error("no accessory attached")]
    NoAccessory,

    /// Access to the accessory has not been granted.
    #[error("permission denied for accessory {0}")]
    PermissionDenied(String),

    /// A link is already open (awaiting handshake or connected).
    #[error("accessory link already open")]
    AlreadyOpen,

    /// The link could not be opened.
    #[error("failed to open accessory link: {0}")]
    Open(#[from] aoalink_transport::TransportError),

    /// A background thread could not be spawned.
    #[error("failed to spawn {0} thread: {1}")]
    Spawn(&'static str, #[source] std::io::Error),

    /// The media engine rejected a request.
    #[error("media engine error: {0}")]
    Engine(#[from] EngineError),

    /// Shutdown did not complete cleanly.
    #[error("shutdown failed: {0}")]
    Shutdown(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
