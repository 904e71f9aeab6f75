//! Accessory connection lifecycle for aoalink.
//!
//! [`ConnectionManager`] opens the accessory link, waits for the handshake
//! byte, keeps it alive with a [`HeartbeatWatchdog`], and lets a
//! [`MediaEngine`] stream into it. Lifecycle events reach the application
//! through a [`NotificationSink`] on a single dispatcher thread.

pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod notify;
pub mod reader;
pub mod watchdog;

pub use config::{
    AttachDetection, SessionConfig, StreamSettings, DEFAULT_HEARTBEAT_TIMEOUT,
    DEFAULT_POLL_INTERVAL, DEFAULT_VIDEO_ROTATION,
};
pub use engine::{
    AudioFrame, EngineError, MediaEngine, MediaFrame, OutboundSink, StreamTarget, VideoFrame,
};
pub use error::{Result, SessionError};
pub use manager::{ConnectionManager, ConnectionManagerBuilder, ConnectionState};
pub use notify::{Notification, NotificationSink};
pub use reader::{AccessoryReader, ReaderEvents};
pub use watchdog::HeartbeatWatchdog;

#[cfg(feature = "async")]
pub use notify::ChannelSink;
