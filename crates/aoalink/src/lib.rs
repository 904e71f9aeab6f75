//! USB accessory streaming transport.
//!
//! aoalink opens a byte link to an attached USB accessory, waits for its
//! handshake, keeps the link alive with an in-band heartbeat, and lets a media
//! engine stream encoded output over it.
//!
//! # Crate Structure
//!
//! - [`transport`]: Accessory platforms and the duplex byte link
//! - [`frame`]: Control codes and media packet framing
//! - [`session`]: Connection lifecycle, heartbeat watchdog, notifications
//! - [`engine`]: A packetizing media engine for the accessory link

pub mod engine;

/// Re-export transport types.
pub mod transport {
    pub use aoalink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use aoalink_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use aoalink_session::*;
}

pub use engine::PacketizingEngine;
pub use session::{ConnectionManager, ConnectionState, NotificationSink, SessionConfig};
