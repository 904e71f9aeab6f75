//! USB accessory byte-link transport.
//!
//! Provides a single duplex byte stream to an attached accessory:
//! - the USB gadget device node (Linux / Android accessory mode)
//! - a Unix socket bridge (host relays and the accessory emulator)
//!
//! This is the lowest layer of aoalink. Everything else builds on top of
//! the [`ByteLink`] type provided here.

pub mod error;
pub mod link;
pub mod platform;
pub mod stream;

#[cfg(unix)]
pub mod device;
#[cfg(unix)]
pub mod socket;

pub use error::{Result, TransportError};
pub use link::ByteLink;
pub use platform::{AccessoryHandle, AccessoryPlatform};
pub use stream::AccessoryStream;

#[cfg(unix)]
pub use device::DevicePlatform;
#[cfg(unix)]
pub use socket::{AccessoryListener, SocketPlatform};
