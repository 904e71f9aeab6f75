//! Inbound control codes.
//!
//! The accessory talks to the host with single bytes, one byte per message,
//! no length prefix. Everything other than the two defined codes is reserved.

/// Handshake: the accessory is ready to present.
pub const HANDSHAKE: u8 = 1;

/// Heartbeat: the accessory is still alive.
pub const HEARTBEAT: u8 = 2;

/// A decoded control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCode {
    Handshake,
    Heartbeat,
    /// Reserved for future use; ignored by readers.
    Reserved(u8),
}

impl ControlCode {
    /// Decode a single wire byte.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            HANDSHAKE => Self::Handshake,
            HEARTBEAT => Self::Heartbeat,
            other => Self::Reserved(other),
        }
    }

    /// Wire value of this code.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Handshake => HANDSHAKE,
            Self::Heartbeat => HEARTBEAT,
            Self::Reserved(byte) => byte,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Handshake => "HANDSHAKE",
            Self::Heartbeat => "HEARTBEAT",
            Self::Reserved(_) => "RESERVED",
        }
    }
}

impl From<u8> for ControlCode {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}
