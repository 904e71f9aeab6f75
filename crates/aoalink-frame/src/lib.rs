//! Wire formats for the accessory link.
//!
//! Two directions, two formats:
//! - inbound (accessory → host): single-byte control codes, see [`control`]
//! - outbound (host → accessory): media packets with a 13-byte header
//!   (length, kind, pts), see [`packet`]
//!
//! The connection core only interprets control codes. Packets are produced by
//! the media engine and consumed by the accessory.

pub mod control;
pub mod error;
pub mod packet;
pub mod reader;

pub use control::{ControlCode, HANDSHAKE, HEARTBEAT};
pub use error::{FrameError, Result};
pub use packet::{
    decode_packet, encode_packet, MediaPacket, PacketKind, CODEC_CONFIG_PTS, DEFAULT_MAX_PAYLOAD,
    HEADER_SIZE,
};
pub use reader::PacketReader;
