use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Packet header: length (4) + kind (1) + pts (8) = 13 bytes.
pub const HEADER_SIZE: usize = 13;

/// Default maximum payload size: 8 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 8 * 1024 * 1024;

/// Presentation timestamp marking the codec configuration record.
pub const CODEC_CONFIG_PTS: i64 = i64::MIN;

/// Media kind carried by a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    Video = 1,
    Audio = 2,
}

impl PacketKind {
    /// Decode the kind byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(Self::Video),
            2 => Ok(Self::Audio),
            other => Err(FrameError::InvalidKind(other)),
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

/// One encoded media unit as carried on the outbound side of the link.
#[derive(Debug, Clone)]
pub struct MediaPacket {
    /// Media kind.
    pub kind: PacketKind,
    /// Presentation timestamp; [`CODEC_CONFIG_PTS`] for the codec config record.
    pub pts: i64,
    /// Encoded payload.
    pub payload: Bytes,
}

impl MediaPacket {
    /// Create a new packet.
    pub fn new(kind: PacketKind, pts: i64, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            pts,
            payload: payload.into(),
        }
    }

    /// Whether this is the codec configuration record sent ahead of media.
    pub fn is_codec_config(&self) -> bool {
        self.pts == CODEC_CONFIG_PTS
    }

    /// The total wire size of this packet (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a packet into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────┬──────────────┬─────────────────┐
/// │ Length       │ Kind     │ PTS          │ Payload         │
/// │ (4B LE)      │ (1B)     │ (8B LE, i64) │ (Length bytes)  │
/// └──────────────┴──────────┴──────────────┴─────────────────┘
/// ```
pub fn encode_packet(kind: PacketKind, pts: i64, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le(payload.len() as u32);
    dst.put_u8(kind as u8);
    dst.put_i64_le(pts);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a packet from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete packet yet.
/// On success, consumes the packet bytes from the buffer.
pub fn decode_packet(src: &mut BytesMut, max_payload: usize) -> Result<Option<MediaPacket>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut header = &src[..HEADER_SIZE];
    let payload_len = header.get_u32_le() as usize;
    let kind = PacketKind::from_byte(header.get_u8())?;
    let pts = header.get_i64_le();

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(MediaPacket { kind, pts, payload }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_little_endian() {
        let mut wire = BytesMut::new();
        encode_packet(PacketKind::Video, 0x0102, b"abc", &mut wire).unwrap();

        assert_eq!(wire.len(), HEADER_SIZE + 3);
        assert_eq!(&wire[0..4], &[3, 0, 0, 0]);
        assert_eq!(wire[4], 1);
        assert_eq!(&wire[5..13], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&wire[13..], b"abc");
    }

    #[test]
    fn codec_config_marker_uses_high_bit_pts() {
        let mut wire = BytesMut::new();
        encode_packet(PacketKind::Video, CODEC_CONFIG_PTS, b"sps", &mut wire).unwrap();
        assert_eq!(&wire[5..13], &[0, 0, 0, 0, 0, 0, 0, 0x80]);

        let packet = decode_packet(&mut wire, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .expect("complete packet");
        assert!(packet.is_codec_config());
    }

    #[test]
    fn decode_waits_for_complete_packet() {
        let mut wire = BytesMut::new();
        encode_packet(PacketKind::Audio, 42, b"pcm-data", &mut wire).unwrap();

        let mut partial = BytesMut::from(&wire[..HEADER_SIZE + 2]);
        assert!(decode_packet(&mut partial, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .is_none());
        assert_eq!(partial.len(), HEADER_SIZE + 2, "partial input is not consumed");

        let packet = decode_packet(&mut wire, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .expect("complete packet");
        assert_eq!(packet.kind, PacketKind::Audio);
        assert_eq!(packet.pts, 42);
        assert_eq!(packet.payload.as_ref(), b"pcm-data");
        assert!(wire.is_empty());
    }

    #[test]
    fn decode_rejects_oversized_payload() {
        let mut wire = BytesMut::new();
        encode_packet(PacketKind::Video, 0, &[0u8; 64], &mut wire).unwrap();

        let err = decode_packet(&mut wire, 16).unwrap_err();
        assert!(matches!(
            err,
            FrameError::PayloadTooLarge { size: 64, max: 16 }
        ));
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let mut wire = BytesMut::new();
        wire.put_u32_le(0);
        wire.put_u8(9);
        wire.put_i64_le(0);

        let err = decode_packet(&mut wire, DEFAULT_MAX_PAYLOAD).unwrap_err();
        assert!(matches!(err, FrameError::InvalidKind(9)));
    }
}
