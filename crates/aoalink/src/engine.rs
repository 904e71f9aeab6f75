use std::sync::Arc;

use aoalink_frame::{encode_packet, PacketKind, CODEC_CONFIG_PTS};
use aoalink_session::{
    AudioFrame, EngineError, MediaEngine, OutboundSink, StreamSettings, StreamTarget, VideoFrame,
};
use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

/// Timestamp carried by every media packet. The accessory paces playback by
/// arrival, so only the codec configuration record is distinguished by pts.
pub const MEDIA_PTS: i64 = 0;

/// Media engine that frames each encoded video unit as an accessory packet.
///
/// Frames are treated as already encoded. Ahead of the first video packet of a
/// stream the engine sends the encoder's extra data (SPS/PPS for H.264) at
/// [`CODEC_CONFIG_PTS`]. Every packet is tagged [`PacketKind::Video`]; the
/// accessory link carries no audio, so audio units are dropped.
pub struct PacketizingEngine {
    settings: StreamSettings,
    rotation: f32,
    codec_config: Bytes,
    sink: Option<Arc<dyn OutboundSink>>,
    sent_header: bool,
    video_frames: u64,
    audio_dropped: u64,
    released: bool,
    buf: BytesMut,
}

impl PacketizingEngine {
    pub fn new() -> Self {
        Self {
            settings: StreamSettings::default(),
            rotation: 0.0,
            codec_config: Bytes::new(),
            sink: None,
            sent_header: false,
            video_frames: 0,
            audio_dropped: 0,
            released: false,
            buf: BytesMut::new(),
        }
    }

    /// Encoder extra data sent as the first record of each stream.
    pub fn with_codec_config(mut self, extra_data: impl Into<Bytes>) -> Self {
        self.codec_config = extra_data.into();
        self
    }

    pub fn settings(&self) -> StreamSettings {
        self.settings
    }

    /// Last rotation hint handed to the video source.
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn is_streaming(&self) -> bool {
        self.sink.is_some()
    }

    fn emit(&mut self, pts: i64, payload: &[u8]) -> Result<(), EngineError> {
        let Some(sink) = self.sink.as_ref() else {
            return Ok(());
        };
        self.buf.clear();
        encode_packet(PacketKind::Video, pts, payload, &mut self.buf)
            .map_err(|err| EngineError::Rejected(err.to_string()))?;
        sink.send(&self.buf);
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), EngineError> {
        if self.released {
            return Err(EngineError::Released);
        }
        Ok(())
    }
}

impl Default for PacketizingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEngine for PacketizingEngine {
    fn reset_video_audio(&mut self, settings: &StreamSettings) -> Result<(), EngineError> {
        self.ensure_live()?;
        if settings.fps == 0 {
            return Err(EngineError::Rejected("frame rate must be non-zero".into()));
        }
        self.settings = *settings;
        self.sent_header = false;
        debug!(
            width = settings.width,
            height = settings.height,
            fps = settings.fps,
            "engine reset"
        );
        Ok(())
    }

    fn start_stream(&mut self, target: StreamTarget) -> Result<(), EngineError> {
        self.ensure_live()?;
        match target {
            StreamTarget::Accessory(sink) => {
                self.sink = Some(sink);
                self.sent_header = false;
                self.video_frames = 0;
                self.audio_dropped = 0;
                debug!(codec_config = self.codec_config.len(), "packet stream started");
                Ok(())
            }
            StreamTarget::Rtmp(url) => Err(EngineError::Unsupported(format!(
                "network target {url}"
            ))),
        }
    }

    fn stop_stream(&mut self) {
        if self.sink.take().is_some() {
            debug!(
                video_frames = self.video_frames,
                audio_dropped = self.audio_dropped,
                "packet stream stopped"
            );
        }
    }

    fn set_video_rotation(&mut self, degrees: f32) {
        self.rotation = degrees;
    }

    fn output_video(&mut self, frame: VideoFrame) -> Result<(), EngineError> {
        self.ensure_live()?;
        if self.sink.is_none() {
            trace!(len = frame.pixels.len(), "not streaming; video unit dropped");
            return Ok(());
        }
        if !self.sent_header {
            self.sent_header = true;
            let extra_data = self.codec_config.clone();
            self.emit(CODEC_CONFIG_PTS, &extra_data)?;
        }
        self.emit(MEDIA_PTS, &frame.pixels)?;
        self.video_frames += 1;
        Ok(())
    }

    fn output_audio(&mut self, frame: AudioFrame) -> Result<(), EngineError> {
        self.ensure_live()?;
        self.audio_dropped += 1;
        trace!(samples = frame.sample_count, "accessory link carries no audio");
        Ok(())
    }

    fn release(&mut self) {
        self.sink = None;
        self.released = true;
        debug!("engine released");
    }
}
