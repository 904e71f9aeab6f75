//! Media engine collaborator interfaces.
//!
//! The engine captures, encodes and serializes media. The connection manager
//! only drives it: it resets the capture settings, hands it an outbound sink
//! when the accessory is ready, forwards raw frames, and releases it once.

use std::sync::Arc;

use bytes::Bytes;

use crate::config::StreamSettings;

/// Errors reported by a media engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine does not support the requested operation or target.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The engine refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The engine has already been released.
    #[error("engine released")]
    Released,
}

/// Byte sink the engine writes its serialized output into.
///
/// `send` never fails from the engine's point of view; delivery problems are
/// handled by the sink's owner.
pub trait OutboundSink: Send + Sync {
    fn send(&self, bytes: &[u8]);
}

/// Where the engine should stream to.
#[derive(Clone)]
pub enum StreamTarget {
    /// The open accessory link.
    Accessory(Arc<dyn OutboundSink>),
    /// A network endpoint.
    Rtmp(String),
}

impl std::fmt::Debug for StreamTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accessory(_) => f.write_str("Accessory"),
            Self::Rtmp(url) => f.debug_tuple("Rtmp").field(url).finish(),
        }
    }
}

/// One raw video picture.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub pixels: Bytes,
    /// Bytes per row, one entry per plane.
    pub linesize: Vec<usize>,
    pub width: u32,
    pub height: u32,
}

/// A block of interleaved PCM samples.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub pcm: Bytes,
    pub sample_count: usize,
}

/// A frame handed to `ConnectionManager::deliver_frame`.
#[derive(Debug, Clone)]
pub enum MediaFrame {
    Video(VideoFrame),
    Audio(AudioFrame),
}

impl From<VideoFrame> for MediaFrame {
    fn from(frame: VideoFrame) -> Self {
        Self::Video(frame)
    }
}

impl From<AudioFrame> for MediaFrame {
    fn from(frame: AudioFrame) -> Self {
        Self::Audio(frame)
    }
}

/// Capture/encode/stream pipeline driven by the connection manager.
pub trait MediaEngine: Send {
    /// Reconfigure capture geometry and frame rate.
    fn reset_video_audio(&mut self, settings: &StreamSettings) -> Result<(), EngineError>;

    /// Begin producing serialized output into `target`.
    fn start_stream(&mut self, target: StreamTarget) -> Result<(), EngineError>;

    /// Stop producing output. Must tolerate being called when not streaming.
    fn stop_stream(&mut self);

    /// Rotation hint for the video source, in degrees.
    fn set_video_rotation(&mut self, degrees: f32);

    fn output_video(&mut self, frame: VideoFrame) -> Result<(), EngineError>;

    fn output_audio(&mut self, frame: AudioFrame) -> Result<(), EngineError>;

    /// Free the engine's resources. Called exactly once by the owner.
    fn release(&mut self);
}
