use std::time::Duration;

/// Default silence window before the link is declared dead.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(500);

/// Default watchdog check period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default rotation hint handed to the engine's video source, in degrees.
pub const DEFAULT_VIDEO_ROTATION: f32 = -90.0;

/// Capture geometry and rate the media engine is reset to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            width: 720,
            height: 1280,
            fps: 20,
        }
    }
}

/// How accessory attach/detach is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachDetection {
    /// Attach/detach events are pushed by the platform; `on_resume`/`on_pause`
    /// do nothing.
    Push,
    /// The application polls on resume and closes on pause.
    #[default]
    Pull,
}

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Heartbeat silence after which the connection is torn down.
    pub heartbeat_timeout: Duration,
    /// How often the watchdog compares against `heartbeat_timeout`.
    pub poll_interval: Duration,
    /// Settings applied with `reset_video_audio` when the manager is built.
    pub stream: StreamSettings,
    /// Rotation hint for the engine's video source.
    pub video_rotation: f32,
    pub attach_detection: AttachDetection,
    /// Ask the platform for access when it has not been granted yet.
    pub request_permission: bool,
    /// Stop the outbound stream before closing the link on detach. When unset,
    /// the link is closed first and the stream stopped afterwards.
    pub stop_stream_on_detach: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stream: StreamSettings::default(),
            video_rotation: DEFAULT_VIDEO_ROTATION,
            attach_detection: AttachDetection::default(),
            request_permission: true,
            stop_stream_on_detach: true,
        }
    }
}

impl SessionConfig {
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_stream(mut self, stream: StreamSettings) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_video_rotation(mut self, degrees: f32) -> Self {
        self.video_rotation = degrees;
        self
    }

    pub fn with_attach_detection(mut self, detection: AttachDetection) -> Self {
        self.attach_detection = detection;
        self
    }

    pub fn with_request_permission(mut self, request: bool) -> Self {
        self.request_permission = request;
        self
    }

    pub fn with_stop_stream_on_detach(mut self, stop_first: bool) -> Self {
        self.stop_stream_on_detach = stop_first;
        self
    }
}
