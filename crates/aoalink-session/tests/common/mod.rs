#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use aoalink_session::{
    AudioFrame, ConnectionManager, EngineError, MediaEngine, Notification, NotificationSink,
    OutboundSink, SessionConfig, StreamSettings, StreamTarget, VideoFrame,
};
use aoalink_transport::{
    AccessoryHandle, AccessoryPlatform, AccessoryStream, Result as TransportResult,
    TransportError,
};
use parking_lot::Mutex;

/// Accessory platform backed by socket pairs; the test keeps the peer ends.
pub struct PairPlatform {
    handle: AccessoryHandle,
    attached: AtomicBool,
    granted: AtomicBool,
    grant_requests: bool,
    pending: Mutex<VecDeque<UnixStream>>,
    pub permission_requests: AtomicUsize,
}

impl PairPlatform {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            handle: AccessoryHandle::new(id).with_description("socket pair"),
            attached: AtomicBool::new(true),
            granted: AtomicBool::new(true),
            grant_requests: true,
            pending: Mutex::new(VecDeque::new()),
            permission_requests: AtomicUsize::new(0),
        })
    }

    pub fn without_permission(id: &str) -> Arc<Self> {
        let platform = Self::new(id);
        platform.granted.store(false, Ordering::SeqCst);
        platform
    }

    pub fn handle(&self) -> AccessoryHandle {
        self.handle.clone()
    }

    /// Queue a link for the next `open` and return the accessory's end.
    pub fn plug(&self) -> Accessory {
        let (local, peer) = UnixStream::pair().expect("socket pair");
        self.pending.lock().push_back(local);
        Accessory { stream: peer }
    }

    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    pub fn grant(&self) {
        self.granted.store(true, Ordering::SeqCst);
    }
}

impl AccessoryPlatform for PairPlatform {
    fn list_accessories(&self) -> Vec<AccessoryHandle> {
        if self.attached.load(Ordering::SeqCst) {
            vec![self.handle.clone()]
        } else {
            Vec::new()
        }
    }

    fn has_permission(&self, _accessory: &AccessoryHandle) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    fn request_permission(&self, _accessory: &AccessoryHandle) -> bool {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        self.grant_requests
    }

    fn open(&self, accessory: &AccessoryHandle) -> TransportResult<AccessoryStream> {
        match self.pending.lock().pop_front() {
            Some(stream) => Ok(AccessoryStream::from_unix(stream)),
            None => Err(TransportError::Open {
                accessory: accessory.id().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "accessory gone"),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "pair"
    }
}

/// The accessory side of a socket pair.
pub struct Accessory {
    pub stream: UnixStream,
}

impl Accessory {
    pub fn handshake(&mut self) {
        self.stream.write_all(&[1]).expect("write handshake");
    }

    pub fn heartbeat(&mut self) {
        self.stream.write_all(&[2]).expect("write heartbeat");
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).expect("write raw");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Reset(StreamSettings),
    StartAccessory,
    StartRtmp(String),
    Stop,
    Rotation(f32),
    Video(usize),
    Audio(usize),
    Release,
}

/// Engine double that writes each video frame's pixels straight into its sink.
#[derive(Clone, Default)]
pub struct RecordingEngine {
    pub calls: Arc<Mutex<Vec<EngineCall>>>,
    sink: Arc<Mutex<Option<Arc<dyn OutboundSink>>>>,
}

impl RecordingEngine {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &EngineCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn has_sink(&self) -> bool {
        self.sink.lock().is_some()
    }
}

impl MediaEngine for RecordingEngine {
    fn reset_video_audio(&mut self, settings: &StreamSettings) -> Result<(), EngineError> {
        self.calls.lock().push(EngineCall::Reset(*settings));
        Ok(())
    }

    fn start_stream(&mut self, target: StreamTarget) -> Result<(), EngineError> {
        match target {
            StreamTarget::Accessory(sink) => {
                self.calls.lock().push(EngineCall::StartAccessory);
                *self.sink.lock() = Some(sink);
            }
            StreamTarget::Rtmp(url) => self.calls.lock().push(EngineCall::StartRtmp(url)),
        }
        Ok(())
    }

    fn stop_stream(&mut self) {
        self.calls.lock().push(EngineCall::Stop);
        *self.sink.lock() = None;
    }

    fn set_video_rotation(&mut self, degrees: f32) {
        self.calls.lock().push(EngineCall::Rotation(degrees));
    }

    fn output_video(&mut self, frame: VideoFrame) -> Result<(), EngineError> {
        self.calls.lock().push(EngineCall::Video(frame.pixels.len()));
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.send(&frame.pixels);
        }
        Ok(())
    }

    fn output_audio(&mut self, frame: AudioFrame) -> Result<(), EngineError> {
        self.calls.lock().push(EngineCall::Audio(frame.sample_count));
        Ok(())
    }

    fn release(&mut self) {
        self.calls.lock().push(EngineCall::Release);
    }
}

/// Records notifications with their arrival order.
#[derive(Default)]
pub struct Recorder {
    history: Mutex<Vec<Notification>>,
}

impl Recorder {
    pub fn history(&self) -> Vec<Notification> {
        self.history.lock().clone()
    }

    /// Connect/disconnect events only.
    pub fn lifecycle(&self) -> Vec<Notification> {
        self.history
            .lock()
            .iter()
            .filter(|n| !matches!(n, Notification::Log(_)))
            .cloned()
            .collect()
    }

    pub fn logs(&self) -> Vec<String> {
        self.history
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::Log(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, notification: &Notification) -> usize {
        self.history
            .lock()
            .iter()
            .filter(|n| *n == notification)
            .count()
    }

    /// Poll until `notification` has been seen `times` times.
    pub fn wait_for(&self, notification: &Notification, times: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.count(notification) >= times)
    }
}

impl NotificationSink for Recorder {
    fn on_connect(&self) {
        self.history.lock().push(Notification::Connect);
    }

    fn on_disconnect(&self) {
        self.history.lock().push(Notification::Disconnect);
    }

    fn on_log(&self, message: &str) {
        self.history.lock().push(Notification::Log(message.to_string()));
    }
}

pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Short timeouts so failure paths resolve quickly.
pub fn fast_config() -> SessionConfig {
    SessionConfig::default()
        .with_heartbeat_timeout(Duration::from_millis(150))
        .with_poll_interval(Duration::from_millis(25))
}

pub struct Harness {
    pub platform: Arc<PairPlatform>,
    pub engine: RecordingEngine,
    pub recorder: Arc<Recorder>,
    pub manager: ConnectionManager,
}

pub fn harness(config: SessionConfig) -> Harness {
    harness_with(PairPlatform::new("acc-1"), config)
}

pub fn harness_with(platform: Arc<PairPlatform>, config: SessionConfig) -> Harness {
    let engine = RecordingEngine::default();
    let recorder = Arc::new(Recorder::default());
    let manager = ConnectionManager::builder(
        platform.clone(),
        Box::new(engine.clone()),
        recorder.clone(),
    )
    .with_config(config)
    .build()
    .expect("manager should build");
    Harness {
        platform,
        engine,
        recorder,
        manager,
    }
}

/// Open a link and complete the handshake.
pub fn connect(h: &Harness) -> Accessory {
    let mut accessory = h.platform.plug();
    h.manager.discover_and_open().expect("open should succeed");
    accessory.handshake();
    assert!(
        h.recorder
            .wait_for(&Notification::Connect, 1, Duration::from_secs(2)),
        "connect notification expected"
    );
    accessory
}
