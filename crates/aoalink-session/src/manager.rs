use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use aoalink_transport::{AccessoryHandle, AccessoryPlatform, ByteLink};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::{AttachDetection, SessionConfig};
use crate::engine::{MediaEngine, MediaFrame, OutboundSink, StreamTarget};
use crate::error::{Result, SessionError};
use crate::notify::{Dispatcher, Notification, NotificationSink, Notifier};
use crate::reader::{AccessoryReader, ReaderEvents};
use crate::watchdog::HeartbeatWatchdog;

/// Lifecycle state of the accessory connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    /// Link open, waiting for the accessory's first handshake byte.
    AwaitingHandshake,
    Connected,
}

impl ConnectionState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::AwaitingHandshake => "awaiting_handshake",
            Self::Connected => "connected",
        }
    }

    /// Whether a link is open in this state.
    pub fn is_open(self) -> bool {
        self != Self::Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    Close,
    Detach,
    HeartbeatTimeout,
}

impl Teardown {
    fn name(self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Detach => "detach",
            Self::HeartbeatTimeout => "heartbeat_timeout",
        }
    }
}

/// Outbound writer handed to the engine.
///
/// Holds the link weakly so a retained sink never keeps descriptors open. The
/// first failed write per connection is reported; later failures are dropped.
struct LinkSink {
    link: Weak<ByteLink>,
    degraded: Arc<AtomicBool>,
    notifier: Notifier,
}

impl OutboundSink for LinkSink {
    fn send(&self, bytes: &[u8]) {
        let Some(link) = self.link.upgrade() else {
            trace!(len = bytes.len(), "link released; outbound bytes dropped");
            return;
        };
        let Err(err) = link.write(bytes) else {
            return;
        };
        if !link.is_writable() {
            trace!(len = bytes.len(), "link torn down; outbound bytes dropped");
            return;
        }
        if self.degraded.swap(true, Ordering::AcqRel) {
            trace!(len = bytes.len(), "outbound bytes dropped on degraded link");
            return;
        }
        warn!(accessory = %link.accessory(), error = %err, "accessory link degraded");
        self.notifier.log(format!("accessory link degraded: {err}"));
    }
}

/// Resources of one open cycle, created and dropped together.
struct Connection {
    generation: u64,
    link: Arc<ByteLink>,
    watchdog: Arc<HeartbeatWatchdog>,
    reader: AccessoryReader,
    degraded: Arc<AtomicBool>,
}

impl Connection {
    fn sink(&self, notifier: Notifier) -> LinkSink {
        LinkSink {
            link: Arc::downgrade(&self.link),
            degraded: Arc::clone(&self.degraded),
            notifier,
        }
    }

    fn shutdown(self) {
        self.watchdog.stop();
        self.link.close();
        self.reader.join();
        debug!(
            accessory = %self.link.accessory(),
            generation = self.generation,
            "connection released"
        );
    }
}

struct Inner {
    state: ConnectionState,
    generation: u64,
    connection: Option<Connection>,
    streaming: bool,
}

struct Shared {
    platform: Arc<dyn AccessoryPlatform>,
    engine: Mutex<Box<dyn MediaEngine>>,
    config: SessionConfig,
    /// Serializes open and teardown. Acquired before `state`.
    lifecycle: Mutex<()>,
    state: Mutex<Inner>,
    permission_pending: AtomicBool,
    notifier: Notifier,
}

impl Shared {
    fn open_first(self: &Arc<Self>) -> Result<()> {
        if self.state.lock().state.is_open() {
            return Err(SessionError::AlreadyOpen);
        }

        let Some(accessory) = self.platform.list_accessories().into_iter().next() else {
            debug!(platform = self.platform.name(), "no accessory attached");
            self.notifier.log("no accessory attached");
            return Err(SessionError::NoAccessory);
        };

        if !self.platform.has_permission(&accessory) {
            self.request_permission(&accessory);
            self.notifier
                .log(format!("permission denied for accessory {accessory}"));
            return Err(SessionError::PermissionDenied(accessory.id().to_string()));
        }

        self.open_link(accessory)
    }

    fn request_permission(&self, accessory: &AccessoryHandle) {
        if !self.config.request_permission {
            return;
        }
        if self.permission_pending.load(Ordering::Acquire) {
            debug!(accessory = %accessory, "permission request already pending");
            return;
        }
        if self.platform.request_permission(accessory) {
            self.permission_pending.store(true, Ordering::Release);
            info!(accessory = %accessory, "permission requested");
        }
    }

    fn open_link(self: &Arc<Self>, accessory: AccessoryHandle) -> Result<()> {
        if self.state.lock().state.is_open() {
            return Err(SessionError::AlreadyOpen);
        }

        let link = match ByteLink::open(self.platform.as_ref(), &accessory) {
            Ok(link) => Arc::new(link),
            Err(err) => {
                warn!(accessory = %accessory, error = %err, "failed to open accessory");
                self.notifier
                    .log(format!("failed to open accessory {accessory}: {err}"));
                return Err(err.into());
            }
        };
        let watchdog = Arc::new(HeartbeatWatchdog::new(
            self.config.heartbeat_timeout,
            self.config.poll_interval,
        ));

        let mut inner = self.state.lock();
        inner.generation += 1;
        let generation = inner.generation;
        let events = Arc::new(CycleEvents {
            shared: Arc::downgrade(self),
            generation,
        });

        let spawned = AccessoryReader::spawn(Arc::clone(&link), Arc::clone(&watchdog), events);
        let reader = match spawned {
            Ok(reader) => reader,
            Err(err) => {
                drop(inner);
                link.close();
                warn!(accessory = %accessory, error = %err, "failed to spawn reader");
                self.notifier
                    .log(format!("failed to start reader for {accessory}: {err}"));
                return Err(SessionError::Spawn("reader", err));
            }
        };

        inner.state = ConnectionState::AwaitingHandshake;
        inner.connection = Some(Connection {
            generation,
            link,
            watchdog,
            reader,
            degraded: Arc::new(AtomicBool::new(false)),
        });
        info!(accessory = %accessory, generation, "accessory opened, awaiting handshake");
        Ok(())
    }

    fn handshake(&self, generation: u64, arm: &mut dyn FnMut()) -> bool {
        let mut inner = self.state.lock();
        if inner.generation != generation || inner.state != ConnectionState::AwaitingHandshake {
            return false;
        }
        inner.state = ConnectionState::Connected;
        // Teardown takes the connection under this lock before stopping the
        // watchdog, so arming here can never outlive the cycle.
        arm();
        self.notifier.notify(Notification::Connect);
        info!(generation, "accessory connected");
        true
    }

    fn teardown(&self, expected: Option<u64>, cause: Teardown) {
        let _lifecycle = self.lifecycle.lock();
        self.teardown_locked(expected, cause);
    }

    fn teardown_locked(&self, expected: Option<u64>, cause: Teardown) {
        let (connection, streaming) = {
            let mut inner = self.state.lock();
            if expected.is_some_and(|generation| generation != inner.generation) {
                debug!(cause = cause.name(), "teardown for stale connection ignored");
                return;
            }
            let prior = mem::replace(&mut inner.state, ConnectionState::Disconnected);
            if prior == ConnectionState::Disconnected {
                debug!(cause = cause.name(), "already disconnected");
                return;
            }
            self.notifier.notify(Notification::Disconnect);
            info!(
                cause = cause.name(),
                prior = %prior,
                generation = inner.generation,
                "accessory disconnected"
            );
            (inner.connection.take(), mem::take(&mut inner.streaming))
        };

        // An engine write stalled on a silent peer holds the engine lock.
        if let Some(connection) = connection.as_ref() {
            connection.link.abort_writes();
        }

        let stop_first = cause != Teardown::Detach || self.config.stop_stream_on_detach;
        if streaming && stop_first {
            self.engine.lock().stop_stream();
        }
        if let Some(connection) = connection {
            connection.shutdown();
        }
        if streaming && !stop_first {
            self.engine.lock().stop_stream();
        }
    }
}

/// Reader and watchdog callbacks for one open cycle.
struct CycleEvents {
    shared: Weak<Shared>,
    generation: u64,
}

impl ReaderEvents for CycleEvents {
    fn handshake(&self, arm: &mut dyn FnMut()) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.handshake(self.generation, arm))
    }

    fn heartbeat_timeout(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.teardown(Some(self.generation), Teardown::HeartbeatTimeout);
        }
    }
}

/// Builder for [`ConnectionManager`].
pub struct ConnectionManagerBuilder {
    platform: Arc<dyn AccessoryPlatform>,
    engine: Box<dyn MediaEngine>,
    sink: Arc<dyn NotificationSink>,
    config: SessionConfig,
}

impl ConnectionManagerBuilder {
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Reset the engine to the configured stream settings and start the
    /// notification dispatcher.
    pub fn build(self) -> Result<ConnectionManager> {
        let Self {
            platform,
            mut engine,
            sink,
            config,
        } = self;

        if let Err(err) = engine.reset_video_audio(&config.stream) {
            engine.release();
            return Err(err.into());
        }
        engine.set_video_rotation(config.video_rotation);

        let dispatcher = match Dispatcher::spawn(sink) {
            Ok(dispatcher) => dispatcher,
            Err(err) => {
                engine.release();
                return Err(SessionError::Spawn("notification", err));
            }
        };

        info!(
            platform = platform.name(),
            width = config.stream.width,
            height = config.stream.height,
            fps = config.stream.fps,
            "connection manager ready"
        );

        let shared = Arc::new(Shared {
            platform,
            engine: Mutex::new(engine),
            config,
            lifecycle: Mutex::new(()),
            state: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                generation: 0,
                connection: None,
                streaming: false,
            }),
            permission_pending: AtomicBool::new(false),
            notifier: dispatcher.notifier(),
        });

        Ok(ConnectionManager {
            shared,
            dispatcher,
            released: false,
        })
    }
}

/// Owns the accessory connection lifecycle and the media engine.
///
/// At most one link is open at a time. Connect and disconnect notifications
/// are delivered on a dedicated dispatcher thread, in transition order, and
/// "disconnected" fires at most once per open cycle no matter how many
/// teardown paths race.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    dispatcher: Dispatcher,
    released: bool,
}

impl ConnectionManager {
    pub fn builder(
        platform: Arc<dyn AccessoryPlatform>,
        engine: Box<dyn MediaEngine>,
        sink: Arc<dyn NotificationSink>,
    ) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder {
            platform,
            engine,
            sink,
            config: SessionConfig::default(),
        }
    }

    /// Open the first attached accessory and start reading control bytes.
    ///
    /// On success the state is `AwaitingHandshake`. Fails with `AlreadyOpen`
    /// if a link is already open; state and notifications are unchanged.
    pub fn discover_and_open(&self) -> Result<()> {
        let _lifecycle = self.shared.lifecycle.lock();
        let result = self.shared.open_first();
        if let Err(SessionError::AlreadyOpen) = &result {
            debug!(state = %self.state(), "accessory already opened");
        }
        result
    }

    /// Hand the engine a sink writing into the link.
    ///
    /// Returns `Ok(false)` without touching the engine unless connected.
    pub fn start_outbound_stream(&self) -> Result<bool> {
        let _lifecycle = self.shared.lifecycle.lock();
        let sink = {
            let inner = self.shared.state.lock();
            if inner.state != ConnectionState::Connected {
                debug!(state = %inner.state, "stream start ignored; accessory not connected");
                return Ok(false);
            }
            if inner.streaming {
                debug!("outbound stream already active");
                return Ok(true);
            }
            let Some(connection) = inner.connection.as_ref() else {
                return Ok(false);
            };
            connection.sink(self.shared.notifier.clone())
        };

        let target = StreamTarget::Accessory(Arc::new(sink));
        if let Err(err) = self.shared.engine.lock().start_stream(target) {
            warn!(error = %err, "media engine refused to start stream");
            self.shared
                .notifier
                .log(format!("failed to start outbound stream: {err}"));
            return Err(err.into());
        }

        self.shared.state.lock().streaming = true;
        info!("outbound stream started");
        self.shared.notifier.log("outbound stream started");
        Ok(true)
    }

    /// Stop the engine's stream if one is active. Idempotent.
    pub fn stop_outbound_stream(&self) {
        let _lifecycle = self.shared.lifecycle.lock();
        let active = mem::take(&mut self.shared.state.lock().streaming);
        if !active {
            debug!("no outbound stream to stop");
            return;
        }
        self.shared.engine.lock().stop_stream();
        info!("outbound stream stopped");
        self.shared.notifier.log("outbound stream stopped");
    }

    /// Forward a raw frame to the engine's video or audio source.
    pub fn deliver_frame(&self, frame: impl Into<MediaFrame>) {
        let result = {
            let mut engine = self.shared.engine.lock();
            match frame.into() {
                MediaFrame::Video(frame) => engine.output_video(frame),
                MediaFrame::Audio(frame) => engine.output_audio(frame),
            }
        };
        if let Err(err) = result {
            warn!(error = %err, "frame rejected by media engine");
        }
    }

    /// Write raw bytes onto the link, with the same failure policy as the
    /// engine's sink. Dropped when no link is open.
    pub fn send(&self, bytes: &[u8]) {
        let sink = {
            let inner = self.shared.state.lock();
            inner
                .connection
                .as_ref()
                .map(|connection| connection.sink(self.shared.notifier.clone()))
        };
        match sink {
            Some(sink) => sink.send(bytes),
            None => debug!(len = bytes.len(), "no accessory link; bytes dropped"),
        }
    }

    /// Tear down the connection. Idempotent and infallible.
    pub fn close(&self) {
        self.shared.teardown(None, Teardown::Close);
    }

    /// External accessory-detach signal.
    pub fn on_detach_event(&self) {
        self.shared.teardown(None, Teardown::Detach);
    }

    /// Detach signal for a specific accessory; ignored unless it is the open one.
    pub fn on_accessory_detached(&self, accessory: &AccessoryHandle) {
        let _lifecycle = self.shared.lifecycle.lock();
        let is_open = self
            .shared
            .state
            .lock()
            .connection
            .as_ref()
            .is_some_and(|connection| connection.link.accessory() == accessory);
        if !is_open {
            debug!(accessory = %accessory, "detach of unrelated accessory ignored");
            return;
        }
        self.shared.teardown_locked(None, Teardown::Detach);
    }

    /// Answer to an earlier permission request. Opens the accessory if granted.
    pub fn on_permission_result(&self, accessory: &AccessoryHandle, granted: bool) -> Result<()> {
        let _lifecycle = self.shared.lifecycle.lock();
        self.shared.permission_pending.store(false, Ordering::Release);
        if !granted {
            info!(accessory = %accessory, "permission denied by user");
            self.shared
                .notifier
                .log(format!("permission denied for accessory {accessory}"));
            return Err(SessionError::PermissionDenied(accessory.id().to_string()));
        }
        self.shared.open_link(accessory.clone())
    }

    /// Pull-mode attach check. A no-op with push detection or when open.
    pub fn on_resume(&self) -> Result<()> {
        if self.shared.config.attach_detection == AttachDetection::Push {
            return Ok(());
        }
        match self.discover_and_open() {
            Err(SessionError::AlreadyOpen) => Ok(()),
            other => other,
        }
    }

    /// Pull-mode teardown. A no-op with push detection.
    pub fn on_pause(&self) {
        if self.shared.config.attach_detection == AttachDetection::Pull {
            self.close();
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.lock().state
    }

    /// The accessory whose link is open, if any.
    pub fn accessory(&self) -> Option<AccessoryHandle> {
        self.shared
            .state
            .lock()
            .connection
            .as_ref()
            .map(|connection| connection.link.accessory().clone())
    }

    /// Time since the last heartbeat, while connected.
    pub fn since_last_heartbeat(&self) -> Option<Duration> {
        let inner = self.shared.state.lock();
        if inner.state != ConnectionState::Connected {
            return None;
        }
        inner
            .connection
            .as_ref()
            .map(|connection| connection.watchdog.since_last_heartbeat())
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.state.lock().streaming
    }

    pub fn is_permission_pending(&self) -> bool {
        self.shared.permission_pending.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Close, release the engine, and drain pending notifications.
    pub fn shutdown(mut self) -> Result<()> {
        self.close();
        self.shared.engine.lock().release();
        self.released = true;
        info!("connection manager shut down");
        if self.dispatcher.stop() {
            Ok(())
        } else {
            Err(SessionError::Shutdown("notification sink panicked".into()))
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if !self.released {
            self.close();
            debug!("connection manager dropped without shutdown; engine not released");
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.state.lock();
        f.debug_struct("ConnectionManager")
            .field("platform", &self.shared.platform.name())
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .field("streaming", &inner.streaming)
            .finish()
    }
}
