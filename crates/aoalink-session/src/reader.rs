use std::sync::Arc;
use std::thread::{self, JoinHandle};

use aoalink_frame::ControlCode;
use aoalink_transport::ByteLink;
use tracing::{debug, trace, warn};

use crate::watchdog::HeartbeatWatchdog;

/// Callbacks from a reader thread into the connection that owns it.
pub trait ReaderEvents: Send + Sync + 'static {
    /// The first handshake byte arrived.
    ///
    /// Implementations call `arm` atomically with their transition to
    /// connected, so a concurrent teardown either sees the armed watchdog or
    /// prevents arming. Returns `false`, without calling `arm`, if the
    /// connection is no longer current.
    fn handshake(&self, arm: &mut dyn FnMut()) -> bool;

    /// The armed watchdog saw no heartbeat within its timeout.
    fn heartbeat_timeout(&self);
}

/// Background thread decoding control bytes for one open link.
///
/// The thread exits when the link reports closure or an I/O error. It never
/// raises a disconnect itself.
#[derive(Debug)]
pub struct AccessoryReader {
    handle: Option<JoinHandle<()>>,
}

impl AccessoryReader {
    pub fn spawn<E: ReaderEvents>(
        link: Arc<ByteLink>,
        watchdog: Arc<HeartbeatWatchdog>,
        events: Arc<E>,
    ) -> std::io::Result<Self> {
        let handle = thread::Builder::new()
            .name("aoalink-reader".into())
            .spawn(move || read_loop(&link, &watchdog, events))?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Wait for the thread to exit. The link must be closed first.
    pub fn join(mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("accessory reader panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }
}

fn read_loop<E: ReaderEvents>(link: &ByteLink, watchdog: &HeartbeatWatchdog, events: Arc<E>) {
    let accessory = link.accessory().clone();
    let mut handshaken = false;
    debug!(accessory = %accessory, "reader started");

    loop {
        let byte = match link.read_byte() {
            Ok(byte) => byte,
            Err(err) => {
                debug!(accessory = %accessory, error = %err, "reader exiting");
                return;
            }
        };

        match ControlCode::from_byte(byte) {
            ControlCode::Handshake if handshaken => {
                trace!(accessory = %accessory, "repeated handshake ignored");
            }
            ControlCode::Handshake => {
                handshaken = true;
                let mut arm = || {
                    let timeout_events = Arc::clone(&events);
                    if let Err(err) = watchdog.start(move || timeout_events.heartbeat_timeout()) {
                        warn!(accessory = %accessory, error = %err, "failed to start watchdog");
                    }
                };
                if !events.handshake(&mut arm) {
                    debug!(accessory = %accessory, "handshake for stale connection");
                }
            }
            ControlCode::Heartbeat => watchdog.record_heartbeat(),
            ControlCode::Reserved(code) => {
                trace!(accessory = %accessory, code, "reserved control byte ignored");
            }
        }
    }
}
