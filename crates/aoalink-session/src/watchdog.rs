use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Last-heartbeat timestamp, in milliseconds since the watchdog's epoch.
#[derive(Debug)]
struct HeartbeatClock {
    epoch: Instant,
    last_ms: AtomicU64,
}

impl HeartbeatClock {
    fn record_at(&self, at: Instant) {
        let ms = at.saturating_duration_since(self.epoch).as_millis() as u64;
        self.last_ms.store(ms, Ordering::Release);
    }

    fn silence(&self) -> Duration {
        let now = self.epoch.elapsed();
        let last = Duration::from_millis(self.last_ms.load(Ordering::Acquire));
        now.saturating_sub(last)
    }
}

struct Run {
    stop: Sender<()>,
    armed: Arc<AtomicBool>,
}

/// Declares the link dead after a silence window with no heartbeat.
///
/// A ticker thread compares the time since the last recorded heartbeat against
/// the timeout every poll interval. On timeout the callback runs once on the
/// ticker thread and the watchdog disarms itself. `stop()` only signals the
/// ticker, so it is safe to call from inside the callback.
pub struct HeartbeatWatchdog {
    timeout: Duration,
    poll_interval: Duration,
    clock: Arc<HeartbeatClock>,
    run: Mutex<Option<Run>>,
}

impl HeartbeatWatchdog {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            clock: Arc::new(HeartbeatClock {
                epoch: Instant::now(),
                last_ms: AtomicU64::new(0),
            }),
            run: Mutex::new(None),
        }
    }

    /// Arm the watchdog. The heartbeat clock is reset to now.
    ///
    /// Calling `start` while armed is a no-op.
    pub fn start<F>(&self, on_timeout: F) -> std::io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut run = self.run.lock();
        if run
            .as_ref()
            .is_some_and(|run| run.armed.load(Ordering::Acquire))
        {
            debug!("watchdog already running");
            return Ok(());
        }

        self.record_heartbeat();

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let ticker = crossbeam_channel::tick(self.poll_interval);
        let armed = Arc::new(AtomicBool::new(true));
        let clock = Arc::clone(&self.clock);
        let timeout = self.timeout;
        let thread_armed = Arc::clone(&armed);

        thread::Builder::new()
            .name("aoalink-watchdog".into())
            .spawn(move || {
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let silence = clock.silence();
                            if silence <= timeout {
                                continue;
                            }
                            // stop() may have raced this tick.
                            if thread_armed.swap(false, Ordering::AcqRel) {
                                warn!(
                                    silence_ms = silence.as_millis() as u64,
                                    timeout_ms = timeout.as_millis() as u64,
                                    "heartbeat timeout"
                                );
                                on_timeout();
                            }
                            break;
                        }
                    }
                }
                debug!("watchdog exited");
            })?;

        debug!(
            timeout_ms = self.timeout.as_millis() as u64,
            poll_ms = self.poll_interval.as_millis() as u64,
            "watchdog started"
        );
        *run = Some(Run {
            stop: stop_tx,
            armed,
        });
        Ok(())
    }

    /// Disarm the watchdog. Idempotent; never joins the ticker thread.
    pub fn stop(&self) {
        if let Some(run) = self.run.lock().take() {
            run.armed.store(false, Ordering::Release);
            let _ = run.stop.try_send(());
            debug!("watchdog stopped");
        }
    }

    /// Record a heartbeat observed now.
    pub fn record_heartbeat(&self) {
        self.clock.record_at(Instant::now());
    }

    /// Record a heartbeat observed at `at`.
    pub fn record_heartbeat_at(&self, at: Instant) {
        self.clock.record_at(at);
    }

    /// Whether the watchdog is armed and has not fired.
    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .as_ref()
            .is_some_and(|run| run.armed.load(Ordering::Acquire))
    }

    /// Time since the last recorded heartbeat.
    pub fn since_last_heartbeat(&self) -> Duration {
        self.clock.silence()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Drop for HeartbeatWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for HeartbeatWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatWatchdog")
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("running", &self.is_running())
            .finish()
    }
}
