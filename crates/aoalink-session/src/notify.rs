use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace, warn};

/// Observer of connection lifecycle events.
///
/// All calls are made from one dispatcher thread, in the order the events
/// were raised. Implementations may call back into the connection manager.
pub trait NotificationSink: Send + Sync {
    fn on_connect(&self);
    fn on_disconnect(&self);
    fn on_log(&self, message: &str);
}

/// A lifecycle event as queued for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Connect,
    Disconnect,
    Log(String),
}

impl Notification {
    fn deliver(self, sink: &dyn NotificationSink) {
        match self {
            Self::Connect => sink.on_connect(),
            Self::Disconnect => sink.on_disconnect(),
            Self::Log(message) => sink.on_log(&message),
        }
    }
}

enum Envelope {
    Event(Notification),
    Stop,
}

/// Enqueues notifications for the dispatcher thread.
#[derive(Clone)]
pub(crate) struct Notifier {
    tx: Sender<Envelope>,
}

impl Notifier {
    pub(crate) fn notify(&self, notification: Notification) {
        trace!(?notification, "notification queued");
        // Dropped silently once the dispatcher has stopped.
        let _ = self.tx.send(Envelope::Event(notification));
    }

    pub(crate) fn log(&self, message: impl Into<String>) {
        self.notify(Notification::Log(message.into()));
    }
}

/// Owns the single thread that calls into the [`NotificationSink`].
pub(crate) struct Dispatcher {
    tx: Sender<Envelope>,
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub(crate) fn spawn(sink: Arc<dyn NotificationSink>) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("aoalink-notify".into())
            .spawn(move || run(sink, rx))?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    pub(crate) fn notifier(&self) -> Notifier {
        Notifier {
            tx: self.tx.clone(),
        }
    }

    /// Deliver everything already queued, then stop the thread.
    ///
    /// Returns `false` if the sink panicked. When called from a sink callback
    /// the thread is signalled but not joined.
    pub(crate) fn stop(&mut self) -> bool {
        let _ = self.tx.send(Envelope::Stop);
        let Some(handle) = self.handle.take() else {
            return true;
        };
        if thread::current().id() == handle.thread().id() {
            debug!("dispatcher stop requested from sink callback; not joining");
            return true;
        }
        if handle.join().is_err() {
            warn!("notification sink panicked");
            return false;
        }
        true
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(sink: Arc<dyn NotificationSink>, rx: Receiver<Envelope>) {
    for envelope in rx {
        match envelope {
            Envelope::Event(notification) => notification.deliver(sink.as_ref()),
            Envelope::Stop => break,
        }
    }
    debug!("notification dispatcher exited");
}

/// Forwards notifications into a tokio channel.
#[cfg(feature = "async")]
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<Notification>,
}

#[cfg(feature = "async")]
impl ChannelSink {
    /// Create a sink and the receiver its events are forwarded to.
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            trace!("notification receiver dropped");
        }
    }
}

#[cfg(feature = "async")]
impl NotificationSink for ChannelSink {
    fn on_connect(&self) {
        self.forward(Notification::Connect);
    }

    fn on_disconnect(&self) {
        self.forward(Notification::Disconnect);
    }

    fn on_log(&self, message: &str) {
        self.forward(Notification::Log(message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use std::thread::ThreadId;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(Notification, ThreadId)>>,
    }

    impl Recorder {
        fn push(&self, notification: Notification) {
            self.events
                .lock()
                .push((notification, thread::current().id()));
        }
    }

    impl NotificationSink for Recorder {
        fn on_connect(&self) {
            self.push(Notification::Connect);
        }

        fn on_disconnect(&self) {
            self.push(Notification::Disconnect);
        }

        fn on_log(&self, message: &str) {
            self.push(Notification::Log(message.to_string()));
        }
    }

    #[test]
    fn delivers_in_order_on_one_thread() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = Dispatcher::spawn(recorder.clone()).unwrap();
        let notifier = dispatcher.notifier();

        let producer = {
            let notifier = notifier.clone();
            thread::spawn(move || {
                notifier.notify(Notification::Connect);
                notifier.log("streaming");
                notifier.notify(Notification::Disconnect);
            })
        };
        producer.join().unwrap();
        assert!(dispatcher.stop());

        let events = recorder.events.lock();
        let kinds: Vec<_> = events.iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                Notification::Connect,
                Notification::Log("streaming".into()),
                Notification::Disconnect
            ]
        );
        let first_thread = events[0].1;
        assert_ne!(first_thread, thread::current().id());
        assert!(events.iter().all(|(_, id)| *id == first_thread));
    }

    #[test]
    fn notify_after_stop_is_dropped() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = Dispatcher::spawn(recorder.clone()).unwrap();
        let notifier = dispatcher.notifier();
        dispatcher.stop();
        assert!(dispatcher.stop(), "second stop is a no-op");

        notifier.notify(Notification::Connect);
        thread::sleep(Duration::from_millis(20));
        assert!(recorder.events.lock().is_empty());
    }

    struct Panicky;

    impl NotificationSink for Panicky {
        fn on_connect(&self) {
            panic!("sink failure");
        }
        fn on_disconnect(&self) {}
        fn on_log(&self, _message: &str) {}
    }

    #[test]
    fn sink_panic_is_reported_on_stop() {
        let mut dispatcher = Dispatcher::spawn(Arc::new(Panicky)).unwrap();
        dispatcher.notifier().notify(Notification::Connect);
        assert!(!dispatcher.stop());
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelSink::new();
        let mut dispatcher = Dispatcher::spawn(Arc::new(sink)).unwrap();
        let notifier = dispatcher.notifier();
        notifier.notify(Notification::Connect);
        notifier.log("hello");

        assert_eq!(rx.recv().await, Some(Notification::Connect));
        assert_eq!(rx.recv().await, Some(Notification::Log("hello".into())));
        dispatcher.stop();
    }
}
