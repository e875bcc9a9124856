//! Event Bus: ordered, fire-and-forget fan-out
//!
//! ```text
//! publisher ──publish()──┬──► [queue A] ──► worker A ──► handler A (in order)
//!   (never blocks)       ├──► [queue B] ──► worker B ──► handler B (in order)
//!                        └──► [queue C] ──► worker C ──► handler C (in order)
//! ```
//!
//! Every subscriber owns an unbounded queue and a dedicated worker task. A
//! publisher only pushes into queues, so a slow or failing handler can never
//! stall the publisher or the other subscribers. Because `publish` is
//! synchronous, events from one publisher land in each queue in the order they
//! were published.
//!
//! Handler failures (both `Err` returns and panics) are logged and counted;
//! the event is not retried and the subscription stays registered.

use crate::error::BusError;
use crate::event::{Event, EventKind};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Error type handlers may return; it is only ever logged
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A bus subscriber
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in log lines
    fn name(&self) -> &str;

    /// Handle one event of a subscribed kind
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Identifies a registration for [`EventBus::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Snapshot of bus counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Events accepted by `publish`
    pub published: u64,
    /// Handler invocations that returned `Ok`
    pub delivered: u64,
    /// Handler invocations that returned `Err` or panicked
    pub handler_failures: u64,
    /// Events rejected because the bus was shut down
    pub dropped: u64,
}

struct Subscriber {
    id: SubscriptionId,
    name: String,
    kinds: Vec<EventKind>,
    tx: mpsc::UnboundedSender<Arc<Event>>,
}

/// Counters shared with worker tasks
#[derive(Default)]
struct Counters {
    in_flight: AtomicUsize,
    idle: Notify,
    published: AtomicU64,
    delivered: AtomicU64,
    handler_failures: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn finish_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

struct BusInner {
    subscribers: RwLock<Vec<Subscriber>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    next_id: AtomicU64,
    counters: Arc<Counters>,
}

/// Cloneable handle to the process-wide event bus
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use vigil_events::{ArmMode, ArmState, ArmedEvent, Event, EventBus, EventHandler, EventKind, HandlerError};
///
/// struct Printer;
///
/// #[async_trait::async_trait]
/// impl EventHandler for Printer {
///     fn name(&self) -> &str {
///         "printer"
///     }
///
///     async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
///         println!("{:?}", event.kind());
///         Ok(())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let bus = EventBus::new();
/// bus.subscribe(&[EventKind::Armed], Arc::new(Printer)).unwrap();
/// bus.publish(ArmedEvent::new(ArmMode::Manual, ArmState::Armed));
/// bus.shutdown().await;
/// # }
/// ```
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(Vec::new()),
                workers: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                counters: Arc::new(Counters::default()),
            }),
        }
    }

    /// Register `handler` for the given event kinds
    ///
    /// Spawns the subscriber's worker task, so this must be called from
    /// within a Tokio runtime.
    pub fn subscribe(
        &self,
        kinds: &[EventKind],
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionId, BusError> {
        let name = handler.name().to_string();

        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        if kinds.is_empty() {
            return Err(BusError::NoEventKinds { subscriber: name });
        }

        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(dispatch_loop(
            Arc::clone(&self.inner.counters),
            name.clone(),
            handler,
            rx,
        ));

        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                name: name.clone(),
                kinds: kinds.to_vec(),
                tx,
            });
        self.inner
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(worker);

        info!(subscriber = %name, ?kinds, "Subscribed to event bus");
        Ok(id)
    }

    /// Remove a subscription
    ///
    /// Events already queued for it are still delivered before its worker
    /// exits. Returns `false` if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match subscribers.iter().position(|s| s.id == id) {
            Some(index) => {
                let removed = subscribers.remove(index);
                info!(subscriber = %removed.name, "Unsubscribed from event bus");
                true
            }
            None => false,
        }
    }

    /// Queue `event` for every interested subscriber and return immediately
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: impl Into<Event>) -> usize {
        let event = Arc::new(event.into());
        let kind = event.kind();
        let counters = &self.inner.counters;

        if self.inner.closed.load(Ordering::Acquire) {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(?kind, "Event bus is shut down, dropping event");
            return 0;
        }

        counters.published.fetch_add(1, Ordering::Relaxed);

        let subscribers = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let mut queued = 0;
        for subscriber in subscribers.iter().filter(|s| s.kinds.contains(&kind)) {
            counters.in_flight.fetch_add(1, Ordering::SeqCst);
            if subscriber.tx.send(Arc::clone(&event)).is_err() {
                counters.finish_one();
                warn!(subscriber = %subscriber.name, ?kind, "Subscriber worker has stopped, event not delivered");
            } else {
                queued += 1;
            }
        }

        if queued == 0 {
            debug!(?kind, "No subscribers for event");
        }
        queued
    }

    /// Wait until every queued event, including events published by handlers
    /// while handling, has been processed
    pub async fn wait_idle(&self) {
        let counters = &self.inner.counters;
        loop {
            let notified = counters.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if counters.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Drain in-flight work, then stop all workers
    ///
    /// Publishing after shutdown is a logged no-op.
    pub async fn shutdown(&self) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }

        self.wait_idle().await;

        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Dropping the senders lets every worker finish its queue and exit.
        let subscribers = std::mem::take(
            &mut *self
                .inner
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        drop(subscribers);

        let workers = std::mem::take(
            &mut *self
                .inner
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        info!(workers = workers.len(), "Event bus draining");
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Event bus worker terminated abnormally");
            }
        }
        info!("Event bus stopped");
    }

    /// Whether `shutdown` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Current counters
    pub fn stats(&self) -> BusStats {
        let counters = &self.inner.counters;
        BusStats {
            published: counters.published.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            handler_failures: counters.handler_failures.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn dispatch_loop(
    counters: Arc<Counters>,
    name: String,
    handler: Arc<dyn EventHandler>,
    mut rx: mpsc::UnboundedReceiver<Arc<Event>>,
) {
    while let Some(event) = rx.recv().await {
        let kind = event.kind();

        match AssertUnwindSafe(handler.handle(event.as_ref()))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                error!(subscriber = %name, ?kind, error = %e, "Event handler failed");
            }
            Err(panic) => {
                counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    subscriber = %name,
                    ?kind,
                    panic = panic_message(panic.as_ref()),
                    "Event handler panicked"
                );
            }
        }

        counters.finish_one();
    }

    debug!(subscriber = %name, "Event bus worker stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ArmMode, ArmState, ArmedEvent, CameraRebootEvent};
    use std::time::Duration;

    /// Records the camera names of reboot events it sees
    struct Recorder {
        name: String,
        seen: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl Recorder {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                seen: Mutex::new(Vec::new()),
                delay: None,
            })
        }

        fn slow(name: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                seen: Mutex::new(Vec::new()),
                delay: Some(delay),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match event {
                Event::CameraReboot(e) => self.seen.lock().unwrap().push(e.camera_name.clone()),
                Event::Armed(e) => self.seen.lock().unwrap().push(e.state.to_string()),
                _ => {}
            }
            Ok(())
        }
    }

    struct Failing {
        panic: bool,
    }

    #[async_trait]
    impl EventHandler for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
            if self.panic {
                panic!("handler exploded");
            }
            Err("handler refused".into())
        }
    }

    #[tokio::test]
    async fn test_delivers_in_publication_order() {
        let bus = EventBus::new();
        let recorder = Recorder::new("recorder");
        bus.subscribe(&[EventKind::CameraReboot], recorder.clone())
            .unwrap();

        for name in ["a", "b", "c", "d"] {
            bus.publish(CameraRebootEvent::new(name));
        }
        bus.wait_idle().await;

        assert_eq!(recorder.seen(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_filters_by_kind() {
        let bus = EventBus::new();
        let recorder = Recorder::new("armed-only");
        bus.subscribe(&[EventKind::Armed], recorder.clone()).unwrap();

        assert_eq!(bus.publish(CameraRebootEvent::new("porch")), 0);
        assert_eq!(
            bus.publish(ArmedEvent::new(ArmMode::Manual, ArmState::Armed)),
            1
        );
        bus.wait_idle().await;

        assert_eq!(recorder.seen(), vec!["ARMED"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        let slow = Recorder::slow("slow", Duration::from_secs(30));
        let fast = Recorder::new("fast");
        bus.subscribe(&[EventKind::CameraReboot], slow.clone()).unwrap();
        bus.subscribe(&[EventKind::CameraReboot], fast.clone()).unwrap();

        bus.publish(CameraRebootEvent::new("porch"));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fast.seen(), vec!["porch"]);
        assert!(slow.seen().is_empty());

        bus.wait_idle().await;
        assert_eq!(slow.seen(), vec!["porch"]);
    }

    #[tokio::test]
    async fn test_failing_handlers_are_isolated() {
        let bus = EventBus::new();
        let recorder = Recorder::new("recorder");
        bus.subscribe(&[EventKind::CameraReboot], Arc::new(Failing { panic: false }))
            .unwrap();
        bus.subscribe(&[EventKind::CameraReboot], Arc::new(Failing { panic: true }))
            .unwrap();
        bus.subscribe(&[EventKind::CameraReboot], recorder.clone())
            .unwrap();

        bus.publish(CameraRebootEvent::new("one"));
        bus.publish(CameraRebootEvent::new("two"));
        bus.wait_idle().await;

        assert_eq!(recorder.seen(), vec!["one", "two"]);
        let stats = bus.stats();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.handler_failures, 4);
        assert_eq!(stats.delivered, 2);
        assert_eq!(bus.subscriber_count(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_rejects() {
        let bus = EventBus::new();
        let recorder = Recorder::slow("slow", Duration::from_millis(5));
        bus.subscribe(&[EventKind::CameraReboot], recorder.clone())
            .unwrap();

        bus.publish(CameraRebootEvent::new("first"));
        bus.publish(CameraRebootEvent::new("second"));
        bus.shutdown().await;

        assert_eq!(recorder.seen(), vec!["first", "second"]);
        assert!(bus.is_closed());
        assert_eq!(bus.publish(CameraRebootEvent::new("late")), 0);
        assert_eq!(bus.stats().dropped, 1);
        assert!(matches!(
            bus.subscribe(&[EventKind::Armed], Recorder::new("late")),
            Err(BusError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let recorder = Recorder::new("recorder");
        let id = bus
            .subscribe(&[EventKind::CameraReboot], recorder.clone())
            .unwrap();

        bus.publish(CameraRebootEvent::new("before"));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(CameraRebootEvent::new("after"));
        bus.wait_idle().await;

        assert_eq!(recorder.seen(), vec!["before"]);
    }

    #[tokio::test]
    async fn test_subscribe_requires_kinds() {
        let bus = EventBus::new();
        let result = bus.subscribe(&[], Recorder::new("nothing"));
        assert!(matches!(result, Err(BusError::NoEventKinds { .. })));
    }
}
