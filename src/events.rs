//! In-process event bus for remote notifications.
//!
//! Publishing only enqueues: one delivery task drains the bus queue and
//! calls the listeners snapshotted for each notification in registration
//! order. The dispatch loop never waits on a listener, and notifications
//! are delivered in the order they came off the stream.

use std::collections::{BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::value::Value;

/// Identifies a registered listener, for [`EventBus::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Callback invoked with a notification's arguments.
pub type Listener = Arc<dyn Fn(Vec<Value>) + Send + Sync + 'static>;

struct Registration {
    id: ListenerId,
    listener: Listener,
}

/// One notification together with the listeners it was published to.
struct Delivery {
    event: String,
    listeners: Vec<Listener>,
    args: Vec<Value>,
}

#[derive(Default)]
struct BusState {
    next_listener: u64,
    listeners: HashMap<String, Vec<Registration>>,
    subscriptions: BTreeSet<String>,
}

pub struct EventBus {
    state: Mutex<BusState>,
    queue: mpsc::UnboundedSender<Delivery>,
}

impl EventBus {
    /// Create a bus whose delivery task runs on `runtime`.
    pub fn new(runtime: RuntimeHandle) -> Self {
        let (queue, deliveries) = mpsc::unbounded_channel();
        runtime.spawn(deliver(deliveries));
        Self {
            state: Mutex::new(BusState::default()),
            queue,
        }
    }

    /// Register a listener for `event`. Listeners of one event are called
    /// in the order they were registered.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        state
            .listeners
            .entry(event.to_string())
            .or_default()
            .push(Registration {
                id,
                listener: Arc::new(listener),
            });
        id
    }

    /// Remove a listener. Notifications already published to it are still
    /// delivered.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut state = self.state.lock();
        let Some(registrations) = state.listeners.get_mut(event) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        let removed = registrations.len() != before;
        if registrations.is_empty() {
            state.listeners.remove(event);
        }
        removed
    }

    /// Queue `args` for every current listener of `event`. Returns how many
    /// listeners it was queued for; zero means the notification was
    /// discarded.
    pub fn publish(&self, event: &str, args: Vec<Value>) -> usize {
        let listeners: Vec<Listener> = {
            let state = self.state.lock();
            match state.listeners.get(event) {
                Some(registrations) => registrations.iter().map(|r| Arc::clone(&r.listener)).collect(),
                None => Vec::new(),
            }
        };

        if listeners.is_empty() {
            debug!("No listeners for {}; dropping notification", event);
            return 0;
        }

        let count = listeners.len();
        let delivery = Delivery {
            event: event.to_string(),
            listeners,
            args,
        };
        match self.queue.send(delivery) {
            Ok(()) => count,
            Err(_) => {
                debug!("Delivery task gone; dropping {}", event);
                0
            }
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.state.lock().listeners.get(event).map_or(0, Vec::len)
    }

    pub(crate) fn mark_subscribed(&self, event: &str) {
        self.state.lock().subscriptions.insert(event.to_string());
    }

    pub(crate) fn mark_unsubscribed(&self, event: &str) {
        self.state.lock().subscriptions.remove(event);
    }

    /// Events this session has subscribed to on the remote side.
    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().subscriptions.iter().cloned().collect()
    }

    /// Drop every listener and subscription.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.listeners.clear();
        state.subscriptions.clear();
    }
}

async fn deliver(mut deliveries: mpsc::UnboundedReceiver<Delivery>) {
    while let Some(Delivery { event, listeners, args }) = deliveries.recv().await {
        for listener in listeners {
            // A panicking listener must not take the bus down with it.
            if catch_unwind(AssertUnwindSafe(|| listener(args.clone()))).is_err() {
                error!("Listener for {} panicked", event);
            }
        }
    }
    debug!("Event delivery finished");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    use super::*;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    fn bus() -> EventBus {
        EventBus::new(RuntimeHandle::current())
    }

    type Recorded = UnboundedReceiver<(&'static str, Vec<Value>)>;

    fn recorder(tag: &'static str) -> (impl Fn(Vec<Value>) + Send + Sync + 'static, Recorded) {
        let (tx, rx) = mpsc::unbounded_channel();
        (move |args| {
            let _ = tx.send((tag, args));
        }, rx)
    }

    async fn next<T>(rx: &mut UnboundedReceiver<T>) -> T {
        timeout(TEST_TIMEOUT, rx.recv())
            .await
            .expect("Test timed out")
            .expect("Channel closed")
    }

    #[tokio::test]
    async fn test_publish_without_listeners_is_noop() {
        let bus = bus();
        assert_eq!(bus.publish("nobody", vec![Value::Integer(1)]), 0);
    }

    #[tokio::test]
    async fn test_delivery_follows_stream_then_registration_order() {
        let bus = bus();
        let (tx, mut rx) = mpsc::unbounded_channel();
        for tag in ["first", "second"] {
            let tx = tx.clone();
            bus.on("tick", move |args| {
                let _ = tx.send((tag, args));
            });
        }

        for i in 0..20 {
            assert_eq!(bus.publish("tick", vec![Value::Integer(i)]), 2);
        }
        for i in 0..20 {
            assert_eq!(next(&mut rx).await, ("first", vec![Value::Integer(i)]));
            assert_eq!(next(&mut rx).await, ("second", vec![Value::Integer(i)]));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_listener_keeps_registration_order() {
        let bus = bus();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tx_slow = tx.clone();
        bus.on("ev", move |_| {
            std::thread::sleep(Duration::from_millis(50));
            let _ = tx_slow.send("first");
        });
        bus.on("ev", move |_| {
            let _ = tx.send("second");
        });

        assert_eq!(bus.publish("ev", vec![]), 2);
        assert_eq!(next(&mut rx).await, "first");
        assert_eq!(next(&mut rx).await, "second");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_publish_does_not_wait_for_listeners() {
        let bus = bus();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        let gate_rx = parking_lot::Mutex::new(gate_rx);
        let (done, mut rx) = recorder("done");
        bus.on("ev", move |args| {
            // Blocks the delivery task until the test releases it.
            let _ = gate_rx.lock().recv_timeout(Duration::from_secs(5));
            done(args);
        });

        for i in 0..3 {
            assert_eq!(bus.publish("ev", vec![Value::Integer(i)]), 1);
        }
        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();
        for i in 0..3 {
            assert_eq!(next(&mut rx).await, ("done", vec![Value::Integer(i)]));
        }
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_stop_delivery() {
        let bus = bus();
        bus.on("ev", |_| panic!("listener failed"));
        let (after, mut rx) = recorder("after");
        bus.on("ev", after);

        bus.publish("ev", vec![Value::Integer(1)]);
        bus.publish("ev", vec![Value::Integer(2)]);
        assert_eq!(next(&mut rx).await, ("after", vec![Value::Integer(1)]));
        assert_eq!(next(&mut rx).await, ("after", vec![Value::Integer(2)]));
    }

    #[tokio::test]
    async fn test_off_inside_listener_keeps_snapshot() {
        let bus = Arc::new(bus());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let self_id = Arc::new(parking_lot::Mutex::new(None::<ListenerId>));
        let bus_for_listener = Arc::clone(&bus);
        let id_for_listener = Arc::clone(&self_id);
        let tx_a = tx.clone();
        let id = bus.on("ev", move |args| {
            if let Some(id) = *id_for_listener.lock() {
                bus_for_listener.off("ev", id);
            }
            let _ = tx_a.send(("a", args));
        });
        *self_id.lock() = Some(id);

        let tx_b = tx.clone();
        bus.on("ev", move |args| {
            let _ = tx_b.send(("b", args));
        });

        assert_eq!(bus.publish("ev", vec![Value::Integer(1)]), 2);

        assert_eq!(next(&mut rx).await, ("a", vec![Value::Integer(1)]));
        assert_eq!(next(&mut rx).await, ("b", vec![Value::Integer(1)]));

        // Listener "a" removed itself; only "b" is left for new notifications.
        assert_eq!(bus.listener_count("ev"), 1);
        assert_eq!(bus.publish("ev", vec![Value::Integer(2)]), 1);
        assert_eq!(next(&mut rx).await, ("b", vec![Value::Integer(2)]));
    }

    #[tokio::test]
    async fn test_off_unknown_listener() {
        let bus = bus();
        let id = bus.on("a", |_| {});
        assert!(!bus.off("b", id));
        assert!(bus.off("a", id));
        assert!(!bus.off("a", id));
        assert_eq!(bus.listener_count("a"), 0);
    }

    #[tokio::test]
    async fn test_clear_drops_listeners_and_subscriptions() {
        let bus = bus();
        bus.on("a", |_| {});
        bus.mark_subscribed("a");
        bus.mark_subscribed("b");
        assert_eq!(bus.subscriptions(), vec!["a".to_string(), "b".to_string()]);

        bus.clear();
        assert_eq!(bus.listener_count("a"), 0);
        assert!(bus.subscriptions().is_empty());
        assert_eq!(bus.publish("a", vec![]), 0);
    }
}
