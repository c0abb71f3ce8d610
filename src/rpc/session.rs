//! The RPC session: one duplex stream, one dispatch loop, many callers.
//!
//! # Architecture
//!
//! ```text
//!   callers ──begin()──► pending table ◄──resolve── dispatch loop ◄── reader
//!      │                                               │
//!      └──frames──► writer task ──► writer             └──publish──► EventBus
//! ```
//!
//! Only the dispatch loop reads from the stream, and only the writer task
//! writes to it. Callers register a pending entry, enqueue an encoded frame,
//! and wait on their own completion slot.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{CloseReason, Error, Result};
use crate::events::{EventBus, ListenerId};
use crate::rpc::codec::{self, Message};
use crate::rpc::framing;
use crate::rpc::pending::{PendingCalls, Slot};
use crate::value::Value;

const SUBSCRIBE: &str = "nvim_subscribe";
const UNSUBSCRIBE: &str = "nvim_unsubscribe";

type RequestHandler =
    Arc<dyn Fn(String, Vec<Value>) -> BoxFuture<'static, std::result::Result<Value, Value>> + Send + Sync>;

struct Shared {
    config: SessionConfig,
    pending: PendingCalls,
    bus: EventBus,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    request_handler: Mutex<Option<RequestHandler>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn send(&self, message: &Message) -> Result<()> {
        let frame = codec::encode(message)?;
        match self.outgoing.lock().as_ref() {
            Some(tx) => tx.send(frame).map_err(|_| Error::ConnectionClosed),
            None => Err(Error::ConnectionClosed),
        }
    }

    fn dispatch(self: &Arc<Self>, message: Message) {
        debug!("<- {}", message.describe());
        match message {
            Message::Response { id, outcome } => {
                if !self.pending.resolve(id, outcome) {
                    debug!("Dropping response for unknown request id {}", id);
                }
            }
            Message::Notification { event, args } => {
                self.bus.publish(&event, args);
            }
            Message::Request { id, method, args } => self.handle_request(id, method, args),
        }
    }

    /// Answer a request initiated by the remote. The handler runs on its own
    /// task so a slow handler cannot stall the dispatch loop.
    fn handle_request(self: &Arc<Self>, id: u32, method: String, args: Vec<Value>) {
        let handler = self.request_handler.lock().clone();
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = match handler {
                Some(handler) => handler(method.clone(), args).await,
                None => {
                    warn!("No request handler registered; rejecting {}", method);
                    Err(Value::from(format!("No request handler for `{}`", method)))
                }
            };
            if let Err(err) = shared.send(&Message::Response { id, outcome }) {
                warn!("Could not answer request {} ({}): {}", id, method, err);
            }
        });
    }

    fn teardown(&self, reason: CloseReason) {
        if let Some(failed) = self.pending.close(reason.clone()) {
            match &reason {
                CloseReason::Closed => info!("Session closed; failed {} pending calls", failed),
                CloseReason::Protocol(msg) => {
                    error!("Session closed on protocol error ({}); failed {} pending calls", msg, failed)
                }
            }
        }
        self.bus.clear();
        // Dropping the sender lets the writer task flush and shut down.
        self.outgoing.lock().take();
    }

    fn stop_reader(&self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}

/// A live connection to the remote process.
///
/// Cloning is cheap; every clone drives the same connection. Dropping the
/// last clone closes it, unless a listener or request handler still holds
/// one of its own; call [`close`](Self::close) to end it explicitly.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
    _owner: Arc<Owner>,
}

/// Shared by every `Session` clone; closes the connection when the last
/// one goes away. Pending calls and the reader hold `Shared` directly and
/// do not keep it alive.
struct Owner(Arc<Shared>);

impl Drop for Owner {
    fn drop(&mut self) {
        if !self.0.pending.is_closed() {
            debug!("Last session handle dropped; closing");
        }
        self.0.teardown(CloseReason::Closed);
        self.0.stop_reader();
    }
}

/// Wrap a duplex byte stream in a session using [`SessionConfig::from_env`].
///
/// Starts the dispatch loop immediately; there is no handshake to wait for.
///
/// # Errors
///
/// Returns `Error::Connection` when called outside a Tokio runtime, since
/// the session's reader and writer tasks could not be started.
pub fn attach<W, R>(writer: W, reader: R) -> Result<Session>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    attach_with(writer, reader, SessionConfig::from_env())
}

/// [`attach`] with an explicit configuration.
pub fn attach_with<W, R>(writer: W, reader: R, config: SessionConfig) -> Result<Session>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    let runtime = RuntimeHandle::try_current()
        .map_err(|e| Error::Connection(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        config,
        pending: PendingCalls::new(),
        bus: EventBus::new(runtime.clone()),
        outgoing: Mutex::new(Some(tx)),
        request_handler: Mutex::new(None),
        reader: Mutex::new(None),
    });

    runtime.spawn(write_loop(writer, rx, Arc::downgrade(&shared)));
    let reader_task = runtime.spawn(read_loop(reader, Arc::clone(&shared)));
    *shared.reader.lock() = Some(reader_task);

    debug!("Session attached");
    Ok(Session {
        _owner: Arc::new(Owner(Arc::clone(&shared))),
        shared,
    })
}

/// `Some((subscribing, event))` when `method` changes an event subscription.
fn subscription_change(method: &str, args: &[Value]) -> Option<(bool, String)> {
    let subscribing = match method {
        SUBSCRIBE => true,
        UNSUBSCRIBE => false,
        _ => return None,
    };
    let event = args.first()?.as_str()?;
    Some((subscribing, event.to_string()))
}

async fn read_loop<R>(mut reader: R, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let reason = loop {
        match framing::read_message(&mut reader, &mut buf, shared.config.max_message_size).await {
            Ok(Some(message)) => shared.dispatch(message),
            Ok(None) => {
                info!("Remote closed the stream");
                break CloseReason::Closed;
            }
            Err(Error::Protocol(msg)) => break CloseReason::Protocol(msg),
            Err(err) => {
                warn!("Read failed: {}", err);
                break CloseReason::Closed;
            }
        }
    };
    shared.teardown(reason);
}

async fn write_loop<W>(mut writer: W, mut frames: mpsc::UnboundedReceiver<Vec<u8>>, shared: Weak<Shared>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let written: std::io::Result<()> = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;

        if let Err(err) = written {
            warn!("Write failed: {}", err);
            if let Some(shared) = shared.upgrade() {
                shared.teardown(CloseReason::Closed);
                shared.stop_reader();
            }
            return;
        }
    }

    if let Err(err) = writer.shutdown().await {
        debug!("Writer shutdown failed: {}", err);
    }
}

impl Session {
    /// Send a request and return a handle to its eventual response.
    ///
    /// The id is allocated and the request queued for writing under one
    /// lock, so ids reach the stream in ascending order, in the order `begin`
    /// was called.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` if the session is closed (nothing is written)
    /// - `Error::Encode` if the arguments cannot be serialized
    pub fn begin(&self, method: &str, args: Vec<Value>) -> Result<PendingResponse> {
        let subscription = subscription_change(method, &args);

        let outgoing = self.shared.outgoing.lock();
        let Some(tx) = outgoing.as_ref() else {
            return Err(Error::ConnectionClosed);
        };
        let (id, slot) = self.shared.pending.register(method)?;
        // Dropped unsent on any error below, which abandons the entry.
        let pending = PendingResponse {
            id,
            slot,
            done: false,
            subscription,
            shared: Arc::clone(&self.shared),
        };

        debug!("-> request {} ({})", id, method);
        let frame = codec::encode(&Message::Request {
            id,
            method: method.to_string(),
            args,
        })?;
        tx.send(frame).map_err(|_| Error::ConnectionClosed)?;
        drop(outgoing);
        Ok(pending)
    }

    /// Call a remote method and wait for its result, applying the
    /// configured timeout, if any.
    ///
    /// # Errors
    ///
    /// - `Error::Rpc` if the remote reported a failure
    /// - `Error::ConnectionClosed` / `Error::Protocol` if the session ended
    /// - `Error::Cancelled` if another task cancelled the call
    /// - `Error::Timeout` if the configured deadline passed
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let deadline = self.shared.config.call_timeout;
        self.call_with_deadline(method, args, deadline).await
    }

    /// Call with an explicit deadline instead of the configured one.
    pub async fn call_timeout(&self, method: &str, args: Vec<Value>, deadline: Duration) -> Result<Value> {
        self.call_with_deadline(method, args, Some(deadline)).await
    }

    async fn call_with_deadline(
        &self,
        method: &str,
        args: Vec<Value>,
        deadline: Option<Duration>,
    ) -> Result<Value> {
        let pending = self.begin(method, args)?;
        match deadline {
            Some(deadline) => pending.with_timeout(deadline).await,
            None => pending.wait().await,
        }
    }

    /// Fail the pending call `id` with `Error::Cancelled`.
    ///
    /// Nothing is sent to the remote; a response that arrives later is
    /// dropped. Returns `false` if the call had already finished.
    pub fn cancel(&self, id: u32) -> bool {
        let cancelled = self.shared.pending.cancel(id);
        if cancelled {
            debug!("Cancelled request {}", id);
        }
        cancelled
    }

    /// Ask the remote to broadcast `event` to this session.
    pub async fn subscribe(&self, event: &str) -> Result<()> {
        self.call(SUBSCRIBE, vec![Value::from(event)]).await.map(drop)
    }

    pub async fn unsubscribe(&self, event: &str) -> Result<()> {
        self.call(UNSUBSCRIBE, vec![Value::from(event)]).await.map(drop)
    }

    /// Register a local listener for notifications named `event`.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        self.shared.bus.on(event, listener)
    }

    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.shared.bus.off(event, id)
    }

    /// Install the handler for requests the remote sends to us (for
    /// example through `rpcrequest()`). Replaces any previous handler.
    pub fn on_request<F, Fut>(&self, handler: F)
    where
        F: Fn(String, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, Value>> + Send + 'static,
    {
        let handler: RequestHandler = Arc::new(move |method, args| Box::pin(handler(method, args)));
        *self.shared.request_handler.lock() = Some(handler);
    }

    /// Close the connection. Outstanding calls fail with
    /// `Error::ConnectionClosed`. Calling it again does nothing.
    pub fn close(&self) {
        self.shared.teardown(CloseReason::Closed);
        self.shared.stop_reader();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.pending.is_closed()
    }

    /// Ids of calls still waiting for a response, ascending.
    pub fn pending_ids(&self) -> Vec<u32> {
        self.shared.pending.ids()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.shared.bus.subscriptions()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.shared.bus.listener_count(event)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// True if both values drive the same connection.
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("closed", &self.is_closed())
            .field("pending", &self.shared.pending.len())
            .finish()
    }
}

/// An outstanding call.
///
/// Await it (or call [`wait`](Self::wait)) for the result. Dropping it
/// before the result arrives abandons the call.
#[must_use = "dropping a PendingResponse abandons the call"]
pub struct PendingResponse {
    id: u32,
    slot: Slot,
    done: bool,
    /// Set for `nvim_subscribe` / `nvim_unsubscribe` calls.
    subscription: Option<(bool, String)>,
    shared: Arc<Shared>,
}

impl PendingResponse {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub async fn wait(mut self) -> Result<Value> {
        let outcome = match (&mut self.slot).await {
            Ok(outcome) => outcome,
            // The slot's sender only disappears without a value if the
            // session state itself was dropped.
            Err(_) => Err(Error::ConnectionClosed),
        };
        self.done = true;

        // Keep the bus's subscription set in step with the remote, whichever
        // path issued the call.
        if outcome.is_ok() {
            match self.subscription.take() {
                Some((true, event)) => self.shared.bus.mark_subscribed(&event),
                Some((false, event)) => self.shared.bus.mark_unsubscribed(&event),
                None => {}
            }
        }
        outcome
    }

    /// Wait at most `deadline`; on expiry the call is abandoned and
    /// `Error::Timeout` returned.
    pub async fn with_timeout(self, deadline: Duration) -> Result<Value> {
        let id = self.id;
        match tokio::time::timeout(deadline, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Request {} timed out after {:?}", id, deadline);
                Err(Error::Timeout(deadline))
            }
        }
    }
}

impl IntoFuture for PendingResponse {
    type Output = Result<Value>;
    type IntoFuture = BoxFuture<'static, Result<Value>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if !self.done {
            self.shared.pending.abandon(self.id);
        }
    }
}

impl fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResponse").field("id", &self.id).finish()
    }
}
