//! Pending-call table.
//!
//! Every outstanding request owns one entry keyed by its msgid. Whoever
//! removes an entry (a response, a cancellation, an abandoned caller or
//! session teardown) is the only one allowed to complete its slot, so each
//! call reaches exactly one terminal outcome.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{CloseReason, Error, RemoteError, Result};
use crate::value::Value;

/// Completion slot handed to the caller.
pub(crate) type Slot = oneshot::Receiver<Result<Value>>;

struct PendingCall {
    method: String,
    created: Instant,
    tx: oneshot::Sender<Result<Value>>,
}

impl PendingCall {
    fn complete(self, id: u32, outcome: Result<Value>) {
        debug!(
            "Call {} ({}) finished after {:?}: {}",
            id,
            self.method,
            self.created.elapsed(),
            if outcome.is_ok() { "ok" } else { "error" }
        );
        // The receiver is gone if the caller stopped waiting; nothing to do.
        let _ = self.tx.send(outcome);
    }
}

struct Table {
    next_id: u32,
    calls: HashMap<u32, PendingCall>,
    closed: Option<CloseReason>,
}

pub(crate) struct PendingCalls {
    inner: Mutex<Table>,
}

impl PendingCalls {
    pub(crate) fn new() -> Self {
        Self::starting_at(1)
    }

    pub(crate) fn starting_at(first_id: u32) -> Self {
        Self {
            inner: Mutex::new(Table {
                next_id: first_id,
                calls: HashMap::new(),
                closed: None,
            }),
        }
    }

    /// Allocate an id and register a call under it.
    ///
    /// Ids wrap at the msgid limit and skip any id still outstanding.
    pub(crate) fn register(&self, method: &str) -> Result<(u32, Slot)> {
        let mut table = self.inner.lock();
        if table.closed.is_some() {
            return Err(Error::ConnectionClosed);
        }

        let mut id = table.next_id;
        while table.calls.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        table.next_id = id.wrapping_add(1);

        let (tx, rx) = oneshot::channel();
        table.calls.insert(
            id,
            PendingCall {
                method: method.to_string(),
                created: Instant::now(),
                tx,
            },
        );
        Ok((id, rx))
    }

    /// Complete a call with the remote's outcome.
    ///
    /// Returns `false` when no call is waiting under `id`.
    pub(crate) fn resolve(&self, id: u32, outcome: std::result::Result<Value, Value>) -> bool {
        let Some(call) = self.inner.lock().calls.remove(&id) else {
            return false;
        };
        call.complete(id, outcome.map_err(|payload| Error::Rpc(RemoteError::new(payload))));
        true
    }

    /// Remove a call and fail it with `Error::Cancelled`.
    pub(crate) fn cancel(&self, id: u32) -> bool {
        let Some(call) = self.inner.lock().calls.remove(&id) else {
            return false;
        };
        call.complete(id, Err(Error::Cancelled));
        true
    }

    /// Forget a call whose caller stopped waiting.
    pub(crate) fn abandon(&self, id: u32) {
        if let Some(call) = self.inner.lock().calls.remove(&id) {
            debug!("Call {} ({}) abandoned by caller", id, call.method);
        }
    }

    /// Close the table and fail every outstanding call.
    ///
    /// Returns `None` if the table was already closed, otherwise the number
    /// of calls that were failed.
    pub(crate) fn close(&self, reason: CloseReason) -> Option<usize> {
        let drained: Vec<(u32, PendingCall)> = {
            let mut table = self.inner.lock();
            if table.closed.is_some() {
                return None;
            }
            table.closed = Some(reason.clone());
            table.calls.drain().collect()
        };

        let count = drained.len();
        for (id, call) in drained {
            call.complete(id, Err(reason.to_error()));
        }
        Some(count)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.lock().closed.is_some()
    }

    pub(crate) fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.inner.lock().calls.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().calls.len()
    }
}
