//! STATUS reply rendezvous
//!
//! A run registers interest in the next STATUS reply for its line *before*
//! sending the activation request, then waits on the returned
//! [`StatusReplySubscription`] with a deadline. The message transport hands
//! inbound replies to [`StatusReplyWaiter::deliver`]. The registration is
//! released when the subscription is dropped, whatever the exit path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{ActivationError, Result};
use crate::types::{LineId, StatusReply};

struct PendingReply {
    id: u64,
    tx: oneshot::Sender<Result<StatusReply>>,
}

/// Correlates inbound STATUS replies to the run waiting for them
pub struct StatusReplyWaiter {
    pending: DashMap<LineId, PendingReply>,
    next_id: AtomicU64,
}

impl StatusReplyWaiter {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register for the next reply on `line`.
    ///
    /// Only one registration per line may exist at a time.
    pub fn register(self: &Arc<Self>, line: &LineId) -> Result<StatusReplySubscription> {
        match self.pending.entry(line.clone()) {
            Entry::Occupied(_) => Err(ActivationError::AlreadyRegistered { line: line.clone() }),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel();
                slot.insert(PendingReply { id, tx });
                trace!(line = %line, registration = id, "Registered for STATUS reply");
                Ok(StatusReplySubscription {
                    line: line.clone(),
                    id,
                    rx,
                    waiter: Arc::clone(self),
                })
            }
        }
    }

    /// Hand a reply to the run waiting on `line`.
    ///
    /// The registration is consumed, so later replies for the same run are
    /// not accepted. Returns the reply back when nobody is waiting.
    pub fn deliver(&self, line: &LineId, reply: StatusReply) -> std::result::Result<(), StatusReply> {
        match self.pending.remove(line) {
            Some((_, pending)) => match pending.tx.send(Ok(reply)) {
                Ok(()) => {
                    debug!(line = %line, "STATUS reply delivered to waiting activation");
                    Ok(())
                }
                // Receiver gone between timeout and release
                Err(Ok(reply)) => Err(reply),
                Err(Err(_)) => Ok(()),
            },
            None => Err(reply),
        }
    }

    /// Fail the pending wait on `line` with a transport error
    pub fn fail(&self, line: &LineId, error: ActivationError) -> bool {
        match self.pending.remove(line) {
            Some((_, pending)) => pending.tx.send(Err(error)).is_ok(),
            None => false,
        }
    }

    /// Drop the registration on `line`; the waiting run sees an interruption
    pub fn interrupt(&self, line: &LineId) -> bool {
        self.pending.remove(line).is_some()
    }

    /// Drop every registration
    pub fn interrupt_all(&self) {
        self.pending.clear();
    }

    pub fn is_waiting(&self, line: &LineId) -> bool {
        self.pending.contains_key(line)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn release(&self, line: &LineId, id: u64) {
        if self.pending.remove_if(line, |_, pending| pending.id == id).is_some() {
            trace!(line = %line, registration = id, "Released STATUS reply registration");
        }
    }
}

impl Default for StatusReplyWaiter {
    fn default() -> Self {
        Self::new()
    }
}

/// A single registration for the next STATUS reply on a line
pub struct StatusReplySubscription {
    line: LineId,
    id: u64,
    rx: oneshot::Receiver<Result<StatusReply>>,
    waiter: Arc<StatusReplyWaiter>,
}

impl StatusReplySubscription {
    pub fn line(&self) -> &LineId {
        &self.line
    }

    /// Wait for the reply, at most `timeout`.
    ///
    /// A reply that has not arrived when the deadline passes is a timeout,
    /// even if it shows up right after.
    pub async fn wait(mut self, timeout: Duration) -> Result<StatusReply> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ActivationError::Interrupted {
                line: self.line.clone(),
            }),
            Err(_) => Err(ActivationError::StatusReplyTimeout {
                line: self.line.clone(),
                timeout,
            }),
        }
    }
}

impl Drop for StatusReplySubscription {
    fn drop(&mut self) {
        self.waiter.release(&self.line, self.id);
    }
}
