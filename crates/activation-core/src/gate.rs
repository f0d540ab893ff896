//! Device readiness gate
//!
//! Activation may depend on information the user provides during initial
//! device setup (language, for instance), so triggers that arrive before
//! setup completes are parked here and replayed once it does.
//!
//! ```text
//!             admit(line), setup incomplete
//!   READY ───────────────────────────────────▶ NOT_READY ──┐ admit(line): add to pending set
//!     ▲                                          │     ◀────┘
//!     └──────────── setup complete: drain, ──────┘
//!                   replay each line once,
//!                   drop observer
//! ```
//!
//! The pending set and the observer slot sit behind one mutex so that a
//! trigger racing the setup-complete notification is either drained with the
//! rest or sees the gate open; it is never lost and never replayed twice.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::collaborators::DeviceSetupSignal;
use crate::types::LineId;

/// Callback that re-issues an activation trigger for a drained line
pub type ReplayFn = Arc<dyn Fn(LineId) + Send + Sync>;

/// Result of asking the gate to let a trigger through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Device is set up; run the activation now
    Proceed,
    /// Parked until setup completes
    Deferred,
}

struct SetupObserver {
    pending: BTreeSet<LineId>,
    task: JoinHandle<()>,
}

/// Defers activation triggers until the device finishes initial setup
pub struct DeviceReadinessGate {
    signal: Arc<dyn DeviceSetupSignal>,
    runtime: Handle,
    replay: ReplayFn,
    observer: Mutex<Option<SetupObserver>>,
}

impl DeviceReadinessGate {
    pub fn new(signal: Arc<dyn DeviceSetupSignal>, runtime: Handle, replay: ReplayFn) -> Arc<Self> {
        Arc::new(Self {
            signal,
            runtime,
            replay,
            observer: Mutex::new(None),
        })
    }

    /// Let a trigger through, or park it until setup completes.
    ///
    /// Parking the same line twice keeps a single entry.
    pub fn admit(self: &Arc<Self>, line: &LineId) -> Admission {
        let mut slot = self.observer.lock();

        if slot.is_none() && self.signal.is_setup_complete() {
            return Admission::Proceed;
        }

        info!(line = %line, "Activation requested while device is not set up, postponing");

        let observer = slot.get_or_insert_with(|| {
            // Subscribe under the lock so a completion after this point is observed
            let rx = self.signal.subscribe();
            let task = self.runtime.spawn(observe_setup(Arc::downgrade(self), rx));
            SetupObserver {
                pending: BTreeSet::new(),
                task,
            }
        });
        observer.pending.insert(line.clone());
        Admission::Deferred
    }

    /// Lines currently parked
    pub fn pending(&self) -> Vec<LineId> {
        self.observer
            .lock()
            .as_ref()
            .map(|observer| observer.pending.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a setup observer is installed
    pub fn is_waiting(&self) -> bool {
        self.observer.lock().is_some()
    }

    /// Remove the observer and forget parked lines without replaying them
    pub fn cancel(&self) {
        if let Some(observer) = self.observer.lock().take() {
            observer.task.abort();
            info!(dropped = observer.pending.len(), "Device readiness gate cancelled");
        }
    }

    /// Take the parked lines and replay each once.
    ///
    /// Replay runs after the lock is released: the replayed trigger goes
    /// through [`admit`](Self::admit) again.
    fn drain(&self) {
        let Some(observer) = self.observer.lock().take() else {
            return;
        };

        info!(lines = observer.pending.len(), "Device set up, resuming activation");
        for line in observer.pending {
            (self.replay)(line);
        }
    }
}

async fn observe_setup(gate: Weak<DeviceReadinessGate>, mut rx: watch::Receiver<bool>) {
    // The borrowed value holds the signal's read lock; release it before replaying
    let completed = rx.wait_for(|complete| *complete).await.is_ok();
    drop(rx);

    let Some(gate) = gate.upgrade() else {
        return;
    };
    if completed {
        gate.drain();
    } else {
        error!("Device setup signal closed before setup completed; parked activations dropped");
        gate.observer.lock().take();
    }
}

/// Watch-backed [`DeviceSetupSignal`] for hosts that track setup themselves
pub struct DeviceSetupState {
    tx: watch::Sender<bool>,
}

impl DeviceSetupState {
    pub fn new(complete: bool) -> Self {
        let (tx, _) = watch::channel(complete);
        Self { tx }
    }

    pub fn set_complete(&self, complete: bool) {
        self.tx.send_replace(complete);
    }
}

impl DeviceSetupSignal for DeviceSetupState {
    fn is_setup_complete(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
