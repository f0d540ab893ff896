//! Activation orchestration
//!
//! [`ActivationService`] is the entry point for every activation trigger:
//! boot, SIM insertion, an explicit signal, or a spontaneous carrier STATUS
//! message. A trigger passes the [`DeviceReadinessGate`], claims the line's
//! in-flight slot and runs one activation lifecycle on the worker runtime.
//!
//! # Lifecycle
//!
//! ```text
//! START ─▶ REQUESTING ─▶ AWAITING_REPLY ─┬─▶ PROVISIONING ─┬─▶ ACCEPTING ─▶ DONE
//!              │ (prefetched reply)      │                 │
//!              └─────────────────────────┼─────────────────┘
//!                                        ▼
//!                                     FAILED ─▶ retry after delay (fresh request)
//!                                               or exhausted
//! ```
//!
//! At most one lifecycle runs per line. A lifecycle owns the line from the
//! first attempt until it is done or out of retries; triggers in between
//! are rejected with [`ActivationError::AlreadyInProgress`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vvm_activation_core::{ActivationConfig, ActivationService, Collaborators, DeviceSetupState, LineId};
//!
//! # async fn example(collaborators: Collaborators) -> vvm_activation_core::Result<()> {
//! let setup = Arc::new(DeviceSetupState::new(true));
//! let service = ActivationService::new(ActivationConfig::default(), collaborators, setup)?;
//!
//! service.trigger_activation(LineId::new("line-1"), None)?;
//! # Ok(())
//! # }
//! ```

mod run;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::{Collaborators, DeviceSetupSignal};
use crate::config::ActivationConfig;
use crate::error::{ActivationError, Result};
use crate::events::VvmEvent;
use crate::gate::{Admission, DeviceReadinessGate, ReplayFn};
use crate::mapper::EventMapper;
use crate::retry::RetryPolicy;
use crate::status::{ChannelStatus, StatusBoard, StatusUpdate};
use crate::types::{ActivationRequest, LineId, ReturnCode, StatusReply};
use crate::waiter::StatusReplyWaiter;

/// Step of an activation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationState {
    Start,
    Requesting,
    AwaitingReply,
    Provisioning,
    Accepting,
    Done,
    Failed,
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivationState::Start => "START",
            ActivationState::Requesting => "REQUESTING",
            ActivationState::AwaitingReply => "AWAITING_REPLY",
            ActivationState::Provisioning => "PROVISIONING",
            ActivationState::Accepting => "ACCEPTING",
            ActivationState::Done => "DONE",
            ActivationState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Terminal result of an activation lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// Credentials stored, source active, full sync requested
    Activated,
    /// The carrier declined activation; not retried
    Rejected { code: ReturnCode },
    /// Every attempt failed; no further automatic action
    Exhausted { attempts: u32 },
    /// The carrier accepted but the line could not be made an active source;
    /// not retried
    Incomplete { error: ActivationError },
    /// Stopped by a non-recoverable error or shutdown
    Aborted { error: ActivationError },
}

impl ActivationOutcome {
    pub fn is_activated(&self) -> bool {
        matches!(self, ActivationOutcome::Activated)
    }

    /// Convert into a `Result`, surfacing non-activation as an error
    pub fn into_result(self, line: &LineId) -> Result<()> {
        match self {
            ActivationOutcome::Activated => Ok(()),
            ActivationOutcome::Rejected { code } => Err(ActivationError::CarrierRejected {
                line: line.clone(),
                code,
            }),
            ActivationOutcome::Exhausted { attempts } => Err(ActivationError::RetriesExhausted {
                line: line.clone(),
                attempts,
            }),
            ActivationOutcome::Incomplete { error } | ActivationOutcome::Aborted { error } => {
                Err(error)
            }
        }
    }
}

/// What happened to a trigger
#[derive(Debug)]
pub enum Triggered {
    /// Lifecycle started; the handle resolves to its outcome
    Started(JoinHandle<ActivationOutcome>),
    /// Parked until the device finishes setup
    Deferred,
}

/// What happened to an inbound STATUS message
#[derive(Debug)]
pub enum StatusRouting {
    /// Handed to the lifecycle that was waiting for it
    Delivered,
    /// Nobody was waiting; treated as a carrier-initiated activation
    Spontaneous(Triggered),
}

/// Snapshot of a running lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSnapshot {
    pub lifecycle: Uuid,
    pub state: ActivationState,
    pub attempt: u32,
}

/// Entry point for activation triggers and inbound STATUS messages
pub struct ActivationService {
    config: ActivationConfig,
    policy: RetryPolicy,
    collaborators: Collaborators,
    waiter: Arc<StatusReplyWaiter>,
    mapper: Arc<EventMapper>,
    gate: Arc<DeviceReadinessGate>,
    in_flight: Arc<DashMap<LineId, RunSnapshot>>,
    outcomes: DashMap<LineId, ActivationOutcome>,
    worker: Handle,
    shutting_down: AtomicBool,
    shutdown_notify: Notify,
}

impl ActivationService {
    /// Create a service that runs lifecycles on the current Tokio runtime
    pub fn new(
        config: ActivationConfig,
        collaborators: Collaborators,
        setup: Arc<dyn DeviceSetupSignal>,
    ) -> Result<Arc<Self>> {
        let worker = Handle::try_current().map_err(|_| {
            ActivationError::config("ActivationService must be created inside a Tokio runtime")
        })?;
        Self::with_worker(config, collaborators, setup, worker)
    }

    /// Create a service that runs lifecycles on `worker`
    pub fn with_worker(
        config: ActivationConfig,
        collaborators: Collaborators,
        setup: Arc<dyn DeviceSetupSignal>,
        worker: Handle,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let board = Arc::new(StatusBoard::new(config.status_channel_capacity));
        let mapper = Arc::new(EventMapper::new(board, collaborators.carriers.clone()));
        let policy = RetryPolicy::from_config(&config);

        let service = Arc::new_cyclic(|this: &Weak<Self>| {
            let this = this.clone();
            let replay: ReplayFn = Arc::new(move |line: LineId| {
                let Some(service) = this.upgrade() else {
                    return;
                };
                // Context learned during setup may change the request, so never replay a reply
                if let Err(e) = service.trigger_activation(line.clone(), None) {
                    warn!(line = %line, error = %e, "Deferred activation could not be started");
                }
            });

            Self {
                gate: DeviceReadinessGate::new(setup, worker.clone(), replay),
                config,
                policy,
                collaborators,
                waiter: Arc::new(StatusReplyWaiter::new()),
                mapper,
                in_flight: Arc::new(DashMap::new()),
                outcomes: DashMap::new(),
                worker,
                shutting_down: AtomicBool::new(false),
                shutdown_notify: Notify::new(),
            }
        });

        info!(
            max_retries = service.config.max_retries,
            retry_interval_ms = service.config.retry_interval_ms,
            status_reply_timeout_ms = service.config.status_reply_timeout_ms,
            "Activation service started"
        );
        Ok(service)
    }

    /// Trigger activation for a line.
    ///
    /// `prefetched` carries a STATUS reply the caller already holds (a
    /// spontaneous carrier message), which skips the activation request.
    pub fn trigger_activation(
        self: &Arc<Self>,
        line: LineId,
        prefetched: Option<StatusReply>,
    ) -> Result<Triggered> {
        if self.is_shut_down() {
            return Err(ActivationError::config("Activation service is shut down"));
        }

        if self.gate.admit(&line) == Admission::Deferred {
            return Ok(Triggered::Deferred);
        }

        let profile = self
            .collaborators
            .carriers
            .lookup(&line)
            .ok_or_else(|| ActivationError::UnsupportedCarrier { line: line.clone() })?;

        let slot = self.claim(&line)?;
        let request = ActivationRequest { line, prefetched };

        debug!(
            line = %request.line,
            lifecycle = %slot.lifecycle,
            prefetched = request.prefetched.is_some(),
            "Starting activation lifecycle"
        );

        let service = Arc::clone(self);
        let handle = self
            .worker
            .spawn(async move { service.run_lifecycle(slot, profile, request).await });
        Ok(Triggered::Started(handle))
    }

    /// Route an inbound STATUS message.
    ///
    /// A lifecycle waiting on the line gets the reply; otherwise the message
    /// was sent by the carrier on its own and starts a lifecycle with the
    /// reply prefetched.
    pub fn on_status_message(self: &Arc<Self>, line: LineId, reply: StatusReply) -> Result<StatusRouting> {
        match self.waiter.deliver(&line, reply) {
            Ok(()) => Ok(StatusRouting::Delivered),
            Err(reply) => {
                info!(line = %line, "Spontaneous STATUS message received");
                self.trigger_activation(line, Some(reply))
                    .map(StatusRouting::Spontaneous)
            }
        }
    }

    /// Report a transport failure for the line's pending STATUS wait
    pub fn on_transport_error(&self, line: &LineId, message: impl Into<String>) -> bool {
        self.waiter.fail(line, ActivationError::transport(message))
    }

    /// Emit an event from the closed taxonomy for a line
    pub fn emit(&self, line: &LineId, event: impl Into<VvmEvent>) -> ChannelStatus {
        self.mapper.apply(line, event)
    }

    pub fn status(&self, line: &LineId) -> ChannelStatus {
        self.mapper.board().get(line)
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusUpdate> {
        self.mapper.board().subscribe()
    }

    /// Snapshot of the line's running lifecycle, if any
    pub fn run_state(&self, line: &LineId) -> Option<RunSnapshot> {
        self.in_flight.get(line).map(|entry| entry.clone())
    }

    pub fn is_active(&self, line: &LineId) -> bool {
        self.in_flight.contains_key(line)
    }

    /// Outcome of the line's most recent finished lifecycle
    pub fn last_outcome(&self, line: &LineId) -> Option<ActivationOutcome> {
        self.outcomes.get(line).map(|entry| entry.clone())
    }

    /// Lines parked until the device finishes setup
    pub fn deferred_lines(&self) -> Vec<LineId> {
        self.gate.pending()
    }

    pub fn config(&self) -> &ActivationConfig {
        &self.config
    }

    /// Stop accepting triggers and release every pending wait.
    ///
    /// Running lifecycles end with [`ActivationOutcome::Aborted`] instead of
    /// retrying.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(active = self.in_flight.len(), "Shutting down activation service");
        self.gate.cancel();
        self.waiter.interrupt_all();
        self.shutdown_notify.notify_waiters();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been called
    async fn shutdown_requested(&self) {
        let notified = self.shutdown_notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent shutdown is not missed
        notified.as_mut().enable();
        if self.is_shut_down() {
            return;
        }
        notified.await;
    }

    fn claim(&self, line: &LineId) -> Result<InFlightSlot> {
        match self.in_flight.entry(line.clone()) {
            Entry::Occupied(_) => {
                debug!(line = %line, "Activation already running, trigger coalesced");
                Err(ActivationError::AlreadyInProgress { line: line.clone() })
            }
            Entry::Vacant(vacant) => {
                let lifecycle = Uuid::new_v4();
                vacant.insert(RunSnapshot {
                    lifecycle,
                    state: ActivationState::Start,
                    attempt: 1,
                });
                Ok(InFlightSlot {
                    line: line.clone(),
                    lifecycle,
                    in_flight: Arc::clone(&self.in_flight),
                })
            }
        }
    }
}

impl Drop for ActivationService {
    fn drop(&mut self) {
        self.gate.cancel();
        self.waiter.interrupt_all();
    }
}

/// Ownership of a line's in-flight entry; released on drop
struct InFlightSlot {
    line: LineId,
    lifecycle: Uuid,
    in_flight: Arc<DashMap<LineId, RunSnapshot>>,
}

impl InFlightSlot {
    fn set_state(&self, state: ActivationState) {
        if let Some(mut entry) = self.in_flight.get_mut(&self.line) {
            if entry.lifecycle == self.lifecycle {
                entry.state = state;
            }
        }
    }

    fn set_attempt(&self, attempt: u32) {
        if let Some(mut entry) = self.in_flight.get_mut(&self.line) {
            if entry.lifecycle == self.lifecycle {
                entry.attempt = attempt;
            }
        }
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle;
        self.in_flight
            .remove_if(&self.line, |_, snapshot| snapshot.lifecycle == lifecycle);
    }
}
