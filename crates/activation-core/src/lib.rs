//! # VVM Activation Core - Visual Voicemail Activation
//!
//! This crate drives visual voicemail activation for a telephony line: it
//! asks the carrier to activate, correlates the asynchronous STATUS reply,
//! stores the mailbox credentials and turns the line into an active,
//! syncable source. Triggers that arrive before the device finishes initial
//! setup are parked and replayed once it does.
//!
//! The pieces:
//!
//! - [`ActivationService`]: entry point for triggers and inbound STATUS messages
//! - [`RetryPolicy`]: bounded, fixed-delay retry decisions
//! - [`StatusReplyWaiter`]: one pending STATUS reply per line, with timeout
//! - [`DeviceReadinessGate`]: parks triggers until device setup completes
//! - [`EventMapper`]: maps [`VvmEvent`]s onto per-line [`ChannelStatus`]
//!
//! Carrier protocols, message transport, credential storage, the source
//! registry, sync and indicators are reached only through the traits in
//! [`collaborators`].

pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod logging;
pub mod mapper;
pub mod memory;
pub mod orchestrator;
pub mod retry;
pub mod status;
pub mod types;
pub mod waiter;

pub use collaborators::{
    CarrierDirectory, CarrierProfile, Collaborators, CredentialStore, DeviceSetupSignal,
    IndicatorService, MessageTransport, ProvisioningCompletion, ProvisioningOutcome,
    SourceRegistry, SyncTrigger, VisualVoicemailProtocol,
};
pub use config::ActivationConfig;
pub use error::{ActivationError, Result};
pub use events::{
    ConfigurationEvent, DataChannelEvent, EventCategory, NotificationChannelEvent, OtherEvent,
    VvmEvent,
};
pub use gate::{Admission, DeviceReadinessGate, DeviceSetupState};
pub use logging::{setup_logging, LoggingConfig};
pub use mapper::{mutation_for, EventMapper};
pub use memory::{InMemoryCredentialStore, InMemorySourceRegistry, StaticCarrierDirectory};
pub use orchestrator::{
    ActivationOutcome, ActivationService, ActivationState, RunSnapshot, StatusRouting, Triggered,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use status::{
    ChannelStatus, ConfigurationState, DataChannelState, NotificationChannelState, StatusBoard,
    StatusMutation, StatusUpdate,
};
pub use types::{
    status_keys, ActivationRequest, LineId, ProvisioningStatus, ReturnCode,
    SourceActivationRecord, StatusReply,
};
pub use waiter::{StatusReplySubscription, StatusReplyWaiter};
