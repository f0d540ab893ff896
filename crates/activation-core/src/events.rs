//! Visual voicemail lifecycle events
//!
//! The taxonomy is closed: every event belongs to exactly one category and
//! each category is its own enum, so a handler that forgets a member fails to
//! compile instead of silently dropping the event.
//!
//! ```text
//! VvmEvent
//!   ├── Configuration(ConfigurationEvent)               → configuration / notification state
//!   ├── DataChannel(DataChannelEvent)                   → data channel state
//!   ├── NotificationChannel(NotificationChannelEvent)   → notification (+ data) state
//!   └── Other(OtherEvent)                               → reset to baseline
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse event category used for dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    Configuration,
    DataChannel,
    NotificationChannel,
    Other,
}

/// Activation and configuration lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigurationEvent {
    /// An activation lifecycle started for the line
    Activating,
    /// A STATUS reply with a success return code was accepted
    RequestStatusSuccess,
    /// The mailbox PIN was set during provisioning
    PinSet,
    /// The carrier did not answer the activation request in time
    StatusReplyTimeout,
    /// The carrier explicitly declined activation
    ActivationRejected,
    /// Retries were exhausted; no further automatic attempt will be made
    ServiceNotAvailable,
}

/// Outcomes of mailbox data channel (IMAP) operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataChannelEvent {
    ImapOperationCompleted,
    NoConnection,
    NoConnectionCellularRequired,
    InvalidPort,
    CannotResolveHostOnNetwork,
    SslInvalidHostName,
    CannotEstablishSslSession,
    IoeOnOpen,
    BadImapCredential,
    AuthUnknownUser,
    AuthUnknownDevice,
    AuthInvalidPassword,
    AuthMailboxNotInitialized,
    AuthServiceNotProvisioned,
    AuthServiceNotActivated,
    AuthUserIsBlocked,
    RejectedServerResponse,
    InvalidInitialServerResponse,
    SslException,
    AllSocketConnectionFailed,
}

/// Notification (SMS) channel availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationChannelEvent {
    InService,
    ServiceLost,
}

/// Events outside the three channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OtherEvent {
    /// The line is no longer an active mailbox source
    SourceRemoved,
}

/// Any event from the closed taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VvmEvent {
    Configuration(ConfigurationEvent),
    DataChannel(DataChannelEvent),
    NotificationChannel(NotificationChannelEvent),
    Other(OtherEvent),
}

impl VvmEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            VvmEvent::Configuration(_) => EventCategory::Configuration,
            VvmEvent::DataChannel(_) => EventCategory::DataChannel,
            VvmEvent::NotificationChannel(_) => EventCategory::NotificationChannel,
            VvmEvent::Other(_) => EventCategory::Other,
        }
    }

    /// Whether the event reports a problem rather than progress
    pub fn is_error(&self) -> bool {
        match self {
            VvmEvent::Configuration(event) => matches!(
                event,
                ConfigurationEvent::StatusReplyTimeout
                    | ConfigurationEvent::ActivationRejected
                    | ConfigurationEvent::ServiceNotAvailable
            ),
            VvmEvent::DataChannel(event) => *event != DataChannelEvent::ImapOperationCompleted,
            VvmEvent::NotificationChannel(event) => *event == NotificationChannelEvent::ServiceLost,
            VvmEvent::Other(_) => false,
        }
    }
}

impl fmt::Display for VvmEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VvmEvent::Configuration(event) => write!(f, "CONFIG_{:?}", event),
            VvmEvent::DataChannel(event) => write!(f, "DATA_{:?}", event),
            VvmEvent::NotificationChannel(event) => write!(f, "NOTIFICATION_{:?}", event),
            VvmEvent::Other(event) => write!(f, "OTHER_{:?}", event),
        }
    }
}

impl From<ConfigurationEvent> for VvmEvent {
    fn from(event: ConfigurationEvent) -> Self {
        VvmEvent::Configuration(event)
    }
}

impl From<DataChannelEvent> for VvmEvent {
    fn from(event: DataChannelEvent) -> Self {
        VvmEvent::DataChannel(event)
    }
}

impl From<NotificationChannelEvent> for VvmEvent {
    fn from(event: NotificationChannelEvent) -> Self {
        VvmEvent::NotificationChannel(event)
    }
}

impl From<OtherEvent> for VvmEvent {
    fn from(event: OtherEvent) -> Self {
        VvmEvent::Other(event)
    }
}
