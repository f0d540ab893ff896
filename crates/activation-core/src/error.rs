//! Error types for visual voicemail activation

use std::time::Duration;

use thiserror::Error;

use crate::types::{LineId, ReturnCode};

/// Result type for activation operations
pub type Result<T> = std::result::Result<T, ActivationError>;

/// Errors that can occur while activating a line
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActivationError {
    /// No STATUS reply arrived before the deadline
    #[error("No status reply for line {line} within {timeout:?}")]
    StatusReplyTimeout { line: LineId, timeout: Duration },

    /// Transport failed while obtaining the STATUS reply
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The wait for a STATUS reply was interrupted before it resolved
    #[error("Status reply wait for line {line} interrupted")]
    Interrupted { line: LineId },

    /// Carrier answered with a non-success return code
    #[error("Carrier rejected activation for line {line}: {code}")]
    CarrierRejected { line: LineId, code: ReturnCode },

    /// A lifecycle for the line is already running
    #[error("Activation already in progress for line {line}")]
    AlreadyInProgress { line: LineId },

    /// Another run already holds the reply registration for the line
    #[error("Status reply registration already held for line {line}")]
    AlreadyRegistered { line: LineId },

    /// No carrier profile is known for the line
    #[error("No visual voicemail carrier profile for line {line}")]
    UnsupportedCarrier { line: LineId },

    /// Provisioning did not complete
    #[error("Provisioning failed for line {line}: {reason}")]
    Provisioning { line: LineId, reason: String },

    /// Persistent store failure
    #[error("Store error: {message}")]
    Store { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// All retry attempts were used up
    #[error("Activation for line {line} failed after {attempts} attempts")]
    RetriesExhausted { line: LineId, attempts: u32 },
}

impl ActivationError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a provisioning error
    pub fn provisioning(line: LineId, reason: impl Into<String>) -> Self {
        Self::Provisioning {
            line,
            reason: reason.into(),
        }
    }

    /// Whether the retry policy should be consulted for this error.
    ///
    /// Timeouts, transport failures and interrupted waits are transient.
    /// A carrier rejection is an explicit answer and is never retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ActivationError::StatusReplyTimeout { .. }
                | ActivationError::Transport { .. }
                | ActivationError::Interrupted { .. }
                | ActivationError::Provisioning { .. }
                | ActivationError::Store { .. }
        )
    }

    /// Short category name used in structured log fields
    pub fn category(&self) -> &'static str {
        match self {
            ActivationError::StatusReplyTimeout { .. } => "timeout",
            ActivationError::Transport { .. } | ActivationError::Interrupted { .. } => "transport",
            ActivationError::CarrierRejected { .. } => "carrier_rejected",
            ActivationError::AlreadyInProgress { .. } | ActivationError::AlreadyRegistered { .. } => {
                "conflict"
            }
            ActivationError::UnsupportedCarrier { .. } => "unsupported",
            ActivationError::Provisioning { .. } => "provisioning",
            ActivationError::Store { .. } => "store",
            ActivationError::Configuration { .. } => "configuration",
            ActivationError::RetriesExhausted { .. } => "exhausted",
        }
    }
}
