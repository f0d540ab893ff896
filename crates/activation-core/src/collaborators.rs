//! Interfaces to the systems the activation flow drives but does not own
//!
//! The carrier protocol, message transport, credential store, source
//! registry, sync engine and indicator service all live outside this crate.
//! The orchestrator reaches them only through the narrow traits below.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};

use crate::error::Result;
use crate::types::{LineId, SourceActivationRecord, StatusReply};

/// Carrier-specific activation protocol
#[async_trait]
pub trait VisualVoicemailProtocol: Send + Sync {
    /// Ask the carrier to activate the service for the line.
    ///
    /// Usually sends an activate message; the carrier answers asynchronously
    /// with a STATUS message delivered through the message transport.
    async fn start_activation(&self, line: &LineId) -> Result<()>;

    /// Whether the carrier offers a provisioning flow for subscribers that
    /// are not ready yet
    fn supports_provisioning(&self) -> bool {
        false
    }

    /// Start provisioning a subscriber that is not ready.
    ///
    /// The flow runs asynchronously and must finish through `completion`:
    /// [`ProvisioningCompletion::complete`] resumes acceptance with the new
    /// reply, [`ProvisioningCompletion::fail`] (or dropping the handle) fails
    /// the attempt.
    async fn start_provisioning(
        &self,
        line: &LineId,
        reply: StatusReply,
        raw: BTreeMap<String, String>,
        completion: ProvisioningCompletion,
    ) -> Result<()> {
        let _ = (line, reply, raw);
        completion.fail("provisioning not supported by carrier");
        Ok(())
    }
}

/// Per-line carrier configuration
#[derive(Clone)]
pub struct CarrierProfile {
    pub protocol: Arc<dyn VisualVoicemailProtocol>,
    /// Losing the notification channel also takes the data channel down
    pub cellular_data_required: bool,
}

impl fmt::Debug for CarrierProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CarrierProfile")
            .field("protocol", &"Arc<dyn VisualVoicemailProtocol>")
            .field("cellular_data_required", &self.cellular_data_required)
            .finish()
    }
}

/// Resolves the carrier profile of a line
pub trait CarrierDirectory: Send + Sync {
    /// `None` when the line's carrier has no visual voicemail service
    fn lookup(&self, line: &LineId) -> Option<CarrierProfile>;
}

/// Inbound carrier message path
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Start intercepting carrier STATUS messages for the line so they can be
    /// correlated to a pending activation
    async fn activate_status_filter(&self, line: &LineId) -> Result<()>;
}

/// Persistent credential store
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn read(&self, line: &LineId) -> Result<Option<SourceActivationRecord>>;

    async fn write(&self, record: SourceActivationRecord) -> Result<()>;
}

/// Registry of lines that are active, syncable mailbox sources
#[async_trait]
pub trait SourceRegistry: Send + Sync {
    /// Mark the line as active. Adding an active line again is a no-op.
    async fn add_source(&self, line: &LineId) -> Result<()>;
}

/// Mailbox synchronization engine
#[async_trait]
pub trait SyncTrigger: Send + Sync {
    async fn request_full_sync(&self, line: &LineId) -> Result<()>;
}

/// Notification / indicator subsystem
#[async_trait]
pub trait IndicatorService: Send + Sync {
    /// Clear the sticky "missed service" indicator used by traditional voicemail
    async fn clear_missed_service_indicator(&self, line: &LineId) -> Result<()>;
}

/// "Has the device completed initial setup" flag with change notification
pub trait DeviceSetupSignal: Send + Sync {
    fn is_setup_complete(&self) -> bool;

    /// Receiver that observes every change of the flag
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// All collaborators the orchestrator needs
#[derive(Clone)]
pub struct Collaborators {
    pub carriers: Arc<dyn CarrierDirectory>,
    pub transport: Arc<dyn MessageTransport>,
    pub credentials: Arc<dyn CredentialStore>,
    pub sources: Arc<dyn SourceRegistry>,
    pub sync: Arc<dyn SyncTrigger>,
    pub indicator: Arc<dyn IndicatorService>,
}

/// How a provisioning flow ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningOutcome {
    /// Provisioning finished; accept the line with this reply
    Accepted(StatusReply),
    /// Provisioning failed; the attempt is retried per policy
    Failed(String),
}

/// One-shot handle through which a provisioning flow reports its result
#[derive(Debug)]
pub struct ProvisioningCompletion {
    line: LineId,
    tx: oneshot::Sender<ProvisioningOutcome>,
}

impl ProvisioningCompletion {
    pub(crate) fn channel(line: LineId) -> (Self, oneshot::Receiver<ProvisioningOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { line, tx }, rx)
    }

    pub fn line(&self) -> &LineId {
        &self.line
    }

    pub fn complete(self, reply: StatusReply) {
        let _ = self.tx.send(ProvisioningOutcome::Accepted(reply));
    }

    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.tx.send(ProvisioningOutcome::Failed(reason.into()));
    }
}
