//! Core data types shared by the activation components
//!
//! - **LineId** - opaque subscriber line identifier
//! - **StatusReply** - parsed carrier STATUS message
//! - **ActivationRequest** - one trigger consumed by one orchestrator lifecycle
//! - **SourceActivationRecord** - persisted mailbox credentials for an active line

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Keys of the STATUS message fields the activation flow understands
pub mod status_keys {
    /// Provisioning status
    pub const PROVISIONING_STATUS: &str = "st";
    /// Return code
    pub const RETURN_CODE: &str = "rc";
    /// Subscription url
    pub const SUBSCRIPTION_URL: &str = "rs";
    /// Mailbox server address
    pub const SERVER_ADDRESS: &str = "srv";
    /// Telephony user interface number
    pub const TUI_ACCESS_NUMBER: &str = "tui";
    /// Client SMS destination number
    pub const CLIENT_SMS_DESTINATION_NUMBER: &str = "dn";
    /// Mailbox (IMAP) port
    pub const IMAP_PORT: &str = "ipt";
    /// Mailbox (IMAP) user name
    pub const IMAP_USER_NAME: &str = "u";
    /// Mailbox (IMAP) password
    pub const IMAP_PASSWORD: &str = "pw";
    /// SMTP port
    pub const SMTP_PORT: &str = "spt";
    /// SMTP user name
    pub const SMTP_USER_NAME: &str = "smtp_u";
    /// SMTP password
    pub const SMTP_PASSWORD: &str = "smtp_pw";
    /// Supported languages
    pub const LANGUAGE: &str = "lang";
}

/// Provisioning status value meaning the subscriber is ready
const SUBSCRIBER_READY: &str = "R";

/// Opaque subscriber line identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineId(String);

impl LineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LineId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Subscriber provisioning status carried in a STATUS reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningStatus {
    /// Subscriber is ready, no provisioning required
    Ready,
    /// Any other status; the raw carrier code is kept for the provisioning flow
    NotReady { code: String },
}

impl ProvisioningStatus {
    pub fn parse(code: &str) -> Self {
        if code == SUBSCRIBER_READY {
            ProvisioningStatus::Ready
        } else {
            ProvisioningStatus::NotReady {
                code: code.to_string(),
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ProvisioningStatus::Ready)
    }
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisioningStatus::Ready => f.write_str(SUBSCRIBER_READY),
            ProvisioningStatus::NotReady { code } => f.write_str(code),
        }
    }
}

/// Return code of a STATUS reply
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnCode {
    Success,
    SystemError,
    SubscriberError,
    MailboxUnknown,
    NotActivated,
    NotProvisioned,
    ClientUnknown,
    MailboxNotInitialized,
    Other(String),
}

impl ReturnCode {
    pub fn parse(code: &str) -> Self {
        match code {
            "0" => ReturnCode::Success,
            "1" => ReturnCode::SystemError,
            "2" => ReturnCode::SubscriberError,
            "3" => ReturnCode::MailboxUnknown,
            "4" => ReturnCode::NotActivated,
            "5" => ReturnCode::NotProvisioned,
            "6" => ReturnCode::ClientUnknown,
            "7" => ReturnCode::MailboxNotInitialized,
            other => ReturnCode::Other(other.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ReturnCode::Success)
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ReturnCode::Success => "0",
            ReturnCode::SystemError => "1",
            ReturnCode::SubscriberError => "2",
            ReturnCode::MailboxUnknown => "3",
            ReturnCode::NotActivated => "4",
            ReturnCode::NotProvisioned => "5",
            ReturnCode::ClientUnknown => "6",
            ReturnCode::MailboxNotInitialized => "7",
            ReturnCode::Other(code) => code,
        };
        f.write_str(code)
    }
}

/// Parsed carrier STATUS reply.
///
/// Immutable once built. The raw key/value fields are kept so that the
/// provisioning flow and the credential store see exactly what the carrier
/// sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    provisioning_status: ProvisioningStatus,
    return_code: ReturnCode,
    fields: BTreeMap<String, String>,
}

impl StatusReply {
    /// Build a reply from the raw fields of a STATUS message
    pub fn from_fields<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields: BTreeMap<String, String> = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let provisioning_status = ProvisioningStatus::parse(
            fields
                .get(status_keys::PROVISIONING_STATUS)
                .map(String::as_str)
                .unwrap_or_default(),
        );
        let return_code = ReturnCode::parse(
            fields
                .get(status_keys::RETURN_CODE)
                .map(String::as_str)
                .unwrap_or_default(),
        );
        Self {
            provisioning_status,
            return_code,
            fields,
        }
    }

    pub fn provisioning_status(&self) -> &ProvisioningStatus {
        &self.provisioning_status
    }

    pub fn return_code(&self) -> &ReturnCode {
        &self.return_code
    }

    /// Raw STATUS fields as received
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// One activation trigger.
///
/// Created on boot, SIM insertion, an explicit signal or a spontaneous
/// carrier STATUS message, and consumed once by one orchestrator lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationRequest {
    pub line: LineId,
    pub prefetched: Option<StatusReply>,
}

impl ActivationRequest {
    pub fn new(line: LineId) -> Self {
        Self {
            line,
            prefetched: None,
        }
    }

    pub fn with_prefetched(line: LineId, reply: StatusReply) -> Self {
        Self {
            line,
            prefetched: Some(reply),
        }
    }
}

/// Persisted mailbox credentials for a line, written after a successful STATUS reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceActivationRecord {
    pub line: LineId,
    pub fields: BTreeMap<String, String>,
    pub activated_at: DateTime<Utc>,
}

impl SourceActivationRecord {
    pub fn from_reply(line: LineId, reply: &StatusReply) -> Self {
        Self {
            line,
            fields: reply.fields().clone(),
            activated_at: Utc::now(),
        }
    }

    pub fn server_address(&self) -> Option<&str> {
        self.get(status_keys::SERVER_ADDRESS)
    }

    pub fn imap_port(&self) -> Option<u16> {
        self.get(status_keys::IMAP_PORT)?.parse().ok()
    }

    pub fn imap_user_name(&self) -> Option<&str> {
        self.get(status_keys::IMAP_USER_NAME)
    }

    pub fn imap_password(&self) -> Option<&str> {
        self.get(status_keys::IMAP_PASSWORD)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}
