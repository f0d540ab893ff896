//! Per-line channel status record and its store
//!
//! `ChannelStatus` is the externally visible health of a line split into
//! configuration, data channel and notification channel states. Only the
//! event mapper writes to the [`StatusBoard`]; health reporters read
//! snapshots or subscribe to updates.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::LineId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigurationState {
    Ok,
    NotConfigured,
    Configuring,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataChannelState {
    Ok,
    NoConnection,
    NoConnectionCellularRequired,
    BadConfiguration,
    CommunicationError,
    ServerError,
    ServerConnectionError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationChannelState {
    Ok,
    NoConnection,
}

/// Health record of one line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub configuration: ConfigurationState,
    pub data_channel: DataChannelState,
    pub notification_channel: NotificationChannelState,
}

impl ChannelStatus {
    /// "Not configured / no connection" state of a line with no active source
    pub const BASELINE: ChannelStatus = ChannelStatus {
        configuration: ConfigurationState::NotConfigured,
        data_channel: DataChannelState::NoConnection,
        notification_channel: NotificationChannelState::NoConnection,
    };
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self::BASELINE
    }
}

/// Set of field writes produced by one event; unset fields are left alone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusMutation {
    pub configuration: Option<ConfigurationState>,
    pub data_channel: Option<DataChannelState>,
    pub notification_channel: Option<NotificationChannelState>,
}

impl StatusMutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configuration(mut self, state: ConfigurationState) -> Self {
        self.configuration = Some(state);
        self
    }

    pub fn data_channel(mut self, state: DataChannelState) -> Self {
        self.data_channel = Some(state);
        self
    }

    pub fn notification_channel(mut self, state: NotificationChannelState) -> Self {
        self.notification_channel = Some(state);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.configuration.is_none() && self.data_channel.is_none() && self.notification_channel.is_none()
    }

    pub fn apply_to(&self, status: &mut ChannelStatus) {
        if let Some(state) = self.configuration {
            status.configuration = state;
        }
        if let Some(state) = self.data_channel {
            status.data_channel = state;
        }
        if let Some(state) = self.notification_channel {
            status.notification_channel = state;
        }
    }
}

/// A status change published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub line: LineId,
    pub status: ChannelStatus,
}

/// In-memory channel status store with change broadcast
pub struct StatusBoard {
    statuses: DashMap<LineId, ChannelStatus>,
    updates: broadcast::Sender<StatusUpdate>,
}

impl StatusBoard {
    pub fn new(capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(capacity.max(1));
        Self {
            statuses: DashMap::new(),
            updates,
        }
    }

    /// Current status of a line; lines never seen report the baseline
    pub fn get(&self, line: &LineId) -> ChannelStatus {
        self.statuses.get(line).map(|entry| *entry).unwrap_or_default()
    }

    /// Subscribe to status changes of all lines
    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.updates.subscribe()
    }

    /// Apply a mutation and publish the resulting record
    pub(crate) fn apply(&self, line: &LineId, mutation: StatusMutation) -> ChannelStatus {
        let status = {
            let mut entry = self.statuses.entry(line.clone()).or_default();
            mutation.apply_to(&mut entry);
            *entry
        };

        debug!(line = %line, status = ?status, "Channel status updated");

        // No subscribers is fine
        let _ = self.updates.send(StatusUpdate {
            line: line.clone(),
            status,
        });
        status
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_STATUS_CHANNEL_CAPACITY)
    }
}
