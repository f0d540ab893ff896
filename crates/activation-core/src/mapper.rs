//! Event to channel status mapping
//!
//! [`mutation_for`] is a pure dispatch table: first on the event category,
//! then exhaustively on the member. [`EventMapper`] resolves the per-line
//! carrier flags, applies the mutation to the [`StatusBoard`] and logs the
//! event. Any component may emit events through the mapper.

use std::sync::Arc;

use tracing::{info, warn};

use crate::collaborators::CarrierDirectory;
use crate::events::{
    ConfigurationEvent, DataChannelEvent, NotificationChannelEvent, OtherEvent, VvmEvent,
};
use crate::status::{
    ChannelStatus, ConfigurationState, DataChannelState, NotificationChannelState, StatusBoard,
    StatusMutation,
};
use crate::types::LineId;

/// Compute the status writes for an event.
///
/// `cellular_data_required` is the line's carrier flag; it only matters for
/// losing the notification channel.
pub fn mutation_for(event: VvmEvent, cellular_data_required: bool) -> StatusMutation {
    match event {
        VvmEvent::Configuration(event) => configuration_mutation(event),
        VvmEvent::DataChannel(event) => data_channel_mutation(event),
        VvmEvent::NotificationChannel(event) => {
            notification_channel_mutation(event, cellular_data_required)
        }
        VvmEvent::Other(event) => other_mutation(event),
    }
}

fn configuration_mutation(event: ConfigurationEvent) -> StatusMutation {
    match event {
        ConfigurationEvent::Activating => {
            StatusMutation::new().configuration(ConfigurationState::Configuring)
        }
        ConfigurationEvent::RequestStatusSuccess | ConfigurationEvent::PinSet => StatusMutation::new()
            .configuration(ConfigurationState::Ok)
            .notification_channel(NotificationChannelState::Ok),
        ConfigurationEvent::StatusReplyTimeout
        | ConfigurationEvent::ActivationRejected
        | ConfigurationEvent::ServiceNotAvailable => {
            StatusMutation::new().configuration(ConfigurationState::Failed)
        }
    }
}

fn data_channel_mutation(event: DataChannelEvent) -> StatusMutation {
    use DataChannelEvent::*;

    let state = match event {
        ImapOperationCompleted => DataChannelState::Ok,
        NoConnection => DataChannelState::NoConnection,
        NoConnectionCellularRequired => DataChannelState::NoConnectionCellularRequired,
        CannotResolveHostOnNetwork => DataChannelState::ServerConnectionError,
        SslInvalidHostName | CannotEstablishSslSession | IoeOnOpen => {
            DataChannelState::CommunicationError
        }
        InvalidPort
        | BadImapCredential
        | AuthUnknownUser
        | AuthUnknownDevice
        | AuthInvalidPassword
        | AuthMailboxNotInitialized
        | AuthServiceNotProvisioned
        | AuthServiceNotActivated
        | AuthUserIsBlocked => DataChannelState::BadConfiguration,
        RejectedServerResponse
        | InvalidInitialServerResponse
        | SslException
        | AllSocketConnectionFailed => DataChannelState::ServerError,
    };
    StatusMutation::new().data_channel(state)
}

fn notification_channel_mutation(
    event: NotificationChannelEvent,
    cellular_data_required: bool,
) -> StatusMutation {
    match event {
        NotificationChannelEvent::InService => {
            StatusMutation::new().notification_channel(NotificationChannelState::Ok)
        }
        NotificationChannelEvent::ServiceLost => {
            let mutation =
                StatusMutation::new().notification_channel(NotificationChannelState::NoConnection);
            if cellular_data_required {
                mutation.data_channel(DataChannelState::NoConnectionCellularRequired)
            } else {
                mutation
            }
        }
    }
}

fn other_mutation(event: OtherEvent) -> StatusMutation {
    match event {
        OtherEvent::SourceRemoved => StatusMutation::new()
            .configuration(ChannelStatus::BASELINE.configuration)
            .data_channel(ChannelStatus::BASELINE.data_channel)
            .notification_channel(ChannelStatus::BASELINE.notification_channel),
    }
}

/// Applies events to the per-line status board
pub struct EventMapper {
    board: Arc<StatusBoard>,
    carriers: Arc<dyn CarrierDirectory>,
}

impl EventMapper {
    pub fn new(board: Arc<StatusBoard>, carriers: Arc<dyn CarrierDirectory>) -> Self {
        Self { board, carriers }
    }

    pub fn board(&self) -> &Arc<StatusBoard> {
        &self.board
    }

    /// Apply an event to the line's status and return the new record
    pub fn apply(&self, line: &LineId, event: impl Into<VvmEvent>) -> ChannelStatus {
        let event = event.into();
        if event.is_error() {
            warn!(line = %line, event = %event, "VVM event");
        } else {
            info!(line = %line, event = %event, "VVM event");
        }

        let cellular_data_required = self
            .carriers
            .lookup(line)
            .map(|profile| profile.cellular_data_required)
            .unwrap_or(false);

        self.board
            .apply(line, mutation_for(event, cellular_data_required))
    }
}
