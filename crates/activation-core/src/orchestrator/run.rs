//! One activation lifecycle: attempts, retries and acceptance

use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn, Instrument};

use super::{ActivationOutcome, ActivationService, ActivationState, InFlightSlot};
use crate::collaborators::{CarrierProfile, ProvisioningCompletion, ProvisioningOutcome};
use crate::error::{ActivationError, Result};
use crate::events::ConfigurationEvent;
use crate::types::{ActivationRequest, LineId, SourceActivationRecord, StatusReply};

/// Input of one attempt.
///
/// Only the first attempt may carry a prefetched reply; a retry always asks
/// the carrier for a fresh STATUS message.
#[derive(Debug)]
struct AttemptContext {
    attempt: u32,
    prefetched: Option<StatusReply>,
}

impl AttemptContext {
    fn first(prefetched: Option<StatusReply>) -> Self {
        Self {
            attempt: 1,
            prefetched,
        }
    }

    fn retry(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            prefetched: None,
        }
    }
}

impl ActivationService {
    pub(super) async fn run_lifecycle(
        self: Arc<Self>,
        slot: InFlightSlot,
        profile: CarrierProfile,
        request: ActivationRequest,
    ) -> ActivationOutcome {
        let line = request.line.clone();
        let span = info_span!("activation", line = %line, lifecycle = %slot.lifecycle);

        let outcome = self.drive(&slot, &profile, request).instrument(span).await;

        // Record before releasing the slot so a finished line always has an outcome
        self.outcomes.insert(line, outcome.clone());
        drop(slot);
        outcome
    }

    async fn drive(
        &self,
        slot: &InFlightSlot,
        profile: &CarrierProfile,
        request: ActivationRequest,
    ) -> ActivationOutcome {
        let line = request.line;
        let mut context = AttemptContext::first(request.prefetched);

        loop {
            slot.set_attempt(context.attempt);

            let error = match self
                .run_attempt(slot, profile, &line, context.prefetched.take())
                .await
            {
                Ok(outcome) => {
                    slot.set_state(ActivationState::Done);
                    return outcome;
                }
                Err(error) => error,
            };
            slot.set_state(ActivationState::Failed);

            if !error.is_recoverable() || self.is_shut_down() {
                error!(error = %error, category = error.category(), "Activation aborted");
                return ActivationOutcome::Aborted { error };
            }

            let decision = self.policy.should_retry(context.attempt);
            if !decision.retry {
                error!(
                    attempts = context.attempt,
                    error = %error,
                    "Activation failed after all retry attempts"
                );
                self.mapper.apply(&line, ConfigurationEvent::ServiceNotAvailable);
                return ActivationOutcome::Exhausted {
                    attempts: context.attempt,
                };
            }

            warn!(
                attempt = context.attempt,
                error = %error,
                category = error.category(),
                next_delay_ms = decision.delay.as_millis() as u64,
                "Activation attempt failed, will retry"
            );

            tokio::select! {
                _ = tokio::time::sleep(decision.delay) => {}
                _ = self.shutdown_requested() => {}
            }
            if self.is_shut_down() {
                return ActivationOutcome::Aborted { error };
            }

            context = context.retry();
        }
    }

    async fn run_attempt(
        &self,
        slot: &InFlightSlot,
        profile: &CarrierProfile,
        line: &LineId,
        prefetched: Option<StatusReply>,
    ) -> Result<ActivationOutcome> {
        slot.set_state(ActivationState::Start);
        self.mapper.apply(line, ConfigurationEvent::Activating);
        self.collaborators.transport.activate_status_filter(line).await?;

        slot.set_state(ActivationState::Requesting);
        let reply = match prefetched {
            Some(reply) => {
                debug!("STATUS reply provided with the trigger, not requesting it again");
                reply
            }
            None => self.request_status(slot, profile, line).await?,
        };

        debug!(
            st = %reply.provisioning_status(),
            rc = %reply.return_code(),
            "STATUS reply received"
        );

        let reply = if reply.provisioning_status().is_ready() {
            debug!("Subscriber ready, no provisioning required");
            reply
        } else if profile.protocol.supports_provisioning() {
            info!("Subscriber not ready, start provisioning");
            slot.set_state(ActivationState::Provisioning);
            self.provision(profile, line, reply).await?
        } else {
            // Usually the subscriber skipped the new user tutorial; use the reply as is
            info!("Subscriber not ready but provisioning is not supported");
            reply
        };

        // Past this point the carrier has answered; nothing goes back to the retry loop
        slot.set_state(ActivationState::Accepting);
        Ok(self.accept(line, &reply).await)
    }

    /// Send the activation request and wait for the carrier's STATUS reply
    async fn request_status(
        &self,
        slot: &InFlightSlot,
        profile: &CarrierProfile,
        line: &LineId,
    ) -> Result<StatusReply> {
        // Register first: the reply may arrive before start_activation returns
        let subscription = self.waiter.register(line)?;
        profile.protocol.start_activation(line).await?;

        slot.set_state(ActivationState::AwaitingReply);
        match subscription.wait(self.config.status_reply_timeout()).await {
            Ok(reply) => Ok(reply),
            Err(error @ ActivationError::StatusReplyTimeout { .. }) => {
                self.mapper.apply(line, ConfigurationEvent::StatusReplyTimeout);
                Err(error)
            }
            Err(error) => {
                error!(error = %error, "Can't get STATUS reply");
                Err(error)
            }
        }
    }

    /// Hand a not-ready subscriber to the carrier's provisioning flow
    async fn provision(
        &self,
        profile: &CarrierProfile,
        line: &LineId,
        reply: StatusReply,
    ) -> Result<StatusReply> {
        let (completion, outcome) = ProvisioningCompletion::channel(line.clone());
        let raw = reply.fields().clone();
        profile
            .protocol
            .start_provisioning(line, reply, raw, completion)
            .await?;

        tokio::select! {
            outcome = outcome => match outcome {
                Ok(ProvisioningOutcome::Accepted(reply)) => {
                    info!("Provisioning completed");
                    Ok(reply)
                }
                Ok(ProvisioningOutcome::Failed(reason)) => {
                    Err(ActivationError::provisioning(line.clone(), reason))
                }
                Err(_) => Err(ActivationError::provisioning(
                    line.clone(),
                    "provisioning flow ended without reporting a result",
                )),
            },
            _ = self.shutdown_requested() => {
                Err(ActivationError::Interrupted { line: line.clone() })
            }
        }
    }

    /// Store the credentials carried by a STATUS reply and activate the source.
    ///
    /// Storing the credentials and adding the source decide the outcome. Sync
    /// and indicator failures are logged only: the source is already active.
    async fn accept(&self, line: &LineId, reply: &StatusReply) -> ActivationOutcome {
        let code = reply.return_code();
        if !code.is_success() {
            error!(rc = %code, "Visual voicemail not available for subscriber");
            self.mapper.apply(line, ConfigurationEvent::ActivationRejected);
            return ActivationOutcome::Rejected { code: code.clone() };
        }

        self.mapper.apply(line, ConfigurationEvent::RequestStatusSuccess);

        let record = SourceActivationRecord::from_reply(line.clone(), reply);
        if let Err(error) = self.collaborators.credentials.write(record).await {
            error!(error = %error, "Failed to store visual voicemail credentials");
            return ActivationOutcome::Incomplete { error };
        }
        if let Err(error) = self.collaborators.sources.add_source(line).await {
            error!(error = %error, "Failed to add visual voicemail source");
            return ActivationOutcome::Incomplete { error };
        }

        if let Err(error) = self.collaborators.sync.request_full_sync(line).await {
            warn!(error = %error, "Full sync request failed");
        }
        // Traditional voicemail leaves a sticky indicator that visual voicemail replaces
        if let Err(error) = self
            .collaborators
            .indicator
            .clear_missed_service_indicator(line)
            .await
        {
            warn!(error = %error, "Failed to clear missed service indicator");
        }

        info!("Visual voicemail activated");
        ActivationOutcome::Activated
    }
}
