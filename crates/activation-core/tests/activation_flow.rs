// Activation lifecycle tests
//
// Covers the happy path side-effect ordering, carrier rejection, prefetched
// STATUS replies, retries on timeout, trigger coalescing, provisioning and
// shutdown.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use vvm_activation_core::{
    ActivationConfig, ActivationError, ActivationOutcome, ActivationState, ConfigurationState,
    CredentialStore, LineId, NotificationChannelState, ReturnCode, StatusRouting, Triggered,
};

use common::*;

fn started(triggered: Triggered) -> tokio::task::JoinHandle<ActivationOutcome> {
    match triggered {
        Triggered::Started(handle) => handle,
        Triggered::Deferred => panic!("trigger was deferred"),
    }
}

#[tokio::test]
async fn test_successful_activation_side_effects_in_order() {
    let harness = Harness::new(ActivationConfig::default(), true, &["L1"]);
    harness.protocol.answer([Answer::Reply(ready_reply())]);
    let line = LineId::new("L1");

    let mut updates = harness.service.subscribe_status();
    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    assert_eq!(handle.await.unwrap(), ActivationOutcome::Activated);

    assert_eq!(
        harness.journal(),
        vec![
            "status_filter:L1",
            "start_activation:L1",
            "credentials:L1",
            "add_source:L1",
            "full_sync:L1",
            "clear_indicator:L1",
        ]
    );

    let record = harness.credentials.read(&line).await.unwrap().unwrap();
    assert_eq!(record.server_address(), Some("vvm.example.net"));
    assert_eq!(record.imap_port(), Some(993));
    assert_eq!(record.imap_password(), Some("secret"));
    assert!(harness.sources.contains(&line));

    let status = harness.service.status(&line);
    assert_eq!(status.configuration, ConfigurationState::Ok);
    assert_eq!(status.notification_channel, NotificationChannelState::Ok);

    let mut configuration = Vec::new();
    while let Ok(update) = updates.try_recv() {
        configuration.push(update.status.configuration);
    }
    assert_eq!(
        configuration,
        vec![ConfigurationState::Configuring, ConfigurationState::Ok]
    );

    assert!(!harness.service.is_active(&line));
    assert_eq!(
        harness.service.last_outcome(&line),
        Some(ActivationOutcome::Activated)
    );
}

#[tokio::test]
async fn test_carrier_rejection_is_not_retried() {
    let harness = Harness::new(ActivationConfig::default(), true, &["L1"]);
    harness.protocol.always(Answer::Reply(reply("R", "3")));
    let line = LineId::new("L1");

    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    let outcome = handle.await.unwrap();

    assert_eq!(
        outcome,
        ActivationOutcome::Rejected {
            code: ReturnCode::MailboxUnknown
        }
    );
    assert_eq!(harness.protocol.activation_requests(), 1);
    assert_eq!(harness.count("credentials"), 0);
    assert_eq!(harness.count("add_source"), 0);
    assert_eq!(harness.count("full_sync"), 0);
    assert_eq!(
        harness.service.status(&line).configuration,
        ConfigurationState::Failed
    );

    let err = outcome.into_result(&line).unwrap_err();
    assert!(matches!(err, ActivationError::CarrierRejected { .. }));
}

#[tokio::test]
async fn test_indicator_failure_keeps_line_activated() {
    let harness = Harness::new(ActivationConfig::default(), true, &["L1"]);
    harness.protocol.always(Answer::Reply(ready_reply()));
    harness.fail_step("clear_indicator");
    harness.fail_step("full_sync");
    let line = LineId::new("L1");

    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    assert_eq!(handle.await.unwrap(), ActivationOutcome::Activated);

    assert_eq!(harness.protocol.activation_requests(), 1);
    assert_eq!(harness.count("clear_indicator:L1"), 1);
    assert!(harness.sources.contains(&line));
    assert_eq!(
        harness.service.status(&line).configuration,
        ConfigurationState::Ok
    );
}

#[tokio::test(start_paused = true)]
async fn test_credential_store_failure_is_not_retried() {
    let harness = Harness::new(ActivationConfig::default(), true, &["L1"]);
    harness.protocol.always(Answer::Reply(ready_reply()));
    harness.fail_step("credentials");
    let line = LineId::new("L1");

    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    let outcome = handle.await.unwrap();
    assert!(matches!(
        outcome,
        ActivationOutcome::Incomplete {
            error: ActivationError::Store { .. }
        }
    ));

    // Nothing left pending behind the failed acceptance
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(harness.protocol.activation_requests(), 1);
    assert_eq!(harness.count("add_source"), 0);
    assert!(!harness.sources.contains(&line));
    assert!(!harness.service.is_active(&line));

    let err = outcome.into_result(&line).unwrap_err();
    assert!(matches!(err, ActivationError::Store { .. }));
}

#[tokio::test]
async fn test_source_registry_failure_is_not_retried() {
    let harness = Harness::new(ActivationConfig::default(), true, &["L1"]);
    harness.protocol.always(Answer::Reply(ready_reply()));
    harness.fail_step("add_source");
    let line = LineId::new("L1");

    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    assert!(matches!(
        handle.await.unwrap(),
        ActivationOutcome::Incomplete { .. }
    ));

    assert_eq!(harness.protocol.activation_requests(), 1);
    assert_eq!(harness.count("credentials:L1"), 1);
    assert_eq!(harness.count("full_sync"), 0);
    assert_eq!(harness.count("clear_indicator"), 0);
}

#[tokio::test]
async fn test_spontaneous_status_message_skips_activation_request() {
    let harness = Harness::new(ActivationConfig::default(), true, &["L99"]);
    let line = LineId::new("L99");

    let routing = harness
        .service
        .on_status_message(line.clone(), reply("R", "0"))
        .unwrap();
    let handle = match routing {
        StatusRouting::Spontaneous(triggered) => started(triggered),
        StatusRouting::Delivered => panic!("nobody was waiting for the reply"),
    };

    assert_eq!(handle.await.unwrap(), ActivationOutcome::Activated);
    assert_eq!(harness.protocol.activation_requests(), 0);
    assert_eq!(harness.count("add_source:L99"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_exhaust_retries() {
    let harness = Harness::new(ActivationConfig::default(), true, &["L7"]);
    let line = LineId::new("L7");

    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    let outcome = handle.await.unwrap();

    // One initial attempt plus four retries
    assert_eq!(outcome, ActivationOutcome::Exhausted { attempts: 5 });
    let requested_at = harness.protocol.requested_at();
    assert_eq!(requested_at.len(), 5);
    for pair in requested_at.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_secs(65), "gap was {:?}", gap);
        assert!(gap < Duration::from_secs(66), "gap was {:?}", gap);
    }

    assert_eq!(harness.count("credentials"), 0);
    assert_eq!(
        harness.service.status(&line).configuration,
        ConfigurationState::Failed
    );
    assert!(!harness.service.is_active(&line));
}

#[tokio::test(start_paused = true)]
async fn test_retry_succeeds_after_timeout() {
    let config = ActivationConfig::default()
        .with_status_reply_timeout(Duration::from_secs(10))
        .with_retry_interval(Duration::from_secs(1));
    let harness = Harness::new(config, true, &["L1"]);
    harness
        .protocol
        .answer([Answer::Silent, Answer::Reply(ready_reply())]);
    let line = LineId::new("L1");

    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    assert_eq!(handle.await.unwrap(), ActivationOutcome::Activated);

    assert_eq!(harness.protocol.activation_requests(), 2);
    assert_eq!(harness.count("status_filter"), 2);
    assert_eq!(harness.count("credentials"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_triggers_coalesce_while_lifecycle_runs() {
    let harness = Harness::new(ActivationConfig::default(), true, &["L1"]);
    let line = LineId::new("L1");

    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    harness
        .wait_for_state(&line, ActivationState::AwaitingReply)
        .await;

    let err = harness
        .service
        .trigger_activation(line.clone(), None)
        .unwrap_err();
    assert_eq!(err, ActivationError::AlreadyInProgress { line: line.clone() });

    let routing = harness
        .service
        .on_status_message(line.clone(), ready_reply())
        .unwrap();
    assert!(matches!(routing, StatusRouting::Delivered));

    assert_eq!(handle.await.unwrap(), ActivationOutcome::Activated);
    assert_eq!(harness.protocol.activation_requests(), 1);

    // Slot released; a new trigger starts a new lifecycle
    harness.protocol.answer([Answer::Reply(ready_reply())]);
    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    assert_eq!(handle.await.unwrap(), ActivationOutcome::Activated);
    assert_eq!(harness.sources.sources(), vec![line]);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_fails_attempt_and_retries() {
    let harness = Harness::new(ActivationConfig::default(), true, &["L1"]);
    harness
        .protocol
        .answer([Answer::Silent, Answer::Reply(ready_reply())]);
    let line = LineId::new("L1");

    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    harness
        .wait_for_state(&line, ActivationState::AwaitingReply)
        .await;

    assert!(harness.service.on_transport_error(&line, "SMS receive failed"));
    assert_eq!(handle.await.unwrap(), ActivationOutcome::Activated);
    assert_eq!(harness.protocol.activation_requests(), 2);
}

#[tokio::test]
async fn test_not_ready_subscriber_is_provisioned() {
    let harness = Harness::new(ActivationConfig::default(), true, &["L1"]);
    harness.protocol.answer([Answer::Reply(reply("N", "0"))]);
    harness
        .protocol
        .support_provisioning(Provisioning::Complete(ready_reply()));
    let line = LineId::new("L1");

    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    assert_eq!(handle.await.unwrap(), ActivationOutcome::Activated);

    assert_eq!(
        harness.journal(),
        vec![
            "status_filter:L1",
            "start_activation:L1",
            "start_provisioning:L1:st=N",
            "credentials:L1",
            "add_source:L1",
            "full_sync:L1",
            "clear_indicator:L1",
        ]
    );
    // Credentials come from the reply provisioning produced
    let record = harness.credentials.read(&line).await.unwrap().unwrap();
    assert_eq!(record.imap_password(), Some("secret"));
}

#[tokio::test]
async fn test_not_ready_without_provisioning_support_is_accepted() {
    let harness = Harness::new(ActivationConfig::default(), true, &["L1"]);
    harness.protocol.answer([Answer::Reply(reply("N", "0"))]);
    let line = LineId::new("L1");

    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    assert_eq!(handle.await.unwrap(), ActivationOutcome::Activated);
    assert_eq!(harness.count("start_provisioning"), 0);
    assert_eq!(harness.count("add_source:L1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_provisioning_is_retried_per_policy() {
    let config = ActivationConfig::default().with_max_retries(2);
    let harness = Harness::new(config, true, &["L1"]);
    harness.protocol.always(Answer::Reply(reply("N", "0")));
    harness
        .protocol
        .support_provisioning(Provisioning::Fail("subscriber declined terms".to_string()));
    let line = LineId::new("L1");

    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    assert_eq!(
        handle.await.unwrap(),
        ActivationOutcome::Exhausted { attempts: 3 }
    );
    assert_eq!(harness.count("start_provisioning"), 3);
    assert_eq!(harness.count("credentials"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_provisioning_counts_as_failure() {
    let config = ActivationConfig::default().with_max_retries(0);
    let harness = Harness::new(config, true, &["L1"]);
    harness.protocol.always(Answer::Reply(reply("N", "0")));
    harness.protocol.support_provisioning(Provisioning::Abandon);
    let line = LineId::new("L1");

    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    assert_eq!(
        handle.await.unwrap(),
        ActivationOutcome::Exhausted { attempts: 1 }
    );
}

#[tokio::test]
async fn test_unknown_carrier_is_rejected() {
    let harness = Harness::new(ActivationConfig::default(), true, &["L1"]);

    let err = harness
        .service
        .trigger_activation(LineId::new("L2"), None)
        .unwrap_err();
    assert_eq!(
        err,
        ActivationError::UnsupportedCarrier {
            line: LineId::new("L2")
        }
    );
    assert!(harness.journal().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_running_lifecycle() {
    let harness = Harness::new(ActivationConfig::default(), true, &["L1"]);
    let line = LineId::new("L1");

    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    harness
        .wait_for_state(&line, ActivationState::AwaitingReply)
        .await;

    harness.service.shutdown();
    assert_eq!(
        handle.await.unwrap(),
        ActivationOutcome::Aborted {
            error: ActivationError::Interrupted { line: line.clone() }
        }
    );
    assert_eq!(harness.protocol.activation_requests(), 1);

    let err = harness
        .service
        .trigger_activation(line, None)
        .unwrap_err();
    assert!(matches!(err, ActivationError::Configuration { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cuts_retry_delay_short() {
    let config = ActivationConfig::default()
        .with_status_reply_timeout(Duration::from_secs(1))
        .with_retry_interval(Duration::from_secs(3600));
    let harness = Harness::new(config, true, &["L1"]);
    let line = LineId::new("L1");

    let handle = started(harness.service.trigger_activation(line.clone(), None).unwrap());
    harness.wait_for_state(&line, ActivationState::Failed).await;

    harness.service.shutdown();
    let outcome = tokio::time::timeout(Duration::from_secs(60), handle)
        .await
        .expect("lifecycle ended before the retry delay")
        .unwrap();
    assert!(matches!(outcome, ActivationOutcome::Aborted { .. }));
    assert_eq!(harness.protocol.activation_requests(), 1);
}
