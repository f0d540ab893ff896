// Shared fakes for activation integration tests
//
// Every collaborator appends to one ordered journal so tests can assert on
// the exact order of side effects.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use vvm_activation_core::{
    ActivationConfig, ActivationError, ActivationService, ActivationState, CarrierProfile, Collaborators,
    CredentialStore, DeviceSetupState, InMemoryCredentialStore, InMemorySourceRegistry,
    IndicatorService, LineId, MessageTransport, ProvisioningCompletion, Result,
    SourceActivationRecord, SourceRegistry, StaticCarrierDirectory, StatusReply, SyncTrigger,
    VisualVoicemailProtocol,
};

pub type Journal = Arc<Mutex<Vec<String>>>;

/// Collaborator steps that fail when called
pub type Faults = Arc<Mutex<BTreeSet<&'static str>>>;

fn check(faults: &Faults, step: &'static str) -> Result<()> {
    if faults.lock().contains(step) {
        Err(ActivationError::store(format!("{} unavailable", step)))
    } else {
        Ok(())
    }
}

pub fn ready_reply() -> StatusReply {
    StatusReply::from_fields([
        ("st", "R"),
        ("rc", "0"),
        ("srv", "vvm.example.net"),
        ("ipt", "993"),
        ("u", "4155550100"),
        ("pw", "secret"),
    ])
}

pub fn reply(st: &str, rc: &str) -> StatusReply {
    StatusReply::from_fields([("st", st), ("rc", rc)])
}

/// How the fake carrier answers one activation request
#[derive(Debug, Clone)]
pub enum Answer {
    /// STATUS message delivered before start_activation returns
    Reply(StatusReply),
    /// Carrier never answers
    Silent,
}

/// How the fake carrier finishes provisioning
#[derive(Debug, Clone)]
pub enum Provisioning {
    Complete(StatusReply),
    Fail(String),
    Abandon,
}

pub struct FakeProtocol {
    journal: Journal,
    answers: Mutex<VecDeque<Answer>>,
    fallback: Mutex<Answer>,
    provisioning: Mutex<Option<Provisioning>>,
    requested_at: Mutex<Vec<Instant>>,
    service: OnceLock<Weak<ActivationService>>,
}

impl FakeProtocol {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            answers: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Answer::Silent),
            provisioning: Mutex::new(None),
            requested_at: Mutex::new(Vec::new()),
            service: OnceLock::new(),
        }
    }

    /// Queue answers for the next activation requests, in order
    pub fn answer(&self, answers: impl IntoIterator<Item = Answer>) {
        self.answers.lock().extend(answers);
    }

    /// Answer used once the queue is empty
    pub fn always(&self, answer: Answer) {
        *self.fallback.lock() = answer;
    }

    pub fn support_provisioning(&self, provisioning: Provisioning) {
        *self.provisioning.lock() = Some(provisioning);
    }

    pub fn activation_requests(&self) -> usize {
        self.requested_at.lock().len()
    }

    pub fn requested_at(&self) -> Vec<Instant> {
        self.requested_at.lock().clone()
    }
}

#[async_trait]
impl VisualVoicemailProtocol for FakeProtocol {
    async fn start_activation(&self, line: &LineId) -> Result<()> {
        self.journal.lock().push(format!("start_activation:{}", line));
        self.requested_at.lock().push(Instant::now());

        let answer = self
            .answers
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().clone());

        if let Answer::Reply(reply) = answer {
            let service = self.service.get().and_then(Weak::upgrade).expect("service attached");
            service.on_status_message(line.clone(), reply)?;
        }
        Ok(())
    }

    fn supports_provisioning(&self) -> bool {
        self.provisioning.lock().is_some()
    }

    async fn start_provisioning(
        &self,
        line: &LineId,
        _reply: StatusReply,
        raw: BTreeMap<String, String>,
        completion: ProvisioningCompletion,
    ) -> Result<()> {
        self.journal
            .lock()
            .push(format!("start_provisioning:{}:st={}", line, raw.get("st").cloned().unwrap_or_default()));

        let provisioning = self.provisioning.lock().clone();
        match provisioning {
            Some(Provisioning::Complete(reply)) => {
                // Completes from another task, the way a real provisioning flow would
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    completion.complete(reply);
                });
            }
            Some(Provisioning::Fail(reason)) => completion.fail(reason),
            Some(Provisioning::Abandon) | None => drop(completion),
        }
        Ok(())
    }
}

struct RecordingTransport(Journal);

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn activate_status_filter(&self, line: &LineId) -> Result<()> {
        self.0.lock().push(format!("status_filter:{}", line));
        Ok(())
    }
}

struct RecordingCredentials {
    journal: Journal,
    faults: Faults,
    inner: Arc<InMemoryCredentialStore>,
}

#[async_trait]
impl CredentialStore for RecordingCredentials {
    async fn read(&self, line: &LineId) -> Result<Option<SourceActivationRecord>> {
        self.inner.read(line).await
    }

    async fn write(&self, record: SourceActivationRecord) -> Result<()> {
        self.journal.lock().push(format!("credentials:{}", record.line));
        check(&self.faults, "credentials")?;
        self.inner.write(record).await
    }
}

struct RecordingSources {
    journal: Journal,
    faults: Faults,
    inner: Arc<InMemorySourceRegistry>,
}

#[async_trait]
impl SourceRegistry for RecordingSources {
    async fn add_source(&self, line: &LineId) -> Result<()> {
        self.journal.lock().push(format!("add_source:{}", line));
        check(&self.faults, "add_source")?;
        self.inner.add_source(line).await
    }
}

struct RecordingSync(Journal, Faults);

#[async_trait]
impl SyncTrigger for RecordingSync {
    async fn request_full_sync(&self, line: &LineId) -> Result<()> {
        self.0.lock().push(format!("full_sync:{}", line));
        check(&self.1, "full_sync")
    }
}

struct RecordingIndicator(Journal, Faults);

#[async_trait]
impl IndicatorService for RecordingIndicator {
    async fn clear_missed_service_indicator(&self, line: &LineId) -> Result<()> {
        self.0.lock().push(format!("clear_indicator:{}", line));
        check(&self.1, "clear_indicator")
    }
}

pub struct Harness {
    pub service: Arc<ActivationService>,
    pub protocol: Arc<FakeProtocol>,
    pub setup: Arc<DeviceSetupState>,
    pub carriers: Arc<StaticCarrierDirectory>,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub sources: Arc<InMemorySourceRegistry>,
    journal: Journal,
    faults: Faults,
}

impl Harness {
    /// Service with every listed line served by one fake carrier
    pub fn new(config: ActivationConfig, setup_complete: bool, lines: &[&str]) -> Self {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let faults: Faults = Arc::new(Mutex::new(BTreeSet::new()));
        let protocol = Arc::new(FakeProtocol::new(journal.clone()));

        let carriers = Arc::new(StaticCarrierDirectory::new());
        for line in lines {
            carriers.insert(
                LineId::new(*line),
                CarrierProfile {
                    protocol: protocol.clone(),
                    cellular_data_required: false,
                },
            );
        }

        let credentials = Arc::new(InMemoryCredentialStore::new());
        let sources = Arc::new(InMemorySourceRegistry::new());
        let collaborators = Collaborators {
            carriers: carriers.clone(),
            transport: Arc::new(RecordingTransport(journal.clone())),
            credentials: Arc::new(RecordingCredentials {
                journal: journal.clone(),
                faults: faults.clone(),
                inner: credentials.clone(),
            }),
            sources: Arc::new(RecordingSources {
                journal: journal.clone(),
                faults: faults.clone(),
                inner: sources.clone(),
            }),
            sync: Arc::new(RecordingSync(journal.clone(), faults.clone())),
            indicator: Arc::new(RecordingIndicator(journal.clone(), faults.clone())),
        };

        let setup = Arc::new(DeviceSetupState::new(setup_complete));
        let service = ActivationService::new(config, collaborators, setup.clone())
            .expect("service construction");
        let _ = protocol.service.set(Arc::downgrade(&service));

        Self {
            service,
            protocol,
            setup,
            carriers,
            credentials,
            sources,
            journal,
            faults,
        }
    }

    /// Make a collaborator step fail from now on
    pub fn fail_step(&self, step: &'static str) {
        self.faults.lock().insert(step);
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    /// Journal entries starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }

    /// Yield until the line's lifecycle reaches `state`
    pub async fn wait_for_state(&self, line: &LineId, state: ActivationState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if self.service.run_state(line).map(|run| run.state) == Some(state) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("line {} never reached {}", line, state));
    }

    /// Yield until the line has a recorded outcome
    pub async fn wait_for_outcome(&self, line: &LineId) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.service.last_outcome(line).is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("line {} never finished", line));
    }
}
