//! In-memory collaborator implementations
//!
//! Useful for hosts without a persistent store and for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::collaborators::{CarrierDirectory, CarrierProfile, CredentialStore, SourceRegistry};
use crate::error::Result;
use crate::types::{LineId, SourceActivationRecord};

/// In-memory credential store
pub struct InMemoryCredentialStore {
    /// Map of line to its most recent activation record
    records: DashMap<LineId, SourceActivationRecord>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Forget the credentials of a line
    pub fn remove(&self, line: &LineId) -> Option<SourceActivationRecord> {
        self.records.remove(line).map(|(_, record)| record)
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn read(&self, line: &LineId) -> Result<Option<SourceActivationRecord>> {
        Ok(self.records.get(line).map(|entry| entry.clone()))
    }

    async fn write(&self, record: SourceActivationRecord) -> Result<()> {
        debug!(line = %record.line, fields = record.fields.len(), "Storing activation record");
        self.records.insert(record.line.clone(), record);
        Ok(())
    }
}

/// In-memory source registry
pub struct InMemorySourceRegistry {
    /// Active lines and when they were first added
    sources: DashMap<LineId, DateTime<Utc>>,
}

impl InMemorySourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: DashMap::new(),
        }
    }

    pub fn contains(&self, line: &LineId) -> bool {
        self.sources.contains_key(line)
    }

    /// Active lines, sorted
    pub fn sources(&self) -> Vec<LineId> {
        let mut lines: Vec<LineId> = self.sources.iter().map(|entry| entry.key().clone()).collect();
        lines.sort();
        lines
    }

    pub fn added_at(&self, line: &LineId) -> Option<DateTime<Utc>> {
        self.sources.get(line).map(|entry| *entry)
    }

    /// Deactivate a line
    pub fn remove_source(&self, line: &LineId) -> bool {
        self.sources.remove(line).is_some()
    }
}

impl Default for InMemorySourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceRegistry for InMemorySourceRegistry {
    async fn add_source(&self, line: &LineId) -> Result<()> {
        self.sources.entry(line.clone()).or_insert_with(Utc::now);
        Ok(())
    }
}

/// Carrier directory backed by an explicit line to profile map
pub struct StaticCarrierDirectory {
    profiles: DashMap<LineId, CarrierProfile>,
}

impl StaticCarrierDirectory {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
        }
    }

    pub fn insert(&self, line: LineId, profile: CarrierProfile) {
        self.profiles.insert(line, profile);
    }

    pub fn remove(&self, line: &LineId) -> Option<CarrierProfile> {
        self.profiles.remove(line).map(|(_, profile)| profile)
    }
}

impl Default for StaticCarrierDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl CarrierDirectory for StaticCarrierDirectory {
    fn lookup(&self, line: &LineId) -> Option<CarrierProfile> {
        self.profiles.get(line).map(|entry| entry.clone())
    }
}
