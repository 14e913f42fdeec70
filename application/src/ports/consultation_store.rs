//! Durable consultation store port
//!
//! Persists [`ConsultationRecord`]s with optimistic concurrency: every
//! record carries the version it was loaded at, and a save is rejected with
//! [`StoreError::Conflict`] when the stored version has moved on.

use async_trait::async_trait;
use crew_domain::{ConsultationId, ConsultationRecord, ConsultationStatus};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur during store operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Consultation not found: {0}")]
    NotFound(ConsultationId),

    #[error("Concurrent write on consultation {id}: expected version {expected}, found {actual}")]
    Conflict {
        id: ConsultationId,
        expected: u64,
        actual: u64,
    },

    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Record serialization error: {0}")]
    Serialization(String),
}

/// Durable store for consultation records
#[async_trait]
pub trait ConsultationStore: Send + Sync {
    /// Load the latest snapshot of a record
    async fn get(&self, id: &ConsultationId) -> Result<ConsultationRecord, StoreError>;

    /// Persist a record and return its new version.
    ///
    /// `record.version()` must equal the stored version (0 for a record
    /// that was never saved).
    async fn save(&self, record: &ConsultationRecord) -> Result<u64, StoreError>;

    /// Status of every stored record, oldest first
    async fn list(&self) -> Result<Vec<ConsultationStatus>, StoreError>;
}

/// Check the optimistic version of an incoming record against the stored one
pub fn check_version(record: &ConsultationRecord, stored: Option<u64>) -> Result<u64, StoreError> {
    let actual = stored.unwrap_or(0);
    if record.version() != actual {
        return Err(StoreError::Conflict {
            id: record.id().clone(),
            expected: record.version(),
            actual,
        });
    }
    Ok(actual + 1)
}

/// In-process store, for tests and runs without persistence
#[derive(Default)]
pub struct InMemoryConsultationStore {
    records: RwLock<HashMap<ConsultationId, ConsultationRecord>>,
}

impl InMemoryConsultationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsultationStore for InMemoryConsultationStore {
    async fn get(&self, id: &ConsultationId) -> Result<ConsultationRecord, StoreError> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn save(&self, record: &ConsultationRecord) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let next = check_version(record, records.get(record.id()).map(|r| r.version()))?;
        let mut stored = record.clone();
        stored.set_version(next);
        records.insert(record.id().clone(), stored);
        Ok(next)
    }

    async fn list(&self) -> Result<Vec<ConsultationStatus>, StoreError> {
        let mut statuses: Vec<ConsultationStatus> = self
            .records
            .read()
            .await
            .values()
            .map(|r| r.status())
            .collect();
        statuses.sort_by_key(|s| s.created_at);
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crew_domain::{RequestContext, RequestText};

    fn record() -> ConsultationRecord {
        ConsultationRecord::new(
            RequestText::try_new("Is metformin safe in CKD stage 3?").unwrap(),
            RequestContext::default(),
        )
    }

    #[tokio::test]
    async fn test_save_assigns_increasing_versions() {
        let store = InMemoryConsultationStore::new();
        let mut rec = record();
        let v1 = store.save(&rec).await.unwrap();
        assert_eq!(v1, 1);
        rec.set_version(v1);
        let v2 = store.save(&rec).await.unwrap();
        assert_eq!(v2, 2);
        assert_eq!(store.get(rec.id()).await.unwrap().version(), 2);
    }

    #[tokio::test]
    async fn test_stale_write_is_rejected() {
        let store = InMemoryConsultationStore::new();
        let rec = record();
        store.save(&rec).await.unwrap();

        let mut writer_a = store.get(rec.id()).await.unwrap();
        let mut writer_b = store.get(rec.id()).await.unwrap();
        writer_a.fail("interrogate", "first").unwrap();
        store.save(&writer_a).await.unwrap();

        writer_b.fail("interrogate", "second").unwrap();
        let err = store.save(&writer_b).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 1, actual: 2, .. }));
        assert_eq!(store.get(rec.id()).await.unwrap().error(), Some("first"));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = InMemoryConsultationStore::new();
        let id = ConsultationId::new("missing");
        assert_eq!(store.get(&id).await, Err(StoreError::NotFound(id)));
    }

    #[tokio::test]
    async fn test_list_returns_statuses() {
        let store = InMemoryConsultationStore::new();
        store.save(&record()).await.unwrap();
        store.save(&record()).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 2);
    }
}
