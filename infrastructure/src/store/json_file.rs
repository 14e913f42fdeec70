//! One-JSON-file-per-record consultation store.
//!
//! Each record `<id>.json` has a sibling `<id>.json.lock`. A save holds an
//! exclusive `fd-lock` on it across the version check and the write, so
//! separate handles and processes sharing a directory stay single-writer.
//! Snapshots are written to a synced temporary file that is persisted over
//! the record, so a reader never sees a half-written snapshot.

use async_trait::async_trait;
use crew_application::{ConsultationStore, StoreError, check_version};
use crew_domain::{ConsultationId, ConsultationRecord, ConsultationStatus};
use fd_lock::RwLock;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// File-backed durable store
pub struct JsonFileConsultationStore {
    dir: PathBuf,
}

impl JsonFileConsultationStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &ConsultationId) -> PathBuf {
        let name: String = id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }

    async fn read(&self, path: &Path) -> Result<Option<ConsultationRecord>, StoreError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(path, e)),
        };
        parse_record(path, &content).map(Some)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Io(format!("{}: {}", path.display(), e))
}

fn parse_record(path: &Path, content: &str) -> Result<ConsultationRecord, StoreError> {
    serde_json::from_str(content)
        .map_err(|e| StoreError::Serialization(format!("{}: {}", path.display(), e)))
}

fn read_version(path: &Path) -> Result<Option<u64>, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => parse_record(path, &content).map(|r| Some(r.version())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path, e)),
    }
}

/// Check the stored version and replace the record while holding its lock file
fn save_locked(
    dir: &Path,
    path: &Path,
    mut snapshot: ConsultationRecord,
) -> Result<u64, StoreError> {
    let lock_path = path.with_extension("json.lock");
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| io_error(&lock_path, e))?;
    let mut lock = RwLock::new(lock_file);
    let _guard = lock.write().map_err(|e| io_error(&lock_path, e))?;

    let next = check_version(&snapshot, read_version(path)?)?;
    snapshot.set_version(next);
    let json = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    tmp.write_all(json.as_bytes())
        .map_err(|e| io_error(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| io_error(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;

    Ok(next)
}

#[async_trait]
impl ConsultationStore for JsonFileConsultationStore {
    async fn get(&self, id: &ConsultationId) -> Result<ConsultationRecord, StoreError> {
        self.read(&self.path_for(id))
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn save(&self, record: &ConsultationRecord) -> Result<u64, StoreError> {
        let dir = self.dir.clone();
        let path = self.path_for(record.id());
        let snapshot = record.clone();

        let next = tokio::task::spawn_blocking(move || save_locked(&dir, &path, snapshot))
            .await
            .map_err(|e| StoreError::Io(format!("save task failed: {}", e)))??;

        debug!(consultation = %record.id(), version = next, "Record saved");
        Ok(next)
    }

    async fn list(&self) -> Result<Vec<ConsultationStatus>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", self.dir.display(), e)))?;

        let mut statuses = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read(&path).await {
                Ok(Some(record)) => statuses.push(record.status()),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable record"),
            }
        }
        statuses.sort_by_key(|s| s.created_at);
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crew_domain::{Phase, RequestContext, RequestText};
    use serde_json::json;

    fn record() -> ConsultationRecord {
        ConsultationRecord::new(
            RequestText::try_new("Dose adjustment of apixaban in CKD?").unwrap(),
            RequestContext::from_value(json!({"egfr": 28})).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileConsultationStore::open(dir.path()).unwrap();
        let mut rec = record();

        let version = store.save(&rec).await.unwrap();
        rec.set_version(version);
        rec.record_interrogation(Vec::new(), true, "enough context").unwrap();
        store.save(&rec).await.unwrap();

        // A fresh handle on the same directory sees the same data
        let reopened = JsonFileConsultationStore::open(dir.path()).unwrap();
        let loaded = reopened.get(rec.id()).await.unwrap();
        assert_eq!(loaded.version(), 2);
        assert_eq!(loaded.phase(), Phase::Evaluating);
        assert_eq!(loaded.context().get("egfr"), Some(&json!(28)));
        assert_eq!(loaded.trace().len(), rec.trace().len());
    }

    #[tokio::test]
    async fn test_stale_write_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileConsultationStore::open(dir.path()).unwrap();
        let rec = record();
        store.save(&rec).await.unwrap();

        let mut first = store.get(rec.id()).await.unwrap();
        let mut second = store.get(rec.id()).await.unwrap();
        first.fail("interrogate", "first writer").unwrap();
        store.save(&first).await.unwrap();

        second.fail("interrogate", "second writer").unwrap();
        let err = store.save(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 1, actual: 2, .. }));
        assert_eq!(
            store.get(rec.id()).await.unwrap().error(),
            Some("first writer")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_handles_admit_exactly_one_writer() {
        let dir = tempfile::tempdir().unwrap();
        for round in 0..25 {
            let a = JsonFileConsultationStore::open(dir.path()).unwrap();
            let b = JsonFileConsultationStore::open(dir.path()).unwrap();
            let rec = record();
            a.save(&rec).await.unwrap();

            let mut first = a.get(rec.id()).await.unwrap();
            let mut second = b.get(rec.id()).await.unwrap();
            first.fail("interrogate", "writer a").unwrap();
            second.fail("interrogate", "writer b").unwrap();

            let (ra, rb) = tokio::join!(
                tokio::spawn(async move { a.save(&first).await }),
                tokio::spawn(async move { b.save(&second).await }),
            );
            let outcomes = [ra.unwrap(), rb.unwrap()];

            let accepted = outcomes.iter().filter(|r| r.is_ok()).count();
            assert_eq!(accepted, 1, "round {round}: exactly one writer must win");
            assert!(
                outcomes
                    .iter()
                    .any(|r| matches!(r, Err(StoreError::Conflict { expected: 1, actual: 2, .. })))
            );

            let reopened = JsonFileConsultationStore::open(dir.path()).unwrap();
            assert_eq!(reopened.get(rec.id()).await.unwrap().version(), 2);
        }
    }

    #[tokio::test]
    async fn test_save_leaves_only_record_and_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileConsultationStore::open(dir.path()).unwrap();
        let mut rec = record();
        let version = store.save(&rec).await.unwrap();
        rec.set_version(version);
        rec.record_interrogation(Vec::new(), true, "enough context").unwrap();
        store.save(&rec).await.unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        let stem = store.path_for(rec.id());
        let stem = stem.file_name().unwrap().to_string_lossy();
        assert_eq!(names, vec![stem.to_string(), format!("{}.lock", stem)]);

        let saved = std::fs::read_to_string(store.path_for(rec.id())).unwrap();
        let parsed: ConsultationRecord = serde_json::from_str(&saved).unwrap();
        assert_eq!(parsed.version(), 2);
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileConsultationStore::open(dir.path()).unwrap();
        let err = store.get(&ConsultationId::new("nope")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_skips_foreign_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileConsultationStore::open(dir.path()).unwrap();
        store.save(&record()).await.unwrap();
        store.save(&record()).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();

        let statuses = store.list().await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|s| s.phase == Phase::Interrogating));
    }
}
