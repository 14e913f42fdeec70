//! JSONL transcript of progress events.
//!
//! Each [`StreamEvent`] is serialized as a single JSON line carrying its
//! `type`, `request_id`, `timestamp` and `data`, appended to the file via a
//! buffered writer.

use async_trait::async_trait;
use crew_application::{DeliveryError, EventSubscriber};
use crew_domain::StreamEvent;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Event bus subscriber that writes one JSON object per line.
///
/// Thread-safe via `Mutex<BufWriter<File>>`. Flushes on `Drop`.
pub struct JsonlEventLogger {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlEventLogger {
    /// Open the transcript at the given path for appending.
    ///
    /// Creates the file (and parent directories) if they don't exist.
    /// Returns `None` if the file cannot be opened.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(
                "Could not create event transcript directory {}: {}",
                parent.display(),
                e
            );
            return None;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!(
                    "Could not open event transcript {}: {}",
                    path.display(),
                    e
                );
                return None;
            }
        };

        Some(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, event: &StreamEvent) -> Result<(), DeliveryError> {
        let line =
            serde_json::to_string(event).map_err(|e| DeliveryError::Failed(e.to_string()))?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| DeliveryError::Closed)?;
        writeln!(writer, "{}", line).map_err(|e| DeliveryError::Failed(e.to_string()))?;
        // Append-only, so a flush per line keeps the file readable after a crash
        writer
            .flush()
            .map_err(|e| DeliveryError::Failed(e.to_string()))
    }
}

#[async_trait]
impl EventSubscriber for JsonlEventLogger {
    async fn on_event(&self, event: &StreamEvent) -> Result<(), DeliveryError> {
        self.write_line(event)
    }
}

impl Drop for JsonlEventLogger {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}
