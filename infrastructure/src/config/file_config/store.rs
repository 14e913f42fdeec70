//! Durable store configuration from TOML (`[store]` section)

use crew_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which durable store backs the consultations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    /// Records live only for the lifetime of the process
    Memory,
    /// One JSON file per record under a directory
    Json(PathBuf),
}

/// Raw store configuration from TOML
///
/// # Example
///
/// ```toml
/// [store]
/// kind = "json"                  # "memory" or "json"
/// dir = "~/.local/share/clinical-crew/consultations"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStoreConfig {
    pub kind: String,
    pub dir: Option<PathBuf>,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            kind: "memory".to_string(),
            dir: None,
        }
    }
}

impl FileStoreConfig {
    fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clinical-crew")
            .join("consultations")
    }

    /// Parse `kind`; unknown values fall back to the in-memory store
    pub fn parse_kind(&self) -> (StoreKind, Vec<ConfigIssue>) {
        match self.kind.to_lowercase().as_str() {
            "memory" => (StoreKind::Memory, vec![]),
            "json" | "file" => {
                let dir = self.dir.clone().unwrap_or_else(Self::default_dir);
                (StoreKind::Json(dir), vec![])
            }
            other => {
                let issue = ConfigIssue::warning(
                    ConfigIssueCode::UnknownBackend,
                    format!(
                        "store.kind: unknown value '{}', falling back to 'memory'",
                        other
                    ),
                );
                (StoreKind::Memory, vec![issue])
            }
        }
    }
}
