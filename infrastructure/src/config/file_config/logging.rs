//! Logging configuration from TOML (`[logging]` section)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw logging configuration from TOML
///
/// # Example
///
/// ```toml
/// [logging]
/// file = "~/.local/state/clinical-crew/crew.log"
/// event_transcript = "./consultations.events.jsonl"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// Also write operational logs to this file
    pub file: Option<PathBuf>,
    /// Append every stream event as one JSON line to this file
    pub event_transcript: Option<PathBuf>,
}
