//! Output format value object

use serde::{Deserialize, Serialize};

/// How a finished consultation is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Complete clinical notes with every interconsultation
    Full,
    /// Only the final answer (default)
    #[default]
    Answer,
    /// The whole record as JSON
    Json,
}
