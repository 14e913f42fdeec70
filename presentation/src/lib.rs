//! Presentation layer for clinical-crew
//!
//! This crate contains CLI definitions, output formatters and the
//! progress reporters that subscribe to the event bus.

pub mod cli;
pub mod output;
pub mod progress;

// Re-export commonly used types
pub use cli::commands::{Cli, OutputFormat, parse_answer};
pub use output::console::ConsoleFormatter;
pub use progress::reporter::{ProgressReporter, SimpleProgress, describe_event};
