//! Logging infrastructure: structured event transcripts.
//!
//! Provides [`JsonlEventLogger`], a JSONL file writer that implements the
//! [`EventSubscriber`](crew_application::EventSubscriber) port.

mod jsonl_logger;

pub use jsonl_logger::JsonlEventLogger;
