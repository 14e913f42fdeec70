//! Durable consultation stores
//!
//! The in-memory store lives next to its port in the application layer;
//! this module adds the file-backed one.

mod json_file;

pub use json_file::JsonFileConsultationStore;
