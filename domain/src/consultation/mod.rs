//! Consultation domain
//!
//! The durable [`record::ConsultationRecord`] and everything it holds: the
//! workflow [`phase::Phase`], request context, expert tasks and results,
//! plus the pure parsing and rendering used by the workflow steps.

pub mod context;
pub mod entities;
pub mod notes;
pub mod parsing;
pub mod phase;
pub mod record;
