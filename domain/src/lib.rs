//! Domain layer for clinical-crew
//!
//! This crate contains the core business logic, entities, and value objects.
//! It has no dependencies on infrastructure or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Consultation
//!
//! A consultation routes a free-text clinical request through a fixed set of
//! [`Phase`]s: interrogation, triage evaluation, optional interconsultation
//! with several experts in parallel, integration of their answers, and
//! completion. The [`ConsultationRecord`] is the aggregate root and the
//! single source of truth for one request.
//!
//! ## Experts
//!
//! Experts ([`ExpertProfile`]) are specialist-scoped evaluators. Each
//! interconsultation is an [`ExpertTaskDescriptor`] that yields at most one
//! [`ExpertTaskResult`].
//!
//! ## Events
//!
//! Progress is described by ephemeral [`StreamEvent`]s that never become
//! part of the record.

pub mod config;
pub mod consultation;
pub mod core;
pub mod events;
pub mod expert;
pub mod lookup;
pub mod prompt;

// Re-export commonly used types
pub use config::{ConfigIssue, ConfigIssueCode, OutputFormat, Severity};
pub use consultation::{
    context::RequestContext,
    entities::{
        Citation, ExpertEvaluation, ExpertTaskDescriptor, ExpertTaskResult, FinalResult,
        InterrogationQuestion, SourceKind, TaskFailureNote, TriageDecision,
    },
    notes::render_notes,
    parsing::{
        InterconsultationDraft, IntegrationDraft, InterrogationOutcome, extract_json_block,
        parse_expert_evaluation, parse_integration, parse_interconsultation, parse_interrogation,
        parse_triage,
    },
    phase::Phase,
    record::{ConsultationRecord, ConsultationStatus, ProgressSummary, TraceEntry},
};
pub use core::{
    error::{DomainError, ExternalFailure},
    ids::{ConsultationId, TaskId},
    request::RequestText,
    string::truncate,
};
pub use events::{EventKind, StreamEvent};
pub use expert::{ExpertId, ExpertProfile, find_profile};
pub use lookup::{Article, KnowledgeChunk, distance_to_score, literature_query};
pub use prompt::PromptTemplate;
