//! Core domain concepts shared across all subdomains.
//!
//! - [`request::RequestText`] — a validated consultation request
//! - [`ids::ConsultationId`] / [`ids::TaskId`] — identifiers
//! - [`error::DomainError`] / [`error::ExternalFailure`] — domain-level errors

pub mod error;
pub mod ids;
pub mod request;
pub mod string;
