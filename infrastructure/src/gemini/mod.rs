//! Gemini generation backend
//!
//! - [`protocol`]: `generateContent` request/response bodies
//! - [`gateway`]: [`GeminiGateway`], the [`GenerationService`] adapter
//!
//! [`GenerationService`]: crew_application::GenerationService

pub mod gateway;
pub mod protocol;

pub use gateway::{GeminiError, GeminiGateway};
