//! Prompt domain
//!
//! Templates for generating prompts at each step of a consultation.

mod template;

pub use template::PromptTemplate;
