//! Request text value object

use super::error::DomainError;
use serde::{Deserialize, Serialize};

/// Minimum number of characters a consultation request must carry.
pub const MIN_REQUEST_LEN: usize = 10;

/// The free-text consultation request (Value Object)
///
/// Represents the clinical question that triage evaluates and, when needed,
/// fans out to several experts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestText {
    content: String,
}

impl RequestText {
    /// Try to create a new request, rejecting blank or too-short text
    pub fn try_new(content: impl Into<String>) -> Result<Self, DomainError> {
        let content = content.into();
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidRequest(
                "request text cannot be empty".to_string(),
            ));
        }
        if trimmed.chars().count() < MIN_REQUEST_LEN {
            return Err(DomainError::InvalidRequest(format!(
                "request text must be at least {} characters",
                MIN_REQUEST_LEN
            )));
        }
        Ok(Self { content })
    }

    /// Get the request content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Consume and return the inner content
    pub fn into_content(self) -> String {
        self.content
    }
}

impl std::fmt::Display for RequestText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.content)
    }
}

impl TryFrom<&str> for RequestText {
    type Error = DomainError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        RequestText::try_new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_creation() {
        let r = RequestText::try_new("Can I start sertraline with metformin?").unwrap();
        assert_eq!(r.content(), "Can I start sertraline with metformin?");
    }

    #[test]
    fn test_try_new_empty() {
        assert!(RequestText::try_new("").is_err());
        assert!(RequestText::try_new("   ").is_err());
    }

    #[test]
    fn test_try_new_too_short() {
        let err = RequestText::try_new("chest?").unwrap_err();
        assert!(matches!(err, DomainError::InvalidRequest(_)));
    }
}
