//! Configuration validation issues.
//!
//! Loaded configuration is checked before use; problems are reported as
//! structured [`ConfigIssue`]s with a severity instead of panicking.

use std::fmt;

/// Severity level of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Fatal: the configuration cannot work at all.
    Error,
    /// Non-fatal: works, but probably not as intended.
    Warning,
}

/// Identifies a specific configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigIssueCode {
    /// A numeric setting is outside its allowed range
    OutOfRange,
    /// Secondary relevance threshold is not below the primary one
    ThresholdOrder,
    /// The expert roster is empty or has duplicate ids
    InvalidRoster,
    /// An unknown backend or store kind was named
    UnknownBackend,
    /// A required credential is missing
    MissingCredential,
}

/// A detected issue in the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub code: ConfigIssueCode,
    pub message: String,
}

impl ConfigIssue {
    pub fn error(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
        }
    }

    pub fn warning(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", level, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_severity() {
        let issue = ConfigIssue::error(ConfigIssueCode::OutOfRange, "max_attempts must be >= 1");
        assert_eq!(issue.to_string(), "error: max_attempts must be >= 1");
        assert!(issue.is_error());
        assert!(!ConfigIssue::warning(ConfigIssueCode::MissingCredential, "x").is_error());
    }
}
