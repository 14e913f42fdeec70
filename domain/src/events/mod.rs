//! Progress events broadcast on the event bus.
//!
//! A [`StreamEvent`] is ephemeral: it never becomes part of the
//! consultation record and exists only while it is being delivered.
//! [`EventKind`] is an open set; unknown kinds round-trip through
//! [`EventKind::Custom`].

use crate::core::ids::ConsultationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a progress event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// First event on a new subscription, carries the current phase
    Connected,
    Interrogating,
    QuestionsRaised,
    Evaluating,
    InterconsultationCreated,
    SpecialistStarted,
    ToolStarted,
    ToolCompleted,
    SourceFound,
    SpecialistCompleted,
    SpecialistFailed,
    Integrating,
    Completed,
    Error,
    Custom(String),
}

impl EventKind {
    pub const BUILTIN: [EventKind; 14] = [
        EventKind::Connected,
        EventKind::Interrogating,
        EventKind::QuestionsRaised,
        EventKind::Evaluating,
        EventKind::InterconsultationCreated,
        EventKind::SpecialistStarted,
        EventKind::ToolStarted,
        EventKind::ToolCompleted,
        EventKind::SourceFound,
        EventKind::SpecialistCompleted,
        EventKind::SpecialistFailed,
        EventKind::Integrating,
        EventKind::Completed,
        EventKind::Error,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Connected => "connected",
            EventKind::Interrogating => "gp_interrogating",
            EventKind::QuestionsRaised => "gp_question",
            EventKind::Evaluating => "gp_evaluating",
            EventKind::InterconsultationCreated => "interconsultation_created",
            EventKind::SpecialistStarted => "specialist_started",
            EventKind::ToolStarted => "tool_started",
            EventKind::ToolCompleted => "tool_completed",
            EventKind::SourceFound => "source_found",
            EventKind::SpecialistCompleted => "specialist_completed",
            EventKind::SpecialistFailed => "specialist_failed",
            EventKind::Integrating => "integrating",
            EventKind::Completed => "completed",
            EventKind::Error => "error",
            EventKind::Custom(name) => name,
        }
    }

    /// Whether no further events follow for the request
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::Completed | EventKind::Error)
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        EventKind::BUILTIN
            .iter()
            .find(|k| k.as_str() == s)
            .cloned()
            .unwrap_or(EventKind::Custom(s))
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        EventKind::from(s.to_string())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A progress notification for one consultation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub request_id: ConsultationId,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

impl StreamEvent {
    pub fn new(kind: EventKind, request_id: ConsultationId, data: Value) -> Self {
        Self {
            kind,
            request_id,
            timestamp: Utc::now(),
            data,
        }
    }

    /// The `message` field of the payload, when present
    pub fn message(&self) -> Option<&str> {
        self.data.get("message").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_wire_names_round_trip() {
        for kind in EventKind::BUILTIN {
            assert_eq!(EventKind::from(kind.as_str()), kind);
        }
        assert_eq!(
            EventKind::from("token_usage"),
            EventKind::Custom("token_usage".to_string())
        );
    }

    #[test]
    fn test_event_serializes_type_field() {
        let event = StreamEvent::new(
            EventKind::SpecialistStarted,
            ConsultationId::new("c-1"),
            json!({"specialty": "cardiology", "message": "Cardiology evaluating"}),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "specialist_started");
        assert_eq!(value["request_id"], "c-1");
        assert_eq!(event.message(), Some("Cardiology evaluating"));

        let back: StreamEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(EventKind::Completed.is_terminal());
        assert!(EventKind::Error.is_terminal());
        assert!(!EventKind::Integrating.is_terminal());
    }
}
