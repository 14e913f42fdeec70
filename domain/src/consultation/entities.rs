//! Consultation entities and value objects.
//!
//! - [`InterrogationQuestion`] - information triage asks for before evaluating
//! - [`TriageDecision`] - direct answer vs. escalation to experts
//! - [`ExpertTaskDescriptor`] - one planned unit of fan-out work
//! - [`ExpertTaskResult`] - output of one expert evaluation
//! - [`TaskFailureNote`] - an expert task that failed terminally
//! - [`FinalResult`] - the merged answer

use crate::core::ids::TaskId;
use crate::expert::ExpertId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A question triage needs answered before it can evaluate the request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterrogationQuestion {
    #[serde(default)]
    pub question_id: String,
    pub question_text: String,
    /// "open", "numeric" or "multiple_choice"
    #[serde(default = "default_question_type")]
    pub question_type: String,
    /// 1 (most critical) to 5
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Why the information is needed
    #[serde(default)]
    pub context: String,
    /// Choices for `multiple_choice` questions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

fn default_question_type() -> String {
    "open".to_string()
}

fn default_priority() -> u8 {
    3
}

impl InterrogationQuestion {
    pub fn new(question_id: impl Into<String>, question_text: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            question_text: question_text.into(),
            question_type: default_question_type(),
            priority: default_priority(),
            context: String::new(),
            options: Vec::new(),
        }
    }
}

/// Decision of the evaluation step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageDecision {
    pub can_answer_directly: bool,
    #[serde(default)]
    pub required_experts: Vec<ExpertId>,
    #[serde(default)]
    pub reasoning: String,
    /// Case complexity in `[0, 1]`
    #[serde(default = "default_complexity")]
    pub estimated_complexity: f64,
    /// Answer synthesized when no escalation is needed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_response: Option<String>,
}

fn default_complexity() -> f64 {
    0.5
}

impl TriageDecision {
    pub fn direct(response: impl Into<String>) -> Self {
        Self {
            can_answer_directly: true,
            required_experts: Vec::new(),
            reasoning: String::new(),
            estimated_complexity: 0.1,
            direct_response: Some(response.into()),
        }
    }

    pub fn escalate(experts: Vec<ExpertId>) -> Self {
        Self {
            can_answer_directly: false,
            required_experts: experts,
            reasoning: String::new(),
            estimated_complexity: default_complexity(),
            direct_response: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// Clamp complexity into `[0, 1]`
    pub fn normalized(mut self) -> Self {
        self.estimated_complexity = if self.estimated_complexity.is_finite() {
            self.estimated_complexity.clamp(0.0, 1.0)
        } else {
            default_complexity()
        };
        self
    }
}

/// One planned unit of fan-out work (an interconsultation)
///
/// Created once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertTaskDescriptor {
    pub id: TaskId,
    pub expert: ExpertId,
    /// The specific question for this expert
    pub question: String,
    /// Read-only projection of the request context plus triage detail
    pub context: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl ExpertTaskDescriptor {
    pub fn new(expert: ExpertId, question: impl Into<String>, context: Map<String, Value>) -> Self {
        Self {
            id: TaskId::generate(),
            expert,
            question: question.into(),
            context,
            created_at: Utc::now(),
        }
    }
}

/// Kind of evidence behind a citation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    KnowledgeBase,
    Literature,
}

/// A piece of evidence an expert relied on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub kind: SourceKind,
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    /// URL, PMID link or document name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Relevance in `[0, 1]` when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Structured payload of one expert evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertEvaluation {
    pub assessment: String,
    /// Direct answer to the task question
    pub answer: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default = "default_evidence_level")]
    pub evidence_level: String,
    /// Confidence indicator in `[0, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub requires_additional_info: bool,
    #[serde(default)]
    pub additional_questions: Vec<String>,
}

fn default_evidence_level() -> String {
    "unknown".to_string()
}

impl ExpertEvaluation {
    pub fn new(assessment: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            assessment: assessment.into(),
            answer: answer.into(),
            reasoning: String::new(),
            recommendations: Vec::new(),
            evidence_level: default_evidence_level(),
            confidence: None,
            citations: Vec::new(),
            requires_additional_info: false,
            additional_questions: Vec::new(),
        }
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }
}

/// Output of one expert evaluation, paired 1:1 with its descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertTaskResult {
    pub task_id: TaskId,
    pub expert: ExpertId,
    pub evaluation: ExpertEvaluation,
    pub produced_at: DateTime<Utc>,
}

impl ExpertTaskResult {
    pub fn new(task: &ExpertTaskDescriptor, evaluation: ExpertEvaluation) -> Self {
        Self {
            task_id: task.id.clone(),
            expert: task.expert.clone(),
            evaluation,
            produced_at: Utc::now(),
        }
    }
}

/// An expert task that failed terminally; surfaces as a documented
/// limitation of the final result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailureNote {
    pub task_id: TaskId,
    pub expert: ExpertId,
    pub cause: String,
}

impl TaskFailureNote {
    pub fn limitation(&self) -> String {
        format!(
            "The {} evaluation could not be obtained: {}",
            self.expert, self.cause
        )
    }
}

/// The merged answer persisted when the consultation completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub summary: String,
    pub answer: String,
    #[serde(default)]
    pub management_plan: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followup: Option<String>,
    /// Experts whose results were merged (empty on the direct path)
    #[serde(default)]
    pub contributing_experts: Vec<ExpertId>,
    /// Documented gaps, e.g. experts that could not be consulted
    #[serde(default)]
    pub limitations: Vec<String>,
    #[serde(default)]
    pub sources: Vec<Citation>,
    /// Rendered complete clinical notes
    #[serde(default)]
    pub notes: String,
    pub produced_at: DateTime<Utc>,
}

impl FinalResult {
    pub fn new(summary: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            answer: answer.into(),
            management_plan: Vec::new(),
            followup: None,
            contributing_experts: Vec::new(),
            limitations: Vec::new(),
            sources: Vec::new(),
            notes: String::new(),
            produced_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.answer.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triage_normalization_clamps_complexity() {
        let mut decision = TriageDecision::escalate(vec![ExpertId::new("cardiology")]);
        decision.estimated_complexity = 3.0;
        assert_eq!(decision.normalized().estimated_complexity, 1.0);

        let mut decision = TriageDecision::direct("ok");
        decision.estimated_complexity = f64::NAN;
        assert_eq!(decision.normalized().estimated_complexity, 0.5);
    }

    #[test]
    fn test_result_pairs_with_descriptor() {
        let task = ExpertTaskDescriptor::new(ExpertId::new("cardiology"), "QT risk?", Map::new());
        let result = ExpertTaskResult::new(&task, ExpertEvaluation::new("low risk", "yes"));
        assert_eq!(result.task_id, task.id);
        assert_eq!(result.expert, task.expert);
    }

    #[test]
    fn test_interrogation_question_defaults() {
        let q: InterrogationQuestion =
            serde_json::from_str(r#"{"question_text": "Current HbA1c?"}"#).unwrap();
        assert_eq!(q.question_type, "open");
        assert_eq!(q.priority, 3);
    }

    #[test]
    fn test_failure_note_limitation_text() {
        let note = TaskFailureNote {
            task_id: TaskId::new("t1"),
            expert: ExpertId::new("pharmacology"),
            cause: "knowledge lookup exhausted retries".to_string(),
        };
        assert_eq!(
            note.limitation(),
            "The pharmacology evaluation could not be obtained: knowledge lookup exhausted retries"
        );
    }
}
