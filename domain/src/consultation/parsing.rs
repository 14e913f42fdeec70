//! Response parsing for generation-service output.
//!
//! The generation service answers each workflow step with a JSON object,
//! usually wrapped in a markdown fence. These functions are pure: they
//! extract the object and map it onto domain types.
//!
//! | Function | Step | Unparseable response |
//! |----------|------|----------------------|
//! | [`parse_interrogation`] | interrogate | `None` |
//! | [`parse_triage`] | evaluate | `None` |
//! | [`parse_interconsultation`] | plan interconsultations | `None` |
//! | [`parse_expert_evaluation`] | expert worker | structured fallback |
//! | [`parse_integration`] | integrate | raw text becomes the answer |

use super::entities::{ExpertEvaluation, InterrogationQuestion, TriageDecision};
use crate::core::string::truncate;
use crate::expert::ExpertId;
use serde_json::{Map, Value};

/// Outcome of an interrogation round
#[derive(Debug, Clone, PartialEq)]
pub struct InterrogationOutcome {
    pub can_proceed: bool,
    pub questions: Vec<InterrogationQuestion>,
    pub reasoning: String,
}

/// Specific question and context projection for one expert
#[derive(Debug, Clone, PartialEq)]
pub struct InterconsultationDraft {
    pub question: String,
    pub context: Map<String, Value>,
}

/// Merged answer returned by the integration step
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationDraft {
    pub summary: String,
    pub answer: String,
    pub management_plan: Vec<String>,
    pub followup: Option<String>,
}

/// Locate the JSON payload in a response.
///
/// Prefers a ` ```json ` fence, then any fence, then the whole text.
pub fn extract_json_block(response: &str) -> &str {
    if response.contains("```json") {
        if let Some(block) = fenced_block(response, "```json") {
            return block;
        }
    } else if let Some(block) = fenced_block(response, "```") {
        return block;
    }
    response.trim()
}

fn fenced_block<'a>(response: &'a str, marker: &str) -> Option<&'a str> {
    let start = response.find(marker)? + marker.len();
    let end = response[start..].find("```")?;
    Some(response[start..start + end].trim())
}

/// Parse the JSON object embedded in a response
pub fn parse_json_object(response: &str) -> Option<Map<String, Value>> {
    let block = extract_json_block(response);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(block) {
        return Some(map);
    }

    // Last resort: outermost braces in free text
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&response[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn str_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn string_list(map: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find_map(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Numeric confidence, or a `high` / `medium` / `low` level
fn confidence_field(map: &Map<String, Value>) -> Option<f64> {
    let value = map.get("confidence").or_else(|| map.get("confidence_level"))?;
    if let Some(n) = value.as_f64() {
        return Some(n);
    }
    match value.as_str()?.trim().to_lowercase().as_str() {
        "high" => Some(0.85),
        "medium" | "moderate" => Some(0.6),
        "low" => Some(0.3),
        _ => None,
    }
}

/// Parse the interrogation step.
///
/// Questions without text are dropped and missing ids are numbered.
/// `multiple_choice` questions with fewer than two options fall back to
/// `open`. When `can_proceed` is absent it is inferred from the question
/// list being empty.
pub fn parse_interrogation(response: &str) -> Option<InterrogationOutcome> {
    let map = parse_json_object(response)?;

    let mut questions = Vec::new();
    if let Some(items) = map.get("questions").and_then(|v| v.as_array()) {
        for (index, item) in items.iter().enumerate() {
            let mut question = match item {
                Value::String(text) if !text.trim().is_empty() => {
                    InterrogationQuestion::new(format!("q{}", index + 1), text.trim())
                }
                Value::Object(obj) => {
                    let Some(text) = str_field(obj, &["question_text", "question", "text"]) else {
                        continue;
                    };
                    let id = str_field(obj, &["question_id", "id"])
                        .unwrap_or_else(|| format!("q{}", index + 1));
                    let mut q = InterrogationQuestion::new(id, text);
                    if let Some(kind) = str_field(obj, &["question_type", "type"]) {
                        q.question_type = kind;
                    }
                    if let Some(priority) = obj.get("priority").and_then(|v| v.as_u64()) {
                        q.priority = priority.clamp(1, 5) as u8;
                    }
                    q.context = str_field(obj, &["context"]).unwrap_or_default();
                    q.options = string_list(obj, &["options"]);
                    q
                }
                _ => continue,
            };
            if question.question_type == "multiple_choice" && question.options.len() < 2 {
                question.question_type = "open".to_string();
                question.options.clear();
            }
            questions.push(question);
        }
    }

    let can_proceed = map
        .get("can_proceed")
        .and_then(|v| v.as_bool())
        .unwrap_or(questions.is_empty());

    Some(InterrogationOutcome {
        can_proceed,
        questions,
        reasoning: str_field(&map, &["reasoning"]).unwrap_or_default(),
    })
}

/// Parse the triage decision. `can_answer_directly` is required.
pub fn parse_triage(response: &str) -> Option<TriageDecision> {
    let map = parse_json_object(response)?;
    let can_answer_directly = map.get("can_answer_directly")?.as_bool()?;

    let mut decision = if can_answer_directly {
        TriageDecision::direct(
            str_field(&map, &["direct_response", "final_response", "answer"]).unwrap_or_default(),
        )
    } else {
        let mut experts: Vec<ExpertId> = Vec::new();
        for id in string_list(&map, &["required_experts", "required_specialists"]) {
            let id = ExpertId::new(id);
            if !experts.contains(&id) {
                experts.push(id);
            }
        }
        TriageDecision::escalate(experts)
    };

    decision.reasoning = str_field(&map, &["reasoning"]).unwrap_or_default();
    if let Some(complexity) = map.get("estimated_complexity").and_then(|v| v.as_f64()) {
        decision.estimated_complexity = complexity;
    }
    Some(decision.normalized())
}

/// Parse an interconsultation draft. `specific_question` is required.
pub fn parse_interconsultation(response: &str) -> Option<InterconsultationDraft> {
    let map = parse_json_object(response)?;
    let question = str_field(&map, &["specific_question", "question"])?;
    let context = map
        .get("relevant_context")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();
    Some(InterconsultationDraft { question, context })
}

/// Parse an expert evaluation, falling back to a structured placeholder
/// that carries the raw text as reasoning.
pub fn parse_expert_evaluation(response: &str) -> ExpertEvaluation {
    let Some(map) = parse_json_object(response) else {
        let mut fallback = ExpertEvaluation::new(
            "Expert response could not be parsed",
            truncate(response.trim(), 2000),
        );
        fallback.reasoning = response.trim().to_string();
        return fallback;
    };

    let mut evaluation = ExpertEvaluation::new(
        str_field(&map, &["assessment", "evaluation"]).unwrap_or_default(),
        str_field(&map, &["answer", "response"]).unwrap_or_default(),
    );
    evaluation.reasoning = str_field(&map, &["reasoning", "clinical_reasoning"]).unwrap_or_default();
    evaluation.recommendations = string_list(&map, &["recommendations"]);
    if let Some(level) = str_field(&map, &["evidence_level"]) {
        evaluation.evidence_level = level;
    }
    if let Some(confidence) = confidence_field(&map) {
        evaluation = evaluation.with_confidence(confidence);
    }
    evaluation.requires_additional_info = map
        .get("requires_additional_info")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    evaluation.additional_questions = string_list(&map, &["additional_questions"]);
    evaluation
}

/// Parse the integration step.
///
/// Non-JSON text is taken verbatim as the answer; an empty response
/// yields `None`.
pub fn parse_integration(response: &str) -> Option<IntegrationDraft> {
    match parse_json_object(response) {
        Some(map) => {
            let answer = str_field(&map, &["final_response", "answer"])?;
            Some(IntegrationDraft {
                summary: str_field(&map, &["general_summary", "summary"]).unwrap_or_default(),
                answer,
                management_plan: string_list(&map, &["management_plan"]),
                followup: str_field(&map, &["recommended_followup", "followup"]),
            })
        }
        None if !response.trim().is_empty() => Some(IntegrationDraft {
            summary: String::new(),
            answer: response.trim().to_string(),
            management_plan: Vec::new(),
            followup: None,
        }),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_block_prefers_json_fence() {
        let text = "Here:\n```json\n{\"a\": 1}\n```\nthanks";
        assert_eq!(extract_json_block(text), "{\"a\": 1}");

        let generic = "```\n{\"b\": 2}\n```";
        assert_eq!(extract_json_block(generic), "{\"b\": 2}");

        assert_eq!(extract_json_block("  {\"c\": 3}  "), "{\"c\": 3}");
    }

    #[test]
    fn test_parse_json_object_from_free_text() {
        let map = parse_json_object("Sure. {\"can_proceed\": true} Done.").unwrap();
        assert_eq!(map["can_proceed"], Value::Bool(true));
        assert!(parse_json_object("no json here").is_none());
        assert!(parse_json_object("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_parse_interrogation_with_questions() {
        let text = r#"```json
{
  "can_proceed": false,
  "reasoning": "Glycemic control unknown",
  "questions": [
    {"question_id": "hba1c", "question_text": "Latest HbA1c?", "question_type": "numeric", "priority": 1},
    {"question_text": "Smoker?", "question_type": "multiple_choice", "options": ["yes"]},
    {"question_type": "open"}
  ]
}
```"#;
        let outcome = parse_interrogation(text).unwrap();
        assert!(!outcome.can_proceed);
        assert_eq!(outcome.questions.len(), 2);
        assert_eq!(outcome.questions[0].question_id, "hba1c");
        assert_eq!(outcome.questions[0].priority, 1);
        assert_eq!(outcome.questions[1].question_id, "q2");
        assert_eq!(outcome.questions[1].question_type, "open");
        assert!(outcome.questions[1].options.is_empty());
    }

    #[test]
    fn test_parse_interrogation_infers_can_proceed() {
        let outcome = parse_interrogation(r#"{"questions": []}"#).unwrap();
        assert!(outcome.can_proceed);
        let outcome = parse_interrogation(r#"{"questions": ["Age?"]}"#).unwrap();
        assert!(!outcome.can_proceed);
    }

    #[test]
    fn test_parse_triage_escalation() {
        let text = r#"{"can_answer_directly": false, "required_specialists": ["Cardiology", "cardiology ", "Pharmacology"], "estimated_complexity": 1.7, "reasoning": "QT risk"}"#;
        let decision = parse_triage(text).unwrap();
        assert!(!decision.can_answer_directly);
        assert_eq!(
            decision.required_experts,
            vec![ExpertId::new("cardiology"), ExpertId::new("pharmacology")]
        );
        assert_eq!(decision.estimated_complexity, 1.0);
        assert_eq!(decision.reasoning, "QT risk");
    }

    #[test]
    fn test_parse_triage_direct() {
        let text = r#"{"can_answer_directly": true, "direct_response": "Yes, with monitoring."}"#;
        let decision = parse_triage(text).unwrap();
        assert!(decision.can_answer_directly);
        assert_eq!(decision.direct_response.as_deref(), Some("Yes, with monitoring."));
    }

    #[test]
    fn test_parse_triage_requires_decision() {
        assert!(parse_triage(r#"{"reasoning": "hmm"}"#).is_none());
        assert!(parse_triage("I think we need cardiology").is_none());
    }

    #[test]
    fn test_parse_interconsultation() {
        let text = r#"{"specific_question": "Is QT prolongation a concern?", "relevant_context": {"key_data": "QTc 470ms"}}"#;
        let draft = parse_interconsultation(text).unwrap();
        assert_eq!(draft.question, "Is QT prolongation a concern?");
        assert_eq!(draft.context["key_data"], "QTc 470ms");
        assert!(parse_interconsultation(r#"{"relevant_context": {}}"#).is_none());
    }

    #[test]
    fn test_parse_expert_evaluation() {
        let text = r#"```json
{"evaluation": "Low risk", "response": "Sertraline is acceptable", "clinical_reasoning": "SSRIs with minimal QT effect",
 "recommendations": ["Baseline ECG", "Monitor glucose"], "evidence_level": "B", "confidence": 0.8}
```"#;
        let eval = parse_expert_evaluation(text);
        assert_eq!(eval.assessment, "Low risk");
        assert_eq!(eval.answer, "Sertraline is acceptable");
        assert_eq!(eval.recommendations.len(), 2);
        assert_eq!(eval.evidence_level, "B");
        assert_eq!(eval.confidence, Some(0.8));
    }

    #[test]
    fn test_parse_expert_confidence_level_words() {
        let eval = parse_expert_evaluation(r#"{"evaluation": "e", "response": "r", "confidence_level": "Medium"}"#);
        assert_eq!(eval.confidence, Some(0.6));
    }

    #[test]
    fn test_parse_expert_evaluation_fallback() {
        let eval = parse_expert_evaluation("Plain prose without structure.");
        assert_eq!(eval.assessment, "Expert response could not be parsed");
        assert_eq!(eval.reasoning, "Plain prose without structure.");
        assert_eq!(eval.evidence_level, "unknown");
    }

    #[test]
    fn test_parse_integration() {
        let text = r#"{"general_summary": "S", "final_response": "A", "management_plan": ["Step 1"], "recommended_followup": null}"#;
        let draft = parse_integration(text).unwrap();
        assert_eq!(draft.summary, "S");
        assert_eq!(draft.answer, "A");
        assert_eq!(draft.management_plan, vec!["Step 1"]);
        assert!(draft.followup.is_none());

        let raw = parse_integration("Just prose.").unwrap();
        assert_eq!(raw.answer, "Just prose.");
        assert!(parse_integration("   ").is_none());
        assert!(parse_integration(r#"{"general_summary": "S"}"#).is_none());
    }
}
