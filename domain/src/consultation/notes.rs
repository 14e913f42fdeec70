//! Rendering of the complete clinical notes attached to a final result.

use super::context::describe_map;
use super::entities::FinalResult;
use super::record::ConsultationRecord;

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- None".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the consultation as a markdown document.
///
/// Sections: request, context, triage, one block per expert
/// interconsultation (question and answer), limitations, final answer.
pub fn render_notes(record: &ConsultationRecord, result: &FinalResult) -> String {
    let mut out = String::new();

    out.push_str("# Consultation Notes\n\n");
    out.push_str(&format!("Consultation: {}\n", record.id()));
    out.push_str(&format!("Opened: {}\n\n", record.created_at().to_rfc3339()));

    out.push_str("## Request\n\n");
    out.push_str(record.request().content());
    out.push_str("\n\n## Context\n\n");
    out.push_str(&describe_map(&record.effective_context()));
    out.push_str("\n\n");

    if let Some(triage) = record.triage() {
        out.push_str("## Triage\n\n");
        let route = if triage.can_answer_directly {
            "answered directly".to_string()
        } else {
            let experts: Vec<&str> = triage.required_experts.iter().map(|e| e.as_str()).collect();
            format!("escalated to {}", experts.join(", "))
        };
        out.push_str(&format!(
            "Decision: {} (complexity {:.2})\n",
            route, triage.estimated_complexity
        ));
        if !triage.reasoning.is_empty() {
            out.push_str(&format!("Reasoning: {}\n", triage.reasoning));
        }
        out.push('\n');
    }

    for task in record.tasks() {
        out.push_str(&format!("## Interconsultation: {}\n\n", task.expert));
        out.push_str(&format!("Question: {}\n\n", task.question));
        match record.results().iter().find(|r| r.task_id == task.id) {
            Some(result) => {
                let eval = &result.evaluation;
                out.push_str(&format!("Assessment: {}\n\n", eval.assessment));
                out.push_str(&format!("Answer: {}\n\n", eval.answer));
                if !eval.reasoning.is_empty() {
                    out.push_str(&format!("Reasoning: {}\n\n", eval.reasoning));
                }
                out.push_str("Recommendations:\n");
                out.push_str(&bullet_list(&eval.recommendations));
                out.push_str(&format!("\n\nEvidence level: {}\n", eval.evidence_level));
                if let Some(confidence) = eval.confidence {
                    out.push_str(&format!("Confidence: {:.0}%\n", confidence * 100.0));
                }
                if !eval.citations.is_empty() {
                    out.push_str("Sources:\n");
                    for citation in &eval.citations {
                        match &citation.reference {
                            Some(reference) => {
                                out.push_str(&format!("- {} ({})\n", citation.title, reference))
                            }
                            None => out.push_str(&format!("- {}\n", citation.title)),
                        }
                    }
                }
            }
            None => out.push_str("No answer was obtained.\n"),
        }
        out.push('\n');
    }

    if !result.limitations.is_empty() {
        out.push_str("## Limitations\n\n");
        out.push_str(&bullet_list(&result.limitations));
        out.push_str("\n\n");
    }

    out.push_str("## Final Answer\n\n");
    if !result.summary.is_empty() {
        out.push_str(&format!("{}\n\n", result.summary));
    }
    out.push_str(&result.answer);
    out.push('\n');

    if !result.management_plan.is_empty() {
        out.push_str("\n### Management Plan\n\n");
        out.push_str(&bullet_list(&result.management_plan));
        out.push('\n');
    }
    if let Some(followup) = &result.followup {
        out.push_str(&format!("\n### Follow-up\n\n{}\n", followup));
    }

    out
}
