//! Console output formatter for consultation records

use colored::Colorize;
use crew_domain::{Citation, ConsultationRecord, FinalResult, OutputFormat, Phase};

/// Formats consultation records for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Force colors off (or back to terminal detection) for all output
    pub fn set_color(enabled: bool) {
        if enabled {
            colored::control::unset_override();
        } else {
            colored::control::set_override(false);
        }
    }

    /// Render a record in the requested format.
    ///
    /// Records that paused for information or failed are rendered the same
    /// way for `full` and `answer`; `json` always dumps the record.
    pub fn render(record: &ConsultationRecord, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => Self::format_json(record),
            _ if record.is_awaiting_information() => Self::format_pending(record),
            _ if record.phase() == Phase::Error => Self::format_failure(record),
            OutputFormat::Full => Self::format(record),
            OutputFormat::Answer => Self::format_answer_only(record),
        }
    }

    /// Format the complete consultation
    pub fn format(record: &ConsultationRecord) -> String {
        let mut output = String::new();

        output.push_str(&Self::header("Clinical Consultation"));
        output.push('\n');
        output.push_str(&format!("{} {}\n", "Consultation:".cyan().bold(), record.id()));
        output.push_str(&format!(
            "{} {}\n\n",
            "Phase:".cyan().bold(),
            record.phase().display_name()
        ));

        match record.final_result() {
            Some(result) => {
                output.push_str(&result.notes);
                output.push('\n');
                if !result.management_plan.is_empty() {
                    output.push_str(&Self::section_header("Management Plan"));
                    output.push_str(&Self::bullets(&result.management_plan));
                }
                if !result.sources.is_empty() {
                    output.push_str(&Self::section_header("Sources"));
                    output.push_str(&Self::sources(&result.sources));
                }
            }
            None => output.push_str(&format!("{}\n", "No final result.".dimmed())),
        }

        output.push_str(&Self::footer());
        output
    }

    /// Format as JSON
    pub fn format_json(record: &ConsultationRecord) -> String {
        serde_json::to_string_pretty(record).unwrap_or_else(|_| "{}".to_string())
    }

    /// Format the final answer only (concise output)
    pub fn format_answer_only(record: &ConsultationRecord) -> String {
        let Some(result) = record.final_result() else {
            return format!("{}\n", "No final result.".dimmed());
        };
        let mut output = String::new();

        output.push_str(&format!("{}\n\n", "=== Clinical Answer ===".cyan().bold()));
        output.push_str(&format!("{} {}\n\n", "Q:".bold(), record.request().content()));
        output.push_str(&Self::consulted(result));

        output.push_str(&result.answer);
        output.push('\n');

        if !result.management_plan.is_empty() {
            output.push_str(&format!("\n{}\n", "Plan:".cyan().bold()));
            output.push_str(&Self::bullets(&result.management_plan));
        }
        if let Some(followup) = &result.followup {
            output.push_str(&format!("\n{} {}\n", "Follow-up:".cyan().bold(), followup));
        }
        if !result.limitations.is_empty() {
            output.push_str(&format!("\n{}\n", "Limitations:".yellow().bold()));
            output.push_str(&Self::bullets(&result.limitations));
        }
        if !result.sources.is_empty() {
            output.push_str(&format!(
                "\n{} {}\n",
                "Sources:".dimmed(),
                result.sources.len()
            ));
        }

        output
    }

    /// Questions the consultation is waiting on
    pub fn format_pending(record: &ConsultationRecord) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "{}\n\n",
            "=== More information needed ===".yellow().bold()
        ));

        let mut questions = record.pending_questions().to_vec();
        questions.sort_by_key(|q| q.priority);
        for question in &questions {
            output.push_str(&format!(
                "  [{}] {} {}\n",
                question.priority,
                question.question_id.bold(),
                question.question_text
            ));
            if !question.options.is_empty() {
                output.push_str(&format!("      options: {}\n", question.options.join(", ")));
            }
            if !question.context.is_empty() {
                output.push_str(&format!("      {}\n", question.context.dimmed()));
            }
        }

        output.push_str(&format!(
            "\nAnswer with {} or resume consultation {} with {}.\n",
            "--answer <id>=<value>".bold(),
            record.id(),
            "--resume".bold()
        ));
        output
    }

    pub fn format_failure(record: &ConsultationRecord) -> String {
        format!(
            "{} {}\n",
            "Consultation failed:".red().bold(),
            record.error().unwrap_or("unknown error")
        )
    }

    fn consulted(result: &FinalResult) -> String {
        if result.contributing_experts.is_empty() {
            return format!("{}\n\n", "Answered directly".dimmed());
        }
        let experts: Vec<&str> = result
            .contributing_experts
            .iter()
            .map(|e| e.as_str())
            .collect();
        format!(
            "{} {}\n\n",
            "Experts consulted:".dimmed(),
            experts.join(", ")
        )
    }

    fn sources(sources: &[Citation]) -> String {
        sources
            .iter()
            .map(|source| match &source.reference {
                Some(reference) if reference != &source.title => {
                    format!("  * {} ({})\n", source.title, reference.dimmed())
                }
                _ => format!("  * {}\n", source.title),
            })
            .collect()
    }

    fn bullets(items: &[String]) -> String {
        items.iter().map(|item| format!("  * {}\n", item)).collect()
    }

    fn header(title: &str) -> String {
        let line = "=".repeat(60);
        format!("{}\n{:^60}\n{}", line.cyan(), title.bold(), line.cyan())
    }

    fn section_header(title: &str) -> String {
        format!("\n{}\n{}\n", title.cyan().bold(), "-".repeat(40))
    }

    fn footer() -> String {
        format!("\n{}\n", "=".repeat(60).cyan())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crew_domain::{
        ExpertId, InterrogationQuestion, RequestContext, RequestText, TriageDecision,
    };

    fn record() -> ConsultationRecord {
        ConsultationRecord::new(
            RequestText::try_new("Apixaban dose in CKD?").unwrap(),
            RequestContext::default(),
        )
    }

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_answer_lists_limitations() {
        plain();
        let mut rec = record();
        rec.record_interrogation(Vec::new(), true, "enough").unwrap();
        let mut result = FinalResult::new("summary", "Use 2.5 mg twice daily.");
        result.limitations =
            vec!["The pharmacology evaluation could not be obtained: timed out".to_string()];
        result.contributing_experts = vec![ExpertId::new("cardiology")];
        rec.record_direct_answer(
            TriageDecision {
                can_answer_directly: true,
                required_experts: vec![],
                reasoning: String::new(),
                estimated_complexity: 0.2,
                direct_response: Some("2.5 mg twice daily".to_string()),
            },
            result,
        )
        .unwrap();

        let output = ConsoleFormatter::render(&rec, OutputFormat::Answer);

        assert!(output.contains("Use 2.5 mg twice daily."));
        assert!(output.contains("Experts consulted: cardiology"));
        assert!(output.contains("Limitations:"));
        assert!(output.contains("timed out"));
    }

    #[test]
    fn test_pending_questions_are_sorted_by_priority() {
        plain();
        let mut rec = record();
        let question = |id: &str, priority: u8| InterrogationQuestion {
            question_id: id.to_string(),
            question_text: format!("What is the {}?", id),
            question_type: "numeric".to_string(),
            priority,
            context: String::new(),
            options: Vec::new(),
        };
        rec.record_interrogation(vec![question("weight", 3), question("egfr", 1)], false, "missing")
            .unwrap();

        let output = ConsoleFormatter::render(&rec, OutputFormat::Full);

        let egfr = output.find("egfr").unwrap();
        let weight = output.find("weight").unwrap();
        assert!(egfr < weight);
        assert!(output.contains("--answer <id>=<value>"));
    }

    #[test]
    fn test_failure_and_json() {
        plain();
        let mut rec = record();
        rec.fail("evaluate", "All experts failed: timeout").unwrap();

        assert!(ConsoleFormatter::render(&rec, OutputFormat::Answer).contains("All experts failed"));
        let json: serde_json::Value =
            serde_json::from_str(&ConsoleFormatter::render(&rec, OutputFormat::Json)).unwrap();
        assert_eq!(json["phase"], "error");
    }
}
