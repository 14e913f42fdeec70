//! Prompt templates for each consultation step
//!
//! Every prompt starts with a `## Task: <name>` header line so that
//! generation backends (and test doubles) can tell the steps apart.

use crate::consultation::entities::{ExpertTaskResult, InterrogationQuestion};
use crate::expert::ExpertProfile;

/// Templates for generating prompts at each step
pub struct PromptTemplate;

impl PromptTemplate {
    pub const INTERROGATION: &'static str = "interrogation";
    pub const EVALUATION: &'static str = "evaluation";
    pub const INTERCONSULTATION: &'static str = "interconsultation";
    pub const EXPERT_EVALUATION: &'static str = "expert_evaluation";
    pub const INTEGRATION: &'static str = "integration";

    fn header(task: &str) -> String {
        format!("## Task: {}\n\n", task)
    }

    /// Task name from a prompt's header line
    pub fn task_of(prompt: &str) -> Option<&str> {
        prompt
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("## Task: "))
            .map(str::trim)
    }

    fn roster_lines(roster: &[ExpertProfile]) -> String {
        roster
            .iter()
            .map(|p| format!("- {} ({})", p.id, p.display_name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Ask which facts are missing before the request can be evaluated
    pub fn interrogation(request: &str, context: &str, round: u32) -> String {
        let mut prompt = Self::header(Self::INTERROGATION);
        prompt.push_str(&format!(
            r#"You are a general practitioner gathering complete information before evaluating a consultation.

CONSULTATION:
{request}

CURRENT CONTEXT:
{context}

Interrogation round: {round}

Identify the information that is missing and critical for a safe evaluation.
Rules:
1. Ask at most 7 questions, prioritized 1 (most critical) to 5.
2. Use question_type "open", "numeric" or "multiple_choice" (with options).
3. Do not ask for information already present in the context.
4. Set can_proceed to true when the context is sufficient.

Respond in JSON:
```json
{{
  "questions": [
    {{"question_id": "q1", "question_text": "...", "question_type": "numeric", "priority": 1, "context": "why it is needed"}}
  ],
  "can_proceed": false,
  "reasoning": "..."
}}
```"#
        ));
        prompt
    }

    /// Triage: answer directly or escalate to experts
    pub fn evaluation(request: &str, context: &str, roster: &[ExpertProfile]) -> String {
        let mut prompt = Self::header(Self::EVALUATION);
        prompt.push_str(&format!(
            r#"You are a general practitioner coordinating multidisciplinary care.

CONSULTATION:
{request}

CONTEXT:
{context}

Decide whether you can answer directly or need specialist interconsultation.
Escalate when the question needs deep specialist knowledge, specific
diagnostic criteria, complex drug interactions, or specialized evidence.

AVAILABLE EXPERTS:
{experts}

Respond in JSON:
```json
{{
  "can_answer_directly": false,
  "reasoning": "...",
  "estimated_complexity": 0.0,
  "required_experts": ["cardiology"],
  "direct_response": "complete answer when can_answer_directly is true"
}}
```"#,
            experts = Self::roster_lines(roster),
        ));
        prompt
    }

    /// Draft the specific question and context for one expert
    pub fn interconsultation(expert: &ExpertProfile, request: &str, context: &str) -> String {
        let mut prompt = Self::header(Self::INTERCONSULTATION);
        prompt.push_str(&format!(
            r#"Expert: {id}

You are a general practitioner writing an interconsultation note for {name}.

ORIGINAL CONSULTATION:
{request}

CONTEXT:
{context}

Write one specific question for the expert and include only the context
pertinent to this specialty. Use only data present in the context above;
never invent values.

Respond in JSON:
```json
{{
  "specific_question": "...",
  "relevant_context": {{"background": "...", "key_data": "...", "expectation": "..."}}
}}
```"#,
            id = expert.id,
            name = expert.display_name,
        ));
        prompt
    }

    /// Expert evaluation of one interconsultation
    pub fn expert_evaluation(
        expert: &ExpertProfile,
        question: &str,
        task_context: &str,
        knowledge: &str,
        literature: &str,
    ) -> String {
        let mut prompt = Self::header(Self::EXPERT_EVALUATION);
        prompt.push_str(&format!(
            r#"Expert: {id}

{instruction}

INTERCONSULTATION QUESTION:
{question}

CASE CONTEXT:
{task_context}

KNOWLEDGE BASE:
{knowledge}

LITERATURE:
{literature}

Answer from your specialty's perspective using the evidence above. Work with
the information provided and state its limitations instead of requesting more.

Respond in JSON:
```json
{{
  "evaluation": "...",
  "clinical_reasoning": "...",
  "response": "direct answer to the question",
  "recommendations": ["..."],
  "evidence_level": "High | Moderate | Low | Expert Opinion",
  "confidence": 0.0
}}
```"#,
            id = expert.id,
            instruction = expert.system_instruction,
        ));
        prompt
    }

    /// Merge expert evaluations into the final answer
    pub fn integration(
        request: &str,
        context: &str,
        results: &[ExpertTaskResult],
        limitations: &[String],
    ) -> String {
        let mut prompt = Self::header(Self::INTEGRATION);
        prompt.push_str(&format!(
            "You are a general practitioner integrating specialist responses.\n\n\
             ORIGINAL CONSULTATION:\n{}\n\nCONTEXT:\n{}\n\nEXPERT RESPONSES:\n",
            request, context
        ));

        for (i, result) in results.iter().enumerate() {
            let eval = &result.evaluation;
            prompt.push_str(&format!(
                "\n[Expert {}: {}]\nEvaluation: {}\nReasoning: {}\nAnswer: {}\nRecommendations:\n{}\nEvidence level: {}\n",
                i + 1,
                result.expert,
                eval.assessment,
                eval.reasoning,
                eval.answer,
                if eval.recommendations.is_empty() {
                    "- None".to_string()
                } else {
                    eval.recommendations
                        .iter()
                        .map(|r| format!("- {}", r))
                        .collect::<Vec<_>>()
                        .join("\n")
                },
                eval.evidence_level,
            ));
            for citation in &eval.citations {
                prompt.push_str(&format!("Source: {}\n", citation.title));
            }
        }

        if !limitations.is_empty() {
            prompt.push_str("\nLIMITATIONS (experts that could not be consulted):\n");
            for limitation in limitations {
                prompt.push_str(&format!("- {}\n", limitation));
            }
        }

        prompt.push_str(
            r#"
Directly answer the original question, synthesize the expert contributions,
note disagreements and limitations, and give a prioritized plan.

Respond in JSON:
```json
{
  "general_summary": "...",
  "final_response": "...",
  "management_plan": ["Step 1", "Step 2"],
  "recommended_followup": "..."
}
```"#,
        );
        prompt
    }

    /// Render pending questions for a requester
    pub fn pending_questions(questions: &[InterrogationQuestion]) -> String {
        let mut sorted: Vec<&InterrogationQuestion> = questions.iter().collect();
        sorted.sort_by_key(|q| q.priority);
        sorted
            .iter()
            .map(|q| {
                let mut line = format!("[{}] {}", q.question_id, q.question_text);
                if !q.options.is_empty() {
                    line.push_str(&format!(" ({})", q.options.join(" / ")));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_prompt_carries_task_header() {
        let roster = ExpertProfile::default_roster();
        let cardio = &roster[0];
        let prompts = [
            (PromptTemplate::interrogation("q", "c", 1), PromptTemplate::INTERROGATION),
            (PromptTemplate::evaluation("q", "c", &roster), PromptTemplate::EVALUATION),
            (
                PromptTemplate::interconsultation(cardio, "q", "c"),
                PromptTemplate::INTERCONSULTATION,
            ),
            (
                PromptTemplate::expert_evaluation(cardio, "q", "c", "k", "l"),
                PromptTemplate::EXPERT_EVALUATION,
            ),
            (PromptTemplate::integration("q", "c", &[], &[]), PromptTemplate::INTEGRATION),
        ];
        for (prompt, task) in prompts {
            assert_eq!(PromptTemplate::task_of(&prompt), Some(task));
        }
    }

    #[test]
    fn test_evaluation_lists_roster() {
        let prompt = PromptTemplate::evaluation("q", "c", &ExpertProfile::default_roster());
        assert!(prompt.contains("- cardiology (Cardiology)"));
        assert!(prompt.contains("- pharmacology (Clinical Pharmacology)"));
    }

    #[test]
    fn test_expert_prompt_names_expert() {
        let roster = ExpertProfile::default_roster();
        let prompt = PromptTemplate::expert_evaluation(&roster[1], "HbA1c target?", "c", "k", "l");
        assert!(prompt.contains("Expert: endocrinology"));
        assert!(prompt.contains("HbA1c target?"));
    }

    #[test]
    fn test_pending_questions_sorted_by_priority() {
        let mut low = InterrogationQuestion::new("q2", "Smoker?");
        low.priority = 4;
        let mut high = InterrogationQuestion::new("q1", "HbA1c?");
        high.priority = 1;
        let text = PromptTemplate::pending_questions(&[low, high]);
        assert_eq!(text, "[q1] HbA1c?\n[q2] Smoker?");
    }

    #[test]
    fn test_task_of_rejects_plain_text() {
        assert_eq!(PromptTemplate::task_of("hello"), None);
    }
}
