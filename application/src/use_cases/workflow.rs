//! Consultation workflow: the driver loop and one node function per phase.
//!
//! The driver loads the record, runs the node for its current phase,
//! and repeats until the record is sealed or the workflow pauses for
//! supplied information. Each node persists its own mutation, so every
//! transition is durable before the next node starts and the status seen
//! by readers is always the last persisted phase.
//!
//! Node errors are recorded on the durable record (phase `error`) and then
//! returned to the caller.

use super::expert_worker::{ExpertContext, evaluate_expert};
use super::fan_out::{FanOutError, FanOutExecutor, TaskFailure};
use crate::config::{PartialFailurePolicy, WorkflowParams};
use crate::event_bus::EventBus;
use crate::ports::consultation_store::{ConsultationStore, StoreError};
use crate::resilience::{KnowledgeAdapter, LiteratureAdapter, ResilientGenerator};
use crew_domain::consultation::context::describe_map;
use crew_domain::{
    Citation, ConsultationId, ConsultationRecord, DomainError, EventKind, ExpertId, ExpertProfile,
    ExpertTaskDescriptor, ExternalFailure, FinalResult, InterrogationOutcome, Phase, PromptTemplate,
    find_profile, parse_integration, parse_interconsultation, parse_interrogation, parse_triage,
};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Attempts at persisting the error phase when the record moved underneath
const FAILURE_SAVE_ATTEMPTS: usize = 3;

/// Errors surfaced to callers of the workflow
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Transient external failure: {0}")]
    TransientExternalFailure(String),

    #[error("External service failed: {0}")]
    TerminalExternalFailure(String),

    #[error("{} expert(s) failed while {succeeded} succeeded: {}", .failed.len(), .failed.join("; "))]
    PartialFanOutFailure {
        succeeded: usize,
        failed: Vec<String>,
    },

    #[error("All experts failed: {}", .failed.join("; "))]
    TotalFanOutFailure { failed: Vec<String> },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Concurrent write on consultation {id}: expected version {expected}, found {actual}")]
    PersistenceConflict {
        id: ConsultationId,
        expected: u64,
        actual: u64,
    },

    #[error("Consultation not found: {0}")]
    NotFound(ConsultationId),

    #[error("Consultation {0} is already running")]
    AlreadyRunning(ConsultationId),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("cancelled")]
    Cancelled,
}

impl WorkflowError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkflowError::Cancelled)
    }
}

impl From<ExternalFailure> for WorkflowError {
    fn from(e: ExternalFailure) -> Self {
        match e {
            ExternalFailure::Transient(m) => WorkflowError::TransientExternalFailure(m),
            ExternalFailure::Terminal(m) => WorkflowError::TerminalExternalFailure(m),
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => WorkflowError::NotFound(id),
            StoreError::Conflict {
                id,
                expected,
                actual,
            } => WorkflowError::PersistenceConflict {
                id,
                expected,
                actual,
            },
            StoreError::Io(m) | StoreError::Serialization(m) => WorkflowError::Storage(m),
        }
    }
}

impl From<DomainError> for WorkflowError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Cancelled => WorkflowError::Cancelled,
            DomainError::InvalidRequest(m) => WorkflowError::InvalidRequest(m),
            other => WorkflowError::InvalidStateTransition(other.to_string()),
        }
    }
}

fn describe_failures(failures: &[TaskFailure]) -> Vec<String> {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.expert, f.cause.message()))
        .collect()
}

/// What a node did to the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Persisted a mutation; run the next node
    Advanced,
    /// Waiting for supplied information
    Paused,
    /// Record sealed as completed
    Finished,
}

/// Trace step name of the node that will run next for `record`
pub fn next_step(record: &ConsultationRecord) -> &'static str {
    match record.phase() {
        Phase::Interrogating => "interrogate",
        Phase::Evaluating => "evaluate",
        Phase::Interconsulting if record.tasks().is_empty() => "plan_interconsultations",
        Phase::Interconsulting => "execute_experts",
        Phase::Integrating => "integrate",
        Phase::Completed | Phase::Error => "sealed",
    }
}

/// Drives consultations through their phases
pub struct ConsultationWorkflow {
    store: Arc<dyn ConsultationStore>,
    generator: Arc<ResilientGenerator>,
    knowledge: Arc<KnowledgeAdapter>,
    literature: Option<Arc<LiteratureAdapter>>,
    roster: Arc<Vec<ExpertProfile>>,
    params: WorkflowParams,
    bus: EventBus,
}

impl ConsultationWorkflow {
    pub fn new(
        store: Arc<dyn ConsultationStore>,
        generator: Arc<ResilientGenerator>,
        knowledge: Arc<KnowledgeAdapter>,
        bus: EventBus,
    ) -> Self {
        Self {
            store,
            generator,
            knowledge,
            literature: None,
            roster: Arc::new(ExpertProfile::default_roster()),
            params: WorkflowParams::default(),
            bus,
        }
    }

    pub fn with_literature(mut self, literature: Arc<LiteratureAdapter>) -> Self {
        self.literature = Some(literature);
        self
    }

    pub fn with_roster(mut self, roster: Vec<ExpertProfile>) -> Self {
        self.roster = Arc::new(roster);
        self
    }

    pub fn with_params(mut self, params: WorkflowParams) -> Self {
        self.params = params;
        self
    }

    pub fn store(&self) -> &Arc<dyn ConsultationStore> {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn params(&self) -> &WorkflowParams {
        &self.params
    }

    pub fn roster(&self) -> &[ExpertProfile] {
        &self.roster
    }

    /// Run a consultation until it is sealed or paused for information.
    ///
    /// A record that is already sealed is returned unchanged.
    pub async fn run(
        &self,
        id: &ConsultationId,
        cancel: &CancellationToken,
    ) -> Result<ConsultationRecord, WorkflowError> {
        let mut record = self.store.get(id).await?;

        loop {
            if record.is_sealed() {
                return Ok(record);
            }

            let step = next_step(&record);
            debug!(consultation = %id, phase = %record.phase(), step, "Running node");

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(WorkflowError::Cancelled),
                outcome = self.run_node(&mut record, cancel) => outcome,
            };

            match outcome {
                Ok(NodeOutcome::Advanced) => {}
                Ok(NodeOutcome::Paused) | Ok(NodeOutcome::Finished) => return Ok(record),
                Err(e) => return Err(self.record_failure(id, step, e).await),
            }
        }
    }

    async fn run_node(
        &self,
        record: &mut ConsultationRecord,
        cancel: &CancellationToken,
    ) -> Result<NodeOutcome, WorkflowError> {
        match record.phase() {
            Phase::Interrogating => self.interrogate(record).await,
            Phase::Evaluating => self.evaluate(record).await,
            Phase::Interconsulting if record.tasks().is_empty() => {
                self.plan_interconsultations(record).await
            }
            Phase::Interconsulting => self.execute_experts(record, cancel).await,
            Phase::Integrating => self.integrate(record).await,
            Phase::Completed | Phase::Error => Ok(NodeOutcome::Finished),
        }
    }

    // ==================== Nodes ====================

    /// Ask which facts are missing; pause when the requester must answer
    async fn interrogate(&self, record: &mut ConsultationRecord) -> Result<NodeOutcome, WorkflowError> {
        let round = record.interrogation_rounds() + 1;
        self.emit(
            record.id(),
            EventKind::Interrogating,
            json!({ "round": round, "message": "Checking whether information is missing" }),
        );

        if record.interrogation_rounds() >= self.params.max_interrogation_rounds {
            info!(consultation = %record.id(), round, "Interrogation round limit reached, proceeding");
            record.record_interrogation(Vec::new(), true, "interrogation round limit reached")?;
            self.persist(record).await?;
            return Ok(NodeOutcome::Advanced);
        }

        let prompt = PromptTemplate::interrogation(
            record.request().content(),
            &describe_map(&record.effective_context()),
            round,
        );
        let response = self.generator.generate(&prompt).await?;

        let outcome = parse_interrogation(&response).unwrap_or_else(|| {
            warn!(consultation = %record.id(), "Interrogation response not parseable, proceeding");
            InterrogationOutcome {
                can_proceed: true,
                questions: Vec::new(),
                reasoning: String::new(),
            }
        });

        if outcome.can_proceed || outcome.questions.is_empty() {
            record.record_interrogation(Vec::new(), true, &outcome.reasoning)?;
            self.persist(record).await?;
            return Ok(NodeOutcome::Advanced);
        }

        info!(
            consultation = %record.id(),
            questions = outcome.questions.len(),
            "Pausing for missing information"
        );
        record.record_interrogation(outcome.questions, false, &outcome.reasoning)?;
        self.persist(record).await?;
        self.emit(
            record.id(),
            EventKind::QuestionsRaised,
            json!({
                "questions": record.pending_questions(),
                "reasoning": outcome.reasoning,
                "message": PromptTemplate::pending_questions(record.pending_questions()),
            }),
        );
        Ok(NodeOutcome::Paused)
    }

    /// Triage: answer directly or escalate
    async fn evaluate(&self, record: &mut ConsultationRecord) -> Result<NodeOutcome, WorkflowError> {
        self.emit(
            record.id(),
            EventKind::Evaluating,
            json!({ "message": "Deciding whether expert interconsultation is needed" }),
        );

        let prompt = PromptTemplate::evaluation(
            record.request().content(),
            &describe_map(&record.effective_context()),
            &self.roster,
        );
        let response = self.generator.generate(&prompt).await?;
        let decision = parse_triage(&response).ok_or_else(|| {
            WorkflowError::TerminalExternalFailure(
                "triage response did not contain a decision".to_string(),
            )
        })?;

        if decision.can_answer_directly {
            let answer = decision
                .direct_response
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .ok_or_else(|| {
                    WorkflowError::TerminalExternalFailure(
                        "triage chose a direct answer but returned none".to_string(),
                    )
                })?
                .to_string();

            info!(consultation = %record.id(), "Answering directly without escalation");
            let result = FinalResult::new(decision.reasoning.clone(), answer);
            record.record_direct_answer(decision, result)?;
            self.persist(record).await?;
            self.emit_completed(record);
            return Ok(NodeOutcome::Finished);
        }

        info!(
            consultation = %record.id(),
            experts = ?decision.required_experts,
            "Escalating to experts"
        );
        record.record_escalation(decision)?;
        self.persist(record).await?;
        Ok(NodeOutcome::Advanced)
    }

    /// Draft one specific question per known expert and persist the tasks
    async fn plan_interconsultations(
        &self,
        record: &mut ConsultationRecord,
    ) -> Result<NodeOutcome, WorkflowError> {
        let required: Vec<ExpertId> = record
            .triage()
            .map(|t| t.required_experts.clone())
            .unwrap_or_default();

        let mut profiles: Vec<&ExpertProfile> = Vec::new();
        for expert in &required {
            match find_profile(&self.roster, expert) {
                Some(profile) => profiles.push(profile),
                None => warn!(consultation = %record.id(), %expert, "Unknown expert requested, skipping"),
            }
        }
        if profiles.is_empty() {
            return Err(WorkflowError::TerminalExternalFailure(format!(
                "triage requested no known experts ({})",
                required.iter().map(ExpertId::as_str).collect::<Vec<_>>().join(", ")
            )));
        }

        let request = record.request().content().to_string();
        let base_context = record.effective_context();
        let context_text = describe_map(&base_context);
        let triage_reasoning = record
            .triage()
            .map(|t| t.reasoning.clone())
            .unwrap_or_default();

        let drafts = futures::future::join_all(
            profiles
                .iter()
                .map(|profile| self.draft_interconsultation(profile, &request, &context_text)),
        )
        .await;

        let tasks: Vec<ExpertTaskDescriptor> = profiles
            .iter()
            .zip(drafts)
            .map(|(profile, (question, extra))| {
                let mut context = base_context.clone();
                context.extend(extra);
                if !triage_reasoning.is_empty() {
                    context.insert("triage_reasoning".to_string(), json!(triage_reasoning));
                }
                ExpertTaskDescriptor::new(profile.id.clone(), question, context)
            })
            .collect();

        record.record_tasks(tasks)?;
        self.persist(record).await?;

        for task in record.tasks() {
            self.emit(
                record.id(),
                EventKind::InterconsultationCreated,
                json!({
                    "specialty": task.expert,
                    "task_id": task.id,
                    "question": task.question,
                }),
            );
        }
        Ok(NodeOutcome::Advanced)
    }

    /// Question and extra context for one expert. Falls back to the
    /// original request when drafting fails.
    async fn draft_interconsultation(
        &self,
        profile: &ExpertProfile,
        request: &str,
        context_text: &str,
    ) -> (String, serde_json::Map<String, Value>) {
        let prompt = PromptTemplate::interconsultation(profile, request, context_text);
        match self.generator.generate(&prompt).await {
            Ok(response) => match parse_interconsultation(&response) {
                Some(draft) => (draft.question, draft.context),
                None => {
                    warn!(expert = %profile.id, "Interconsultation draft not parseable, using request");
                    (request.to_string(), serde_json::Map::new())
                }
            },
            Err(e) => {
                warn!(expert = %profile.id, error = %e, "Interconsultation drafting failed, using request");
                (request.to_string(), serde_json::Map::new())
            }
        }
    }

    /// Fan the planned tasks out and persist what came back
    async fn execute_experts(
        &self,
        record: &mut ConsultationRecord,
        cancel: &CancellationToken,
    ) -> Result<NodeOutcome, WorkflowError> {
        let ctx = Arc::new(ExpertContext {
            request_id: record.id().clone(),
            generator: Arc::clone(&self.generator),
            knowledge: Arc::clone(&self.knowledge),
            literature: self.literature.clone(),
            roster: Arc::clone(&self.roster),
            params: self.params.clone(),
            bus: self.bus.clone(),
        });

        let timeout = self.params.expert_timeout;
        let worker = move |task: ExpertTaskDescriptor, ctx: Arc<ExpertContext>| {
            let expert = task.expert.clone();
            async move {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, evaluate_expert(task, ctx))
                        .await
                        .unwrap_or_else(|_| {
                            Err(ExternalFailure::terminal(format!(
                                "{} evaluation timed out after {}s",
                                expert,
                                limit.as_secs()
                            )))
                        }),
                    None => evaluate_expert(task, ctx).await,
                }
            }
        };

        let executor = FanOutExecutor::new(self.params.max_parallel_experts);
        let outcome = executor
            .run_all(record.tasks().to_vec(), ctx, worker, cancel)
            .await;

        let (results, failures) = match outcome {
            Ok(results) => (results, Vec::new()),
            Err(FanOutError::Cancelled) => return Err(WorkflowError::Cancelled),
            Err(FanOutError::Total { failures }) => {
                self.emit_failures(record.id(), &failures);
                return Err(WorkflowError::TotalFanOutFailure {
                    failed: describe_failures(&failures),
                });
            }
            Err(FanOutError::Partial(partial)) => {
                self.emit_failures(record.id(), &partial.failures);
                if self.params.partial_failure == PartialFailurePolicy::RequireAll {
                    return Err(WorkflowError::PartialFanOutFailure {
                        succeeded: partial.results.len(),
                        failed: describe_failures(&partial.failures),
                    });
                }
                info!(
                    consultation = %record.id(),
                    succeeded = partial.results.len(),
                    failed = partial.failures.len(),
                    "Continuing with partial expert results"
                );
                (partial.results, partial.failures)
            }
        };

        let notes = failures.iter().map(TaskFailure::to_note).collect();
        record.record_fan_in(results, notes)?;
        self.persist(record).await?;
        Ok(NodeOutcome::Advanced)
    }

    /// Merge the expert results into the final answer
    async fn integrate(&self, record: &mut ConsultationRecord) -> Result<NodeOutcome, WorkflowError> {
        self.emit(
            record.id(),
            EventKind::Integrating,
            json!({
                "message": "Integrating expert responses",
                "results": record.results().len(),
            }),
        );

        let limitations: Vec<String> = record
            .failed_tasks()
            .iter()
            .map(|f| f.limitation())
            .collect();
        let prompt = PromptTemplate::integration(
            record.request().content(),
            &describe_map(&record.effective_context()),
            record.results(),
            &limitations,
        );
        let response = self.generator.generate(&prompt).await?;
        let draft = parse_integration(&response).ok_or_else(|| {
            WorkflowError::TerminalExternalFailure("integration returned no answer".to_string())
        })?;

        let mut result = FinalResult::new(draft.summary, draft.answer);
        result.management_plan = draft.management_plan;
        result.followup = draft.followup;
        result.contributing_experts = record.results().iter().map(|r| r.expert.clone()).collect();
        result.limitations = limitations;
        result.sources = merge_sources(record);

        record.complete(result)?;
        self.persist(record).await?;
        self.emit_completed(record);
        Ok(NodeOutcome::Finished)
    }

    // ==================== Helpers ====================

    async fn persist(&self, record: &mut ConsultationRecord) -> Result<(), WorkflowError> {
        let version = self.store.save(record).await?;
        record.set_version(version);
        Ok(())
    }

    /// Persist `error` on the latest snapshot, publish it, hand the error back
    async fn record_failure(
        &self,
        id: &ConsultationId,
        step: &str,
        error: WorkflowError,
    ) -> WorkflowError {
        let message = error.to_string();
        warn!(consultation = %id, step, error = %message, "Consultation failed");

        for _ in 0..FAILURE_SAVE_ATTEMPTS {
            let mut latest = match self.store.get(id).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(consultation = %id, error = %e, "Could not reload record to mark it failed");
                    break;
                }
            };
            if latest.fail(step, message.as_str()).is_err() {
                // Already sealed by someone else
                break;
            }
            match self.store.save(&latest).await {
                Ok(_) => break,
                Err(StoreError::Conflict { .. }) => continue,
                Err(e) => {
                    warn!(consultation = %id, error = %e, "Could not persist failure");
                    break;
                }
            }
        }

        self.emit(
            id,
            EventKind::Error,
            json!({ "message": message, "step": step }),
        );
        error
    }

    fn emit(&self, id: &ConsultationId, kind: EventKind, data: Value) {
        self.bus.emit(kind, id, data);
    }

    fn emit_completed(&self, record: &ConsultationRecord) {
        let experts: Vec<&str> = record
            .final_result()
            .map(|r| r.contributing_experts.iter().map(ExpertId::as_str).collect())
            .unwrap_or_default();
        self.emit(
            record.id(),
            EventKind::Completed,
            json!({
                "message": "Consultation completed",
                "phase": record.phase(),
                "contributing_experts": experts,
            }),
        );
    }

    fn emit_failures(&self, id: &ConsultationId, failures: &[TaskFailure]) {
        for failure in failures {
            self.emit(
                id,
                EventKind::SpecialistFailed,
                json!({
                    "specialty": failure.expert,
                    "task_id": failure.task_id,
                    "error": failure.cause.message(),
                }),
            );
        }
    }
}

/// Citations of every result, without repeats
fn merge_sources(record: &ConsultationRecord) -> Vec<Citation> {
    let mut sources: Vec<Citation> = Vec::new();
    for citation in record.results().iter().flat_map(|r| &r.evaluation.citations) {
        let duplicate = sources.iter().any(|s| {
            s.kind == citation.kind && s.title == citation.title && s.reference == citation.reference
        });
        if !duplicate {
            sources.push(citation.clone());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crew_domain::{
        ExpertEvaluation, ExpertTaskResult, RequestContext, RequestText, SourceKind,
        TriageDecision,
    };

    fn record() -> ConsultationRecord {
        ConsultationRecord::new(
            RequestText::try_new("Chest pain on exertion, next steps?").unwrap(),
            RequestContext::default(),
        )
    }

    #[test]
    fn test_next_step_follows_phase() {
        let mut record = record();
        assert_eq!(next_step(&record), "interrogate");
        record.record_interrogation(vec![], true, "").unwrap();
        assert_eq!(next_step(&record), "evaluate");
        record
            .record_escalation(TriageDecision::escalate(vec![ExpertId::new("cardiology")]))
            .unwrap();
        assert_eq!(next_step(&record), "plan_interconsultations");
        record
            .record_tasks(vec![ExpertTaskDescriptor::new(
                ExpertId::new("cardiology"),
                "q",
                Default::default(),
            )])
            .unwrap();
        assert_eq!(next_step(&record), "execute_experts");
    }

    #[test]
    fn test_error_conversions() {
        assert_eq!(
            WorkflowError::from(ExternalFailure::terminal("bad query")),
            WorkflowError::TerminalExternalFailure("bad query".to_string())
        );
        let conflict = StoreError::Conflict {
            id: ConsultationId::new("c"),
            expected: 1,
            actual: 2,
        };
        assert!(matches!(
            WorkflowError::from(conflict),
            WorkflowError::PersistenceConflict { expected: 1, actual: 2, .. }
        ));
        assert!(matches!(
            WorkflowError::from(DomainError::RecordSealed(Phase::Completed)),
            WorkflowError::InvalidStateTransition(_)
        ));
        assert!(WorkflowError::from(DomainError::Cancelled).is_cancelled());
        assert_eq!(WorkflowError::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_partial_failure_message_names_experts() {
        let error = WorkflowError::PartialFanOutFailure {
            succeeded: 1,
            failed: vec!["endocrinology: timed out".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "1 expert(s) failed while 1 succeeded: endocrinology: timed out"
        );
    }

    #[test]
    fn test_merge_sources_drops_repeats() {
        let mut record = record();
        record.record_interrogation(vec![], true, "").unwrap();
        record
            .record_escalation(TriageDecision::escalate(vec![
                ExpertId::new("cardiology"),
                ExpertId::new("pharmacology"),
            ]))
            .unwrap();
        let a = ExpertTaskDescriptor::new(ExpertId::new("cardiology"), "q", Default::default());
        let b = ExpertTaskDescriptor::new(ExpertId::new("pharmacology"), "q", Default::default());
        record.record_tasks(vec![a.clone(), b.clone()]).unwrap();

        let shared = Citation {
            kind: SourceKind::KnowledgeBase,
            title: "esc_2023.md".to_string(),
            excerpt: String::new(),
            reference: Some("esc_2023.md".to_string()),
            score: Some(0.8),
        };
        let eval = ExpertEvaluation::new("a", "b").with_citations(vec![shared.clone()]);
        record
            .record_fan_in(
                vec![
                    ExpertTaskResult::new(&a, eval.clone()),
                    ExpertTaskResult::new(&b, eval),
                ],
                vec![],
            )
            .unwrap();

        assert_eq!(merge_sources(&record), vec![shared]);
    }
}
