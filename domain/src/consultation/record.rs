//! The durable consultation record (aggregate root).
//!
//! Every mutation goes through one of the methods below, each of which
//! validates the phase transition, refuses to touch a sealed record and
//! appends exactly one [`TraceEntry`].

use super::context::RequestContext;
use super::entities::{
    ExpertTaskDescriptor, ExpertTaskResult, FinalResult, InterrogationQuestion, TaskFailureNote,
    TriageDecision,
};
use super::notes::render_notes;
use super::phase::Phase;
use crate::core::error::DomainError;
use crate::core::ids::ConsultationId;
use crate::core::request::RequestText;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// One entry of the append-only execution trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: DateTime<Utc>,
    pub step: String,
    /// Phase the record was left in by this step
    pub phase: Phase,
    #[serde(default)]
    pub data: Value,
}

/// Counters reported by status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub triage_completed: bool,
    pub pending_questions: usize,
    pub tasks_planned: usize,
    pub results_received: usize,
    pub tasks_failed: usize,
    pub final_result_ready: bool,
}

/// Lightweight status view of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationStatus {
    pub id: ConsultationId,
    pub phase: Phase,
    pub progress: ProgressSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending_questions: Vec<InterrogationQuestion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Consultation record (Entity, aggregate root)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationRecord {
    id: ConsultationId,
    phase: Phase,
    request: RequestText,
    context: RequestContext,
    #[serde(default)]
    pending_questions: Vec<InterrogationQuestion>,
    #[serde(default)]
    interrogation_rounds: u32,
    #[serde(default)]
    supplied_information: Map<String, Value>,
    #[serde(default)]
    triage: Option<TriageDecision>,
    #[serde(default)]
    tasks: Vec<ExpertTaskDescriptor>,
    #[serde(default)]
    results: Vec<ExpertTaskResult>,
    #[serde(default)]
    failed_tasks: Vec<TaskFailureNote>,
    #[serde(default)]
    final_result: Option<FinalResult>,
    #[serde(default)]
    trace: Vec<TraceEntry>,
    #[serde(default)]
    error: Option<String>,
    /// Optimistic concurrency version, assigned by the store
    #[serde(default)]
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
}

impl ConsultationRecord {
    /// Create a record in the initial phase
    pub fn new(request: RequestText, context: RequestContext) -> Self {
        let now = Utc::now();
        let mut record = Self {
            id: ConsultationId::generate(),
            phase: Phase::Interrogating,
            request,
            context,
            pending_questions: Vec::new(),
            interrogation_rounds: 0,
            supplied_information: Map::new(),
            triage: None,
            tasks: Vec::new(),
            results: Vec::new(),
            failed_tasks: Vec::new(),
            final_result: None,
            trace: Vec::new(),
            error: None,
            version: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        let data = json!({ "context_keys": record.context.len() });
        record.push_trace("created", data);
        record
    }

    // ==================== Accessors ====================

    pub fn id(&self) -> &ConsultationId {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn request(&self) -> &RequestText {
        &self.request
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn pending_questions(&self) -> &[InterrogationQuestion] {
        &self.pending_questions
    }

    pub fn interrogation_rounds(&self) -> u32 {
        self.interrogation_rounds
    }

    pub fn supplied_information(&self) -> &Map<String, Value> {
        &self.supplied_information
    }

    pub fn triage(&self) -> Option<&TriageDecision> {
        self.triage.as_ref()
    }

    pub fn tasks(&self) -> &[ExpertTaskDescriptor] {
        &self.tasks
    }

    pub fn results(&self) -> &[ExpertTaskResult] {
        &self.results
    }

    pub fn failed_tasks(&self) -> &[TaskFailureNote] {
        &self.failed_tasks
    }

    pub fn final_result(&self) -> Option<&FinalResult> {
        self.final_result.as_ref()
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_sealed(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Whether the workflow paused waiting for supplied information
    pub fn is_awaiting_information(&self) -> bool {
        self.phase == Phase::Interrogating && !self.pending_questions.is_empty()
    }

    /// Set by the durable store after a successful save
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Request context merged with information supplied on resume
    pub fn effective_context(&self) -> Map<String, Value> {
        self.context.project_with(&self.supplied_information)
    }

    pub fn progress(&self) -> ProgressSummary {
        ProgressSummary {
            triage_completed: self.triage.is_some(),
            pending_questions: self.pending_questions.len(),
            tasks_planned: self.tasks.len(),
            results_received: self.results.len(),
            tasks_failed: self.failed_tasks.len(),
            final_result_ready: self.final_result.is_some(),
        }
    }

    pub fn status(&self) -> ConsultationStatus {
        ConsultationStatus {
            id: self.id.clone(),
            phase: self.phase,
            progress: self.progress(),
            error: self.error.clone(),
            pending_questions: self.pending_questions.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        }
    }

    // ==================== Mutations ====================

    /// Record the outcome of an interrogation round.
    ///
    /// With `can_proceed` the record advances to `evaluating`; otherwise it
    /// stays in `interrogating` holding the questions for the caller.
    pub fn record_interrogation(
        &mut self,
        questions: Vec<InterrogationQuestion>,
        can_proceed: bool,
        reasoning: &str,
    ) -> Result<Phase, DomainError> {
        let next = if can_proceed {
            Phase::Evaluating
        } else {
            Phase::Interrogating
        };
        self.guard_transition(next)?;

        self.interrogation_rounds += 1;
        let data = json!({
            "round": self.interrogation_rounds,
            "question_count": questions.len(),
            "can_proceed": can_proceed,
            "reasoning": reasoning,
        });
        self.pending_questions = if can_proceed { Vec::new() } else { questions };
        self.commit("interrogate", next, data);
        Ok(next)
    }

    /// Store information supplied by the requester on resume.
    ///
    /// Does not move the phase; only legal from a resumable phase.
    pub fn supply_information(&mut self, info: Map<String, Value>) -> Result<(), DomainError> {
        if self.is_sealed() {
            return Err(DomainError::RecordSealed(self.phase));
        }
        if !self.phase.is_resumable() {
            return Err(DomainError::InvalidTransition {
                from: self.phase,
                to: Phase::Interrogating,
            });
        }

        let keys: Vec<&String> = info.keys().collect();
        let data = json!({ "keys": keys, "answered_questions": self.pending_questions.len() });
        for (k, v) in info {
            self.supplied_information.insert(k, v);
        }
        self.pending_questions.clear();
        let phase = self.phase;
        self.commit("supply_information", phase, data);
        Ok(())
    }

    /// Triage resolved the request without escalation
    pub fn record_direct_answer(
        &mut self,
        decision: TriageDecision,
        result: FinalResult,
    ) -> Result<Phase, DomainError> {
        self.guard_transition(Phase::Completed)?;
        let data = json!({
            "can_answer_directly": true,
            "complexity": decision.estimated_complexity,
        });
        self.triage = Some(decision);
        self.seal_result(result);
        self.commit("evaluate", Phase::Completed, data);
        Ok(Phase::Completed)
    }

    /// Triage decided experts are required
    pub fn record_escalation(&mut self, decision: TriageDecision) -> Result<Phase, DomainError> {
        self.guard_transition(Phase::Interconsulting)?;
        let data = json!({
            "can_answer_directly": false,
            "experts": decision.required_experts,
            "complexity": decision.estimated_complexity,
        });
        self.triage = Some(decision);
        self.commit("evaluate", Phase::Interconsulting, data);
        Ok(Phase::Interconsulting)
    }

    /// Persist the planned expert tasks (phase does not advance yet)
    pub fn record_tasks(&mut self, tasks: Vec<ExpertTaskDescriptor>) -> Result<(), DomainError> {
        self.guard_transition(Phase::Interconsulting)?;
        if !self.tasks.is_empty() {
            return Err(DomainError::TasksAlreadyPlanned);
        }
        let experts: Vec<&str> = tasks.iter().map(|t| t.expert.as_str()).collect();
        let data = json!({ "count": tasks.len(), "experts": experts });
        self.tasks = tasks;
        self.commit("plan_interconsultations", Phase::Interconsulting, data);
        Ok(())
    }

    /// Persist fan-in output and advance to `integrating`
    pub fn record_fan_in(
        &mut self,
        results: Vec<ExpertTaskResult>,
        failures: Vec<TaskFailureNote>,
    ) -> Result<Phase, DomainError> {
        self.guard_transition(Phase::Integrating)?;
        let total = self.results.len() + results.len();
        if total > self.tasks.len() {
            return Err(DomainError::ResultsExceedTasks {
                results: total,
                tasks: self.tasks.len(),
            });
        }
        for result in &results {
            if !self.tasks.iter().any(|t| t.id == result.task_id) {
                return Err(DomainError::UnknownTask(result.task_id.to_string()));
            }
        }

        let data = json!({
            "results": results.len(),
            "failed": failures.iter().map(|f| f.expert.as_str()).collect::<Vec<_>>(),
        });
        self.results.extend(results);
        self.failed_tasks.extend(failures);
        self.commit("execute_experts", Phase::Integrating, data);
        Ok(Phase::Integrating)
    }

    /// Persist the merged result and seal the record
    pub fn complete(&mut self, result: FinalResult) -> Result<Phase, DomainError> {
        self.guard_transition(Phase::Completed)?;
        let data = json!({
            "experts": result.contributing_experts.len(),
            "limitations": result.limitations.len(),
            "sources": result.sources.len(),
        });
        self.seal_result(result);
        self.commit("integrate", Phase::Completed, data);
        Ok(Phase::Completed)
    }

    /// Record a failure and seal the record
    pub fn fail(&mut self, step: &str, message: impl Into<String>) -> Result<Phase, DomainError> {
        self.guard_transition(Phase::Error)?;
        let message = message.into();
        let data = json!({ "error": message, "failed_in": self.phase.as_str() });
        self.error = Some(message);
        self.commit(step, Phase::Error, data);
        Ok(Phase::Error)
    }

    // ==================== Internals ====================

    fn guard_transition(&self, next: Phase) -> Result<(), DomainError> {
        if self.is_sealed() {
            return Err(DomainError::RecordSealed(self.phase));
        }
        if !self.phase.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        Ok(())
    }

    /// Attach the rendered notes and store the final result
    fn seal_result(&mut self, mut result: FinalResult) {
        result.notes = render_notes(self, &result);
        self.final_result = Some(result);
    }

    fn commit(&mut self, step: &str, next: Phase, data: Value) {
        self.phase = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        self.push_trace(step, data);
    }

    fn push_trace(&mut self, step: &str, data: Value) {
        self.trace.push(TraceEntry {
            timestamp: self.updated_at,
            step: step.to_string(),
            phase: self.phase,
            data,
        });
    }
}
