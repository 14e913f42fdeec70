//! Consultation service: the operations exposed to callers.
//!
//! Wraps the [`ConsultationWorkflow`] with record creation, status queries,
//! subscriptions, resume and cancellation. At most one workflow invocation
//! runs per consultation; a second one is refused with
//! [`WorkflowError::AlreadyRunning`].

use super::workflow::{ConsultationWorkflow, WorkflowError};
use crate::event_bus::{EventBus, EventStream};
use crew_domain::{
    ConsultationId, ConsultationRecord, ConsultationStatus, EventKind, RequestContext,
    RequestText, StreamEvent,
};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancellation tokens of the invocations currently running
#[derive(Clone, Default)]
struct RunRegistry {
    // std lock: released from `RunGuard::drop`
    running: Arc<Mutex<HashMap<ConsultationId, CancellationToken>>>,
}

impl RunRegistry {
    fn acquire(&self, id: &ConsultationId) -> Result<RunGuard, WorkflowError> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.contains_key(id) {
            return Err(WorkflowError::AlreadyRunning(id.clone()));
        }
        let token = CancellationToken::new();
        running.insert(id.clone(), token.clone());
        Ok(RunGuard {
            registry: self.clone(),
            id: id.clone(),
            token,
        })
    }

    fn cancel(&self, id: &ConsultationId) -> bool {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        match running.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn is_running(&self, id: &ConsultationId) -> bool {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.contains_key(id)
    }
}

/// Exclusive right to drive one consultation; released on drop
struct RunGuard {
    registry: RunRegistry,
    id: ConsultationId,
    token: CancellationToken,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut running = self
            .registry
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        running.remove(&self.id);
    }
}

/// Entry point for consultations
pub struct ConsultationService {
    workflow: Arc<ConsultationWorkflow>,
    runs: RunRegistry,
}

impl ConsultationService {
    pub fn new(workflow: Arc<ConsultationWorkflow>) -> Self {
        Self {
            workflow,
            runs: RunRegistry::default(),
        }
    }

    pub fn bus(&self) -> &EventBus {
        self.workflow.bus()
    }

    pub fn workflow(&self) -> &ConsultationWorkflow {
        &self.workflow
    }

    /// Validate and persist a new consultation in `interrogating`
    pub async fn create(
        &self,
        request: &str,
        context: RequestContext,
    ) -> Result<ConsultationId, WorkflowError> {
        let request = RequestText::try_new(request)?;
        let mut record = ConsultationRecord::new(request, context);
        let version = self.workflow.store().save(&record).await?;
        record.set_version(version);
        info!(consultation = %record.id(), "Consultation created");
        Ok(record.id().clone())
    }

    /// Drive an existing consultation until it completes, fails or pauses
    pub async fn run(&self, id: &ConsultationId) -> Result<ConsultationRecord, WorkflowError> {
        let guard = self.runs.acquire(id)?;
        self.workflow.run(id, &guard.token).await
    }

    /// Create and run to the end (or to a pause) in one call
    pub async fn consult(
        &self,
        request: &str,
        context: RequestContext,
    ) -> Result<ConsultationRecord, WorkflowError> {
        let id = self.create(request, context).await?;
        self.run(&id).await
    }

    /// Create a consultation and run it in the background.
    ///
    /// Returns as soon as the record is persisted; follow progress through
    /// [`subscribe`](Self::subscribe) or [`status`](Self::status).
    pub async fn submit(
        self: &Arc<Self>,
        request: &str,
        context: RequestContext,
    ) -> Result<ConsultationId, WorkflowError> {
        let id = self.create(request, context).await?;
        let guard = self.runs.acquire(&id)?;
        let service = Arc::clone(self);
        let run_id = id.clone();
        tokio::spawn(async move {
            if let Err(e) = service.workflow.run(&run_id, &guard.token).await {
                warn!(consultation = %run_id, error = %e, "Background consultation failed");
            }
            drop(guard);
        });
        Ok(id)
    }

    pub async fn status(&self, id: &ConsultationId) -> Result<ConsultationStatus, WorkflowError> {
        Ok(self.workflow.store().get(id).await?.status())
    }

    pub async fn record(&self, id: &ConsultationId) -> Result<ConsultationRecord, WorkflowError> {
        Ok(self.workflow.store().get(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<ConsultationStatus>, WorkflowError> {
        Ok(self.workflow.store().list().await?)
    }

    pub fn is_running(&self, id: &ConsultationId) -> bool {
        self.runs.is_running(id)
    }

    /// Live events for one consultation, starting with a `connected` event
    /// that carries the current phase
    pub async fn subscribe(&self, id: &ConsultationId) -> Result<EventStream, WorkflowError> {
        let record = self.workflow.store().get(id).await?;
        let connected = StreamEvent::new(
            EventKind::Connected,
            id.clone(),
            json!({
                "phase": record.phase(),
                "message": format!("Connected to consultation {}", id),
            }),
        );
        Ok(self.bus().stream(id.clone(), Some(connected)))
    }

    /// Supply requested information and re-enter the workflow.
    ///
    /// Legal only while the consultation is interrogating or evaluating.
    pub async fn resume(
        &self,
        id: &ConsultationId,
        info: Map<String, Value>,
    ) -> Result<ConsultationRecord, WorkflowError> {
        let guard = self.runs.acquire(id)?;

        let mut record = self.workflow.store().get(id).await?;
        record.supply_information(info)?;
        let version = self.workflow.store().save(&record).await?;
        record.set_version(version);
        info!(consultation = %id, phase = %record.phase(), "Resuming consultation");

        self.workflow.run(id, &guard.token).await
    }

    /// Cancel a consultation.
    ///
    /// A running invocation is signalled and records `error` itself. A
    /// consultation that is not running but not yet sealed (e.g. paused
    /// for information) is sealed here. Returns false for sealed records.
    pub async fn cancel(&self, id: &ConsultationId) -> Result<bool, WorkflowError> {
        if self.runs.cancel(id) {
            info!(consultation = %id, "Cancellation requested");
            return Ok(true);
        }

        let _guard = match self.runs.acquire(id) {
            Ok(guard) => guard,
            // Started between the two checks
            Err(WorkflowError::AlreadyRunning(_)) => return Ok(self.runs.cancel(id)),
            Err(e) => return Err(e),
        };
        let mut record = self.workflow.store().get(id).await?;
        if record.is_sealed() {
            return Ok(false);
        }
        record.fail("cancel", WorkflowError::Cancelled.to_string())?;
        self.workflow.store().save(&record).await?;
        self.bus().emit(
            EventKind::Error,
            id,
            json!({ "message": WorkflowError::Cancelled.to_string(), "step": "cancel" }),
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_refuses_second_run() {
        let registry = RunRegistry::default();
        let id = ConsultationId::new("c-1");

        let guard = registry.acquire(&id).unwrap();
        assert!(matches!(
            registry.acquire(&id),
            Err(WorkflowError::AlreadyRunning(_))
        ));
        assert!(registry.is_running(&id));

        drop(guard);
        assert!(!registry.is_running(&id));
        assert!(registry.acquire(&id).is_ok());
    }

    #[test]
    fn test_registry_cancel_trips_token() {
        let registry = RunRegistry::default();
        let id = ConsultationId::new("c-2");
        assert!(!registry.cancel(&id));

        let guard = registry.acquire(&id).unwrap();
        assert!(registry.cancel(&id));
        assert!(guard.token.is_cancelled());
    }
}
