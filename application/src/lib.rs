//! Application layer for clinical-crew
//!
//! This crate contains use cases, port definitions, the resilient call
//! adapters, the event bus and application configuration. It depends only
//! on the domain layer.

pub mod config;
pub mod event_bus;
pub mod ports;
pub mod resilience;
pub mod use_cases;

// Re-export commonly used types
pub use config::{PartialFailurePolicy, RelaxationParams, ResilienceParams, WorkflowParams};
pub use event_bus::{ChannelSubscriber, EventBus, EventStream, SubscriptionHandle, SubscriptionKey};
pub use ports::{
    consultation_store::{ConsultationStore, InMemoryConsultationStore, StoreError, check_version},
    event_subscriber::{DeliveryError, EventSubscriber},
    generation::GenerationService,
    knowledge_lookup::{KnowledgeLookup, KnowledgeQuery},
    literature_search::LiteratureSearch,
};
pub use resilience::{
    CacheStats, KnowledgeAdapter, LiteratureAdapter, RelaxedLookup, ResilientGenerator, TtlCache,
    retry_with_backoff,
};
pub use use_cases::consultation_service::ConsultationService;
pub use use_cases::expert_worker::{ExpertContext, evaluate_expert};
pub use use_cases::fan_out::{FanOutError, FanOutExecutor, PartialFailure, TaskFailure};
pub use use_cases::workflow::{ConsultationWorkflow, NodeOutcome, WorkflowError, next_step};
