//! One expert evaluation: knowledge lookup, literature search, generation.
//!
//! Runs inside the fan-out executor. Everything it reads lives in the
//! shared [`ExpertContext`]; its only output is the returned result plus
//! progress events.

use crate::config::WorkflowParams;
use crate::event_bus::EventBus;
use crate::ports::knowledge_lookup::KnowledgeQuery;
use crate::resilience::{KnowledgeAdapter, LiteratureAdapter, ResilientGenerator};
use crew_domain::consultation::context::describe_map;
use crew_domain::lookup::{format_articles, format_chunks};
use crew_domain::{
    Article, Citation, ConsultationId, EventKind, ExpertProfile, ExpertTaskDescriptor,
    ExpertTaskResult, ExternalFailure, KnowledgeChunk, PromptTemplate, find_profile,
    literature_query, parse_expert_evaluation,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Read-only context shared by every expert task of one fan-out
pub struct ExpertContext {
    pub request_id: ConsultationId,
    pub generator: Arc<ResilientGenerator>,
    pub knowledge: Arc<KnowledgeAdapter>,
    pub literature: Option<Arc<LiteratureAdapter>>,
    pub roster: Arc<Vec<ExpertProfile>>,
    pub params: WorkflowParams,
    pub bus: EventBus,
}

impl ExpertContext {
    fn profile(&self, task: &ExpertTaskDescriptor) -> ExpertProfile {
        find_profile(&self.roster, &task.expert)
            .cloned()
            .unwrap_or_else(|| {
                ExpertProfile::new(
                    task.expert.clone(),
                    task.expert.as_str(),
                    format!("You are a consultant in {}.", task.expert),
                )
            })
    }

    fn emit(&self, kind: EventKind, data: serde_json::Value) {
        self.bus.emit(kind, &self.request_id, data);
    }
}

/// Evaluate one interconsultation
pub async fn evaluate_expert(
    task: ExpertTaskDescriptor,
    ctx: Arc<ExpertContext>,
) -> Result<ExpertTaskResult, ExternalFailure> {
    let profile = ctx.profile(&task);
    info!(expert = %task.expert, task = %task.id, "Expert evaluation started");
    ctx.emit(
        EventKind::SpecialistStarted,
        json!({
            "specialty": task.expert,
            "task_id": task.id,
            "question": task.question,
            "message": format!("{} is reviewing the case", profile.display_name),
        }),
    );

    let chunks = search_knowledge(&task, &ctx).await?;
    let articles = search_literature(&task, &ctx).await?;

    let prompt = PromptTemplate::expert_evaluation(
        &profile,
        &task.question,
        &describe_map(&task.context),
        &format_chunks(&chunks),
        &format_articles(&articles),
    );
    let response = ctx.generator.generate(&prompt).await?;

    let mut citations: Vec<Citation> = chunks.iter().map(KnowledgeChunk::to_citation).collect();
    citations.extend(articles.iter().map(Article::to_citation));
    let evaluation = parse_expert_evaluation(&response).with_citations(citations);

    ctx.emit(
        EventKind::SpecialistCompleted,
        json!({
            "specialty": task.expert,
            "task_id": task.id,
            "confidence": evaluation.confidence,
            "evidence_level": evaluation.evidence_level,
            "sources": evaluation.citations.len(),
        }),
    );
    info!(expert = %task.expert, "Expert evaluation completed");
    Ok(ExpertTaskResult::new(&task, evaluation))
}

async fn search_knowledge(
    task: &ExpertTaskDescriptor,
    ctx: &ExpertContext,
) -> Result<Vec<KnowledgeChunk>, ExternalFailure> {
    ctx.emit(
        EventKind::ToolStarted,
        json!({ "tool": "knowledge_base", "specialty": task.expert }),
    );

    let query =
        KnowledgeQuery::new(&task.question, ctx.knowledge.relaxation().top_k).scoped(task.expert.clone());
    let lookup = ctx.knowledge.fetch(&query).await?;

    for chunk in &lookup.items {
        ctx.emit(
            EventKind::SourceFound,
            json!({
                "kind": "knowledge_base",
                "specialty": task.expert,
                "title": chunk.source_name(),
                "score": chunk.score,
            }),
        );
    }
    ctx.emit(
        EventKind::ToolCompleted,
        json!({
            "tool": "knowledge_base",
            "specialty": task.expert,
            "count": lookup.items.len(),
            "relaxed": lookup.relaxed,
        }),
    );
    debug!(expert = %task.expert, chunks = lookup.items.len(), relaxed = lookup.relaxed, "Knowledge lookup done");
    Ok(lookup.items)
}

/// Literature failures degrade to "no literature" unless the workflow
/// requires it
async fn search_literature(
    task: &ExpertTaskDescriptor,
    ctx: &ExpertContext,
) -> Result<Vec<Article>, ExternalFailure> {
    let Some(literature) = &ctx.literature else {
        return Ok(Vec::new());
    };

    ctx.emit(
        EventKind::ToolStarted,
        json!({ "tool": "literature", "specialty": task.expert }),
    );
    let query = literature_query(&task.question, &task.expert);
    let articles = match literature
        .search(&query, ctx.params.literature_max_results)
        .await
    {
        Ok(articles) => articles,
        Err(e) if ctx.params.literature_required => return Err(e),
        Err(e) => {
            warn!(expert = %task.expert, error = %e, "Literature search failed, continuing without it");
            ctx.emit(
                EventKind::ToolCompleted,
                json!({
                    "tool": "literature",
                    "specialty": task.expert,
                    "count": 0,
                    "error": e.message(),
                }),
            );
            return Ok(Vec::new());
        }
    };

    for article in &articles {
        ctx.emit(
            EventKind::SourceFound,
            json!({
                "kind": "literature",
                "specialty": task.expert,
                "title": article.title,
                "reference": article.url().unwrap_or_else(|| format!("PMID:{}", article.id)),
            }),
        );
    }
    ctx.emit(
        EventKind::ToolCompleted,
        json!({ "tool": "literature", "specialty": task.expert, "count": articles.len() }),
    );
    Ok(articles)
}
