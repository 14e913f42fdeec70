//! CLI entrypoint for Clinical Crew
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use crew_application::{
    ConsultationService, ConsultationStore, ConsultationWorkflow, EventBus, EventSubscriber,
    InMemoryConsultationStore, KnowledgeAdapter, LiteratureAdapter, ResilientGenerator,
};
use crew_domain::{ConsultationId, ConsultationRecord, EventKind, OutputFormat, RequestContext};
use crew_infrastructure::{
    ConfigLoader, FileConfig, GeminiGateway, JsonFileConsultationStore, JsonlEventLogger,
    LocalKnowledgeBase, PubMedClient, StoreKind,
};
use crew_presentation::{Cli, ConsoleFormatter, ProgressReporter, SimpleProgress};
use serde_json::{Map, Value};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.show_config {
        ConfigLoader::print_config_sources(cli.config.as_ref());
        return Ok(ExitCode::SUCCESS);
    }

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref())
            .map_err(|e| anyhow!("Failed to load configuration: {}", e))?
    };

    let _log_guard = init_logging(cli.verbose, config.logging.file.as_deref())?;
    info!("Starting Clinical Crew");

    let issues = config.validate();
    for issue in &issues {
        if issue.is_error() {
            eprintln!("config {}", issue);
        } else {
            warn!("config {}", issue);
        }
    }
    if issues.iter().any(|i| i.is_error()) {
        bail!("Configuration is invalid");
    }

    ConsoleFormatter::set_color(config.output.color);
    let format = cli
        .output
        .map(OutputFormat::from)
        .or(config.output.format)
        .unwrap_or_default();

    // === Dependency Injection ===
    let bus = EventBus::new();
    let service = Arc::new(ConsultationService::new(Arc::new(build_workflow(
        &config,
        bus.clone(),
    )?)));

    if let Some(path) = &config.logging.event_transcript {
        subscribe_transcript(&bus, path);
    }

    let answers = cli.supplied_information();
    let id = match &cli.resume {
        Some(id) => ConsultationId::new(id.as_str()),
        None => {
            let request = cli
                .request
                .as_deref()
                .ok_or_else(|| anyhow!("A request is required"))?;
            let context = load_context(cli.context.as_deref(), cli.context_file.as_deref())?;
            service.create(request, context).await?
        }
    };

    if !cli.quiet && config.output.show_progress {
        let subscriber: Arc<dyn EventSubscriber> = if std::io::stderr().is_terminal() {
            Arc::new(ProgressReporter::new())
        } else {
            Arc::new(SimpleProgress)
        };
        bus.subscribe(id.clone(), subscriber);
    }

    // Ctrl-C trips the run's cancellation token; the workflow records it
    let interrupt = {
        let service = Arc::clone(&service);
        let id = id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(consultation = %id, "Interrupted, cancelling consultation");
                if let Err(e) = service.cancel(&id).await {
                    warn!(consultation = %id, error = %e, "Cancellation failed");
                }
            }
        })
    };
    let outcome = drive(&service, &id, cli.resume.is_some(), answers).await;
    interrupt.abort();

    let record = match outcome {
        Ok(record) => record,
        Err(e) => {
            // Node failures are recorded before they surface here
            match service.record(&id).await {
                Ok(record) if record.is_sealed() => record,
                _ => return Err(e.into()),
            }
        }
    };

    println!("{}", ConsoleFormatter::render(&record, format));

    Ok(if record.is_sealed() && record.error().is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Run the consultation, resuming once with the supplied answers if it
/// pauses for information
async fn drive(
    service: &ConsultationService,
    id: &ConsultationId,
    resuming: bool,
    answers: Map<String, Value>,
) -> Result<ConsultationRecord, crew_application::WorkflowError> {
    if resuming {
        return service.resume(id, answers).await;
    }

    let record = service.run(id).await?;
    if !record.is_awaiting_information() || answers.is_empty() {
        return Ok(record);
    }
    info!(consultation = %id, answers = answers.len(), "Resuming with supplied answers");
    service.resume(id, answers).await
}

fn build_workflow(config: &FileConfig, bus: EventBus) -> Result<ConsultationWorkflow> {
    let resilience = config.resilience_params();

    let store: Arc<dyn ConsultationStore> = match config.store.parse_kind().0 {
        StoreKind::Memory => Arc::new(InMemoryConsultationStore::new()),
        StoreKind::Json(dir) => Arc::new(
            JsonFileConsultationStore::open(&dir)
                .with_context(|| format!("Failed to open store at {}", dir.display()))?,
        ),
    };

    let gateway = GeminiGateway::from_config(&config.generation)
        .context("Failed to initialize the generation backend")?;
    let generator = Arc::new(ResilientGenerator::new(Arc::new(gateway), resilience.clone()));

    let root = config
        .knowledge
        .resolve_root()
        .unwrap_or_else(|| PathBuf::from("knowledge"));
    let knowledge_base = LocalKnowledgeBase::load(&root, &config.knowledge.pattern)
        .context("Failed to index the knowledge base")?;
    let knowledge = Arc::new(KnowledgeAdapter::new(
        Arc::new(knowledge_base),
        resilience.clone(),
        config.relaxation_params(),
    ));

    let mut workflow = ConsultationWorkflow::new(store, generator, knowledge, bus)
        .with_roster(config.roster())
        .with_params(config.workflow_params());

    if config.literature.enabled {
        let client = PubMedClient::from_config(&config.literature)
            .context("Failed to initialize literature search")?;
        workflow = workflow.with_literature(Arc::new(LiteratureAdapter::new(
            Arc::new(client),
            resilience,
        )));
    }

    Ok(workflow)
}

/// Append every built-in event kind to a JSONL transcript
fn subscribe_transcript(bus: &EventBus, path: &Path) {
    let Some(logger) = JsonlEventLogger::new(path) else {
        return;
    };
    let logger: Arc<dyn EventSubscriber> = Arc::new(logger);
    for kind in EventKind::BUILTIN {
        bus.subscribe_kind(kind, Arc::clone(&logger));
    }
    info!(path = %path.display(), "Event transcript enabled");
}

fn load_context(inline: Option<&str>, file: Option<&Path>) -> Result<RequestContext> {
    let raw = match (inline, file) {
        (Some(json), _) => json.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read context file {}", path.display()))?,
        (None, None) => return Ok(RequestContext::default()),
    };
    let value: Value = serde_json::from_str(&raw).context("Request context is not valid JSON")?;
    RequestContext::from_value(value).map_err(|e| anyhow!("Invalid request context: {}", e))
}

/// Initialize logging based on verbosity level, plus an optional log file
fn init_logging(verbose: u8, file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    };

    let (file_layer, guard) = match file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("Log file path has no file name: {}", path.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}
