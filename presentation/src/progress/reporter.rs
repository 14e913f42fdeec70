//! Live progress for a running consultation
//!
//! Both reporters are event bus subscribers; the workflow never calls them
//! directly.

use async_trait::async_trait;
use colored::Colorize;
use crew_application::{DeliveryError, EventSubscriber};
use crew_domain::{EventKind, StreamEvent};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

fn text<'a>(event: &'a StreamEvent, key: &str) -> &'a str {
    event.data.get(key).and_then(Value::as_str).unwrap_or("")
}

fn count(event: &StreamEvent) -> u64 {
    event.data.get("count").and_then(Value::as_u64).unwrap_or(0)
}

fn tool_name(event: &StreamEvent) -> &'static str {
    match text(event, "tool") {
        "knowledge_base" => "knowledge base",
        "literature" => "literature",
        _ => "tool",
    }
}

/// One-line, uncolored description of an event, `None` for events that
/// are not worth a line
pub fn describe_event(event: &StreamEvent) -> Option<String> {
    let specialty = text(event, "specialty");
    let line = match &event.kind {
        EventKind::Connected | EventKind::Custom(_) => return None,
        EventKind::Interrogating => "Interrogation: checking for missing information".to_string(),
        EventKind::QuestionsRaised => {
            let n = event
                .data
                .get("questions")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            format!("Interrogation: {} question(s) need an answer", n)
        }
        EventKind::Evaluating => "Triage: deciding whether experts are needed".to_string(),
        EventKind::InterconsultationCreated => format!("Interconsultation created: {}", specialty),
        EventKind::SpecialistStarted => format!("{}: evaluating", specialty),
        EventKind::ToolStarted => format!("{}: searching {}", specialty, tool_name(event)),
        EventKind::SourceFound => format!("{}: source {}", specialty, text(event, "title")),
        EventKind::ToolCompleted => {
            let mut line = format!(
                "{}: {} returned {} result(s)",
                specialty,
                tool_name(event),
                count(event)
            );
            if event.data.get("relaxed").and_then(Value::as_bool) == Some(true) {
                line.push_str(" (relaxed threshold)");
            }
            line
        }
        EventKind::SpecialistCompleted => format!("{}: done", specialty),
        EventKind::SpecialistFailed => format!("{}: failed ({})", specialty, text(event, "error")),
        EventKind::Integrating => "Integration: merging expert answers".to_string(),
        EventKind::Completed => "Consultation completed".to_string(),
        EventKind::Error => format!("Consultation failed: {}", text(event, "message")),
    };
    Some(line)
}

/// Reports progress with spinners: one for the consultation phase and one
/// per expert
pub struct ProgressReporter {
    multi: MultiProgress,
    phase_bar: Mutex<Option<ProgressBar>>,
    experts: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            phase_bar: Mutex::new(None),
            experts: Mutex::new(HashMap::new()),
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix:.bold.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn spinner(&self, prefix: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(Self::spinner_style());
        pb.set_prefix(prefix.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    fn set_phase(&self, prefix: &str, message: &str) {
        let mut slot = self.phase_bar.lock().unwrap_or_else(|e| e.into_inner());
        let pb = slot.get_or_insert_with(|| self.spinner(prefix));
        pb.set_prefix(prefix.to_string());
        pb.set_message(message.to_string());
    }

    fn finish_phase(&self, message: String) {
        if let Some(pb) = self
            .phase_bar
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            pb.finish_with_message(message);
        }
    }

    fn expert(&self, specialty: &str, message: String) {
        let mut experts = self.experts.lock().unwrap_or_else(|e| e.into_inner());
        let pb = experts
            .entry(specialty.to_string())
            .or_insert_with(|| self.spinner(specialty));
        pb.set_message(message);
    }

    fn finish_expert(&self, specialty: &str, message: String) {
        let mut experts = self.experts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pb) = experts.remove(specialty) {
            pb.finish_with_message(message);
        }
    }

    fn abandon_experts(&self) {
        let mut experts = self.experts.lock().unwrap_or_else(|e| e.into_inner());
        for (_, pb) in experts.drain() {
            pb.abandon();
        }
    }

    fn render(&self, event: &StreamEvent) {
        let specialty = text(event, "specialty");
        match &event.kind {
            EventKind::Interrogating => self.set_phase("Interrogation", "checking for missing information"),
            EventKind::QuestionsRaised => {
                self.finish_phase(format!("{}", "information needed".yellow()))
            }
            EventKind::Evaluating => self.set_phase("Triage", "deciding whether experts are needed"),
            EventKind::InterconsultationCreated => {
                self.set_phase("Interconsultation", "waiting for experts");
                self.expert(specialty, "queued".dimmed().to_string());
            }
            EventKind::SpecialistStarted => self.expert(specialty, "evaluating".to_string()),
            EventKind::ToolStarted => {
                self.expert(specialty, format!("searching {}", tool_name(event)))
            }
            EventKind::SourceFound => self.expert(specialty, format!("found {}", text(event, "title"))),
            EventKind::ToolCompleted => self.expert(
                specialty,
                format!("{} {} result(s)", tool_name(event), count(event)),
            ),
            EventKind::SpecialistCompleted => {
                self.finish_expert(specialty, format!("{} done", "v".green()))
            }
            EventKind::SpecialistFailed => self.finish_expert(
                specialty,
                format!("{} {}", "x".red(), text(event, "error")),
            ),
            EventKind::Integrating => self.set_phase("Integration", "merging expert answers"),
            EventKind::Completed => {
                self.abandon_experts();
                self.finish_phase(format!("{}", "completed".green()));
            }
            EventKind::Error => {
                self.abandon_experts();
                self.finish_phase(format!("{} {}", "failed:".red(), text(event, "message")));
            }
            EventKind::Connected | EventKind::Custom(_) => {}
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSubscriber for ProgressReporter {
    async fn on_event(&self, event: &StreamEvent) -> Result<(), DeliveryError> {
        self.render(event);
        Ok(())
    }
}

/// Simple text-based progress (no fancy UI), for non-interactive stderr
pub struct SimpleProgress;

#[async_trait]
impl EventSubscriber for SimpleProgress {
    async fn on_event(&self, event: &StreamEvent) -> Result<(), DeliveryError> {
        if let Some(line) = describe_event(event) {
            let marker = match event.kind {
                EventKind::SpecialistFailed | EventKind::Error => "x".red(),
                EventKind::SpecialistCompleted | EventKind::Completed => "v".green(),
                _ => "->".cyan(),
            };
            eprintln!("{} {}", marker, line);
        }
        Ok(())
    }
}
