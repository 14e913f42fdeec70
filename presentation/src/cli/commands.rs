//! CLI command definitions

use clap::{Parser, ValueEnum};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Output format for a finished consultation
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Complete clinical notes with every interconsultation
    Full,
    /// Only the final answer
    Answer,
    /// The whole record as JSON
    Json,
}

impl From<OutputFormat> for crew_domain::OutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Full => crew_domain::OutputFormat::Full,
            OutputFormat::Answer => crew_domain::OutputFormat::Answer,
            OutputFormat::Json => crew_domain::OutputFormat::Json,
        }
    }
}

/// CLI arguments for clinical-crew
#[derive(Parser, Debug)]
#[command(name = "clinical-crew")]
#[command(author, version, about = "Clinical consultation with a crew of specialist experts")]
#[command(long_about = r#"
Clinical Crew routes a clinical question through a general practitioner
workflow and, when needed, a crew of specialist experts.

The process has four steps:
1. Interrogation: missing facts are identified and asked for
2. Triage: the question is answered directly or escalated
3. Interconsultation: each required expert answers in parallel,
   grounded in the local knowledge base and the literature
4. Integration: expert answers are merged into one final result

Configuration files are loaded from (in priority order):
1. --config <path>     Explicit config file
2. ./crew.toml         Project-level config
3. ~/.config/clinical-crew/config.toml   Global config

Example:
  clinical-crew "Apixaban dose for a 78 year old with eGFR 28?"
  clinical-crew --context '{"age": 78, "egfr": 28}' -o full "Anticoagulation in AF with CKD"
  clinical-crew --answer weight_kg=58 --answer on_dialysis=false "Apixaban dose in CKD?"
"#)]
pub struct Cli {
    /// The clinical request
    #[arg(required_unless_present_any = ["show_config", "resume"])]
    pub request: Option<String>,

    /// Request context as a JSON object (e.g. '{"age": 78}')
    #[arg(long, value_name = "JSON", conflicts_with = "context_file")]
    pub context: Option<String>,

    /// Read the request context from a JSON file
    #[arg(long, value_name = "PATH")]
    pub context_file: Option<PathBuf>,

    /// Answer to an interrogation question, used when the consultation
    /// pauses for information (can be specified multiple times)
    #[arg(long = "answer", value_name = "KEY=VALUE", value_parser = parse_answer)]
    pub answers: Vec<(String, Value)>,

    /// Resume a stored consultation instead of starting a new one
    #[arg(long, value_name = "ID", conflicts_with = "request")]
    pub resume: Option<String>,

    /// Output format (defaults to the configured format, then `answer`)
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress indicators
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}

impl Cli {
    /// Collected `--answer` values as supplied information
    pub fn supplied_information(&self) -> Map<String, Value> {
        self.answers.iter().cloned().collect()
    }
}

/// Parse `key=value`. The value is read as JSON when it parses (numbers,
/// booleans, arrays) and kept as a string otherwise.
pub fn parse_answer(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    let value = value.trim();
    let value = serde_json::from_str::<Value>(value)
        .ok()
        .filter(|v| !v.is_object())
        .unwrap_or_else(|| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
