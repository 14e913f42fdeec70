//! Configuration file loading for clinical-crew
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `CREW_*` environment variables (`__` separates sections)
//! 2. `--config <path>` specified file
//! 3. Project root: `./crew.toml` or `./.crew.toml`
//! 4. Global: `$XDG_CONFIG_HOME/clinical-crew/config.toml`
//!    (fallback `~/.config/clinical-crew/config.toml`)
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    FileConfig, FileExpertConfig, FileGenerationConfig, FileKnowledgeConfig,
    FileLiteratureConfig, FileLoggingConfig, FileOutputConfig, FileResilienceConfig,
    FileStoreConfig, FileWorkflowConfig, GEMINI_API_KEY_ENV, StoreKind, parse_roster,
};
pub use loader::ConfigLoader;
