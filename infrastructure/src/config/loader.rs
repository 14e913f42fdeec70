//! Configuration file loader with multi-source merging

use super::file_config::FileConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

const PROJECT_FILES: [&str; 2] = ["crew.toml", ".crew.toml"];
const ENV_PREFIX: &str = "CREW_";

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `CREW_*` environment variables (e.g. `CREW_GENERATION__API_KEY`)
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `./crew.toml` or `./.crew.toml`
    /// 4. Global: `$XDG_CONFIG_HOME/clinical-crew/config.toml`
    /// 5. Default values
    pub fn load(config_path: Option<&PathBuf>) -> Result<FileConfig, Box<figment::Error>> {
        let global = Self::global_config_path().filter(|p| p.exists());
        let project = Self::project_config_path();
        Self::load_from(
            global.as_deref(),
            project.as_deref(),
            config_path.map(PathBuf::as_path),
        )
    }

    /// Merge the given files over the defaults, then the environment
    pub fn load_from(
        global: Option<&Path>,
        project: Option<&Path>,
        explicit: Option<&Path>,
    ) -> Result<FileConfig, Box<figment::Error>> {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        for path in [global, project, explicit].into_iter().flatten() {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)
    }

    /// Load only default configuration (for --no-config)
    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    /// Get the global config file path
    ///
    /// Returns XDG_CONFIG_HOME/clinical-crew/config.toml if set,
    /// otherwise falls back to ~/.config/clinical-crew/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("clinical-crew").join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path() -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Print the config file locations being used (for debugging)
    pub fn print_config_sources(explicit: Option<&PathBuf>) {
        println!("Configuration sources (in priority order):");
        println!("  [ENV  ] Environment: {}*", ENV_PREFIX);

        if let Some(path) = explicit {
            let mark = if path.exists() { "FOUND" } else { "MISSING" };
            println!("  [{:<5}] Explicit: {}", mark, path.display());
        }

        if let Some(path) = Self::project_config_path() {
            println!("  [FOUND] Project: {}", path.display());
        } else {
            println!("  [     ] Project: ./crew.toml or ./.crew.toml");
        }

        if let Some(path) = Self::global_config_path() {
            if path.exists() {
                println!("  [FOUND] Global:  {}", path.display());
            } else {
                println!("  [     ] Global:  {}", path.display());
            }
        }

        println!("  [     ] Default: built-in defaults");
    }
}
