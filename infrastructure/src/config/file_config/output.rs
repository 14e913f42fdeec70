//! Output configuration from TOML (`[output]` section)

use crew_domain::OutputFormat;
use serde::{Deserialize, Serialize};

/// Raw output configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOutputConfig {
    /// Output format; the command line flag wins when given
    pub format: Option<OutputFormat>,
    /// Enable colored terminal output
    pub color: bool,
    /// Render live progress while the consultation runs
    pub show_progress: bool,
}

impl Default for FileOutputConfig {
    fn default() -> Self {
        Self {
            format: None,
            color: true,
            show_progress: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_deserialize() {
        let toml_str = r#"
[output]
format = "full"
color = false
"#;
        let config: super::super::FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.output.format, Some(OutputFormat::Full));
        assert!(!config.output.color);
        assert!(config.output.show_progress);
    }
}
