//! Retry and cache configuration from TOML (`[resilience]` section)

use crew_application::ResilienceParams;
use crew_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw resilience configuration from TOML
///
/// # Example
///
/// ```toml
/// [resilience]
/// max_attempts = 3
/// backoff_base = 2.0
/// backoff_unit_ms = 1000   # delay after attempt k = unit * base^k
/// max_elapsed_secs = 60
/// cache_ttl_secs = 604800  # 7 days
/// cache_capacity = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileResilienceConfig {
    pub max_attempts: u32,
    pub backoff_base: f64,
    pub backoff_unit_ms: u64,
    pub max_elapsed_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for FileResilienceConfig {
    fn default() -> Self {
        let params = ResilienceParams::default();
        Self {
            max_attempts: params.max_attempts,
            backoff_base: params.backoff_base,
            backoff_unit_ms: params.backoff_unit.as_millis() as u64,
            max_elapsed_secs: params.max_elapsed.as_secs(),
            cache_ttl_secs: params.cache_ttl.as_secs(),
            cache_capacity: params.cache_capacity,
        }
    }
}

impl FileResilienceConfig {
    /// Convert to application params, clamping invalid values
    pub fn parse_params(&self) -> (ResilienceParams, Vec<ConfigIssue>) {
        let mut issues = Vec::new();

        let max_attempts = if self.max_attempts == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::OutOfRange,
                "resilience.max_attempts must be at least 1, using 1",
            ));
            1
        } else {
            self.max_attempts
        };

        let backoff_base = if self.backoff_base < 1.0 || !self.backoff_base.is_finite() {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::OutOfRange,
                format!(
                    "resilience.backoff_base: {} would shrink delays, using 2.0",
                    self.backoff_base
                ),
            ));
            2.0
        } else {
            self.backoff_base
        };

        if self.cache_capacity == 0 {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::OutOfRange,
                "resilience.cache_capacity is 0, caching a single entry",
            ));
        }

        let params = ResilienceParams::default()
            .with_max_attempts(max_attempts)
            .with_backoff(backoff_base, Duration::from_millis(self.backoff_unit_ms))
            .with_max_elapsed(Duration::from_secs(self.max_elapsed_secs))
            .with_cache(
                Duration::from_secs(self.cache_ttl_secs),
                self.cache_capacity.max(1),
            );
        (params, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_application_defaults() {
        let (params, issues) = FileResilienceConfig::default().parse_params();
        assert!(issues.is_empty());
        assert_eq!(params, ResilienceParams::default());
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        let config = FileResilienceConfig {
            max_attempts: 0,
            ..Default::default()
        };
        let (params, issues) = config.parse_params();
        assert_eq!(params.max_attempts, 1);
        assert!(issues[0].is_error());
    }

    #[test]
    fn test_deserialize_section() {
        let config: super::super::FileConfig = toml::from_str(
            r#"
[resilience]
max_attempts = 5
backoff_unit_ms = 250
"#,
        )
        .unwrap();
        let (params, _) = config.resilience.parse_params();
        assert_eq!(params.max_attempts, 5);
        assert_eq!(params.delay_after(1), Duration::from_millis(500));
    }
}
