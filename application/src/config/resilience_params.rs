//! Resilience parameters: retry, backoff, caching and threshold relaxation.

use std::time::Duration;

/// Retry, backoff and cache control for external calls.
///
/// The delay before attempt `k + 1` is `backoff_unit * backoff_base^k`,
/// where `k` is the 1-based attempt that just failed. Retrying stops at
/// whichever of `max_attempts` or `max_elapsed` is hit first.
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceParams {
    pub max_attempts: u32,
    pub backoff_base: f64,
    pub backoff_unit: Duration,
    pub max_elapsed: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl Default for ResilienceParams {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2.0,
            backoff_unit: Duration::from_secs(1),
            max_elapsed: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            cache_capacity: 1000,
        }
    }
}

impl ResilienceParams {
    // ==================== Builder Methods ====================

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, base: f64, unit: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_unit = unit;
        self
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    pub fn with_cache(mut self, ttl: Duration, capacity: usize) -> Self {
        self.cache_ttl = ttl;
        self.cache_capacity = capacity;
        self
    }

    /// Backoff before the attempt following `failed_attempt` (1-based).
    ///
    /// Never longer than `max_elapsed`.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = i32::try_from(failed_attempt).unwrap_or(i32::MAX);
        let secs = self.backoff_unit.as_secs_f64() * self.backoff_base.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_elapsed)
            .min(self.max_elapsed)
    }
}

/// Adaptive relaxation for quality-scored lookups.
///
/// When fewer than `min_results` chunks clear `primary_threshold`, exactly
/// one supplementary fetch is made at `secondary_threshold`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaxationParams {
    pub top_k: usize,
    pub primary_threshold: f64,
    pub secondary_threshold: f64,
    pub min_results: usize,
}

impl Default for RelaxationParams {
    fn default() -> Self {
        Self {
            top_k: 5,
            primary_threshold: 0.7,
            secondary_threshold: 0.5,
            min_results: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let params = ResilienceParams::default();
        assert_eq!(params.max_attempts, 3);
        assert_eq!(params.cache_capacity, 1000);
        let relax = RelaxationParams::default();
        assert!(relax.secondary_threshold < relax.primary_threshold);
    }

    #[test]
    fn test_exponential_delay() {
        let params = ResilienceParams::default().with_backoff(2.0, Duration::from_millis(100));
        assert_eq!(params.delay_after(1), Duration::from_millis(200));
        assert_eq!(params.delay_after(2), Duration::from_millis(400));
        assert_eq!(params.delay_after(3), Duration::from_millis(800));
    }

    #[test]
    fn test_extreme_backoff_is_capped_at_elapsed_budget() {
        let huge_base = ResilienceParams::default()
            .with_backoff(1e6, Duration::from_secs(1))
            .with_max_elapsed(Duration::from_secs(30));
        assert_eq!(huge_base.delay_after(1), Duration::from_secs(30));
        assert_eq!(huge_base.delay_after(u32::MAX), Duration::from_secs(30));

        let huge_unit = ResilienceParams::default()
            .with_backoff(2.0, Duration::from_millis(u64::MAX))
            .with_max_elapsed(Duration::from_secs(30));
        assert_eq!(huge_unit.delay_after(3), Duration::from_secs(30));

        let negative = ResilienceParams::default().with_backoff(-2.0, Duration::from_secs(1));
        assert_eq!(negative.delay_after(1), negative.max_elapsed);
    }

    #[test]
    fn test_builder() {
        let params = ResilienceParams::default()
            .with_max_attempts(5)
            .with_max_elapsed(Duration::from_secs(10))
            .with_cache(Duration::from_secs(30), 10);
        assert_eq!(params.max_attempts, 5);
        assert_eq!(params.max_elapsed, Duration::from_secs(10));
        assert_eq!(params.cache_ttl, Duration::from_secs(30));
        assert_eq!(params.cache_capacity, 10);
    }
}
