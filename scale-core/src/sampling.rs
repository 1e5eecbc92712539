//! Statistical sampling of a unit population for expensive per-unit probes.

use rand::Rng;
use scale_types::Status;
use std::time::Duration;
use thiserror::Error;

/// Sampling configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SamplingError {
    /// Percentage outside 0..=100.
    #[error("sampling percentage {0} out of range 0..=100")]
    PercentageOutOfRange(u32),

    /// At least one attempt per sampled unit is required.
    #[error("max_retries must be at least 1")]
    ZeroRetries,
}

/// Validated sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingConfig {
    percentage: u8,
    max_retries: u32,
    retry_interval: Duration,
}

impl SamplingConfig {
    /// Fixed wait between attempts against one sampled unit.
    pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(15);

    /// Build a config, rejecting out-of-range values.
    pub fn new(
        percentage: u32,
        max_retries: u32,
        retry_interval: Duration,
    ) -> Result<Self, SamplingError> {
        if percentage > 100 {
            return Err(SamplingError::PercentageOutOfRange(percentage));
        }
        if max_retries == 0 {
            return Err(SamplingError::ZeroRetries);
        }
        Ok(Self {
            percentage: percentage as u8,
            max_retries,
            retry_interval,
        })
    }

    /// Configured percentage (0..=100).
    pub fn percentage(&self) -> u8 {
        self.percentage
    }

    /// Attempts per sampled unit.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Wait between attempts on one unit.
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Sampling is disabled at 0 %.
    pub fn is_disabled(&self) -> bool {
        self.percentage == 0
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            percentage: 10,
            max_retries: 8,
            retry_interval: Self::DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Sample size for a population of `population` units at `percentage` %.
///
/// `max(1, floor(N·p/100))` for p > 0, else 0, never more than N.
pub fn sample_size(population: usize, percentage: u8) -> usize {
    if percentage == 0 || population == 0 {
        return 0;
    }
    let floor = population * usize::from(percentage.min(100)) / 100;
    floor.max(1).min(population)
}

/// Draw a uniform random sample without replacement.
pub fn select_sample<T: Clone, R: Rng + ?Sized>(
    population: &[T],
    percentage: u8,
    rng: &mut R,
) -> Vec<T> {
    let amount = sample_size(population.len(), percentage);
    rand::seq::index::sample(rng, population.len(), amount)
        .into_iter()
        .map(|i| population[i].clone())
        .collect()
}

/// Per-unit probe tally for one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleTally {
    /// Units probed.
    pub validated: usize,
    /// Units that eventually answered.
    pub passed: usize,
    /// Units that failed every attempt.
    pub failed: usize,
}

impl SampleTally {
    /// Record one unit's final result.
    pub fn record(&mut self, success: bool) {
        self.validated += 1;
        if success {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }

    /// PASS when nothing failed, PARTIAL otherwise. Never FAIL: guest
    /// reachability is a soft signal next to control-plane state.
    pub fn classify(&self) -> Status {
        if self.failed == 0 {
            Status::Pass
        } else {
            Status::Partial
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn sample_size_examples() {
        assert_eq!(sample_size(63, 25), 15);
        assert_eq!(sample_size(400, 25), 100);
        assert_eq!(sample_size(3, 10), 1);
        assert_eq!(sample_size(10, 100), 10);
    }

    #[test]
    fn zero_percentage_samples_nothing() {
        for n in [0, 1, 50, 10_000] {
            assert_eq!(sample_size(n, 0), 0);
        }
    }

    #[test]
    fn sample_never_exceeds_population() {
        for n in 0..200 {
            for p in 0..=100u8 {
                let size = sample_size(n, p);
                assert!(size <= n, "n={} p={} size={}", n, p, size);
                if p > 0 && n > 0 {
                    assert_eq!(size, (n * p as usize / 100).max(1));
                }
            }
        }
    }

    #[test]
    fn selection_is_without_replacement() {
        let population: Vec<u32> = (0..400).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let sample = select_sample(&population, 25, &mut rng);
        assert_eq!(sample.len(), 100);
        let unique: HashSet<_> = sample.iter().collect();
        assert_eq!(unique.len(), 100);
        assert!(sample.iter().all(|u| population.contains(u)));
    }

    #[test]
    fn selection_varies_with_rng() {
        let population: Vec<u32> = (0..1000).collect();
        let a = select_sample(&population, 5, &mut StdRng::seed_from_u64(1));
        let b = select_sample(&population, 5, &mut StdRng::seed_from_u64(2));
        assert_ne!(a, b);
    }

    #[test]
    fn tally_classification() {
        let mut tally = SampleTally::default();
        for _ in 0..97 {
            tally.record(true);
        }
        assert_eq!(tally.classify(), Status::Pass);
        for _ in 0..3 {
            tally.record(false);
        }
        assert_eq!(
            tally,
            SampleTally {
                validated: 100,
                passed: 97,
                failed: 3
            }
        );
        assert_eq!(tally.classify(), Status::Partial);
    }

    #[test]
    fn all_failed_is_still_partial() {
        let mut tally = SampleTally::default();
        tally.record(false);
        assert_eq!(tally.classify(), Status::Partial);
    }

    #[test]
    fn config_validation() {
        assert_eq!(
            SamplingConfig::new(101, 8, Duration::from_secs(15)),
            Err(SamplingError::PercentageOutOfRange(101))
        );
        assert_eq!(
            SamplingConfig::new(10, 0, Duration::from_secs(15)),
            Err(SamplingError::ZeroRetries)
        );
        let config = SamplingConfig::new(0, 8, Duration::from_secs(15)).unwrap();
        assert!(config.is_disabled());
    }
}
