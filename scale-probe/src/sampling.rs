//! Sampling validator: probe a random subset of a population.

use scale_core::{sample_size, select_sample, SampleTally, SamplingConfig};
use scale_types::{Status, UnitRef, ValidationOutcome};
use serde_json::Value;
use std::future::Future;
use std::time::Instant;

use crate::clock::Clock;

/// Aggregated result of one sampling run.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleReport {
    /// PASS, PARTIAL or SKIP. Never FAIL.
    pub status: Status,
    /// Population size.
    pub population: usize,
    /// Configured percentage.
    pub percentage: u8,
    /// Pass/fail counts.
    pub tally: SampleTally,
    /// Sampled units that never answered.
    pub failed_units: Vec<UnitRef>,
    /// Why the check was skipped, if it was.
    pub skip_reason: Option<String>,
}

impl SampleReport {
    fn skipped(population: usize, percentage: u8, reason: &str) -> Self {
        Self {
            status: Status::Skip,
            population,
            percentage,
            tally: SampleTally::default(),
            failed_units: Vec::new(),
            skip_reason: Some(reason.to_string()),
        }
    }

    /// Convert into the outcome for phase `phase`.
    pub fn to_outcome(&self, phase: &str) -> ValidationOutcome {
        let message = match &self.skip_reason {
            Some(reason) => reason.clone(),
            None => format!(
                "{}/{} sampled units reachable ({}% of {})",
                self.tally.passed, self.tally.validated, self.percentage, self.population
            ),
        };
        let failed: Vec<Value> = self
            .failed_units
            .iter()
            .map(|u| Value::String(u.to_string()))
            .collect();

        ValidationOutcome::new(phase, self.status, message)
            .with_extra("population", self.population)
            .with_extra("percentage", self.percentage)
            .with_extra("sample_size", self.tally.validated)
            .with_extra("passed", self.tally.passed)
            .with_extra("failed", self.tally.failed)
            .with_extra("failed_units", Value::Array(failed))
    }
}

/// Run `attempt` up to `config.max_retries()` times with the fixed interval
/// between failures. Returns the first `Some`.
pub async fn probe_with_retries<T, F, Fut>(
    config: &SamplingConfig,
    clock: &dyn Clock,
    mut attempt: F,
) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for n in 1..=config.max_retries() {
        if let Some(value) = attempt(n).await {
            return Some(value);
        }
        if n < config.max_retries() {
            clock.sleep(config.retry_interval()).await;
        }
    }
    None
}

/// Sample `population` and run `probe` (retried per unit) on every sampled unit.
///
/// SKIP when sampling is disabled, credentials are absent, or there is
/// nothing to sample. Otherwise PASS if every sampled unit answered,
/// PARTIAL if some did not.
pub async fn validate_sample<F, Fut>(
    population: &[UnitRef],
    config: &SamplingConfig,
    credentials_available: bool,
    clock: &dyn Clock,
    probe: F,
) -> SampleReport
where
    F: Fn(UnitRef) -> Fut,
    Fut: Future<Output = bool>,
{
    let percentage = config.percentage();
    if config.is_disabled() {
        return SampleReport::skipped(population.len(), percentage, "sampling disabled (0%)");
    }
    if !credentials_available {
        return SampleReport::skipped(population.len(), percentage, "no guest credentials configured");
    }
    if population.is_empty() {
        return SampleReport::skipped(0, percentage, "no units discovered");
    }

    let sample = select_sample(population, percentage, &mut rand::thread_rng());
    tracing::info!(
        population = population.len(),
        percentage,
        sample = sample.len(),
        "sampling units for guest validation"
    );
    debug_assert_eq!(sample.len(), sample_size(population.len(), percentage));

    let started = Instant::now();
    let mut tally = SampleTally::default();
    let mut failed_units = Vec::new();

    for unit in sample {
        let answered = probe_with_retries(config, clock, |attempt| {
            let fut = probe(unit.clone());
            let unit = &unit;
            async move {
                if fut.await {
                    Some(())
                } else {
                    tracing::debug!(%unit, attempt, "unit not reachable yet");
                    None
                }
            }
        })
        .await
        .is_some();

        if !answered {
            tracing::warn!(%unit, retries = config.max_retries(), "unit unreachable after all retries");
            failed_units.push(unit.clone());
        }
        tally.record(answered);
    }

    tracing::info!(
        passed = tally.passed,
        failed = tally.failed,
        elapsed_secs = started.elapsed().as_secs(),
        "sampling complete"
    );

    SampleReport {
        status: tally.classify(),
        population: population.len(),
        percentage,
        tally,
        failed_units,
        skip_reason: None,
    }
}
