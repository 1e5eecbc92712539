//! Retry state machine for eventually-consistent checks.
//!
//! The machine never sleeps. It consumes probe results and emits actions
//! (run the probe, wait, finish); the caller owns the timer. Target state is
//! expected to converge between attempts, so nothing is cached: every
//! `RunProbe` means a fresh probe.

use std::time::Duration;
use thiserror::Error;

/// Message carried by a verdict when every attempt failed.
pub const EXHAUSTED_MESSAGE: &str = "exhausted all attempts";

/// Retry policy errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError {
    /// A policy must allow at least one attempt.
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
}

/// Bounded-attempt, two-tier backoff policy.
///
/// Failures on attempts `1..=early_wait_attempts` wait `early_wait`, later
/// failures wait `late_wait`. Attempt `max_attempts` is terminal: no wait
/// follows it whatever the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Wait after early failures.
    pub early_wait: Duration,
    /// How many failures count as early.
    pub early_wait_attempts: u32,
    /// Wait after later failures.
    pub late_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 130,
            early_wait: Duration::from_secs(5),
            early_wait_attempts: 12,
            late_wait: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy that runs the probe once.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Reject policies that can never run the probe.
    pub fn validate(&self) -> Result<(), RetryError> {
        if self.max_attempts == 0 {
            return Err(RetryError::ZeroAttempts);
        }
        Ok(())
    }

    /// Wait after a failed `attempt` (1-based), or `None` if it was the last.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            None
        } else if attempt <= self.early_wait_attempts {
            Some(self.early_wait)
        } else {
            Some(self.late_wait)
        }
    }

    /// Upper bound on total waiting if every attempt fails.
    pub fn worst_case_wait(&self) -> Duration {
        (1..self.max_attempts)
            .filter_map(|a| self.delay_after(a))
            .sum()
    }

    /// Initial state and the action that starts it.
    pub fn start(&self) -> (RetryState, Vec<RetryAction>) {
        (
            RetryState::Pending { attempt: 1 },
            vec![RetryAction::RunProbe { attempt: 1 }],
        )
    }
}

/// Terminal result of a retried validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryVerdict {
    /// Whether the last attempt succeeded.
    pub success: bool,
    /// Attempts actually made.
    pub attempts: u32,
    /// Human-readable summary.
    pub message: String,
}

/// Retry lifecycle. Pending → Succeeded | Exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    /// Waiting for the result of `attempt`.
    Pending {
        /// Attempt currently in flight (1-based).
        attempt: u32,
    },
    /// A probe passed.
    Succeeded {
        /// Attempts made, including the passing one.
        attempts: u32,
    },
    /// Every attempt failed.
    Exhausted {
        /// Attempts made.
        attempts: u32,
    },
}

/// Result of one probe run, fed back into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEvent {
    /// Probe reported success.
    Passed,
    /// Probe reported failure.
    Failed,
}

/// Actions for the caller to execute, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAction {
    /// Run the probe again.
    RunProbe {
        /// Attempt number being started.
        attempt: u32,
    },
    /// Sleep before the next attempt.
    Wait {
        /// How long.
        delay: Duration,
    },
    /// Stop and report.
    Finish(RetryVerdict),
}

impl RetryState {
    /// True once the machine reached Succeeded or Exhausted.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RetryState::Pending { .. })
    }

    /// Process a probe result and return the new state plus actions.
    ///
    /// Events arriving in a terminal state are ignored.
    pub fn on_event(self, policy: &RetryPolicy, event: ProbeEvent) -> (Self, Vec<RetryAction>) {
        match (self, event) {
            (RetryState::Pending { attempt }, ProbeEvent::Passed) => (
                RetryState::Succeeded { attempts: attempt },
                vec![RetryAction::Finish(RetryVerdict {
                    success: true,
                    attempts: attempt,
                    message: format!("passed on attempt {}", attempt),
                })],
            ),
            (RetryState::Pending { attempt }, ProbeEvent::Failed) => {
                match policy.delay_after(attempt) {
                    Some(delay) => (
                        RetryState::Pending {
                            attempt: attempt + 1,
                        },
                        vec![
                            RetryAction::Wait { delay },
                            RetryAction::RunProbe {
                                attempt: attempt + 1,
                            },
                        ],
                    ),
                    None => (
                        RetryState::Exhausted { attempts: attempt },
                        vec![RetryAction::Finish(RetryVerdict {
                            success: false,
                            attempts: attempt,
                            message: EXHAUSTED_MESSAGE.to_string(),
                        })],
                    ),
                }
            }
            (terminal, _) => (terminal, vec![]),
        }
    }
}
