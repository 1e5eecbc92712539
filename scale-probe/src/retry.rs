//! Async driver for the retry state machine.

use scale_core::{ProbeEvent, RetryAction, RetryPolicy, RetryState, RetryVerdict};
use std::future::Future;

use crate::clock::Clock;

/// Run `probe` under `policy` until it passes or attempts are exhausted.
///
/// `probe` receives the 1-based attempt number. `Ok(true)` is a pass,
/// `Ok(false)` a failure worth retrying; `Err` aborts immediately (the probe
/// could not even record its result). Waits go through `clock`; none follows
/// the final attempt.
pub async fn retry<F, Fut, E>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    mut probe: F,
) -> Result<RetryVerdict, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let (mut state, mut actions) = policy.start();

    loop {
        let mut next = Vec::new();
        for action in actions {
            match action {
                RetryAction::RunProbe { attempt } => {
                    let passed = probe(attempt).await?;
                    let event = if passed {
                        ProbeEvent::Passed
                    } else {
                        tracing::debug!(attempt, max = policy.max_attempts, "attempt failed");
                        ProbeEvent::Failed
                    };
                    let (new_state, more) = state.on_event(policy, event);
                    state = new_state;
                    next.extend(more);
                }
                RetryAction::Wait { delay } => clock.sleep(delay).await,
                RetryAction::Finish(verdict) => {
                    if verdict.success {
                        tracing::info!(attempts = verdict.attempts, "validation passed");
                    } else {
                        tracing::warn!(attempts = verdict.attempts, "{}", verdict.message);
                    }
                    return Ok(verdict);
                }
            }
        }
        actions = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn always_failing_probe_runs_130_times() {
        let clock = FakeClock::new();
        let calls = AtomicU32::new(0);
        let verdict = retry(&RetryPolicy::default(), &clock, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Infallible>(false) }
        })
        .await
        .unwrap();

        assert!(!verdict.success);
        assert_eq!(verdict.attempts, 130);
        assert_eq!(verdict.message, "exhausted all attempts");
        assert_eq!(calls.load(Ordering::SeqCst), 130);

        let sleeps = clock.sleeps();
        assert_eq!(sleeps.len(), 129);
        assert_eq!(sleeps.iter().filter(|d| **d == Duration::from_secs(5)).count(), 12);
        assert_eq!(sleeps.iter().filter(|d| **d == Duration::from_secs(30)).count(), 117);
    }

    #[tokio::test]
    async fn success_on_attempt_k() {
        let clock = FakeClock::new();
        let verdict = retry(&RetryPolicy::default(), &clock, |attempt| async move {
            Ok::<_, Infallible>(attempt == 4)
        })
        .await
        .unwrap();

        assert!(verdict.success);
        assert_eq!(verdict.attempts, 4);
        assert_eq!(clock.sleeps().len(), 3);
    }

    #[tokio::test]
    async fn each_attempt_runs_fresh() {
        let clock = FakeClock::new();
        let seen = std::sync::Mutex::new(Vec::new());
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        retry(&policy, &clock, |attempt| {
            seen.lock().unwrap().push(attempt);
            async { Ok::<_, Infallible>(false) }
        })
        .await
        .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn probe_error_aborts() {
        let clock = FakeClock::new();
        let result = retry(&RetryPolicy::default(), &clock, |attempt| async move {
            if attempt == 2 {
                Err("disk full")
            } else {
                Ok(false)
            }
        })
        .await;
        assert_eq!(result.unwrap_err(), "disk full");
        assert_eq!(clock.sleeps().len(), 1);
    }
}
