//! Bounded fixed-delay retry with an observable connection state

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use crate::core::constants::{DEFAULT_RETRY_DELAY_MS, DEFAULT_RETRY_MAX_ATTEMPTS};

/// How many times to attempt an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

/// Lifecycle of a connect sequence.
///
/// `Idle -> Attempting -> (Attempting ->)* Connected | Failed`. The two
/// terminal states are never left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectState {
    Idle,
    Attempting { attempt: u32 },
    Connected { attempts: u32 },
    Failed { attempts: u32, error: String },
}

impl fmt::Display for ConnectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectState::Idle => write!(f, "not started"),
            ConnectState::Attempting { attempt } => write!(f, "connecting, attempt {}", attempt),
            ConnectState::Connected { attempts } => {
                write!(f, "connected after {} attempts", attempts)
            }
            ConnectState::Failed { attempts, error } => {
                write!(f, "failed after {} attempts: {}", attempts, error)
            }
        }
    }
}

/// The retry budget ran out. Carries the last error.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    #[error("gave up after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },
}

/// Runs a connect sequence under a [`RetryPolicy`] and publishes its state.
pub struct Retrier {
    policy: RetryPolicy,
    state: watch::Sender<ConnectState>,
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(ConnectState::Idle);
        Self { policy, state }
    }

    pub fn state(&self) -> ConnectState {
        self.state.borrow().clone()
    }

    /// Run `operation` until it succeeds or `max_attempts` attempts have failed.
    ///
    /// Each attempt must release whatever it acquired before returning an
    /// error; nothing from a failed attempt is reused.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.state.send_replace(ConnectState::Attempting { attempt });
            tracing::debug!(label, attempt, max_attempts, "Attempting");

            match operation().await {
                Ok(value) => {
                    self.state
                        .send_replace(ConnectState::Connected { attempts: attempt });
                    tracing::info!(label, attempts = attempt, "Connected");
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(
                        label,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Attempt {} of {} failed",
                        attempt,
                        max_attempts
                    );
                    if attempt >= max_attempts {
                        self.state.send_replace(ConnectState::Failed {
                            attempts: attempt,
                            error: e.to_string(),
                        });
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            source: e,
                        });
                    }
                    tokio::time::sleep(self.policy.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use tokio::time::Instant;

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("{0}")]
    struct Flaky(String);

    fn policy(max_attempts: u32, delay_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(delay_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_try() {
        let retrier = Retrier::new(policy(3, 5000));
        let result = retrier.run("test", || async { Ok::<_, Flaky>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(retrier.state(), ConnectState::Connected { attempts: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_failures() {
        let retrier = Retrier::new(policy(10, 5000));
        let calls = Cell::new(0u32);
        let result = retrier
            .run("test", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 4 {
                        Err(Flaky(format!("broker down ({n})")))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(calls.get(), 4);
        assert_eq!(retrier.state(), ConnectState::Connected { attempts: 4 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_exact_attempts_with_fixed_delay() {
        let retrier = Retrier::new(policy(10, 5000));
        let started = RefCell::new(Vec::new());
        let result = retrier
            .run("test", || {
                started.borrow_mut().push(Instant::now());
                async { Err::<(), _>(Flaky("unreachable".into())) }
            })
            .await;

        let Err(RetryError::Exhausted { attempts, source }) = result else {
            panic!("expected exhaustion");
        };
        assert_eq!(attempts, 10);
        assert_eq!(source, Flaky("unreachable".into()));

        let started = started.into_inner();
        assert_eq!(started.len(), 10);
        for pair in started.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(5000));
        }
        assert_eq!(
            retrier.state(),
            ConnectState::Failed {
                attempts: 10,
                error: "unreachable".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_delay_after_last_attempt() {
        let retrier = Retrier::new(policy(2, 1000));
        let start = Instant::now();
        let _ = retrier
            .run("test", || async { Err::<(), _>(Flaky("down".into())) })
            .await;
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions_are_observable() {
        let retrier = Retrier::new(policy(3, 100));
        let mut rx = retrier.state.subscribe();
        assert_eq!(*rx.borrow(), ConnectState::Idle);

        let calls = Cell::new(0u32);
        retrier
            .run("test", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n == 1 {
                        Err(Flaky("first".into()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(
            *rx.borrow_and_update(),
            ConnectState::Connected { attempts: 2 }
        );
        assert_eq!(retrier.state().to_string(), "connected after 2 attempts");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_message_names_cause_once() {
        let retrier = Retrier::new(policy(2, 10));
        let err = retrier
            .run("test", || async { Err::<(), _>(Flaky("broker unavailable".into())) })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "gave up after 2 attempts");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("broker unavailable"));
        assert_eq!(
            format!("{:#}", anyhow::Error::new(err)),
            "gave up after 2 attempts: broker unavailable"
        );
    }

    #[test]
    fn test_zero_attempts_treated_as_one() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        let retrier = Retrier::new(policy(0, 10));
        let calls = Cell::new(0u32);
        let result = rt.block_on(retrier.run("test", || {
            calls.set(calls.get() + 1);
            async { Err::<(), _>(Flaky("down".into())) }
        }));
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
