//! Retry execution for calls the server transiently rejects
//!
//! The automation server is single-threaded; while it is busy it rejects
//! incoming calls with a transient fault. [`RetryExecutor`] absorbs those
//! rejections with bounded, linearly backing-off retries. Any other fault
//! is re-raised immediately — the retry decision is purely
//! [`AutomationError::is_transient`].
//!
//! Callers must ensure the wrapped operation is idempotent, or own cleanup
//! on partial failure; the executor itself never mutates session state.

use crate::error::{AutomationError, Result};
use chrono::{DateTime, Local};
use std::time::Duration;

/// Default number of attempts per operation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay; attempt `n` sleeps `base * n` (0.5s, 1s, 1.5s, ...)
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Retry policy: attempt count and backoff base
///
/// These are policy, not domain invariants; override them freely
/// (tests run with a zero delay).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy with no sleeping between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff before retrying after failed attempt `attempt_number`
    pub fn delay_for(&self, attempt_number: u32) -> Duration {
        self.base_delay * attempt_number
    }
}

/// How one attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    TransientFault(String),
    TerminalFault(String),
}

/// One entry in the diagnostic attempt log
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    pub attempt_number: u32,
    pub operation_name: String,
    pub outcome: AttemptOutcome,
    pub timestamp: DateTime<Local>,
}

/// Executes operations against the server, retrying transient rejections
///
/// The attempt log is append-only and diagnostic; it never feeds back into
/// control decisions.
#[derive(Debug, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    log: Vec<RetryAttempt>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            log: Vec::new(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// The attempt log accumulated so far
    pub fn log(&self) -> &[RetryAttempt] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Run `operation` under the executor's policy
    pub fn execute<T>(
        &mut self,
        operation_name: &str,
        operation: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let max_attempts = self.policy.max_attempts;
        self.execute_with(operation_name, max_attempts, operation)
    }

    /// Run `operation` with an explicit attempt limit
    pub fn execute_with<T>(
        &mut self,
        operation_name: &str,
        max_attempts: u32,
        mut operation: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let max_attempts = max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match operation() {
                Ok(value) => {
                    self.record(attempt, operation_name, AttemptOutcome::Success);
                    return Ok(value);
                }
                Err(err) if err.is_transient() => {
                    self.record(
                        attempt,
                        operation_name,
                        AttemptOutcome::TransientFault(err.to_string()),
                    );
                    if attempt == max_attempts {
                        return Err(AutomationError::RetryExhausted {
                            operation: operation_name.to_string(),
                            attempts: max_attempts,
                            source: Box::new(err),
                        });
                    }
                    let delay = self.policy.delay_for(attempt);
                    log::debug!(
                        "{operation_name}: busy (attempt {attempt}/{max_attempts}), retrying in {delay:?}"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                Err(err) => {
                    self.record(
                        attempt,
                        operation_name,
                        AttemptOutcome::TerminalFault(err.to_string()),
                    );
                    return Err(err);
                }
            }
        }

        unreachable!("loop either returns a value or an error")
    }

    fn record(&mut self, attempt_number: u32, operation_name: &str, outcome: AttemptOutcome) {
        self.log.push(RetryAttempt {
            attempt_number,
            operation_name: operation_name.to_string(),
            outcome,
            timestamp: Local::now(),
        });
    }
}
