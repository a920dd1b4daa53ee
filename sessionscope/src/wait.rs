//! Poll-until-condition-or-timeout waiting.
//!
//! [`RetryWait`] backs every blocking operation in the crate: borrowing a
//! shared session, taking a session from an exhausted pool. It reports
//! success as a boolean so callers decide whether running out of time is
//! fatal, and it never spins: the retry interval is slept between attempts
//! and cancellation is checked before each one.

use crate::cancellation::CancellationToken;
use crate::errors::SessionError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Timing knobs for waiting on an unavailable session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitOptions {
    /// Total wait budget in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Pause between attempts in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

const fn default_timeout_ms() -> u64 {
    5 * 60 * 1000
}

const fn default_retry_interval_ms() -> u64 {
    200
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl WaitOptions {
    /// Creates wait options from durations.
    #[must_use]
    pub fn new(timeout: Duration, retry_interval: Duration) -> Self {
        Self {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            retry_interval_ms: u64::try_from(retry_interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the retry interval.
    #[must_use]
    pub const fn with_retry_interval_ms(mut self, interval_ms: u64) -> Self {
        self.retry_interval_ms = interval_ms;
        self
    }

    /// Gets the timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Gets the retry interval as a Duration.
    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero retry interval.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.retry_interval_ms == 0 {
            return Err(SessionError::validation(
                "session waiting retry interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Repeatedly evaluates a predicate until it holds or the budget runs out.
#[derive(Debug, Clone, Copy)]
pub struct RetryWait {
    options: WaitOptions,
}

impl RetryWait {
    /// Creates a waiter with the given options.
    #[must_use]
    pub const fn new(options: WaitOptions) -> Self {
        Self { options }
    }

    /// Returns the options.
    #[must_use]
    pub const fn options(&self) -> &WaitOptions {
        &self.options
    }

    /// Evaluates `predicate` against `subject` until it returns true.
    ///
    /// Returns false on timeout or cancellation. The predicate is always
    /// evaluated at least once unless the token is already cancelled.
    pub async fn until<T, F>(&self, subject: &T, mut predicate: F, token: &CancellationToken) -> bool
    where
        T: ?Sized,
        F: FnMut(&T) -> bool,
    {
        let deadline = Instant::now() + self.options.timeout();
        let interval = self.options.retry_interval().max(Duration::from_millis(1));
        let mut attempts: u32 = 0;

        loop {
            if token.is_cancelled() {
                debug!(attempts, "Wait cancelled");
                return false;
            }

            attempts += 1;
            if predicate(subject) {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(
                    attempts,
                    timeout_ms = self.options.timeout_ms,
                    "Wait timed out"
                );
                return false;
            }

            let pause = interval.min(deadline - now);
            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                () = token.cancelled() => {
                    debug!(attempts, "Wait cancelled while sleeping");
                    return false;
                }
            }
        }
    }

    /// Polls `f` until it yields a value.
    ///
    /// Returns `None` on timeout or cancellation.
    pub async fn until_some<R, F>(&self, mut f: F, token: &CancellationToken) -> Option<R>
    where
        F: FnMut() -> Option<R>,
    {
        let mut found = None;
        self.until(
            &(),
            |_: &()| {
                found = f();
                found.is_some()
            },
            token,
        )
        .await;
        found
    }

    /// Builds the timeout error for a resource awaited by a context.
    #[must_use]
    pub fn timeout_error(&self, resource: impl Into<String>, context: impl Into<String>) -> SessionError {
        SessionError::timeout(resource, context, self.options.timeout_ms)
    }

    /// Builds the error for a failed wait: cancellation if the token fired,
    /// timeout otherwise.
    #[must_use]
    pub fn failure(
        &self,
        resource: impl Into<String>,
        context: impl Into<String>,
        token: &CancellationToken,
    ) -> SessionError {
        if token.is_cancelled() {
            SessionError::cancelled(
                resource,
                context,
                token.reason().unwrap_or_else(|| "cancelled".to_string()),
            )
        } else {
            self.timeout_error(resource, context)
        }
    }
}

impl Default for RetryWait {
    fn default() -> Self {
        Self::new(WaitOptions::default())
    }
}
