//! Poll policy: interval, backoff and the bounds that guarantee termination.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::env_secs;
use crate::error::{ConfigError, PollError};

/// Longest accepted poll timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// How the wait between status queries grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same interval every time.
    Constant,
    /// Interval doubles after each query, capped at `max_interval`.
    Exponential { max_interval: Duration },
}

/// Bounds and pacing for one polling run.
///
/// Every field is finite; there is no way to poll forever.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Wait before the second query (and every query under `Constant`)
    pub interval: Duration,
    /// Growth of the wait between queries
    pub backoff: Backoff,
    /// Wall-clock limit for the whole run
    pub timeout: Duration,
    /// Maximum number of status queries
    pub max_attempts: u32,
    /// Consecutive failed queries tolerated before giving up
    pub max_transient_failures: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            backoff: Backoff::Constant,
            timeout: Duration::from_secs(600),
            max_attempts: 120,
            max_transient_failures: 3,
        }
    }
}

impl PollPolicy {
    /// Policy with explicit pacing and bounds.
    pub fn new(interval: Duration, timeout: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            timeout,
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_exponential_backoff(mut self, max_interval: Duration) -> Self {
        self.backoff = Backoff::Exponential { max_interval };
        self
    }

    pub fn with_max_transient_failures(mut self, max: u32) -> Self {
        self.max_transient_failures = max;
        self
    }

    /// Create policy from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let policy = Self {
            interval: Duration::from_secs(env_secs(
                "WMR_POLL_INTERVAL_SECS",
                defaults.interval.as_secs(),
            )?),
            timeout: Duration::from_secs(env_secs(
                "WMR_POLL_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )?),
            max_attempts: env_u32("WMR_POLL_MAX_ATTEMPTS", defaults.max_attempts)?,
            max_transient_failures: env_u32(
                "WMR_POLL_MAX_TRANSIENT_FAILURES",
                defaults.max_transient_failures,
            )?,
            backoff: match std::env::var("WMR_POLL_BACKOFF_MAX_SECS") {
                Ok(_) => Backoff::Exponential {
                    max_interval: Duration::from_secs(env_secs("WMR_POLL_BACKOFF_MAX_SECS", 0)?),
                },
                Err(_) => Backoff::Constant,
            },
        };

        policy
            .validate()
            .map_err(|e| ConfigError::invalid("WMR_POLL_*", e.to_string()))?;
        Ok(policy)
    }

    /// Reject policies that could not terminate or could never query.
    pub fn validate(&self) -> Result<(), PollError> {
        if self.interval.is_zero() {
            return Err(PollError::InvalidPolicy("interval must be positive".into()));
        }
        if self.timeout.is_zero() {
            return Err(PollError::InvalidPolicy("timeout must be positive".into()));
        }
        if self.timeout > MAX_TIMEOUT {
            return Err(PollError::InvalidPolicy(format!(
                "timeout must not exceed {:?}",
                MAX_TIMEOUT
            )));
        }
        if self.max_attempts == 0 {
            return Err(PollError::InvalidPolicy("max_attempts must be positive".into()));
        }
        if self.max_transient_failures == 0 || self.max_transient_failures > self.max_attempts {
            return Err(PollError::InvalidPolicy(
                "max_transient_failures must be between 1 and max_attempts".into(),
            ));
        }
        if let Backoff::Exponential { max_interval } = self.backoff {
            if max_interval < self.interval {
                return Err(PollError::InvalidPolicy(
                    "backoff max_interval must not be below interval".into(),
                ));
            }
        }
        Ok(())
    }

    /// Wait after the given 1-based query number.
    pub fn delay_after(&self, query: u32) -> Duration {
        match self.backoff {
            Backoff::Constant => self.interval,
            Backoff::Exponential { max_interval } => {
                let exp = query.saturating_sub(1).min(16);
                self.interval.saturating_mul(2u32.pow(exp)).min(max_interval)
            }
        }
    }
}

fn env_u32(var: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid(var, format!("expected a whole number, got {:?}", raw))),
        Err(_) => Ok(default),
    }
}

/// Counts consecutive failed status queries against the transient budget.
#[derive(Debug)]
pub struct TransientBudget {
    consecutive_failures: u32,
    limit: u32,
}

impl TransientBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            consecutive_failures: 0,
            limit,
        }
    }

    /// Record a successful query (resets the count).
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            debug!(
                "Status query recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
    }

    /// Record a failed query.
    ///
    /// Returns `true` once the budget is exhausted.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        let exhausted = self.consecutive_failures >= self.limit;
        if exhausted {
            warn!(
                "Transient failure budget exhausted after {} consecutive failures",
                self.consecutive_failures
            );
        }
        exhausted
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}
