//! Bounded retry state machine.
//!
//! The policy decides *whether* and *how long to wait*; callers own the
//! actual timers. Nothing in here sleeps, so every decision can be tested
//! without a runtime.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "delayMs", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry.
    #[serde(with = "millis")]
    Fixed(Duration),
    /// `base × failures` before the n-th retry.
    #[serde(with = "millis")]
    Linear(Duration),
}

impl Backoff {
    /// Delay to wait after the given number of consecutive failures (1-based).
    #[must_use]
    pub fn delay_after(&self, failures: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Linear(base) => base.saturating_mul(failures.max(1)),
        }
    }
}

/// Retry budget plus backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Failures tolerated before giving up. The failure that reaches this
    /// count is terminal.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, Backoff::Fixed(delay))
    }

    pub const fn linear(max_attempts: u32, base: Duration) -> Self {
        Self::new(max_attempts, Backoff::Linear(base))
    }

    /// Fresh state with no recorded failures.
    #[must_use]
    pub const fn start(self) -> RetryState {
        RetryState {
            policy: self,
            failures: 0,
        }
    }
}

/// What the caller should do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again once `delay` has elapsed. `attempt` is the 1-based number
    /// of the upcoming retry.
    RetryAfter { attempt: u32, delay: Duration },
    /// Budget spent. `failures` is the total recorded.
    Exhausted { failures: u32 },
}

/// Failure counter bound to a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    policy: RetryPolicy,
    failures: u32,
}

impl RetryState {
    /// Record one failure and decide the next step.
    ///
    /// Once exhausted, further failures keep returning `Exhausted` without
    /// growing the count past the budget.
    pub fn record_failure(&mut self) -> RetryDecision {
        if self.failures >= self.policy.max_attempts {
            return RetryDecision::Exhausted {
                failures: self.failures,
            };
        }

        self.failures += 1;
        if self.failures >= self.policy.max_attempts {
            RetryDecision::Exhausted {
                failures: self.failures,
            }
        } else {
            RetryDecision::RetryAfter {
                attempt: self.failures,
                delay: self.policy.backoff.delay_after(self.failures),
            }
        }
    }

    pub const fn reset(&mut self) {
        self.failures = 0;
    }

    pub const fn failures(&self) -> u32 {
        self.failures
    }

    pub const fn is_exhausted(&self) -> bool {
        self.failures >= self.policy.max_attempts
    }

    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff_grows_with_failures() {
        let mut state = RetryPolicy::linear(3, Duration::from_secs(3)).start();

        assert_eq!(
            state.record_failure(),
            RetryDecision::RetryAfter {
                attempt: 1,
                delay: Duration::from_secs(3)
            }
        );
        assert_eq!(
            state.record_failure(),
            RetryDecision::RetryAfter {
                attempt: 2,
                delay: Duration::from_secs(6)
            }
        );
        assert_eq!(
            state.record_failure(),
            RetryDecision::Exhausted { failures: 3 }
        );
        assert!(state.is_exhausted());
    }

    #[test]
    fn fixed_backoff_keeps_delay_constant() {
        let mut state = RetryPolicy::fixed(3, Duration::from_secs(2)).start();

        for attempt in 1..=2 {
            assert_eq!(
                state.record_failure(),
                RetryDecision::RetryAfter {
                    attempt,
                    delay: Duration::from_secs(2)
                }
            );
        }
        assert!(matches!(
            state.record_failure(),
            RetryDecision::Exhausted { .. }
        ));
    }

    #[test]
    fn exhausted_state_is_a_ceiling() {
        let mut state = RetryPolicy::linear(1, Duration::from_millis(10)).start();
        assert_eq!(
            state.record_failure(),
            RetryDecision::Exhausted { failures: 1 }
        );
        assert_eq!(
            state.record_failure(),
            RetryDecision::Exhausted { failures: 1 }
        );
        assert_eq!(state.failures(), 1);
    }

    #[test]
    fn reset_restores_the_full_budget() {
        let mut state = RetryPolicy::fixed(2, Duration::from_millis(5)).start();
        state.record_failure();
        state.record_failure();
        assert!(state.is_exhausted());

        state.reset();
        assert_eq!(state.failures(), 0);
        assert!(matches!(
            state.record_failure(),
            RetryDecision::RetryAfter { attempt: 1, .. }
        ));
    }

    #[test]
    fn zero_budget_is_immediately_exhausted() {
        let mut state = RetryPolicy::fixed(0, Duration::from_secs(1)).start();
        assert_eq!(
            state.record_failure(),
            RetryDecision::Exhausted { failures: 0 }
        );
    }

    #[test]
    fn policy_round_trips_through_json() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(3000));
        let json = serde_json::to_value(policy).unwrap();
        assert_eq!(json["backoff"]["kind"], "linear");
        assert_eq!(json["backoff"]["delayMs"], 3000);
        let back: RetryPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(back, policy);
    }
}
