use std::time::Duration;

use crate::gemini::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    /// Transient failure, but the attempt budget is spent.
    Exhausted,
    /// Permanent failure; surface it as is.
    Fail,
}

/// Bounded retry with linear backoff for transient model failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_secs(2) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay }
    }

    /// `attempt` is the 1-based number of the call that just failed.
    pub fn decide(&self, attempt: u32, error: &TransportError) -> RetryDecision {
        if !error.is_transient() {
            RetryDecision::Fail
        } else if attempt >= self.max_attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::RetryAfter(self.base_delay * attempt)
        }
    }
}
