use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

/// Exponential backoff for failed fetches: `base_ms * 2^attempt`, capped at `max_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
    /// Consecutive failures tolerated before the edge is faulted.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_ms: 250,
            max_ms: 8_000,
            max_retries: 4,
        }
    }
}

impl RetryPolicy {
    /// Delay after the failure numbered `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_ms.saturating_mul(multiplier).min(self.max_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    CoolingDown(Instant),
    Faulted,
}

/// Failure bookkeeping for one edge of a window.
#[derive(Debug, Clone, Default)]
pub struct EdgeHealth {
    failures: u32,
    retry_at: Option<Instant>,
    faulted: bool,
}

impl EdgeHealth {
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub fn readiness(&self, now: Instant) -> Readiness {
        if self.faulted {
            return Readiness::Faulted;
        }
        match self.retry_at {
            Some(at) if at > now => Readiness::CoolingDown(at),
            _ => Readiness::Ready,
        }
    }

    pub fn record_failure(&mut self, policy: &RetryPolicy, now: Instant) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = policy.delay(self.failures - 1);
        self.retry_at = Some(now + delay);
        self.faulted = self.failures > policy.max_retries;
        delay
    }

    pub fn record_success(&mut self) {
        *self = Self::default();
    }

    /// Lets a faulted edge try once more. The backoff deadline of the last failure
    /// still applies and the failure count is kept, so the next failure re-faults.
    pub fn revive(&mut self) -> bool {
        std::mem::replace(&mut self.faulted, false)
    }
}
