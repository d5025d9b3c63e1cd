use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

/// Health gate for one downstream dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        })
    }
}

/// Consecutive half-open successes required to close the circuit.
const HALF_OPEN_CLOSE_THRESHOLD: u32 = 2;

/// Three-state circuit breaker, evaluated deterministically from `state`,
/// `failure_count`, and elapsed time only. Process-local, never persisted.
///
/// Uses `tokio::time::Instant` so the recovery clock follows the runtime's
/// (pausable) clock.
pub struct CircuitBreaker {
    service: String,
    failure_threshold: u32,
    recovery: Duration,
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    half_open_successes: u32,
}

impl CircuitBreaker {
    pub fn new(service: &str, failure_threshold: u32, recovery: Duration) -> Self {
        Self {
            service: service.to_string(),
            failure_threshold,
            recovery,
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            half_open_successes: 0,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Consulted before every call. While open, flips to half-open once
    /// the recovery interval has elapsed and admits the caller as a probe.
    pub fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = self
                    .last_failure_at
                    .map(|t| t.elapsed())
                    .unwrap_or(self.recovery);
                if elapsed >= self.recovery {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_successes = 0;
                    info!(
                        service = %self.service,
                        after_ms = elapsed.as_millis() as u64,
                        "circuit half-open, admitting probes"
                    );
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.half_open_successes += 1;
            if self.half_open_successes >= HALF_OPEN_CLOSE_THRESHOLD {
                self.state = CircuitState::Closed;
                self.failure_count = 0;
                info!(service = %self.service, "circuit closed");
            }
        } else {
            self.failure_count = 0;
        }
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_at = Some(Instant::now());

        if self.state == CircuitState::HalfOpen {
            self.state = CircuitState::Open;
            warn!(service = %self.service, "half-open probe failed, circuit re-opened");
        } else if self.failure_count >= self.failure_threshold {
            self.state = CircuitState::Open;
            warn!(
                service = %self.service,
                failures = self.failure_count,
                threshold = self.failure_threshold,
                "circuit opened"
            );
        }
    }
}
