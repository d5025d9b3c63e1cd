//! Resilience gateway for outbound calls to third-party services.
//!
//! Every external call goes through [`ServiceGateway::execute`], which
//! applies, in order: circuit check → concurrency admission → timeout →
//! execute → classify outcome → retry-or-raise.
//!
//! Breakers and concurrency slots are process-local: with N worker
//! processes the effective global concurrency per service is
//! `max_concurrent * N`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, warn};

pub mod breaker;

use breaker::{CircuitBreaker, CircuitState};

/// Static per-service policy. One of these per named service, fixed at
/// process start.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Max in-flight calls; callers beyond it wait, they do not fail.
    pub max_concurrent: usize,
    /// Hard per-call timeout; an elapsed timeout is a retryable failure.
    pub call_timeout: Duration,
    /// Retries after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting probes.
    pub recovery: Duration,
    /// Base of the exponential retry backoff.
    pub base_backoff: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            call_timeout: Duration::from_secs(90),
            max_retries: 2,
            failure_threshold: 5,
            recovery: Duration::from_secs(30),
            base_backoff: Duration::from_secs(1),
        }
    }
}

/// Classified outcome of one external call. Retryable: rate limits,
/// connection trouble, timeouts, and 5xx. Everything else is terminal.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("rate limited")]
    RateLimited,

    #[error("upstream returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid request or response: {0}")]
    Invalid(String),
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Timeout | ServiceError::Connection(_) | ServiceError::RateLimited => true,
            ServiceError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            ServiceError::Invalid(_) => false,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout
        } else if err.is_decode() {
            ServiceError::Invalid(err.to_string())
        } else if let Some(status) = err.status() {
            ServiceError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ServiceError::Connection(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The service is known-unhealthy; the call was rejected without
    /// contacting it. Treat as "defer or take another path", not as
    /// evidence the call itself was invalid.
    #[error("circuit breaker open for '{service}', request rejected")]
    CircuitOpen { service: String },

    /// The original error, annotated with service/attempt metadata.
    #[error("'{service}' call failed after {attempts} attempt(s): {source}")]
    Service {
        service: String,
        attempts: u32,
        #[source]
        source: ServiceError,
    },
}

struct ServiceEntry {
    config: ServiceConfig,
    breaker: Mutex<CircuitBreaker>,
    slots: Semaphore,
}

impl ServiceEntry {
    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().expect("breaker mutex poisoned")
    }
}

/// One breaker and one slot pool per named service, so a failure flood on
/// one service never starves another.
pub struct ServiceGateway {
    services: HashMap<String, ServiceEntry>,
}

impl ServiceGateway {
    pub fn new(configs: HashMap<String, ServiceConfig>) -> Self {
        let services = configs
            .into_iter()
            .map(|(name, config)| {
                let entry = ServiceEntry {
                    breaker: Mutex::new(CircuitBreaker::new(
                        &name,
                        config.failure_threshold,
                        config.recovery,
                    )),
                    slots: Semaphore::new(config.max_concurrent),
                    config,
                };
                (name, entry)
            })
            .collect();
        Self { services }
    }

    /// The services this deployment ships clients for, with the tuning
    /// the product runs in production.
    pub fn with_default_services() -> Self {
        let mut configs = HashMap::new();
        configs.insert(
            "anthropic".to_string(),
            ServiceConfig {
                max_concurrent: 10,
                call_timeout: Duration::from_secs(90),
                max_retries: 2,
                failure_threshold: 5,
                recovery: Duration::from_secs(30),
                base_backoff: Duration::from_secs(1),
            },
        );
        configs.insert(
            "perplexity".to_string(),
            ServiceConfig {
                max_concurrent: 5,
                call_timeout: Duration::from_secs(30),
                max_retries: 2,
                failure_threshold: 3,
                recovery: Duration::from_secs(30),
                base_backoff: Duration::from_secs(1),
            },
        );
        configs.insert(
            "firecrawl".to_string(),
            ServiceConfig {
                max_concurrent: 3,
                call_timeout: Duration::from_secs(45),
                max_retries: 1,
                failure_threshold: 3,
                recovery: Duration::from_secs(60),
                base_backoff: Duration::from_secs(1),
            },
        );
        Self::new(configs)
    }

    /// Runs `op` under this service's protections. `op` is invoked once
    /// per attempt; retryable failures are contained here and only
    /// surface once retries are exhausted.
    pub async fn execute<T, F, Fut>(&self, service: &str, mut op: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let Some(entry) = self.services.get(service) else {
            // Unknown service: pass through without protection.
            warn!(service, "no gateway config for service, executing unprotected");
            return op().await.map_err(|source| GatewayError::Service {
                service: service.to_string(),
                attempts: 1,
                source,
            });
        };

        if !entry.breaker().allow_request() {
            return Err(GatewayError::CircuitOpen {
                service: service.to_string(),
            });
        }

        let total_attempts = entry.config.max_retries + 1;
        let mut attempt: u32 = 0;

        loop {
            let started = Instant::now();
            let outcome = {
                let _slot = entry
                    .slots
                    .acquire()
                    .await
                    .expect("gateway semaphore closed");
                match timeout(entry.config.call_timeout, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(ServiceError::Timeout),
                }
                // Slot released here on success and failure alike.
            };
            let duration_ms = started.elapsed().as_millis() as u64;
            attempt += 1;

            match outcome {
                Ok(value) => {
                    entry.breaker().record_success();
                    debug!(service, attempt, duration_ms, "gateway call succeeded");
                    return Ok(value);
                }
                Err(err) => {
                    entry.breaker().record_failure();

                    if attempt < total_attempts && err.is_retryable() {
                        let wait = backoff_with_jitter(entry.config.base_backoff, attempt - 1);
                        warn!(
                            service,
                            attempt,
                            duration_ms,
                            error = %err,
                            wait_ms = wait.as_millis() as u64,
                            "gateway call failed, retrying"
                        );
                        tokio::time::sleep(wait).await;
                        // The circuit may have opened while we slept.
                        if !entry.breaker().allow_request() {
                            return Err(GatewayError::CircuitOpen {
                                service: service.to_string(),
                            });
                        }
                    } else {
                        error!(service, attempt, duration_ms, error = %err, "gateway call failed");
                        return Err(GatewayError::Service {
                            service: service.to_string(),
                            attempts: attempt,
                            source: err,
                        });
                    }
                }
            }
        }
    }

    /// Current breaker state per service, for health endpoints.
    pub fn circuit_states(&self) -> HashMap<String, CircuitState> {
        self.services
            .iter()
            .map(|(name, entry)| (name.clone(), entry.breaker().state()))
            .collect()
    }
}

/// `base * 2^attempt` plus jitter in `[0, base * 2^attempt / 2)`, so
/// synchronized clients don't retry in lockstep.
fn backoff_with_jitter(base: Duration, attempt: u32) -> Duration {
    let backoff = base * 2u32.saturating_pow(attempt.min(16));
    let jitter = backoff.mul_f64(rand::thread_rng().gen_range(0.0..0.5));
    backoff + jitter
}
