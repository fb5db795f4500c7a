use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use parley_core::errors::BackendError;
use parley_core::generator::{GenerationRequest, TextGenerator, TokenStream};

/// Retry, timeout, and circuit breaker settings for backend calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliableConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
    /// Upper bound on how long one attempt may take to start streaming.
    pub attempt_timeout_ms: u64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_cooldown_ms: u64,
}

impl Default for ReliableConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_factor: 0.2,
            attempt_timeout_ms: 60_000,
            circuit_breaker_threshold: 5,
            circuit_breaker_cooldown_ms: 60_000,
        }
    }
}

impl ReliableConfig {
    fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    fn cooldown(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_cooldown_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open { since: Instant },
    HalfOpen,
}

/// Wraps a generator with a bounded retry policy.
///
/// - Retryable errors are retried up to `max_retries` times with capped exponential backoff + jitter
/// - Each attempt is bounded by `attempt_timeout_ms`
/// - Exhausting the budget yields `RetriesExhausted` carrying the last error
/// - Fatal errors (context exhaustion, bad request) return immediately, unwrapped
/// - N consecutive failed calls open the circuit; calls fail fast until the cooldown passes
pub struct ReliableGenerator<G: TextGenerator> {
    inner: G,
    config: ReliableConfig,
    circuit_state: RwLock<CircuitState>,
    consecutive_failures: AtomicU32,
    total_retries: AtomicU64,
}

impl<G: TextGenerator> ReliableGenerator<G> {
    pub fn new(inner: G, config: ReliableConfig) -> Self {
        Self {
            inner,
            config,
            circuit_state: RwLock::new(CircuitState::Closed),
            consecutive_failures: AtomicU32::new(0),
            total_retries: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(inner: G) -> Self {
        Self::new(inner, ReliableConfig::default())
    }

    fn check_circuit(&self) -> Result<(), BackendError> {
        let state = self.circuit_state.read();
        match &*state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open { since } => {
                if since.elapsed() >= self.config.cooldown() {
                    drop(state);
                    *self.circuit_state.write() = CircuitState::HalfOpen;
                    Ok(())
                } else {
                    Err(BackendError::Overloaded)
                }
            }
        }
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let mut state = self.circuit_state.write();
        if *state != CircuitState::Closed {
            info!("circuit breaker closed after successful request");
            *state = CircuitState::Closed;
        }
    }

    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.config.circuit_breaker_threshold {
            let mut state = self.circuit_state.write();
            if matches!(*state, CircuitState::Closed | CircuitState::HalfOpen) {
                warn!(failures, "circuit breaker opened");
                *state = CircuitState::Open {
                    since: Instant::now(),
                };
            }
        }
    }

    /// Exponential backoff: base * 2^attempt, capped, then spread by the jitter factor.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let exp = self.config.base_delay_ms as f64 * 2.0_f64.powi(attempt as i32);
        let capped = exp.min(self.config.max_delay_ms as f64);
        let spread = capped * self.config.jitter_factor;
        let jitter = if spread > 0.0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    pub fn circuit_state_name(&self) -> &'static str {
        match &*self.circuit_state.read() {
            CircuitState::Closed => "closed",
            CircuitState::Open { .. } => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<TokenStream, BackendError> {
        let limit = self.config.attempt_timeout();
        match tokio::time::timeout(limit, self.inner.stream(request)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(limit)),
        }
    }
}

#[async_trait]
impl<G: TextGenerator> TextGenerator for ReliableGenerator<G> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<TokenStream, BackendError> {
        self.check_circuit()?;

        let mut attempt = 0;
        loop {
            let e = match self.attempt(request).await {
                Ok(stream) => {
                    self.record_success();
                    return Ok(stream);
                }
                Err(e) => e,
            };

            if !e.is_retryable() {
                self.record_failure();
                return Err(e);
            }
            if attempt >= self.config.max_retries {
                self.record_failure();
                return Err(BackendError::RetriesExhausted {
                    attempts: attempt + 1,
                    last: Box::new(e),
                });
            }

            let delay = e
                .suggested_delay()
                .unwrap_or_else(|| self.retry_delay(attempt));
            self.total_retries.fetch_add(1, Ordering::Relaxed);
            warn!(
                attempt = attempt + 1,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "retrying backend call"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
