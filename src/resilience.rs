//! Retry and circuit-breaker machinery shared by the resource clients.
//!
//! Each external source gets one [`CircuitBreaker`]; it protects a
//! whole scheduler cycle from a degraded upstream by short-circuiting
//! calls to a fallback value instead of waiting out the full timeout on
//! every tracked link.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::errors::ApiError;

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Delay is randomized by +/- this fraction.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let spread = if self.jitter > 0.0 {
            let factor = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            capped * factor
        } else {
            0.0
        };
        Duration::from_secs_f64((capped + spread).max(0.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow through.
    Closed,
    /// Calls are rejected until the reset timeout elapses.
    Open,
    /// One probe call is allowed through to test recovery.
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Number of recent call outcomes considered.
    pub window_size: usize,
    /// Failures within the window that open the circuit.
    pub failure_threshold: usize,
    /// How long the circuit stays open before probing.
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            window_size: 10,
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    // true = failure, most recent at the back
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
}

/// Sliding-window circuit breaker, shared per external source.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        CircuitBreaker {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Whether a call may proceed. Transitions `Open` to `HalfOpen`
    /// once the reset timeout has elapsed.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.window.clear();
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CircuitState::HalfOpen {
            // Probe failed; go straight back to open.
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            return;
        }
        inner.window.push_back(true);
        while inner.window.len() > self.config.window_size {
            inner.window.pop_front();
        }
        let failures = inner.window.iter().filter(|failed| **failed).count();
        if failures >= self.config.failure_threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}

/// Run `op` with retries, reporting the outcome to the breaker.
///
/// When the breaker is open the call is skipped entirely and
/// `fallback` is returned, so a degraded upstream costs nothing per
/// link. Non-retryable errors propagate immediately and do not count
/// against the breaker.
pub async fn call<T, F, Fut>(
    name: &str,
    breaker: &CircuitBreaker,
    retry: &RetryPolicy,
    fallback: impl FnOnce() -> T,
    op: F,
) -> Result<T, ApiError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    if !breaker.allow() {
        tracing::warn!("{name}: circuit open, returning fallback");
        return Ok(fallback());
    }

    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => {
                breaker.record_success();
                return Ok(value);
            }
            Err(e) if e.is_retryable() => {
                attempt += 1;
                if attempt >= retry.max_attempts {
                    breaker.record_failure();
                    return Err(e);
                }
                let delay = e.retry_after().unwrap_or_else(|| retry.delay_for(attempt - 1));
                tracing::warn!(
                    "{name}: transient failure ({e}), retrying in {:?} (attempt {attempt})",
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
