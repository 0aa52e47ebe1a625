use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::BreakerConfig;

/// Circuit breaker state, exposed read-only for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Failure returned by [`CircuitBreaker::execute`]
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Rejected without invoking the wrapped operation
    #[error("circuit breaker is open")]
    Open,

    /// The wrapped operation ran and failed
    #[error("{0}")]
    Inner(E),
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,

    /// When the current half-open probe was admitted. A probe whose future
    /// is dropped never reports back; once a full cooldown has passed a new
    /// probe is admitted so the breaker cannot wedge in half-open.
    half_open_since: Option<Instant>,
}

/// Wraps calls to a flaky dependency, rejecting fast while it is down.
///
/// Closed until `failure_threshold` consecutive failures, then open for
/// `cooldown`; the first call after the cooldown becomes the single
/// half-open probe whose outcome decides the next state.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<BreakerInner>>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
                half_open_since: None,
            })),
            config,
        }
    }

    /// Run `op` under the breaker.
    ///
    /// The state lock is never held across the await.
    pub async fn execute<T, E, F>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => {}
                CircuitState::Open => {
                    let cooled_down = inner
                        .last_failure_at
                        .is_some_and(|at| at.elapsed() >= self.config.cooldown());
                    if !cooled_down {
                        return Err(BreakerError::Open);
                    }
                    info!("Circuit breaker half-open, admitting probe call");
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_since = Some(Instant::now());
                }
                CircuitState::HalfOpen => {
                    // A probe is in flight; reject everyone else. A probe
                    // whose future was dropped never resolves the state, so
                    // after a full cooldown the next call becomes the probe.
                    let stale_probe = inner
                        .half_open_since
                        .is_none_or(|at| at.elapsed() >= self.config.cooldown());
                    if !stale_probe {
                        return Err(BreakerError::Open);
                    }
                    info!("Circuit breaker re-admitting probe after abandoned attempt");
                    inner.half_open_since = Some(Instant::now());
                }
            }
        }

        match op.await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            info!("Circuit breaker closed after successful probe");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.half_open_since = None;
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.last_failure_at = Some(Instant::now());
                    warn!(
                        "Circuit breaker opened after {} consecutive failures",
                        inner.failure_count
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.last_failure_at = Some(Instant::now());
                inner.half_open_since = None;
                warn!("Circuit breaker re-opened after failed probe");
            }
            CircuitState::Open => {
                inner.last_failure_at = Some(Instant::now());
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}
