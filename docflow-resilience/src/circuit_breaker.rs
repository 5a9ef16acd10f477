//! ABOUTME: Per-service CLOSED/OPEN/HALF_OPEN circuit breaker state machine (C1)
//! ABOUTME: and the process-wide registry that hands out stable instances by service name

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The three states a circuit breaker can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Tunables for one circuit breaker instance.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// A single service's failure gate. Per §4.1:
/// - `CLOSED`: calls pass; `failure_threshold` consecutive failures open it.
/// - `OPEN`: calls are rejected; after `recovery_timeout` elapses since the
///   last failure, a *read* of the state transitions it to `HALF_OPEN`.
/// - `HALF_OPEN`: the next call is allowed; success closes it (and resets
///   the counter); failure reopens it (and restarts the timer).
pub struct CircuitBreaker {
    service_name: String,
    config: BreakerConfig,
    state: RwLock<BreakerState>,
    consecutive_failures: AtomicU32,
    last_failure_at: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(service_name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            service_name: service_name.into(),
            config,
            state: RwLock::new(BreakerState::Closed),
            consecutive_failures: AtomicU32::new(0),
            last_failure_at: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Reading state may itself perform the `OPEN -> HALF_OPEN` transition
    /// based on elapsed time (§4.1).
    #[must_use]
    pub fn state(&self) -> BreakerState {
        let current = *self.state.read();
        if current == BreakerState::Open {
            let elapsed_ok = self
                .last_failure_at
                .read()
                .is_some_and(|at| at.elapsed() >= self.config.recovery_timeout);
            if elapsed_ok {
                let mut guard = self.state.write();
                if *guard == BreakerState::Open {
                    *guard = BreakerState::HalfOpen;
                    tracing::debug!(service = %self.service_name, "circuit breaker half-opening");
                }
                return *guard;
            }
        }
        current
    }

    /// Returns `Ok(())` if the call may proceed, or the remaining cooldown
    /// if the circuit is open.
    pub fn check(&self) -> Result<(), Duration> {
        match self.state() {
            BreakerState::Open => {
                let remaining = self
                    .last_failure_at
                    .read()
                    .map_or(self.config.recovery_timeout, |at| {
                        self.config
                            .recovery_timeout
                            .saturating_sub(at.elapsed())
                    });
                Err(remaining)
            }
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
        }
    }

    pub fn record_success(&self) {
        match self.state() {
            BreakerState::HalfOpen => {
                *self.state.write() = BreakerState::Closed;
                self.consecutive_failures.store(0, Ordering::SeqCst);
                tracing::info!(service = %self.service_name, "circuit breaker closed after successful half-open probe");
            }
            BreakerState::Closed => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        *self.last_failure_at.write() = Some(Instant::now());

        match self.state() {
            BreakerState::HalfOpen => {
                *self.state.write() = BreakerState::Open;
                tracing::warn!(service = %self.service_name, "circuit breaker reopened after failed half-open probe");
            }
            BreakerState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold {
                    *self.state.write() = BreakerState::Open;
                    tracing::warn!(
                        service = %self.service_name,
                        failures,
                        "circuit breaker opened after consecutive failures"
                    );
                }
            }
            BreakerState::Open => {}
        }
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }
}

/// Process-wide registry keyed by service name, providing stable instances
/// (§4.1: "a single process-wide registry keyed by service name provides
/// stable instances").
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get_or_create(&self, service_name: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(service_name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(service_name, config)))
            .clone()
    }

    pub fn reset_all(&self) {
        self.breakers.clear();
    }
}
