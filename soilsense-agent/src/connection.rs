//! Startup gate for the hardware backend
//!
//! The agent must not touch the sensor or the relay before the backend has
//! answered its liveness probe. `ConnectionWaiter::wait` probes the backend,
//! sleeping a fixed delay between failed attempts, and flips the
//! `ConnectionState` to established on the first success. Only transport-level
//! failures are retried; any other probe error is returned immediately.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::BackendError;
use crate::clock::Clock;

/// Liveness check against the backend
pub trait Probe: Send + Sync {
    fn probe(&self) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// How many probes the waiter may spend before giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    Unbounded,
    Bounded(u32),
}

impl RetryPolicy {
    fn allows(&self, attempts_made: u32) -> bool {
        match self {
            RetryPolicy::Unbounded => true,
            RetryPolicy::Bounded(max) => attempts_made < *max,
        }
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryPolicy::Unbounded => write!(f, "unbounded"),
            RetryPolicy::Bounded(max) => write!(f, "{} attempts", max),
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid retry policy '{0}': expected 'unbounded', -1 or an attempt count")]
pub struct InvalidRetryPolicy(String);

impl FromStr for RetryPolicy {
    type Err = InvalidRetryPolicy;

    /// Accepts `unbounded` and the legacy `-1` sentinel, or an attempt count.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "unbounded" | "-1" => Ok(RetryPolicy::Unbounded),
            other => other
                .parse::<u32>()
                .map(RetryPolicy::Bounded)
                .map_err(|_| InvalidRetryPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed {attempts} times to connect to {host}:{port}")]
    Exhausted { host: String, port: u16, attempts: u32 },
    #[error("backend probe failed: {0}")]
    Backend(#[from] BackendError),
}

/// Reachability of the backend, established once per agent run
#[derive(Debug, Clone)]
pub struct ConnectionState {
    host: String,
    port: u16,
    established: bool,
}

impl ConnectionState {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            established: false,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Guard used by components that talk to the backend.
    pub fn require_established(&self) -> Result<(), BackendError> {
        if self.established {
            Ok(())
        } else {
            Err(BackendError::NotEstablished {
                host: self.host.clone(),
                port: self.port,
            })
        }
    }

    // One-way transition, only reachable from ConnectionWaiter.
    fn mark_established(&mut self) {
        self.established = true;
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionWaiter {
    policy: RetryPolicy,
    delay: Duration,
}

impl ConnectionWaiter {
    pub fn new(policy: RetryPolicy, delay: Duration) -> Self {
        Self { policy, delay }
    }

    /// Probe until the backend answers or the attempt budget is spent.
    ///
    /// Returns the number of probes made. No sleep follows the last allowed
    /// attempt. An already established state returns `Ok(0)` without probing.
    pub async fn wait<P, C>(
        &self,
        probe: &P,
        clock: &C,
        state: &mut ConnectionState,
    ) -> Result<u32, ConnectError>
    where
        P: Probe,
        C: Clock,
    {
        if state.is_established() {
            debug!("Connection to {}:{} already established", state.host, state.port);
            return Ok(0);
        }

        let mut attempts: u32 = 0;
        while self.policy.allows(attempts) {
            attempts = attempts.saturating_add(1);
            debug!("Attempting connection to {}:{} (attempt {})", state.host, state.port, attempts);

            match probe.probe().await {
                Ok(()) => {
                    state.mark_established();
                    info!(
                        "Connected to backend {}:{} after {} attempt(s)",
                        state.host, state.port, attempts
                    );
                    return Ok(attempts);
                }
                Err(e) if e.is_unreachable() => {
                    if !self.policy.allows(attempts) {
                        warn!(
                            "Error connecting to {}:{} ({}), no attempts left ({})",
                            state.host, state.port, e, self.policy
                        );
                        break;
                    }
                    warn!(
                        "Error connecting to {}:{} ({}), retrying in {:?}",
                        state.host, state.port, e, self.delay
                    );
                    clock.sleep(self.delay).await;
                }
                Err(e) => return Err(ConnectError::Backend(e)),
            }
        }

        Err(ConnectError::Exhausted {
            host: state.host.clone(),
            port: state.port,
            attempts,
        })
    }
}

#[cfg(test)]
impl ConnectionState {
    /// State as left by a successful `wait`, for tests of downstream components.
    pub(crate) fn established(host: &str, port: u16) -> Self {
        let mut state = Self::new(host, port);
        state.mark_established();
        state
    }
}
