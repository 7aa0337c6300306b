//! Circuit breaker for generative providers.
//!
//! Tracks consecutive failures per provider. When failures reach the
//! threshold the circuit *opens* and Tier 3 is skipped without reserving
//! budget. After a cooldown the circuit goes *half-open* and lets one probe
//! through; a success closes it again.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Circuit state for a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Healthy: requests allowed.
    Closed,
    /// Tripped: requests blocked until cooldown expires.
    Open,
    /// Cooldown expired: one probe request allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Seconds after last failure before Open → HalfOpen.
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Per-provider circuit breaker tracking consecutive failures.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    consecutive_failures: HashMap<String, u32>,
    last_failure_secs: HashMap<String, u64>,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            consecutive_failures: HashMap::new(),
            last_failure_secs: HashMap::new(),
            failure_threshold: failure_threshold.max(1),
            cooldown_secs,
        }
    }

    pub fn from_config(config: CircuitBreakerConfig) -> Self {
        Self::new(config.failure_threshold, config.cooldown_secs)
    }

    /// Record a success: resets circuit to Closed.
    pub fn record_success(&mut self, provider: &str) {
        self.consecutive_failures.remove(provider);
        self.last_failure_secs.remove(provider);
    }

    /// Record a failure: may trip circuit to Open.
    pub fn record_failure(&mut self, provider: &str) {
        let count = self
            .consecutive_failures
            .entry(provider.to_string())
            .or_insert(0);
        *count += 1;
        self.last_failure_secs
            .insert(provider.to_string(), unix_now());
    }

    pub fn state(&self, provider: &str) -> CircuitState {
        let failures = self.failure_count(provider);
        if failures < self.failure_threshold {
            return CircuitState::Closed;
        }
        let last = self.last_failure_secs.get(provider).copied().unwrap_or(0);
        if unix_now().saturating_sub(last) >= self.cooldown_secs {
            CircuitState::HalfOpen
        } else {
            CircuitState::Open
        }
    }

    /// Whether the provider may be called (Closed or HalfOpen).
    pub fn is_available(&self, provider: &str) -> bool {
        !matches!(self.state(provider), CircuitState::Open)
    }

    pub fn failure_count(&self, provider: &str) -> u32 {
        self.consecutive_failures.get(provider).copied().unwrap_or(0)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::from_config(CircuitBreakerConfig::default())
    }
}
