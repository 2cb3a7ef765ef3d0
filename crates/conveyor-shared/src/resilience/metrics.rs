//! # Circuit Breaker Metrics
//!
//! A point-in-time snapshot of a circuit breaker's counters, cheap to
//! clone and serialize for the health endpoint or a metrics exporter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::CircuitState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u64,
    pub half_open_calls: u64,
    pub total_duration: Duration,
    pub current_state: CircuitState,
    pub failure_rate: f64,
    pub success_rate: f64,
    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            half_open_calls: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            success_rate: 0.0,
            average_duration: Duration::ZERO,
        }
    }

    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Testing system health",
        }
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Integration point for exporting circuit breaker metrics to a monitoring
/// system. The only implementation shipped here logs structured events;
/// a real deployment swaps this for a StatsD/Prometheus exporter without
/// touching the breaker itself.
pub trait MetricsCollector {
    fn record_circuit_breaker_metrics(&self, name: &str, metrics: &CircuitBreakerMetrics);
    fn record_state_transition(&self, name: &str, from: CircuitState, to: CircuitState);
}

#[derive(Debug, Default)]
pub struct TracingMetricsCollector;

impl MetricsCollector for TracingMetricsCollector {
    fn record_circuit_breaker_metrics(&self, name: &str, metrics: &CircuitBreakerMetrics) {
        tracing::info!(
            circuit_breaker = name,
            total_calls = metrics.total_calls,
            failure_count = metrics.failure_count,
            failure_rate = metrics.failure_rate,
            state = ?metrics.current_state,
            "circuit breaker metrics"
        );
    }

    fn record_state_transition(&self, name: &str, from: CircuitState, to: CircuitState) {
        tracing::info!(
            circuit_breaker = name,
            from_state = ?from,
            to_state = ?to,
            "circuit breaker state transition"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_metrics_are_healthy() {
        let metrics = CircuitBreakerMetrics::new();
        assert!(metrics.is_healthy());
    }

    #[test]
    fn open_state_is_never_healthy() {
        let mut metrics = CircuitBreakerMetrics::new();
        metrics.current_state = CircuitState::Open;
        assert!(!metrics.is_healthy());
    }

    #[test]
    fn high_failure_rate_unhealthy_when_closed() {
        let mut metrics = CircuitBreakerMetrics::new();
        metrics.failure_rate = 0.2;
        assert!(!metrics.is_healthy());
    }
}
