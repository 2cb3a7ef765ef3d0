//! # Resilience
//!
//! A generic circuit breaker and its unifying trait, used to wrap the
//! Remote Spawner's outbound calls (§4.3) against a degraded or
//! unreachable machine API. Nothing here is specific to spawning — the
//! same breaker type could protect any outbound call.

mod behavior;
mod circuit_breaker;
mod metrics;

pub use behavior::CircuitBreakerBehavior;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use metrics::{CircuitBreakerMetrics, MetricsCollector, TracingMetricsCollector};
