//! # Database Health Evaluator
//!
//! Evaluates database connectivity and circuit breaker state for the
//! `/health` endpoint, without blocking the HTTP hot path on a slow or
//! unreachable database.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, error};

use crate::resilience::CircuitBreaker;

#[derive(Debug, Clone)]
pub struct DatabaseHealthConfig {
    pub query_timeout_ms: u64,
}

impl Default for DatabaseHealthConfig {
    fn default() -> Self {
        Self { query_timeout_ms: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseHealthStatus {
    pub evaluated: bool,
    pub is_connected: bool,
    pub circuit_breaker_open: bool,
    pub circuit_breaker_failures: u64,
    pub last_check_duration_ms: u64,
    pub error_message: Option<String>,
}

/// Evaluate database health, skipping the probe query entirely when the
/// circuit breaker is already open.
pub async fn evaluate_db_status(
    pool: &PgPool,
    circuit_breaker: &CircuitBreaker,
    config: &DatabaseHealthConfig,
) -> DatabaseHealthStatus {
    let start = Instant::now();

    let circuit_breaker_open = !circuit_breaker.should_allow();
    let circuit_breaker_failures = circuit_breaker.metrics().consecutive_failures;

    if circuit_breaker_open {
        debug!(failures = circuit_breaker_failures, "database health check skipped - circuit breaker open");
        return DatabaseHealthStatus {
            evaluated: true,
            is_connected: false,
            circuit_breaker_open: true,
            circuit_breaker_failures,
            last_check_duration_ms: 0,
            error_message: Some("circuit breaker open".to_string()),
        };
    }

    let timeout = Duration::from_millis(config.query_timeout_ms);
    let check_result = tokio::time::timeout(timeout, check_database_connection(pool)).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match check_result {
        Ok(Ok(())) => {
            circuit_breaker.record_success_manual(start.elapsed());
            debug!(duration_ms, "database health check successful");
            DatabaseHealthStatus {
                evaluated: true,
                is_connected: true,
                circuit_breaker_open: false,
                circuit_breaker_failures,
                last_check_duration_ms: duration_ms,
                error_message: None,
            }
        }
        Ok(Err(e)) => {
            circuit_breaker.record_failure_manual(start.elapsed());
            error!(error = %e, duration_ms, "database health check failed");
            DatabaseHealthStatus {
                evaluated: true,
                is_connected: false,
                circuit_breaker_open,
                circuit_breaker_failures,
                last_check_duration_ms: duration_ms,
                error_message: Some(e.to_string()),
            }
        }
        Err(_elapsed) => {
            circuit_breaker.record_failure_manual(start.elapsed());
            error!(timeout_ms = config.query_timeout_ms, duration_ms, "database health check timed out");
            DatabaseHealthStatus {
                evaluated: true,
                is_connected: false,
                circuit_breaker_open,
                circuit_breaker_failures,
                last_check_duration_ms: duration_ms,
                error_message: Some(format!("health check timed out after {}ms", config.query_timeout_ms)),
            }
        }
    }
}

async fn check_database_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
