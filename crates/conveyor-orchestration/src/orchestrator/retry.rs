//! Pure delay computations for the alarm loop (§4.4, §5).
//!
//! Kept free of the actor's mutable state so the schedule a given
//! `retry_count` produces can be asserted on directly.

use std::time::Duration;

use conveyor_shared::config::OrchestrationConfig;

/// Delay between two alarms that both observed forward progress.
pub fn phase_delay(config: &OrchestrationConfig) -> Duration {
    Duration::from_millis(config.alarm_delay_phase_ms)
}

/// Delay before retrying after a wake that made no progress. Backs off
/// exponentially in the consecutive no-progress count, capped at 10x the
/// configured base so a flapping machine API doesn't stretch batches out
/// indefinitely.
pub fn error_retry_delay(config: &OrchestrationConfig, retry_count: u32) -> Duration {
    let base = config.alarm_delay_error_retry_ms;
    let exponent = retry_count.saturating_sub(1).min(5);
    let factor = 2u64.saturating_pow(exponent);
    let ceiling = base.saturating_mul(10);
    Duration::from_millis(base.saturating_mul(factor).min(ceiling))
}
