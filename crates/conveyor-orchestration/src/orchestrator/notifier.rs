//! Downstream notifier (§4.4, §2 data flow).
//!
//! The notifier's wire contract is an external collaborator's interface,
//! fixed outside this service, so the trait intentionally says nothing
//! about HTTP bodies or queue shapes — only "a finished batch happened."
//! The logging implementation is the only one that ships here; a
//! production deployment supplies its own.

use async_trait::async_trait;
use tracing::info;

use conveyor_shared::domain::BatchState;

#[async_trait]
pub trait DownstreamNotifier: Send + Sync {
    async fn notify(&self, state: &BatchState);
}

#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl DownstreamNotifier for LoggingNotifier {
    async fn notify(&self, state: &BatchState) {
        info!(
            batch_id = %state.batch_id,
            tasks_total = state.tasks_total,
            tasks_completed = state.tasks_completed,
            tasks_failed = state.tasks_failed,
            "batch finalized"
        );
    }
}
