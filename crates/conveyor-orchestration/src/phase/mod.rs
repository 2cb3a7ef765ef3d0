//! # Phase (§4.2)
//!
//! A pluggable unit with the discover/execute/reconcile/next capability
//! set. `BatchOrchestratorActor` never matches on phase identity itself —
//! it asks [`registry::PhaseRegistry`] for the implementation behind a
//! tag and calls through the `Phase` trait object.

mod registry;
mod tiff_conversion;

pub use registry::PhaseRegistry;
pub use tiff_conversion::TiffConversionPhase;

use async_trait::async_trait;
use conveyor_shared::config::AppConfig;
use conveyor_shared::domain::{BatchQueueMessage, BatchState, CallbackOutcome, CallbackPayload, Task};
use conveyor_shared::error::ConveyorResult;
use conveyor_shared::spawner::RemoteSpawner;

/// Outcome of one `execute_batch` call, per §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOutcome {
    /// `true` unless every task is `completed` or `failed`.
    pub more_work: bool,
    /// `true` if at least one spawn succeeded this wake — the alarm loop's
    /// progress signal for resetting `BatchState.retry_count`.
    pub did_spawn_any: bool,
}

#[async_trait]
pub trait Phase: Send + Sync {
    /// Stable tag identifying this phase, e.g. `"TIFF_CONVERSION"`.
    fn tag(&self) -> &'static str;

    /// Scan the batch message and emit a task per qualifying file.
    /// Deterministic and I/O-free: identical input yields an identical
    /// task set.
    fn discover(&self, message: &BatchQueueMessage) -> Vec<Task>;

    /// Advance pending tasks toward completion by issuing spawn requests
    /// for at most `config`'s `batch_size_phase` of them, concurrently.
    async fn execute_batch(
        &self,
        state: &mut BatchState,
        config: &AppConfig,
        spawner: &dyn RemoteSpawner,
    ) -> ConveyorResult<ExecuteOutcome>;

    /// Fold a worker's terminal callback into task state. Idempotent: a
    /// callback for an already-terminal task is discarded.
    fn reconcile_callback(&self, state: &mut BatchState, task_id: &str, payload: &CallbackPayload) -> CallbackOutcome;

    /// The tag of the phase that follows this one, or `None` if this is
    /// the last phase (the batch reaches `DONE` after it).
    fn next_phase(&self) -> Option<&'static str>;
}
