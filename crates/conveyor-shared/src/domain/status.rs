//! # Status & Callback Wire Types (§6)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::batch::{BatchState, BatchStatus};

/// Read-only snapshot returned by `GET /status/{batch_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusView {
    pub batch_id: String,
    pub status: BatchStatus,
    pub tasks_total: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<&BatchState> for StatusView {
    fn from(state: &BatchState) -> Self {
        Self {
            batch_id: state.batch_id.clone(),
            status: state.status.clone(),
            tasks_total: state.tasks_total,
            tasks_completed: state.tasks_completed,
            tasks_failed: state.tasks_failed,
            started_at: state.started_at,
            updated_at: state.updated_at,
            completed_at: state.completed_at,
            error: state.error.clone(),
        }
    }
}

/// Inbound body of `POST /callback/{batch_id}/{task_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CallbackPayload {
    Success {
        task_id: String,
        batch_id: String,
        output_r2_key: String,
        output_file_name: String,
        output_file_size: u64,
        #[serde(default)]
        performance: Option<serde_json::Value>,
    },
    Error {
        task_id: String,
        batch_id: String,
        error: String,
    },
}

impl CallbackPayload {
    pub fn task_id(&self) -> &str {
        match self {
            CallbackPayload::Success { task_id, .. } => task_id,
            CallbackPayload::Error { task_id, .. } => task_id,
        }
    }

    pub fn batch_id(&self) -> &str {
        match self {
            CallbackPayload::Success { batch_id, .. } => batch_id,
            CallbackPayload::Error { batch_id, .. } => batch_id,
        }
    }
}

/// Result of folding a callback into a task: whether the fold actually
/// mutated state, used to decide alarm scheduling and for idempotent-drop
/// logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackOutcome {
    pub applied: bool,
}

impl CallbackOutcome {
    pub const APPLIED: Self = Self { applied: true };
    pub const DROPPED: Self = Self { applied: false };
}
