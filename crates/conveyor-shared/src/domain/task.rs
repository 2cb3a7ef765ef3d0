//! # Task (§3)
//!
//! The per-file unit of work within a phase. `Task` is shape-shared across
//! phases; phase-specific outputs (`output_key`, `output_size`,
//! `performance`) are optional fields populated only by phases that
//! produce them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// `completed` and `failed` are terminal: a task in either state never
    /// returns to `pending`/`processing` within the same phase attempt.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub retry_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub machine_handle: Option<String>,
    pub input_key: String,
    pub input_name: String,
    pub output_key: Option<String>,
    pub output_size: Option<u64>,
    pub performance: Option<serde_json::Value>,
}

impl Task {
    /// Build a freshly discovered task: `status = pending`, `retry_count = 0`.
    pub fn new_pending(task_id: String, input_key: String, input_name: String) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            retry_count: 0,
            started_at: None,
            completed_at: None,
            error: None,
            machine_handle: None,
            input_key,
            input_name,
            output_key: None,
            output_size: None,
            performance: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transition into `processing` after a successful spawn.
    pub fn mark_processing(&mut self, machine_handle: String, now: DateTime<Utc>) {
        self.status = TaskStatus::Processing;
        self.started_at = Some(now);
        self.machine_handle = Some(machine_handle);
    }

    /// Fold a worker success callback.
    pub fn mark_completed(
        &mut self,
        output_key: Option<String>,
        output_size: Option<u64>,
        performance: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) {
        self.status = TaskStatus::Completed;
        self.output_key = output_key;
        self.output_size = output_size;
        self.performance = performance;
        self.completed_at = Some(now);
        self.error = None;
    }

    /// Worker reported an error and the task still has retry budget: go back
    /// to `pending` for respawn. Spawn failures never call this — see
    /// `reset_for_spawn_retry`.
    pub fn mark_retriable_error(&mut self, error: String) {
        self.retry_count += 1;
        self.status = TaskStatus::Pending;
        self.error = Some(error);
        self.started_at = None;
        self.machine_handle = None;
    }

    /// Worker reported an error and the task's retry budget is exhausted.
    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(now);
    }
}
