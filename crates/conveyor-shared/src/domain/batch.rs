//! # BatchState (§3)
//!
//! The durable, per-`batch_id` record the whole orchestrator revolves
//! around. `BatchState` itself never performs I/O — the orchestrator
//! mutates it in memory and the persistence repository (§4.6) is
//! responsible for making mutations durable.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::queue_message::BatchQueueMessage;
use super::task::Task;

/// Either the tag of the currently-active phase, or one of the two batch
/// terminal states. Serializes as a plain string so the persisted JSON
/// and the `GET /status` wire shape match §6 exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    Phase(String),
    Done,
    Error,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Done | BatchStatus::Error)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::Phase(tag) => write!(f, "{tag}"),
            BatchStatus::Done => write!(f, "DONE"),
            BatchStatus::Error => write!(f, "ERROR"),
        }
    }
}

impl Serialize for BatchStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BatchStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "DONE" => BatchStatus::Done,
            "ERROR" => BatchStatus::Error,
            tag => BatchStatus::Phase(tag.to_string()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchState {
    pub batch_id: String,
    pub status: BatchStatus,
    pub queue_message: BatchQueueMessage,
    pub current_phase: String,
    pub current_phase_tasks: HashMap<String, Task>,
    pub tasks_total: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Consecutive orchestrator-level no-progress alarm wakeups.
    pub retry_count: u32,
}

impl BatchState {
    /// Construct a freshly created batch, before the first phase's
    /// `discover` has been called. `current_phase_tasks` starts empty;
    /// the caller installs the first phase's tasks via [`install_tasks`].
    pub fn new(batch_id: String, queue_message: BatchQueueMessage, first_phase_tag: String, now: DateTime<Utc>) -> Self {
        Self {
            batch_id,
            status: BatchStatus::Phase(first_phase_tag.clone()),
            queue_message,
            current_phase: first_phase_tag,
            current_phase_tasks: HashMap::new(),
            tasks_total: 0,
            tasks_completed: 0,
            tasks_failed: 0,
            started_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
            retry_count: 0,
        }
    }

    /// Install a phase's discovered tasks as the active task set, appending
    /// to `tasks_total` (a running sum across phase transitions per §9).
    pub fn install_tasks(&mut self, phase_tag: String, tasks: Vec<Task>, now: DateTime<Utc>) {
        self.tasks_total += tasks.len() as u64;
        self.current_phase = phase_tag.clone();
        self.status = BatchStatus::Phase(phase_tag);
        self.current_phase_tasks = tasks.into_iter().map(|t| (t.task_id.clone(), t)).collect();
        self.updated_at = now;
    }

    /// `true` once every task of the current phase has reached a terminal
    /// state (`completed` or `failed`).
    pub fn all_current_tasks_terminal(&self) -> bool {
        self.current_phase_tasks.values().all(Task::is_terminal)
    }

    pub fn mark_done(&mut self, now: DateTime<Utc>) {
        self.status = BatchStatus::Done;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_error(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = BatchStatus::Error;
        self.error = Some(reason.into());
        self.updated_at = now;
    }

    /// `admin_reset`: force terminal failure, preserving `current_phase_tasks`
    /// for audit (§9 resolved open question).
    pub fn admin_reset(&mut self, now: DateTime<Utc>) {
        self.mark_error("reset by admin", now);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::queue_message::BatchQueueMessage;

    fn empty_message(batch_id: &str) -> BatchQueueMessage {
        BatchQueueMessage {
            batch_id: batch_id.to_string(),
            r2_prefix: "s/".to_string(),
            directories: vec![],
            uploader: None,
            root_path: None,
            total_files: None,
            total_bytes: None,
            uploaded_at: None,
            finalized_at: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn new_batch_starts_in_first_phase() {
        let now = Utc::now();
        let state = BatchState::new("B1".into(), empty_message("B1"), "TIFF_CONVERSION".into(), now);
        assert_eq!(state.status, BatchStatus::Phase("TIFF_CONVERSION".into()));
        assert_eq!(state.tasks_total, 0);
        assert!(!state.is_terminal());
    }

    #[test]
    fn install_tasks_accumulates_totals_across_phases() {
        let now = Utc::now();
        let mut state = BatchState::new("B1".into(), empty_message("B1"), "PHASE_A".into(), now);
        let first = vec![Task::new_pending("t1".into(), "k1".into(), "n1".into())];
        state.install_tasks("PHASE_A".into(), first, now);
        assert_eq!(state.tasks_total, 1);

        let second = vec![
            Task::new_pending("t2".into(), "k2".into(), "n2".into()),
            Task::new_pending("t3".into(), "k3".into(), "n3".into()),
        ];
        state.install_tasks("PHASE_B".into(), second, now);
        assert_eq!(state.tasks_total, 3);
        assert_eq!(state.current_phase, "PHASE_B");
    }

    #[test]
    fn all_current_tasks_terminal_true_when_empty() {
        let state = BatchState::new("B1".into(), empty_message("B1"), "PHASE_A".into(), Utc::now());
        assert!(state.all_current_tasks_terminal());
    }

    #[test]
    fn admin_reset_preserves_current_phase_tasks() {
        let now = Utc::now();
        let mut state = BatchState::new("B1".into(), empty_message("B1"), "PHASE_A".into(), now);
        let tasks = vec![Task::new_pending("t1".into(), "k1".into(), "n1".into())];
        state.install_tasks("PHASE_A".into(), tasks, now);

        state.admin_reset(now);

        assert_eq!(state.status, BatchStatus::Error);
        assert_eq!(state.error.as_deref(), Some("reset by admin"));
        assert_eq!(state.current_phase_tasks.len(), 1);
    }

    #[test]
    fn status_serializes_as_plain_string() {
        let value = serde_json::to_value(BatchStatus::Phase("TIFF_CONVERSION".into())).unwrap();
        assert_eq!(value, serde_json::json!("TIFF_CONVERSION"));
        assert_eq!(serde_json::to_value(BatchStatus::Done).unwrap(), serde_json::json!("DONE"));
        assert_eq!(serde_json::to_value(BatchStatus::Error).unwrap(), serde_json::json!("ERROR"));
    }

    #[test]
    fn status_roundtrips_through_json() {
        let original = BatchStatus::Phase("TIFF_CONVERSION".into());
        let json = serde_json::to_string(&original).unwrap();
        let parsed: BatchStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(original, parsed);
    }
}
