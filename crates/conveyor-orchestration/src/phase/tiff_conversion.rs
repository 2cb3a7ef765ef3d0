//! # TIFF Conversion Phase
//!
//! The initial (and, today, only) phase: spawns one worker per `.tiff`/
//! `.tif` file to produce a converted `.jpg`. The only phase-specific
//! knowledge here is the file-suffix predicate and the worker image; the
//! spawn fan-out, retry policy, and callback folding are all generic.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tracing::warn;

use conveyor_shared::config::AppConfig;
use conveyor_shared::domain::{matches_phase, task_id, BatchQueueMessage, BatchState, CallbackOutcome, CallbackPayload, Task};
use conveyor_shared::error::ConveyorResult;
use conveyor_shared::spawner::{build_env_bundle, GuestResources, MachineSpec, RemoteSpawner, RestartPolicy};

pub const PHASE_TAG: &str = "TIFF_CONVERSION";

#[derive(Debug, Clone)]
pub struct TiffConversionPhase {
    max_task_retries: u32,
}

impl TiffConversionPhase {
    pub fn new(max_task_retries: u32) -> Self {
        Self { max_task_retries }
    }
}

#[async_trait]
impl super::Phase for TiffConversionPhase {
    fn tag(&self) -> &'static str {
        PHASE_TAG
    }

    fn discover(&self, message: &BatchQueueMessage) -> Vec<Task> {
        message
            .all_files()
            .filter(|file| matches_phase(&file.file_name, PHASE_TAG))
            .map(|file| {
                let id = task_id(&message.batch_id, PHASE_TAG, &file.r2_key);
                Task::new_pending(id, file.r2_key.clone(), file.file_name.clone())
            })
            .collect()
    }

    async fn execute_batch(
        &self,
        state: &mut BatchState,
        config: &AppConfig,
        spawner: &dyn RemoteSpawner,
    ) -> ConveyorResult<super::ExecuteOutcome> {
        let mut pending_ids: Vec<String> = state
            .current_phase_tasks
            .values()
            .filter(|t| matches!(t.status, conveyor_shared::domain::TaskStatus::Pending))
            .map(|t| t.task_id.clone())
            .collect();
        pending_ids.sort();
        pending_ids.truncate(config.orchestration.batch_size_phase as usize);

        let mut did_spawn_any = false;

        if !pending_ids.is_empty() {
            let specs: Vec<(String, MachineSpec)> = pending_ids
                .iter()
                .map(|id| {
                    let task = &state.current_phase_tasks[id];
                    let env = build_env_bundle(
                        &task.task_id,
                        &state.batch_id,
                        &task.input_key,
                        &config.object_store.bucket,
                        &config.object_store.account_id,
                        &config.object_store.access_key_id,
                        &config.object_store.secret_access_key,
                        &config.orchestration.orchestrator_url,
                    );
                    let spec = MachineSpec {
                        image: config.machine_api.fly_worker_image.clone(),
                        env,
                        auto_destroy: true,
                        restart: RestartPolicy::default(),
                        guest: GuestResources {
                            memory_mb: 512,
                            cpus: 1,
                            cpu_kind: "shared".to_string(),
                        },
                        region: config.machine_api.fly_region.clone(),
                    };
                    (id.clone(), spec)
                })
                .collect();

            let results = join_all(specs.iter().map(|(_, spec)| spawner.spawn(spec))).await;

            let now = Utc::now();
            for ((id, _), result) in specs.into_iter().zip(results) {
                match result {
                    Ok(handle) => {
                        if let Some(task) = state.current_phase_tasks.get_mut(&id) {
                            task.mark_processing(handle, now);
                        }
                        did_spawn_any = true;
                    }
                    Err(e) => {
                        // Spawn failure: leave pending, no counter touched (§4.2, §9).
                        warn!(task_id = %id, error = %e, "spawn request failed, task remains pending");
                    }
                }
            }
        }

        let more_work = !state.all_current_tasks_terminal();
        Ok(super::ExecuteOutcome { more_work, did_spawn_any })
    }

    fn reconcile_callback(&self, state: &mut BatchState, task_id: &str, payload: &CallbackPayload) -> CallbackOutcome {
        let now = Utc::now();
        let max_task_retries = self.max_task_retries;

        let Some(task) = state.current_phase_tasks.get_mut(task_id) else {
            return CallbackOutcome::DROPPED;
        };
        if task.is_terminal() {
            return CallbackOutcome::DROPPED;
        }

        match payload {
            CallbackPayload::Success {
                output_r2_key,
                output_file_size,
                performance,
                ..
            } => {
                task.mark_completed(Some(output_r2_key.clone()), Some(*output_file_size), performance.clone(), now);
                state.tasks_completed += 1;
            }
            CallbackPayload::Error { error, .. } => {
                if task.retry_count < max_task_retries {
                    task.mark_retriable_error(error.clone());
                } else {
                    task.mark_failed(error.clone(), now);
                    state.tasks_failed += 1;
                }
            }
        }
        CallbackOutcome::APPLIED
    }

    fn next_phase(&self) -> Option<&'static str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;
    use conveyor_shared::domain::{DirectoryEntry, FileEntry, TaskStatus};

    fn message_with_files(names: &[&str]) -> BatchQueueMessage {
        BatchQueueMessage {
            batch_id: "B1".to_string(),
            r2_prefix: "s/B1".to_string(),
            directories: vec![DirectoryEntry {
                directory_path: "s/B1".to_string(),
                processing_config: serde_json::Value::Null,
                files: names
                    .iter()
                    .map(|name| FileEntry {
                        r2_key: format!("s/B1/{name}"),
                        logical_path: name.to_string(),
                        file_name: name.to_string(),
                        file_size: 10,
                        content_type: "application/octet-stream".to_string(),
                        cid: None,
                    })
                    .collect(),
            }],
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
    fn discover_is_deterministic() {
        let phase = TiffConversionPhase::new(5);
        let message = message_with_files(&["a.tiff", "b.jpg"]);
        let first = phase.discover(&message);
        let second = phase.discover(&message);
        let first_ids: std::collections::HashSet<_> = first.iter().map(|t| t.task_id.clone()).collect();
        let second_ids: std::collections::HashSet<_> = second.iter().map(|t| t.task_id.clone()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn discover_only_selects_qualifying_suffixes() {
        let phase = TiffConversionPhase::new(5);
        let message = message_with_files(&["a.tiff", "b.jpg", "c.TIF", "d.pdf"]);
        let tasks = phase.discover(&message);
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn next_phase_is_none() {
        let phase = TiffConversionPhase::new(5);
        assert_eq!(phase.next_phase(), None);
    }

    #[test]
    fn reconcile_success_increments_completed_and_marks_task() {
        let phase = TiffConversionPhase::new(5);
        let message = message_with_files(&["a.tiff"]);
        let tasks = phase.discover(&message);
        let id = tasks[0].task_id.clone();
        let mut state = BatchState::new("B1".to_string(), message, PHASE_TAG.to_string(), Utc::now());
        state.install_tasks(PHASE_TAG.to_string(), tasks, Utc::now());

        let payload = CallbackPayload::Success {
            task_id: id.clone(),
            batch_id: "B1".to_string(),
            output_r2_key: "s/B1/a.jpg".to_string(),
            output_file_name: "a.jpg".to_string(),
            output_file_size: 5,
            performance: None,
        };
        let outcome = phase.reconcile_callback(&mut state, &id, &payload);
        assert_eq!(outcome, CallbackOutcome::APPLIED);
        assert_eq!(state.tasks_completed, 1);
        assert_eq!(state.current_phase_tasks[&id].status, TaskStatus::Completed);
    }

    #[test]
    fn reconcile_error_under_budget_respawns() {
        let phase = TiffConversionPhase::new(3);
        let message = message_with_files(&["a.tiff"]);
        let tasks = phase.discover(&message);
        let id = tasks[0].task_id.clone();
        let mut state = BatchState::new("B1".to_string(), message, PHASE_TAG.to_string(), Utc::now());
        state.install_tasks(PHASE_TAG.to_string(), tasks, Utc::now());

        let payload = CallbackPayload::Error {
            task_id: id.clone(),
            batch_id: "B1".to_string(),
            error: "sharp failure".to_string(),
        };
        phase.reconcile_callback(&mut state, &id, &payload);
        let task = &state.current_phase_tasks[&id];
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        assert_eq!(state.tasks_failed, 0);
    }

    #[test]
    fn reconcile_error_past_budget_fails_task() {
        let phase = TiffConversionPhase::new(1);
        let message = message_with_files(&["a.tiff"]);
        let tasks = phase.discover(&message);
        let id = tasks[0].task_id.clone();
        let mut state = BatchState::new("B1".to_string(), message, PHASE_TAG.to_string(), Utc::now());
        state.install_tasks(PHASE_TAG.to_string(), tasks, Utc::now());

        let payload = CallbackPayload::Error {
            task_id: id.clone(),
            batch_id: "B1".to_string(),
            error: "sharp failure".to_string(),
        };
        // First error: retry_count 0 < 1 -> respawn.
        phase.reconcile_callback(&mut state, &id, &payload);
        // Second error: retry_count 1 >= 1 -> fail.
        phase.reconcile_callback(&mut state, &id, &payload);

        let task = &state.current_phase_tasks[&id];
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(state.tasks_failed, 1);
    }

    #[test]
    fn reconcile_callback_is_idempotent_on_terminal_task() {
        let phase = TiffConversionPhase::new(5);
        let message = message_with_files(&["a.tiff"]);
        let tasks = phase.discover(&message);
        let id = tasks[0].task_id.clone();
        let mut state = BatchState::new("B1".to_string(), message, PHASE_TAG.to_string(), Utc::now());
        state.install_tasks(PHASE_TAG.to_string(), tasks, Utc::now());

        let success = CallbackPayload::Success {
            task_id: id.clone(),
            batch_id: "B1".to_string(),
            output_r2_key: "s/B1/a.jpg".to_string(),
            output_file_name: "a.jpg".to_string(),
            output_file_size: 5,
            performance: None,
        };
        phase.reconcile_callback(&mut state, &id, &success);
        let outcome = phase.reconcile_callback(&mut state, &id, &success);
        assert_eq!(outcome, CallbackOutcome::DROPPED);
        assert_eq!(state.tasks_completed, 1);
    }

    #[test]
    fn reconcile_callback_unknown_task_is_dropped() {
        let phase = TiffConversionPhase::new(5);
        let message = message_with_files(&["a.tiff"]);
        let mut state = BatchState::new("B1".to_string(), message, PHASE_TAG.to_string(), Utc::now());

        let payload = CallbackPayload::Error {
            task_id: "unknown".to_string(),
            batch_id: "B1".to_string(),
            error: "x".to_string(),
        };
        let outcome = phase.reconcile_callback(&mut state, "unknown", &payload);
        assert_eq!(outcome, CallbackOutcome::DROPPED);
    }
}
