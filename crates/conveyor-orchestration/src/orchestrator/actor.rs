//! The per-batch single-writer execution domain (§4.4, §5).
//!
//! One actor task owns exactly one `BatchState` for its lifetime. All
//! mutation flows through its mailbox, so `start_batch`, callback
//! reconciliation, status reads, admin reset, and the alarm wake never
//! race each other for a given `batch_id` even though different batches
//! run fully in parallel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use conveyor_shared::config::AppConfig;
use conveyor_shared::domain::{BatchQueueMessage, BatchState, CallbackOutcome, CallbackPayload, StatusView};
use conveyor_shared::error::{ConveyorError, ConveyorResult};
use conveyor_shared::persistence::BatchRepository;
use conveyor_shared::spawner::RemoteSpawner;

use super::alarm::AlarmScheduler;
use super::command::Command;
use super::notifier::DownstreamNotifier;
use super::retry;
use crate::phase::PhaseRegistry;

pub const MAILBOX_CAPACITY: usize = 64;

pub struct BatchOrchestratorActor {
    batch_id: String,
    state: Option<BatchState>,
    registry: Arc<PhaseRegistry>,
    config: Arc<AppConfig>,
    spawner: Arc<dyn RemoteSpawner>,
    repository: Arc<dyn BatchRepository>,
    notifier: Arc<dyn DownstreamNotifier>,
    alarm: AlarmScheduler,
    rx: mpsc::Receiver<Command>,
}

impl BatchOrchestratorActor {
    /// Spawn an actor for `batch_id`, rehydrating any persisted state
    /// before it processes its first command (§4.4 "process-restart
    /// durability", §9 "actor rehydration").
    pub fn spawn(
        batch_id: String,
        registry: Arc<PhaseRegistry>,
        config: Arc<AppConfig>,
        spawner: Arc<dyn RemoteSpawner>,
        repository: Arc<dyn BatchRepository>,
        notifier: Arc<dyn DownstreamNotifier>,
    ) -> mpsc::Sender<Command> {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let alarm = AlarmScheduler::new(tx.clone());
        let actor = Self {
            batch_id,
            state: None,
            registry,
            config,
            spawner,
            repository,
            notifier,
            alarm,
            rx,
        };
        tokio::spawn(actor.run());
        tx
    }

    async fn run(mut self) {
        if let Err(e) = self.rehydrate().await {
            error!(batch_id = %self.batch_id, error = %e, "failed to rehydrate batch state");
        }

        while let Some(command) = self.rx.recv().await {
            match command {
                Command::StartBatch { message, reply } => {
                    let result = self.start_batch(message).await;
                    let _ = reply.send(result);
                }
                Command::HandleCallback { task_id, payload, reply } => {
                    let result = self.handle_callback(&task_id, payload).await;
                    let _ = reply.send(result);
                }
                Command::GetStatus { reply } => {
                    let result = self.get_status();
                    let _ = reply.send(result);
                }
                Command::AdminReset { reply } => {
                    let result = self.admin_reset().await;
                    let _ = reply.send(result);
                }
                Command::AlarmFired => {
                    self.on_alarm().await;
                }
            }
        }
    }

    async fn rehydrate(&mut self) -> ConveyorResult<()> {
        if let Some(state) = self.repository.load(&self.batch_id).await? {
            let non_terminal = !state.is_terminal();
            self.state = Some(state);
            if non_terminal {
                self.alarm.schedule(Duration::ZERO);
            }
        }
        Ok(())
    }

    fn phase_tag_lookup(&self, tag: &str) -> ConveyorResult<Arc<dyn crate::phase::Phase>> {
        self.registry
            .get(tag)
            .ok_or_else(|| ConveyorError::invariant_violation(&self.batch_id, format!("unknown phase tag {tag}")))
    }

    async fn start_batch(&mut self, message: BatchQueueMessage) -> ConveyorResult<()> {
        if self.state.is_some() {
            info!(batch_id = %self.batch_id, "start_batch is a no-op, batch already exists");
            return Ok(());
        }

        let now = Utc::now();
        let first_tag = self.registry.first_phase();
        let phase = self.phase_tag_lookup(first_tag)?;
        let tasks = phase.discover(&message);

        let mut state = BatchState::new(self.batch_id.clone(), message, first_tag.to_string(), now);
        state.install_tasks(first_tag.to_string(), tasks, now);
        self.repository.save(&state).await?;
        self.state = Some(state);

        info!(batch_id = %self.batch_id, phase = first_tag, "batch started");

        if self.state.as_ref().unwrap().current_phase_tasks.is_empty() {
            self.advance_phase().await?;
        } else {
            self.alarm.schedule(Duration::ZERO);
        }
        Ok(())
    }

    async fn handle_callback(&mut self, task_id: &str, payload: CallbackPayload) -> ConveyorResult<CallbackOutcome> {
        // An unknown batch is dropped just like an unknown task or a terminal
        // batch, never reported as not-found: a callback arriving for a batch
        // this process never started (or already forgot) is not malformed.
        eprintln!("DEBUG handle_callback entry, state_is_some={}", self.state.is_some());
        let Some(current_phase) = self.state.as_ref().map(|s| s.current_phase.clone()) else {
            eprintln!("DEBUG state is None, dropping");
            return Ok(CallbackOutcome::DROPPED);
        };

        if self.state.as_ref().unwrap().is_terminal() {
            eprintln!("DEBUG state is_terminal, dropping. status={:?}", self.state.as_ref().unwrap().status);
            return Ok(CallbackOutcome::DROPPED);
        }

        let phase = self.phase_tag_lookup(&current_phase)?;
        let state = self.state.as_mut().unwrap();
        eprintln!("DEBUG current_phase={} task_id={} keys={:?}", current_phase, task_id, state.current_phase_tasks.keys().collect::<Vec<_>>());
        let outcome = phase.reconcile_callback(state, task_id, &payload);

        if !outcome.applied {
            return Ok(outcome);
        }

        state.updated_at = Utc::now();
        self.repository.save(state).await?;

        if state.all_current_tasks_terminal() {
            self.advance_phase().await?;
        } else {
            self.alarm.schedule(retry::phase_delay(&self.config.orchestration));
        }

        Ok(outcome)
    }

    fn get_status(&self) -> ConveyorResult<StatusView> {
        self.state
            .as_ref()
            .map(StatusView::from)
            .ok_or_else(|| ConveyorError::BatchNotFound {
                batch_id: self.batch_id.clone(),
            })
    }

    async fn admin_reset(&mut self) -> ConveyorResult<()> {
        let Some(state) = self.state.as_mut() else {
            return Err(ConveyorError::BatchNotFound {
                batch_id: self.batch_id.clone(),
            });
        };
        let now = Utc::now();
        state.admin_reset(now);
        self.repository.save(state).await?;
        self.alarm.cancel();
        warn!(batch_id = %self.batch_id, "batch reset by admin");
        Ok(())
    }

    /// Step through zero or more empty phases until one installs a
    /// non-empty task set, or the phase chain ends and the batch is
    /// marked `DONE` (§4.4 step 3, §4.4 `start_batch` step 3).
    async fn advance_phase(&mut self) -> ConveyorResult<()> {
        loop {
            let current_tag = self.state.as_ref().unwrap().current_phase.clone();
            let phase = self.phase_tag_lookup(&current_tag)?;

            match phase.next_phase() {
                None => {
                    let now = Utc::now();
                    let state = self.state.as_mut().unwrap();
                    state.mark_done(now);
                    self.repository.save(state).await?;
                    self.notifier.notify(state).await;
                    self.alarm.cancel();
                    info!(batch_id = %self.batch_id, "batch done");
                    return Ok(());
                }
                Some(next_tag) => {
                    let next_phase = self.phase_tag_lookup(next_tag)?;
                    let now = Utc::now();
                    let state = self.state.as_mut().unwrap();
                    let tasks = next_phase.discover(&state.queue_message);
                    state.install_tasks(next_tag.to_string(), tasks, now);
                    self.repository.save(state).await?;

                    if state.current_phase_tasks.is_empty() {
                        continue;
                    }
                    self.alarm.schedule(Duration::ZERO);
                    return Ok(());
                }
            }
        }
    }

    async fn on_alarm(&mut self) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        if state.is_terminal() {
            return;
        }

        let current_tag = state.current_phase.clone();
        let phase = match self.phase_tag_lookup(&current_tag) {
            Ok(phase) => phase,
            Err(e) => {
                error!(batch_id = %self.batch_id, error = %e, "alarm wake found an unregistered phase");
                let state = self.state.as_mut().unwrap();
                state.mark_error(e.to_string(), Utc::now());
                let _ = self.repository.save(state).await;
                self.alarm.cancel();
                return;
            }
        };

        let outcome = {
            let state = self.state.as_mut().unwrap();
            phase.execute_batch(state, &self.config, self.spawner.as_ref()).await
        };

        match outcome {
            Err(e) if e.is_recoverable() => {
                warn!(batch_id = %self.batch_id, error = %e, "alarm wake hit a recoverable error, treating as no progress");
                self.on_no_progress().await;
            }
            Err(e) => {
                error!(batch_id = %self.batch_id, error = %e, "alarm wake hit a fatal error");
                let state = self.state.as_mut().unwrap();
                state.mark_error(e.to_string(), Utc::now());
                let _ = self.repository.save(state).await;
                self.alarm.cancel();
            }
            Ok(outcome) => {
                if !outcome.more_work {
                    if let Err(e) = self.advance_phase().await {
                        error!(batch_id = %self.batch_id, error = %e, "failed to advance phase after execute_batch");
                    }
                    return;
                }

                if outcome.did_spawn_any {
                    let state = self.state.as_mut().unwrap();
                    state.retry_count = 0;
                    state.updated_at = Utc::now();
                    let _ = self.repository.save(state).await;
                    self.alarm.schedule(retry::phase_delay(&self.config.orchestration));
                } else {
                    self.on_no_progress().await;
                }
            }
        }
    }

    /// A wake that made no progress: bump the no-progress counter and
    /// either back off or give up per `MAX_RETRY_ATTEMPTS` (§4.4 step 4).
    async fn on_no_progress(&mut self) {
        let max_retry_attempts = self.config.orchestration.max_retry_attempts;
        let state = self.state.as_mut().unwrap();
        state.retry_count += 1;
        state.updated_at = Utc::now();

        if state.retry_count > max_retry_attempts {
            state.mark_error("retry budget exhausted", Utc::now());
            let _ = self.repository.save(state).await;
            self.alarm.cancel();
            warn!(batch_id = %self.batch_id, "retry budget exhausted, batch marked ERROR");
            return;
        }

        let delay = retry::error_retry_delay(&self.config.orchestration, state.retry_count);
        let _ = self.repository.save(state).await;
        self.alarm.schedule(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conveyor_shared::config::{MachineApiConfig, ObjectStoreConfig, OrchestrationConfig};
    use conveyor_shared::domain::{DirectoryEntry, FileEntry};
    use conveyor_shared::spawner::MachineSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::oneshot;

    #[derive(Debug, Default)]
    struct AlwaysSucceedsSpawner {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteSpawner for AlwaysSucceedsSpawner {
        async fn spawn(&self, _spec: &MachineSpec) -> ConveyorResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("machine-{n}"))
        }
    }

    #[derive(Debug, Default)]
    struct InMemoryRepository {
        state: StdMutex<Option<BatchState>>,
    }

    #[async_trait]
    impl BatchRepository for InMemoryRepository {
        async fn load(&self, _batch_id: &str) -> ConveyorResult<Option<BatchState>> {
            Ok(self.state.lock().unwrap().clone())
        }
        async fn save(&self, state: &BatchState) -> ConveyorResult<()> {
            *self.state.lock().unwrap() = Some(state.clone());
            Ok(())
        }
        async fn exists(&self, _batch_id: &str) -> ConveyorResult<bool> {
            Ok(self.state.lock().unwrap().is_some())
        }
    }

    #[derive(Debug, Default)]
    struct NoopNotifier;

    #[async_trait]
    impl DownstreamNotifier for NoopNotifier {
        async fn notify(&self, _state: &BatchState) {}
    }

    fn test_config() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/test".to_string(),
            orchestration: OrchestrationConfig {
                batch_size_phase: 10,
                alarm_delay_phase_ms: 5,
                alarm_delay_error_retry_ms: 5,
                max_retry_attempts: 2,
                orchestrator_url: "https://orchestrator.example".to_string(),
                http_bind_addr: "0.0.0.0:8080".to_string(),
                batch_queue_name: "batch_jobs".to_string(),
            },
            machine_api: MachineApiConfig {
                fly_app_name: "workers".to_string(),
                fly_worker_image: "registry.example/worker:latest".to_string(),
                fly_region: "sjc".to_string(),
                base_url: "https://api.machines.example".to_string(),
                token: "token".to_string(),
                circuit_failure_threshold: 5,
                circuit_recovery_ms: 30000,
            },
            object_store: ObjectStoreConfig {
                account_id: "acct".to_string(),
                access_key_id: "key".to_string(),
                secret_access_key: "secret".to_string(),
                bucket: "bucket".to_string(),
            },
        }
    }

    fn message_with_one_tiff() -> BatchQueueMessage {
        BatchQueueMessage {
            batch_id: "B1".to_string(),
            r2_prefix: "s/B1".to_string(),
            directories: vec![DirectoryEntry {
                directory_path: "s/B1".to_string(),
                processing_config: serde_json::Value::Null,
                files: vec![FileEntry {
                    r2_key: "s/B1/a.tiff".to_string(),
                    logical_path: "a.tiff".to_string(),
                    file_name: "a.tiff".to_string(),
                    file_size: 10,
                    content_type: "image/tiff".to_string(),
                    cid: None,
                }],
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

    fn spawn_actor(
        spawner: Arc<dyn RemoteSpawner>,
        repository: Arc<dyn BatchRepository>,
    ) -> mpsc::Sender<Command> {
        let registry = Arc::new(PhaseRegistry::new(vec![Arc::new(
            crate::phase::TiffConversionPhase::new(2),
        )]));
        BatchOrchestratorActor::spawn(
            "B1".to_string(),
            registry,
            Arc::new(test_config()),
            spawner,
            repository,
            Arc::new(NoopNotifier),
        )
    }

    async fn status_of(tx: &mpsc::Sender<Command>) -> ConveyorResult<StatusView> {
        let (reply, rx) = oneshot::channel();
        tx.send(Command::GetStatus { reply }).await.unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn start_batch_then_alarm_spawns_and_completes_on_callback() {
        let repository: Arc<dyn BatchRepository> = Arc::new(InMemoryRepository::default());
        let spawner: Arc<dyn RemoteSpawner> = Arc::new(AlwaysSucceedsSpawner::default());
        let tx = spawn_actor(spawner, repository);

        let (reply, rx) = oneshot::channel();
        tx.send(Command::StartBatch {
            message: message_with_one_tiff(),
            reply,
        })
        .await
        .unwrap();
        rx.await.unwrap().unwrap();

        // Give the immediate alarm a moment to execute the spawn.
        tokio::time::sleep(Duration::from_millis(30)).await;

        let status = status_of(&tx).await.unwrap();
        assert_eq!(status.tasks_total, 1);

        let task_id = conveyor_shared::domain::task_id("B1", "TIFF_CONVERSION", "s/B1/a.tiff");
        let (reply, rx) = oneshot::channel();
        tx.send(Command::HandleCallback {
            task_id: task_id.clone(),
            payload: CallbackPayload::Success {
                task_id,
                batch_id: "B1".to_string(),
                output_r2_key: "s/B1/a.jpg".to_string(),
                output_file_name: "a.jpg".to_string(),
                output_file_size: 5,
                performance: None,
            },
            reply,
        })
        .await
        .unwrap();
        let outcome = rx.await.unwrap().unwrap();
        assert_eq!(outcome, CallbackOutcome::APPLIED);

        let status = status_of(&tx).await.unwrap();
        assert_eq!(status.status.to_string(), "DONE");
        assert_eq!(status.tasks_completed, 1);
    }

    #[tokio::test]
    async fn start_batch_is_idempotent() {
        let repository: Arc<dyn BatchRepository> = Arc::new(InMemoryRepository::default());
        let spawner: Arc<dyn RemoteSpawner> = Arc::new(AlwaysSucceedsSpawner::default());
        let tx = spawn_actor(spawner, repository);

        for _ in 0..2 {
            let (reply, rx) = oneshot::channel();
            tx.send(Command::StartBatch {
                message: message_with_one_tiff(),
                reply,
            })
            .await
            .unwrap();
            rx.await.unwrap().unwrap();
        }

        tokio::time::sleep(Duration::from_millis(30)).await;
        let status = status_of(&tx).await.unwrap();
        assert_eq!(status.tasks_total, 1, "a second start_batch must not redouble task counts");
    }

    #[tokio::test]
    async fn admin_reset_marks_batch_error_and_drops_later_callbacks() {
        let repository: Arc<dyn BatchRepository> = Arc::new(InMemoryRepository::default());
        let spawner: Arc<dyn RemoteSpawner> = Arc::new(AlwaysSucceedsSpawner::default());
        let tx = spawn_actor(spawner, repository);

        let (reply, rx) = oneshot::channel();
        tx.send(Command::StartBatch {
            message: message_with_one_tiff(),
            reply,
        })
        .await
        .unwrap();
        rx.await.unwrap().unwrap();

        let (reply, rx) = oneshot::channel();
        tx.send(Command::AdminReset { reply }).await.unwrap();
        rx.await.unwrap().unwrap();

        let status = status_of(&tx).await.unwrap();
        assert_eq!(status.status.to_string(), "ERROR");

        let task_id = conveyor_shared::domain::task_id("B1", "TIFF_CONVERSION", "s/B1/a.tiff");
        let (reply, rx) = oneshot::channel();
        tx.send(Command::HandleCallback {
            task_id: task_id.clone(),
            payload: CallbackPayload::Success {
                task_id,
                batch_id: "B1".to_string(),
                output_r2_key: "s/B1/a.jpg".to_string(),
                output_file_name: "a.jpg".to_string(),
                output_file_size: 5,
                performance: None,
            },
            reply,
        })
        .await
        .unwrap();
        let outcome = rx.await.unwrap().unwrap();
        assert_eq!(outcome, CallbackOutcome::DROPPED);

        let status = status_of(&tx).await.unwrap();
        assert_eq!(status.status.to_string(), "ERROR", "a post-reset callback must not change status");
    }

    #[tokio::test]
    async fn get_status_on_unknown_batch_is_not_found() {
        let repository: Arc<dyn BatchRepository> = Arc::new(InMemoryRepository::default());
        let spawner: Arc<dyn RemoteSpawner> = Arc::new(AlwaysSucceedsSpawner::default());
        let tx = spawn_actor(spawner, repository);

        let err = status_of(&tx).await.unwrap_err();
        assert!(matches!(err, ConveyorError::BatchNotFound { .. }));
    }
}
