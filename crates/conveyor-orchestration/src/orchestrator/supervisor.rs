//! Registry mapping `batch_id → actor handle` (§5 "process topology").
//!
//! Lazily spawns an actor the first time a `batch_id` is referenced by
//! any operation, and only routes — it never inspects or mutates
//! `BatchState` itself. Actors never voluntarily exit, so once spawned a
//! handle stays valid for the process lifetime; that's acceptable here
//! since the actor's own memory footprint is a `BatchState`, not a
//! persistent connection.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use conveyor_shared::config::AppConfig;
use conveyor_shared::domain::{BatchQueueMessage, CallbackOutcome, CallbackPayload, StatusView};
use conveyor_shared::error::{ConveyorError, ConveyorResult};
use conveyor_shared::persistence::BatchRepository;
use conveyor_shared::spawner::RemoteSpawner;

use super::actor::BatchOrchestratorActor;
use super::command::Command;
use super::notifier::DownstreamNotifier;
use crate::phase::PhaseRegistry;

pub struct BatchSupervisor {
    handles: DashMap<String, mpsc::Sender<Command>>,
    registry: Arc<PhaseRegistry>,
    config: Arc<AppConfig>,
    spawner: Arc<dyn RemoteSpawner>,
    repository: Arc<dyn BatchRepository>,
    notifier: Arc<dyn DownstreamNotifier>,
}

impl BatchSupervisor {
    pub fn new(
        registry: Arc<PhaseRegistry>,
        config: Arc<AppConfig>,
        spawner: Arc<dyn RemoteSpawner>,
        repository: Arc<dyn BatchRepository>,
        notifier: Arc<dyn DownstreamNotifier>,
    ) -> Self {
        Self {
            handles: DashMap::new(),
            registry,
            config,
            spawner,
            repository,
            notifier,
        }
    }

    fn handle_for(&self, batch_id: &str) -> mpsc::Sender<Command> {
        if let Some(existing) = self.handles.get(batch_id) {
            return existing.clone();
        }
        let tx = BatchOrchestratorActor::spawn(
            batch_id.to_string(),
            self.registry.clone(),
            self.config.clone(),
            self.spawner.clone(),
            self.repository.clone(),
            self.notifier.clone(),
        );
        self.handles.insert(batch_id.to_string(), tx.clone());
        tx
    }

    pub async fn start_batch(&self, message: BatchQueueMessage) -> ConveyorResult<()> {
        let tx = self.handle_for(&message.batch_id);
        let (reply, rx) = oneshot::channel();
        tx.send(Command::StartBatch { message, reply })
            .await
            .map_err(mailbox_closed)?;
        rx.await.map_err(mailbox_closed)?
    }

    pub async fn handle_callback(&self, batch_id: &str, task_id: String, payload: CallbackPayload) -> ConveyorResult<CallbackOutcome> {
        let tx = self.handle_for(batch_id);
        let (reply, rx) = oneshot::channel();
        tx.send(Command::HandleCallback { task_id, payload, reply })
            .await
            .map_err(mailbox_closed)?;
        rx.await.map_err(mailbox_closed)?
    }

    pub async fn get_status(&self, batch_id: &str) -> ConveyorResult<StatusView> {
        let tx = self.handle_for(batch_id);
        let (reply, rx) = oneshot::channel();
        tx.send(Command::GetStatus { reply }).await.map_err(mailbox_closed)?;
        rx.await.map_err(mailbox_closed)?
    }

    pub async fn admin_reset(&self, batch_id: &str) -> ConveyorResult<()> {
        let tx = self.handle_for(batch_id);
        let (reply, rx) = oneshot::channel();
        tx.send(Command::AdminReset { reply }).await.map_err(mailbox_closed)?;
        rx.await.map_err(mailbox_closed)?
    }
}

fn mailbox_closed<E: std::fmt::Display>(_: E) -> ConveyorError {
    ConveyorError::invariant_violation("unknown", "actor mailbox closed unexpectedly")
}
