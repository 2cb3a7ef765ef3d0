//! # Orchestration Bootstrap
//!
//! Wires configuration, the database pool, the remote spawner (behind
//! its circuit breaker), the phase registry, the batch supervisor, the
//! HTTP server, and the queue consumer into one running process. Mirrors
//! the shape of a typical service entrypoint in this family: a single
//! `bootstrap()` call the binary awaits once, returning a handle the
//! binary holds until shutdown.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use conveyor_shared::config::AppConfig;
use conveyor_shared::error::{ConveyorError, ConveyorResult};
use conveyor_shared::messaging::{BatchQueueConsumer, QueueConsumerConfig};
use conveyor_shared::persistence::{BatchRepository, PgBatchRepository};
use conveyor_shared::spawner::{FlyMachineSpawner, RemoteSpawner};

use crate::api::{self, AppState};
use crate::orchestrator::{BatchSupervisor, LoggingNotifier};
use crate::phase::{PhaseRegistry, TiffConversionPhase};

pub struct OrchestrationHandle {
    pub config: Arc<AppConfig>,
    http_task: JoinHandle<()>,
    queue_task: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl OrchestrationHandle {
    /// Signal the HTTP server to stop accepting new connections and finish
    /// in-flight ones, and stop the queue consumer. Does not touch
    /// in-flight spawn fan-outs or actor mailboxes — those drain on their
    /// own once the process is no longer fed new work.
    pub async fn stop(self) -> ConveyorResult<()> {
        let _ = self.shutdown_tx.send(true);
        self.queue_task.abort();

        if let Err(e) = self.http_task.await {
            if !e.is_cancelled() {
                error!(error = %e, "http server task ended abnormally");
            }
        }
        Ok(())
    }
}

pub struct OrchestrationBootstrap;

impl OrchestrationBootstrap {
    pub async fn bootstrap() -> ConveyorResult<OrchestrationHandle> {
        let config = Arc::new(AppConfig::load()?);
        info!(bind_addr = %config.orchestration.http_bind_addr, "configuration loaded");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| ConveyorError::Configuration(format!("migration failed: {e}")))?;

        let repository: Arc<dyn BatchRepository> = Arc::new(PgBatchRepository::new(pool));
        let spawner: Arc<dyn RemoteSpawner> = Arc::new(FlyMachineSpawner::new(config.machine_api.clone()));
        let registry = Arc::new(PhaseRegistry::new(vec![Arc::new(TiffConversionPhase::new(
            config.orchestration.max_retry_attempts,
        ))]));
        let supervisor = Arc::new(BatchSupervisor::new(
            registry,
            config.clone(),
            spawner,
            repository,
            Arc::new(LoggingNotifier),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let http_task = Self::spawn_http_server(config.clone(), supervisor.clone(), shutdown_rx).await?;
        let queue_task = Self::spawn_queue_consumer(config.clone(), supervisor.clone()).await?;

        Ok(OrchestrationHandle {
            config,
            http_task,
            queue_task,
            shutdown_tx,
        })
    }

    async fn spawn_http_server(
        config: Arc<AppConfig>,
        supervisor: Arc<BatchSupervisor>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> ConveyorResult<JoinHandle<()>> {
        let state = Arc::new(AppState { supervisor });
        let router = api::router(state);
        let listener = tokio::net::TcpListener::bind(&config.orchestration.http_bind_addr)
            .await
            .map_err(|e| ConveyorError::Configuration(format!("failed to bind http listener: {e}")))?;
        info!(addr = %config.orchestration.http_bind_addr, "http server listening");

        Ok(tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.changed().await;
            };
            if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(shutdown).await {
                error!(error = %e, "http server exited with error");
            }
        }))
    }

    async fn spawn_queue_consumer(config: Arc<AppConfig>, supervisor: Arc<BatchSupervisor>) -> ConveyorResult<JoinHandle<()>> {
        let consumer = BatchQueueConsumer::connect(
            &config.database_url,
            QueueConsumerConfig {
                queue_name: config.orchestration.batch_queue_name.clone(),
                ..QueueConsumerConfig::default()
            },
        )
        .await?;

        Ok(tokio::spawn(async move {
            consumer
                .run(|message| {
                    let supervisor = supervisor.clone();
                    async move { supervisor.start_batch(message).await }
                })
                .await;
        }))
    }
}
