//! # Batch Queue Consumer
//!
//! Polls the inbound batch-job queue (backed by `pgmq`, a Postgres-native
//! message queue) and hands each message to a caller-supplied `start_batch`
//! closure, archiving the message once that call returns. A crash between
//! receipt and archival redelivers the message on the next poll;
//! `start_batch`'s idempotency under the same `batch_id` (§4.4) makes that
//! safe.

use std::future::Future;
use std::time::Duration;

use pgmq::{Message, PGMQueue};
use tracing::{error, info, warn};

use crate::domain::BatchQueueMessage;
use crate::error::{ConveyorError, ConveyorResult};

#[derive(Debug, Clone)]
pub struct QueueConsumerConfig {
    pub queue_name: String,
    pub poll_interval: Duration,
    /// How long a read message is invisible to other readers before it is
    /// eligible for redelivery, if it is never archived.
    pub visibility_timeout_secs: i32,
}

impl Default for QueueConsumerConfig {
    fn default() -> Self {
        Self {
            queue_name: "batch_jobs".to_string(),
            poll_interval: Duration::from_secs(2),
            visibility_timeout_secs: 30,
        }
    }
}

pub struct BatchQueueConsumer {
    queue: PGMQueue,
    config: QueueConsumerConfig,
}

impl BatchQueueConsumer {
    pub async fn connect(database_url: &str, config: QueueConsumerConfig) -> ConveyorResult<Self> {
        let queue = PGMQueue::new(database_url.to_string())
            .await
            .map_err(|e| ConveyorError::Queue(e.to_string()))?;
        queue
            .create(&config.queue_name)
            .await
            .map_err(|e| ConveyorError::Queue(e.to_string()))?;
        Ok(Self { queue, config })
    }

    /// Poll forever, dispatching each message to `handler`. Intended to be
    /// spawned as its own task by the bootstrap; runs until the process
    /// shuts down.
    pub async fn run<F, Fut>(&self, mut handler: F)
    where
        F: FnMut(BatchQueueMessage) -> Fut,
        Fut: Future<Output = ConveyorResult<()>>,
    {
        loop {
            match self
                .queue
                .read::<BatchQueueMessage>(&self.config.queue_name, Some(self.config.visibility_timeout_secs))
                .await
            {
                Ok(Some(message)) => self.dispatch(&mut handler, message).await,
                Ok(None) => tokio::time::sleep(self.config.poll_interval).await,
                Err(e) => {
                    error!(error = %e, "failed to read from batch queue");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    async fn dispatch<F, Fut>(&self, handler: &mut F, message: Message<BatchQueueMessage>)
    where
        F: FnMut(BatchQueueMessage) -> Fut,
        Fut: Future<Output = ConveyorResult<()>>,
    {
        let batch_id = message.message.batch_id.clone();
        match handler(message.message).await {
            Ok(()) => {
                if let Err(e) = self.queue.archive(&self.config.queue_name, message.msg_id).await {
                    warn!(batch_id, error = %e, "failed to archive processed batch message");
                }
            }
            Err(e) if e.is_recoverable() => {
                warn!(batch_id, error = %e, "batch delivery failed transiently, leaving message for redelivery");
            }
            Err(e) => {
                error!(batch_id, error = %e, "batch delivery failed permanently, archiving to avoid poison-message loop");
                if let Err(archive_err) = self.queue.archive(&self.config.queue_name, message.msg_id).await {
                    error!(batch_id, error = %archive_err, "failed to archive permanently-failed batch message");
                }
            }
        }
        info!(batch_id, "batch queue message processed");
    }
}
