//! # Messaging
//!
//! The inbound-queue adapter (§4.7): thin plumbing that turns queue
//! messages into `start_batch` calls. Contains no orchestration logic.

mod queue_client;

pub use queue_client::{BatchQueueConsumer, QueueConsumerConfig};
