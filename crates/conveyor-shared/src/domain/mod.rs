//! # Domain Types
//!
//! The data model of §3: `BatchState`, `Task`, the inbound queue message,
//! and the pure identity functions of §4.1. Nothing here performs I/O.

pub mod batch;
pub mod identity;
pub mod queue_message;
pub mod status;
pub mod task;

pub use batch::{BatchState, BatchStatus};
pub use identity::{matches_phase, task_id};
pub use queue_message::{BatchQueueMessage, DirectoryEntry, FileEntry};
pub use status::{CallbackOutcome, CallbackPayload, StatusView};
pub use task::{Task, TaskStatus};
