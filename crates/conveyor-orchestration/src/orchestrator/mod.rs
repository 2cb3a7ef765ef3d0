//! # Batch Orchestrator (§4.4, §5)
//!
//! The per-batch actor ([`actor::BatchOrchestratorActor`]), its mailbox
//! protocol ([`command::Command`]), the self-wakeup timer
//! ([`alarm::AlarmScheduler`]), backoff math ([`retry`]), the downstream
//! completion hook ([`notifier`]), and the `batch_id → actor` registry
//! ([`supervisor::BatchSupervisor`]) that the HTTP and queue adapters
//! talk to.

mod actor;
mod alarm;
mod command;
mod notifier;
mod retry;
mod supervisor;

pub use notifier::{DownstreamNotifier, LoggingNotifier};
pub use supervisor::BatchSupervisor;
