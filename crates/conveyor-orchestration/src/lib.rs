//! # conveyor-orchestration
//!
//! The batch orchestrator: the phase abstraction, the per-batch actor and
//! its supervisor, the alarm loop, and the HTTP surface that fronts it.
//! Depends on `conveyor-shared` for domain types, configuration,
//! persistence and the remote spawner.

pub mod api;
pub mod bootstrap;
pub mod orchestrator;
pub mod phase;

pub use bootstrap::OrchestrationBootstrap;
