//! # Persistence (§4.6)
//!
//! A repository abstraction over "load/save the `BatchState` for a
//! `batch_id`", backed in production by a single Postgres table with a
//! JSONB column — one logical record per batch, matching §6's persisted
//! state layout exactly.

mod batch_repository;
mod health;

pub use batch_repository::{BatchRepository, PgBatchRepository};
pub use health::{evaluate_db_status, DatabaseHealthConfig, DatabaseHealthStatus};
