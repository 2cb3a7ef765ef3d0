//! # Configuration
//!
//! Layered, env-driven settings loaded once at process start. See
//! [`settings::AppConfig`] for the full field list and validation rules.

mod settings;

pub use settings::{AppConfig, MachineApiConfig, ObjectStoreConfig, OrchestrationConfig};
