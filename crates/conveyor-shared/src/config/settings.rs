//! # Application Settings
//!
//! Precedence (lowest to highest): compiled-in defaults, an optional
//! `config/local.toml` file, process environment variables (prefixed
//! `CONVEYOR__`, double-underscore nested). Loaded once at process start
//! via [`AppConfig::load`] and validated eagerly so a misconfigured
//! process fails at boot rather than on its first batch.

use crate::error::{ConveyorError, ConveyorResult};
use serde::Deserialize;

/// Orchestration tunables from spec §6.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestrationConfig {
    pub batch_size_phase: u32,
    pub alarm_delay_phase_ms: u64,
    pub alarm_delay_error_retry_ms: u64,
    pub max_retry_attempts: u32,
    pub orchestrator_url: String,
    pub http_bind_addr: String,
    pub batch_queue_name: String,
}

/// Remote machine API targeting and credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct MachineApiConfig {
    pub fly_app_name: String,
    pub fly_worker_image: String,
    pub fly_region: String,
    pub base_url: String,
    pub token: String,
    pub circuit_failure_threshold: u32,
    pub circuit_recovery_ms: u64,
}

/// Object-store credentials passed immutably into each task's environment bundle.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStoreConfig {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub orchestration: OrchestrationConfig,
    pub machine_api: MachineApiConfig,
    pub object_store: ObjectStoreConfig,
}

impl AppConfig {
    /// Load configuration from the process environment, applying compiled-in
    /// defaults first. Reads a `.env` file if present (development convenience).
    pub fn load() -> ConveyorResult<Self> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            .set_default("orchestration.batch_size_phase", 1000)?
            .set_default("orchestration.alarm_delay_phase_ms", 5000)?
            .set_default("orchestration.alarm_delay_error_retry_ms", 30000)?
            .set_default("orchestration.max_retry_attempts", 5)?
            .set_default("orchestration.http_bind_addr", "0.0.0.0:8080")?
            .set_default("orchestration.batch_queue_name", "batch_jobs")?
            .set_default("machine_api.fly_region", "sjc")?
            .set_default("machine_api.circuit_failure_threshold", 5)?
            .set_default("machine_api.circuit_recovery_ms", 30000)?
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("CONVEYOR")
                    .separator("__")
                    .try_parsing(true),
            );

        let raw = builder
            .build()
            .map_err(|e| ConveyorError::Configuration(e.to_string()))?;

        let settings: AppConfig = raw
            .try_deserialize()
            .map_err(|e| ConveyorError::Configuration(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> ConveyorResult<()> {
        if self.database_url.is_empty() {
            return Err(ConveyorError::Configuration(
                "database_url must not be empty".into(),
            ));
        }
        if self.orchestration.batch_size_phase == 0 {
            return Err(ConveyorError::Configuration(
                "orchestration.batch_size_phase must be positive".into(),
            ));
        }
        if self.orchestration.orchestrator_url.is_empty() {
            return Err(ConveyorError::Configuration(
                "orchestration.orchestrator_url must not be empty".into(),
            ));
        }
        if self.machine_api.fly_app_name.is_empty() {
            return Err(ConveyorError::Configuration(
                "machine_api.fly_app_name must not be empty".into(),
            ));
        }
        if self.machine_api.token.is_empty() {
            return Err(ConveyorError::Configuration(
                "machine_api.token must not be empty".into(),
            ));
        }
        if self.object_store.bucket.is_empty() {
            return Err(ConveyorError::Configuration(
                "object_store.bucket must not be empty".into(),
            ));
        }
        Ok(())
    }
}

impl From<config::ConfigError> for ConveyorError {
    fn from(e: config::ConfigError) -> Self {
        ConveyorError::Configuration(e.to_string())
    }
}
