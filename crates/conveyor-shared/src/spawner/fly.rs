//! # Machine-API Backed Spawner
//!
//! Production `RemoteSpawner`: a bearer-authenticated HTTP POST to the
//! `{machine_api}/v1/apps/{app}/machines` endpoint (§6), wrapped in a
//! circuit breaker keyed on the machine-API endpoint (§4.3) so a degraded
//! API fails spawn attempts fast instead of piling up slow timeouts.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{instrument, warn};

use crate::config::MachineApiConfig;
use crate::error::{ConveyorError, ConveyorResult};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};

use super::{MachineSpec, RemoteSpawner};

const SPAWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct MachineResponse {
    id: String,
}

#[derive(Debug)]
pub struct FlyMachineSpawner {
    http: reqwest::Client,
    config: MachineApiConfig,
    breaker: CircuitBreaker,
}

impl FlyMachineSpawner {
    pub fn new(config: MachineApiConfig) -> Self {
        let breaker_config = CircuitBreakerConfig {
            failure_threshold: config.circuit_failure_threshold,
            timeout: Duration::from_millis(config.circuit_recovery_ms),
            success_threshold: 2,
        };
        let http = reqwest::Client::builder()
            .timeout(SPAWN_TIMEOUT)
            .build()
            .expect("reqwest client builder is infallible for this configuration");

        Self {
            http,
            breaker: CircuitBreaker::new(format!("machine_api:{}", config.fly_app_name), breaker_config),
            config,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl RemoteSpawner for FlyMachineSpawner {
    #[instrument(skip(self, spec), fields(app = %self.config.fly_app_name))]
    async fn spawn(&self, spec: &MachineSpec) -> ConveyorResult<String> {
        if !self.breaker.should_allow() {
            return Err(ConveyorError::spawn_transient(
                "unknown",
                "circuit breaker open for machine API",
            ));
        }

        let url = format!(
            "{}/v1/apps/{}/machines",
            self.config.base_url.trim_end_matches('/'),
            self.config.fly_app_name
        );

        let start = Instant::now();
        let result = self
            .http
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(spec)
            .send()
            .await;

        let elapsed = start.elapsed();

        match result {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    self.breaker.record_success_manual(elapsed);
                    let body: MachineResponse = response.json().await?;
                    Ok(body.id)
                } else if status.is_server_error() || status.as_u16() == 429 {
                    self.breaker.record_failure_manual(elapsed);
                    let body = response.text().await.unwrap_or_default();
                    warn!(status = %status, body = %body, "machine API returned a transient error");
                    Err(ConveyorError::spawn_transient(
                        "unknown",
                        format!("machine API status {status}: {body}"),
                    ))
                } else {
                    let body = response.text().await.unwrap_or_default();
                    warn!(status = %status, body = %body, "machine API rejected the spawn request");
                    Err(ConveyorError::spawn_permanent(
                        "unknown",
                        format!("machine API status {status}: {body}"),
                    ))
                }
            }
            Err(e) if e.is_timeout() || e.is_connect() => {
                self.breaker.record_failure_manual(elapsed);
                Err(ConveyorError::spawn_transient("unknown", e.to_string()))
            }
            Err(e) => {
                self.breaker.record_failure_manual(elapsed);
                Err(ConveyorError::spawn_permanent("unknown", e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitBreakerBehavior;
    use std::collections::HashMap;

    fn config() -> MachineApiConfig {
        MachineApiConfig {
            fly_app_name: "preprocess-workers".to_string(),
            fly_worker_image: "registry.example/worker:latest".to_string(),
            fly_region: "sjc".to_string(),
            base_url: "https://api.machines.example".to_string(),
            token: "secret".to_string(),
            circuit_failure_threshold: 3,
            circuit_recovery_ms: 5000,
        }
    }

    #[test]
    fn spawner_breaker_starts_closed() {
        let spawner = FlyMachineSpawner::new(config());
        assert!(spawner.breaker().should_allow());
    }

    #[test]
    fn spawner_breaker_name_includes_app() {
        let spawner = FlyMachineSpawner::new(config());
        assert_eq!(spawner.breaker().name(), "machine_api:preprocess-workers");
    }

    #[test]
    fn machine_spec_serializes_with_expected_shape() {
        let spec = MachineSpec {
            image: "registry.example/worker:latest".to_string(),
            env: HashMap::new(),
            auto_destroy: true,
            restart: super::super::RestartPolicy::default(),
            guest: super::super::GuestResources {
                memory_mb: 512,
                cpus: 1,
                cpu_kind: "shared".to_string(),
            },
            region: "sjc".to_string(),
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["auto_destroy"], serde_json::json!(true));
        assert_eq!(value["restart"]["policy"], serde_json::json!("no"));
        assert_eq!(value["guest"]["cpu_kind"], serde_json::json!("shared"));
    }
}
