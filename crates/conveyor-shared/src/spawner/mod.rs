//! # Remote Spawner (§4.3)
//!
//! Thin, stateless contract over the external machine API. Does not
//! retry internally — retries are an orchestrator-level concern (§4.4).

mod fly;

pub use fly::FlyMachineSpawner;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConveyorResult;

/// CPU/memory/region shape requested for one ephemeral worker machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestResources {
    pub memory_mb: u32,
    pub cpus: u32,
    pub cpu_kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartPolicy {
    pub policy: String,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            policy: "no".to_string(),
        }
    }
}

/// Everything needed to ask the machine API for one ephemeral worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSpec {
    pub image: String,
    pub env: HashMap<String, String>,
    pub auto_destroy: bool,
    pub restart: RestartPolicy,
    pub guest: GuestResources,
    pub region: String,
}

/// Build the environment bundle handed to a worker: task identity, the
/// callback URL it must report to, and object-store credentials. Pure,
/// no I/O.
pub fn build_env_bundle(
    task_id: &str,
    batch_id: &str,
    input_key: &str,
    bucket: &str,
    account_id: &str,
    access_key_id: &str,
    secret_access_key: &str,
    orchestrator_url: &str,
) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("TASK_ID".to_string(), task_id.to_string());
    env.insert("BATCH_ID".to_string(), batch_id.to_string());
    env.insert("INPUT_KEY".to_string(), input_key.to_string());
    env.insert("OBJECT_STORE_BUCKET".to_string(), bucket.to_string());
    env.insert("OBJECT_STORE_ACCOUNT_ID".to_string(), account_id.to_string());
    env.insert("OBJECT_STORE_ACCESS_KEY_ID".to_string(), access_key_id.to_string());
    env.insert("OBJECT_STORE_SECRET_ACCESS_KEY".to_string(), secret_access_key.to_string());
    env.insert(
        "CALLBACK_URL".to_string(),
        format!("{orchestrator_url}/callback/{batch_id}/{task_id}"),
    );
    env
}

/// Thin contract over the external machine API.
#[async_trait]
pub trait RemoteSpawner: Send + Sync + std::fmt::Debug {
    /// Request a new ephemeral machine. Returns an opaque machine handle on
    /// success, or a `SpawnTransientError`/`SpawnPermanentError` classified
    /// per §4.3.
    async fn spawn(&self, spec: &MachineSpec) -> ConveyorResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_bundle_contains_callback_url() {
        let env = build_env_bundle(
            "t1",
            "B1",
            "s/B1/a.tiff",
            "bucket",
            "acct",
            "key",
            "secret",
            "https://orchestrator.example",
        );
        assert_eq!(
            env.get("CALLBACK_URL").unwrap(),
            "https://orchestrator.example/callback/B1/t1"
        );
        assert_eq!(env.get("TASK_ID").unwrap(), "t1");
    }

    #[test]
    fn restart_policy_default_is_no() {
        assert_eq!(RestartPolicy::default().policy, "no");
    }
}
