//! # Inbound Batch Queue Message (§6)
//!
//! The fixed wire shape of the batch-job message. The orchestrator treats
//! this as opaque and immutable once stored on `BatchState`; only a
//! `Phase::discover` implementation interprets its contents.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub r2_key: String,
    pub logical_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub content_type: String,
    #[serde(default)]
    pub cid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub directory_path: String,
    #[serde(default)]
    pub processing_config: serde_json::Value,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchQueueMessage {
    pub batch_id: String,
    pub r2_prefix: String,
    pub directories: Vec<DirectoryEntry>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub root_path: Option<String>,
    #[serde(default)]
    pub total_files: Option<u64>,
    #[serde(default)]
    pub total_bytes: Option<u64>,
    #[serde(default)]
    pub uploaded_at: Option<String>,
    #[serde(default)]
    pub finalized_at: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl BatchQueueMessage {
    /// Iterate every file across every directory, in message order.
    pub fn all_files(&self) -> impl Iterator<Item = &FileEntry> {
        self.directories.iter().flat_map(|d| d.files.iter())
    }
}
