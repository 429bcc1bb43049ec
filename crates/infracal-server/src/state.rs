//! Shared application state.

use std::collections::HashMap;

use infracal_core::InfracalConfig;
use infracal_extract::ExtractionReport;
use infracal_store::SqliteStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Extraction job status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractJob {
    pub id: String,
    pub extraction_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    pub status: JobStatus,
    pub pages_done: usize,
    pub pages_total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ExtractionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub queued_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// A request to run the extraction pipeline.
pub struct ExtractRequest {
    pub job_id: String,
    pub extraction_version: String,
    pub config_id: Option<String>,
    pub limit: Option<usize>,
}

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: InfracalConfig,
    pub store: SqliteStore,
    pub extract_jobs: RwLock<HashMap<String, ExtractJob>>,
    pub extract_tx: mpsc::UnboundedSender<ExtractRequest>,
    extract_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<ExtractRequest>>>,
}

impl AppState {
    pub fn new(config: InfracalConfig, store: SqliteStore) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            store,
            extract_jobs: RwLock::new(HashMap::new()),
            extract_tx: tx,
            extract_rx: parking_lot::Mutex::new(Some(rx)),
        }
    }

    /// Take the extraction receiver (can only be called once, by the worker).
    pub fn take_extract_rx(&self) -> Option<mpsc::UnboundedReceiver<ExtractRequest>> {
        self.extract_rx.lock().take()
    }

    pub fn update_job(&self, job_id: &str, update: impl FnOnce(&mut ExtractJob)) {
        if let Some(job) = self.extract_jobs.write().get_mut(job_id) {
            update(job);
        }
    }

    /// Count of jobs in `status`.
    pub fn jobs_with_status(&self, status: JobStatus) -> usize {
        self.extract_jobs
            .read()
            .values()
            .filter(|j| j.status == status)
            .count()
    }
}
