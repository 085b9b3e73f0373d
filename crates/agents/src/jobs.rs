//! Status tracking for long-running background work (index builds, imports)

use crate::error::{AgentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub type JobId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub id: JobId,
    pub kind: String,
    pub status: JobStatus,
    pub progress: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, kind: &str) -> JobId;
    async fn update(&self, id: &str, status: JobStatus, progress: &str) -> Result<()>;
    async fn complete(&self, id: &str, result: serde_json::Value) -> Result<()>;
    async fn fail(&self, id: &str, error: &str) -> Result<()>;
    async fn get(&self, id: &str) -> Option<JobRecord>;
    /// All jobs, oldest first
    async fn list(&self) -> Vec<JobRecord>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify(&self, id: &str, apply: impl FnOnce(&mut JobRecord) + Send) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| AgentError::JobNotFound(id.to_string()))?;
        apply(job);
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, kind: &str) -> JobId {
        let id = Uuid::new_v4().to_string();
        let record = JobRecord {
            id: id.clone(),
            kind: kind.to_string(),
            status: JobStatus::Queued,
            progress: "Queued".to_string(),
            result: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.jobs.write().await.insert(id.clone(), record);
        tracing::debug!(job = %id, kind, "job created");
        id
    }

    async fn update(&self, id: &str, status: JobStatus, progress: &str) -> Result<()> {
        self.modify(id, |job| {
            job.status = status;
            job.progress = progress.to_string();
            if status.is_finished() {
                job.completed_at.get_or_insert_with(Utc::now);
            }
        })
        .await
    }

    async fn complete(&self, id: &str, result: serde_json::Value) -> Result<()> {
        self.modify(id, |job| {
            job.status = JobStatus::Completed;
            job.progress = "Completed".to_string();
            job.result = Some(result);
            job.completed_at = Some(Utc::now());
        })
        .await
    }

    async fn fail(&self, id: &str, error: &str) -> Result<()> {
        tracing::warn!(job = %id, "job failed: {}", error);
        self.modify(id, |job| {
            job.status = JobStatus::Failed;
            job.progress = "Failed".to_string();
            job.error = Some(error.to_string());
            job.completed_at = Some(Utc::now());
        })
        .await
    }

    async fn get(&self, id: &str) -> Option<JobRecord> {
        self.jobs.read().await.get(id).cloned()
    }

    async fn list(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.started_at);
        jobs
    }
}
