use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Lifecycle of a progress job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

/// A progress job as tracked by the job service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "_id")]
    pub id: String,
    pub total: u64,
    pub good: u64,
    pub bad: u64,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: String) -> Self {
        Self {
            id,
            total: 0,
            good: 0,
            bad: 0,
            status: JobStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// Job/progress tracking operations.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Start a new running job.
    async fn start(&self) -> Result<Job, StoreError>;

    async fn set_total(&self, job_id: &str, total: u64) -> Result<(), StoreError>;

    async fn success(&self, job_id: &str, n: u64) -> Result<(), StoreError>;

    async fn failure(&self, job_id: &str, n: u64) -> Result<(), StoreError>;

    /// Close the job, marking it completed (`ok`) or failed.
    async fn end(&self, job_id: &str, ok: bool) -> Result<(), StoreError>;

    async fn find_by_id(&self, job_id: &str) -> Result<Option<Job>, StoreError>;
}

/// MongoDB implementation of the JobService.
#[cfg(feature = "backend")]
pub struct MongoJobService {
    collection: mongodb::Collection<Job>,
}

#[cfg(feature = "backend")]
impl MongoJobService {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("jobs"),
        }
    }

    async fn apply(&self, job_id: &str, update: bson::Document) -> Result<(), StoreError> {
        use bson::doc;

        let result = self
            .collection
            .update_one(doc! { "_id": job_id }, update)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if result.matched_count == 0 {
            return Err(StoreError::NotFound(format!("job '{job_id}'")));
        }
        Ok(())
    }
}

#[cfg(feature = "backend")]
#[async_trait]
impl JobService for MongoJobService {
    async fn start(&self) -> Result<Job, StoreError> {
        let job = Job::new(uuid::Uuid::new_v4().to_string());

        self.collection
            .insert_one(&job)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(job)
    }

    async fn set_total(&self, job_id: &str, total: u64) -> Result<(), StoreError> {
        self.apply(job_id, bson::doc! { "$set": { "total": total as i64 } })
            .await
    }

    async fn success(&self, job_id: &str, n: u64) -> Result<(), StoreError> {
        self.apply(job_id, bson::doc! { "$inc": { "good": n as i64 } })
            .await
    }

    async fn failure(&self, job_id: &str, n: u64) -> Result<(), StoreError> {
        self.apply(job_id, bson::doc! { "$inc": { "bad": n as i64 } })
            .await
    }

    async fn end(&self, job_id: &str, ok: bool) -> Result<(), StoreError> {
        let status = if ok { JobStatus::Completed } else { JobStatus::Failed };
        let status = bson::to_bson(&status).map_err(|e| StoreError::Backend(e.to_string()))?;

        self.apply(
            job_id,
            bson::doc! { "$set": { "status": status, "ended_at": Utc::now().to_rfc3339() } },
        )
        .await
    }

    async fn find_by_id(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        self.collection
            .find_one(bson::doc! { "_id": job_id })
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}
