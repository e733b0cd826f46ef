use std::sync::Arc;

use crate::db::job_repository::JobService;

/// Progress counters of one job. Counter failures are logged, never raised.
#[derive(Clone)]
pub struct Reporting {
    jobs: Arc<dyn JobService>,
    job_id: String,
}

impl Reporting {
    pub fn new(jobs: Arc<dyn JobService>, job_id: String) -> Self {
        Self { jobs, job_id }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn success(&self, n: u64) {
        if let Err(e) = self.jobs.success(&self.job_id, n).await {
            tracing::warn!(job_id = %self.job_id, "Failed to record success: {e}");
        }
    }

    pub async fn failure(&self, n: u64) {
        if let Err(e) = self.jobs.failure(&self.job_id, n).await {
            tracing::warn!(job_id = %self.job_id, "Failed to record failure: {e}");
        }
    }

    pub async fn end(&self, ok: bool) {
        if let Err(e) = self.jobs.end(&self.job_id, ok).await {
            tracing::warn!(job_id = %self.job_id, "Failed to end job: {e}");
        }
    }
}
