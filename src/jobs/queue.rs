use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// A background analysis run, polled by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: String,
    pub status: JobStatus,
    pub analysis_id: Option<String>,
    pub total_paths: Option<usize>,
    pub total_chains: Option<usize>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    pub fn new() -> Self {
        AnalysisJob {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            analysis_id: None,
            total_paths: None,
            total_chains: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, analysis_id: String, total_paths: usize, total_chains: usize) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.analysis_id = Some(analysis_id);
        self.total_paths = Some(total_paths);
        self.total_chains = Some(total_chains);
    }

    pub fn fail(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(error);
    }

    pub fn cancel(&mut self, reason: String) {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(reason);
    }
}

impl Default for AnalysisJob {
    fn default() -> Self {
        Self::new()
    }
}

/// How long finished jobs stay pollable, and how many are kept at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRetention {
    pub ttl: Duration,
    pub max_finished: usize,
}

impl Default for JobRetention {
    fn default() -> Self {
        JobRetention {
            ttl: Duration::hours(1),
            max_finished: 1000,
        }
    }
}

pub struct JobQueue {
    jobs: Vec<AnalysisJob>,
    retention: JobRetention,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::with_retention(JobRetention::default())
    }

    pub fn with_retention(retention: JobRetention) -> Self {
        JobQueue {
            jobs: Vec::new(),
            retention,
        }
    }

    pub fn enqueue(&mut self, job: AnalysisJob) -> String {
        self.prune(Utc::now());
        let job_id = job.id.clone();
        self.jobs.push(job);
        job_id
    }

    pub fn get_job(&self, job_id: &str) -> Option<&AnalysisJob> {
        self.jobs.iter().find(|j| j.id == job_id)
    }

    pub fn get_job_mut(&mut self, job_id: &str) -> Option<&mut AnalysisJob> {
        self.jobs.iter_mut().find(|j| j.id == job_id)
    }

    /// Newest first.
    pub fn list_jobs(&self, status: Option<JobStatus>) -> Vec<&AnalysisJob> {
        self.jobs
            .iter()
            .rev()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .collect()
    }

    /// Drop finished jobs older than the ttl, then the earliest submitted
    /// finished jobs beyond `max_finished`. Pending and running jobs are never dropped.
    /// Returns how many jobs were removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.jobs.len();
        let ttl = self.retention.ttl;
        self.jobs.retain(|j| match (j.status.is_finished(), j.completed_at) {
            (true, Some(done)) => now.signed_duration_since(done) <= ttl,
            _ => true,
        });

        let finished = self.jobs.iter().filter(|j| j.status.is_finished()).count();
        let mut excess = finished.saturating_sub(self.retention.max_finished);
        if excess > 0 {
            self.jobs.retain(|j| {
                if excess > 0 && j.status.is_finished() {
                    excess -= 1;
                    false
                } else {
                    true
                }
            });
        }

        let removed = before - self.jobs.len();
        if removed > 0 {
            log::debug!("Evicted {} finished jobs", removed);
        }
        removed
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
