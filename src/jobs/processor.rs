use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use log::{info, warn};

use crate::analysis::{AnalysisService, AttackPathRequest, CancellationToken};
use crate::error::{EngineError, EngineResult};
use crate::jobs::queue::{AnalysisJob, JobQueue, JobRetention, JobStatus};

/// Runs analyses in the background and tracks them for polling. Finished
/// jobs are evicted according to the queue's retention.
#[derive(Clone)]
pub struct JobProcessor {
    service: AnalysisService,
    job_queue: Arc<Mutex<JobQueue>>,
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl JobProcessor {
    pub fn new(service: AnalysisService, retention: JobRetention) -> Self {
        JobProcessor {
            service,
            job_queue: Arc::new(Mutex::new(JobQueue::with_retention(retention))),
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a pending job and start it on the blocking pool.
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: AttackPathRequest) -> AnalysisJob {
        let job = AnalysisJob::new();
        let job_id = job.id.clone();
        let token = self.service.new_token();

        {
            let mut queue = self.job_queue.lock().unwrap();
            queue.enqueue(job.clone());
        }
        self.tokens.lock().unwrap().insert(job_id.clone(), token.clone());
        info!("Job {} enqueued", job_id);

        let processor = self.clone();
        tokio::task::spawn_blocking(move || processor.run_job(&job_id, &request, &token));

        job
    }

    pub fn get_job(&self, job_id: &str) -> Option<AnalysisJob> {
        let queue = self.job_queue.lock().unwrap();
        queue.get_job(job_id).cloned()
    }

    pub fn list_jobs(&self, status: Option<JobStatus>) -> Vec<AnalysisJob> {
        let queue = self.job_queue.lock().unwrap();
        queue.list_jobs(status).into_iter().cloned().collect()
    }

    /// Trip the job's token. Finished jobs are returned unchanged.
    pub fn cancel(&self, job_id: &str) -> EngineResult<AnalysisJob> {
        if let Some(token) = self.tokens.lock().unwrap().get(job_id) {
            token.cancel();
        }

        let mut queue = self.job_queue.lock().unwrap();
        let job = queue
            .get_job_mut(job_id)
            .ok_or_else(|| EngineError::not_found("job", job_id))?;
        if job.status == JobStatus::Pending {
            job.cancel("cancelled by caller".to_string());
        }
        info!("Cancellation requested for job {}", job_id);
        Ok(job.clone())
    }

    fn run_job(&self, job_id: &str, request: &AttackPathRequest, token: &CancellationToken) {
        let started = {
            let mut queue = self.job_queue.lock().unwrap();
            match queue.get_job_mut(job_id) {
                Some(job) if job.status == JobStatus::Pending => {
                    job.start();
                    true
                }
                _ => false,
            }
        };

        if started {
            info!("Processing job {}", job_id);
            let result = self.service.analyze_with_token(request, token);

            let mut queue = self.job_queue.lock().unwrap();
            if let Some(job) = queue.get_job_mut(job_id) {
                match result {
                    Ok(result) => {
                        info!("Job {} completed as analysis {}", job_id, result.analysis_id);
                        job.complete(result.analysis_id, result.total_paths, result.total_chains);
                    }
                    Err(EngineError::Cancelled { reason }) => {
                        info!("Job {} cancelled: {}", job_id, reason);
                        job.cancel(reason);
                    }
                    Err(e) => {
                        warn!("Job {} failed: {}", job_id, e);
                        job.fail(e.to_string());
                    }
                }
            }
            queue.prune(chrono::Utc::now());
        }

        self.tokens.lock().unwrap().remove(job_id);
    }
}
