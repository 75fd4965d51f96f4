use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use crate::analysis::AttackPathRequest;
use crate::api::{error_response, ApiState};
use crate::error::EngineError;
use crate::jobs::JobStatus;

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
}

/// Start a background analysis and return the pending job.
pub async fn create_job(
    state: web::Data<ApiState>,
    body: web::Json<AttackPathRequest>,
) -> impl Responder {
    let request = body.into_inner();
    // Reject malformed requests up front rather than as a failed job
    if let Err(e) = request.validate() {
        return error_response(&e);
    }

    let job = state.jobs.submit(request);
    HttpResponse::Accepted().json(job)
}

pub async fn get_job_status(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let job_id = path.into_inner();
    match state.jobs.get_job(&job_id) {
        Some(job) => HttpResponse::Ok().json(job),
        None => error_response(&EngineError::not_found("job", job_id)),
    }
}

pub async fn list_jobs(
    state: web::Data<ApiState>,
    query: web::Query<JobListQuery>,
) -> impl Responder {
    HttpResponse::Ok().json(state.jobs.list_jobs(query.status))
}

pub async fn cancel_job(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.jobs.cancel(&path.into_inner()) {
        Ok(job) => HttpResponse::Ok().json(job),
        Err(e) => error_response(&e),
    }
}
