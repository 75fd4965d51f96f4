use actix_web::{HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use crate::analysis::AnalysisService;
use crate::error::EngineError;
use crate::jobs::{JobProcessor, JobRetention};
use crate::risk::FrameworkRegistry;

pub mod server;
pub mod attack_paths;
pub mod frameworks;
pub mod scoring;
pub mod jobs;

pub struct ApiState {
    pub service: AnalysisService,
    pub jobs: JobProcessor,
}

impl ApiState {
    pub fn new(service: AnalysisService, retention: JobRetention) -> Self {
        ApiState {
            jobs: JobProcessor::new(service.clone(), retention),
            service,
        }
    }

    pub fn frameworks(&self) -> &FrameworkRegistry {
        self.service.frameworks()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Map an engine error onto its HTTP status.
pub fn error_response(error: &EngineError) -> HttpResponse {
    let body = ErrorResponse {
        error: error.to_string(),
        field: match error {
            EngineError::Validation { field, .. } => Some(field.clone()),
            _ => None,
        },
    };

    match error {
        EngineError::Validation { .. } => HttpResponse::BadRequest().json(body),
        EngineError::NotFound { .. } => HttpResponse::NotFound().json(body),
        EngineError::Cancelled { .. } => HttpResponse::RequestTimeout().json(body),
        EngineError::FrameworkConflict(_) => HttpResponse::Conflict().json(body),
        EngineError::InvalidFramework(_) => HttpResponse::UnprocessableEntity().json(body),
        EngineError::Storage(e) => {
            log::error!("Storage error: {:#}", e);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

/// Failure of the blocking pool itself, not of the work it ran.
pub(crate) fn blocking_error(e: actix_web::error::BlockingError) -> HttpResponse {
    log::error!("Blocking task error: {}", e);
    HttpResponse::InternalServerError().json(ErrorResponse {
        error: e.to_string(),
        field: None,
    })
}

// Health check endpoint
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "tara-engine"
    }))
}
