use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use crate::analysis::{FeasibilityLevel, FeasibilityRating};
use crate::api::{error_response, ApiState};
use crate::risk::RiskMatrixEngine;

#[derive(Debug, Deserialize)]
pub struct FeasibilityRequest {
    pub elapsed_time: u8,
    pub specialist_expertise: u8,
    pub knowledge_of_target: u8,
    pub window_of_opportunity: u8,
    pub equipment: u8,
}

#[derive(Debug, Serialize)]
pub struct FeasibilityResponse {
    #[serde(flatten)]
    pub rating: FeasibilityRating,
    pub feasibility_level: FeasibilityLevel,
    pub likelihood_level: u8,
}

#[derive(Debug, Deserialize)]
pub struct RiskEvaluationRequest {
    pub impact: u8,
    pub likelihood: u8,
}

/// Rate five analyst-supplied sub-factors.
pub async fn rate_feasibility(body: web::Json<FeasibilityRequest>) -> impl Responder {
    match FeasibilityRating::new(
        body.elapsed_time,
        body.specialist_expertise,
        body.knowledge_of_target,
        body.window_of_opportunity,
        body.equipment,
    ) {
        Ok(rating) => {
            let feasibility_level = rating.level();
            HttpResponse::Ok().json(FeasibilityResponse {
                rating,
                feasibility_level,
                likelihood_level: feasibility_level.likelihood_level(),
            })
        }
        Err(e) => error_response(&e),
    }
}

/// Evaluate an impact/likelihood pair against the active framework.
pub async fn evaluate_risk(
    state: web::Data<ApiState>,
    body: web::Json<RiskEvaluationRequest>,
) -> impl Responder {
    let framework = state.frameworks().active();
    HttpResponse::Ok().json(RiskMatrixEngine::evaluate(
        &framework,
        body.impact,
        body.likelihood,
    ))
}
