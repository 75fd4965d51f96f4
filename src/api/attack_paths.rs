use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use crate::analysis::AttackPathRequest;
use crate::api::{blocking_error, error_response, ApiState};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub analysis_id: Option<String>,
    #[serde(default)]
    pub skip: usize,
    pub limit: Option<usize>,
}

/// Run an analysis synchronously and return the full result.
pub async fn analyze_attack_paths(
    state: web::Data<ApiState>,
    body: web::Json<AttackPathRequest>,
) -> impl Responder {
    let request = body.into_inner();
    log::info!(
        "Attack path analysis requested for {} component(s)",
        request.component_ids.len()
    );

    // Search and persistence both block
    let state_clone = state.clone();
    let result = web::block(move || state_clone.service.analyze(&request)).await;

    match result {
        Ok(Ok(result)) => HttpResponse::Ok().json(result),
        Ok(Err(e)) => error_response(&e),
        Err(e) => blocking_error(e),
    }
}

pub async fn list_attack_paths(
    state: web::Data<ApiState>,
    query: web::Query<PageQuery>,
) -> impl Responder {
    match state
        .service
        .get_paths(query.analysis_id.as_deref(), query.skip, query.limit)
    {
        Ok(page) => HttpResponse::Ok().json(page),
        Err(e) => error_response(&e),
    }
}

pub async fn get_attack_path(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.service.get_path(&path.into_inner()) {
        Ok(attack_path) => HttpResponse::Ok().json(attack_path),
        Err(e) => error_response(&e),
    }
}

pub async fn list_attack_chains(
    state: web::Data<ApiState>,
    query: web::Query<PageQuery>,
) -> impl Responder {
    match state
        .service
        .get_chains(query.analysis_id.as_deref(), query.skip, query.limit)
    {
        Ok(page) => HttpResponse::Ok().json(page),
        Err(e) => error_response(&e),
    }
}

pub async fn get_attack_chain(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.service.get_chain(&path.into_inner()) {
        Ok(chain) => HttpResponse::Ok().json(chain),
        Err(e) => error_response(&e),
    }
}
