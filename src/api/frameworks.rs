use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use crate::api::{error_response, ApiState};
use crate::risk::FrameworkDefinition;

#[derive(Debug, Deserialize)]
pub struct CreateFrameworkRequest {
    #[serde(flatten)]
    pub definition: FrameworkDefinition,
    #[serde(default)]
    pub activate: bool,
}

pub async fn list_frameworks(state: web::Data<ApiState>) -> impl Responder {
    match state.frameworks().list() {
        Ok(frameworks) => HttpResponse::Ok().json(frameworks),
        Err(e) => error_response(&e),
    }
}

pub async fn get_active_framework(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.frameworks().active().as_ref())
}

pub async fn get_framework(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.frameworks().get(&path.into_inner()) {
        Ok(framework) => HttpResponse::Ok().json(framework),
        Err(e) => error_response(&e),
    }
}

pub async fn create_framework(
    state: web::Data<ApiState>,
    body: web::Json<CreateFrameworkRequest>,
) -> impl Responder {
    let CreateFrameworkRequest { definition, activate } = body.into_inner();
    match state.frameworks().create(definition, activate) {
        Ok(framework) => HttpResponse::Created().json(framework),
        Err(e) => error_response(&e),
    }
}

pub async fn update_framework(
    state: web::Data<ApiState>,
    path: web::Path<String>,
    body: web::Json<FrameworkDefinition>,
) -> impl Responder {
    match state.frameworks().update(&path.into_inner(), body.into_inner()) {
        Ok(framework) => HttpResponse::Ok().json(framework),
        Err(e) => error_response(&e),
    }
}

pub async fn delete_framework(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.frameworks().delete(&path.into_inner()) {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(&e),
    }
}

pub async fn activate_framework(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.frameworks().set_active(&path.into_inner()) {
        Ok(framework) => HttpResponse::Ok().json(framework),
        Err(e) => error_response(&e),
    }
}
