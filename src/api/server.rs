use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use async_graphql_actix_web::{GraphQLRequest, GraphQLResponse};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use crate::analysis::{AnalysisService, AnalysisSettings, AttackPathAnalyzer};
use crate::api::attack_paths::{
    analyze_attack_paths, get_attack_chain, get_attack_path, list_attack_chains, list_attack_paths,
};
use crate::api::frameworks::{
    activate_framework, create_framework, delete_framework, get_active_framework, get_framework,
    list_frameworks, update_framework,
};
use crate::api::jobs::{cancel_job, create_job, get_job_status, list_jobs};
use crate::api::scoring::{evaluate_risk, rate_feasibility};
use crate::api::{health, ApiState};
use crate::config::Config;
use crate::graph::StepRuleLoader;
use crate::graphql::{build_schema, GraphQLSchema};
use crate::risk::{FrameworkLoader, FrameworkRegistry};
use crate::storage::{AnalysisRepository, Database, FrameworkRepository};

/// Wire storage, rules and the framework registry into an analysis service.
pub fn build_service(config: &Config) -> anyhow::Result<AnalysisService> {
    let db = Database::new(&config.database)?;

    let rules_path = config.analysis.step_rules_path.as_deref().map(Path::new);
    let rules = StepRuleLoader::load_or_default(rules_path)?;

    let seed_path = config.frameworks.seed_path.as_deref().map(Path::new);
    let seed = FrameworkLoader::load_or_builtin(seed_path)?;
    let frameworks = FrameworkRegistry::new(FrameworkRepository::new(db.clone()), seed)?;

    let analyzer = AttackPathAnalyzer::new(
        Arc::new(rules),
        AnalysisSettings::from(&config.analysis),
    );

    Ok(AnalysisService::new(
        analyzer,
        AnalysisRepository::new(db),
        frameworks,
        Duration::from_secs(config.analysis.timeout_secs),
    ))
}

/// Register every route. Shared by the server and handler tests.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/graphql", web::post().to(graphql_handler))
        .route("/graphiql", web::get().to(graphiql_handler))
        .service(
            web::scope("/api/v1")
                // Analysis
                .route("/attack-paths/analyze", web::post().to(analyze_attack_paths))
                .route("/attack-paths", web::get().to(list_attack_paths))
                .route("/attack-paths/{id}", web::get().to(get_attack_path))
                .route("/attack-chains", web::get().to(list_attack_chains))
                .route("/attack-chains/{id}", web::get().to(get_attack_chain))
                // Scoring
                .route("/feasibility", web::post().to(rate_feasibility))
                .route("/risk/evaluate", web::post().to(evaluate_risk))
                // Risk frameworks
                .route("/risk-frameworks", web::get().to(list_frameworks))
                .route("/risk-frameworks", web::post().to(create_framework))
                .route("/risk-frameworks/active", web::get().to(get_active_framework))
                .route("/risk-frameworks/{id}", web::get().to(get_framework))
                .route("/risk-frameworks/{id}", web::put().to(update_framework))
                .route("/risk-frameworks/{id}", web::delete().to(delete_framework))
                .route("/risk-frameworks/{id}/activate", web::post().to(activate_framework))
                // Background jobs
                .route("/jobs", web::post().to(create_job))
                .route("/jobs", web::get().to(list_jobs))
                .route("/jobs/{id}", web::get().to(get_job_status))
                .route("/jobs/{id}/cancel", web::post().to(cancel_job)),
        );
}

// GraphQL handler
async fn graphql_handler(
    schema: web::Data<GraphQLSchema>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

// GraphiQL handler
async fn graphiql_handler() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(async_graphql::http::GraphiQLSource::build().endpoint("/graphql").finish())
}

pub async fn start_server(config: Config) -> std::io::Result<()> {
    let service = build_service(&config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let api_state = web::Data::new(ApiState::new(service.clone(), config.analysis.job_retention()));
    let schema = web::Data::new(build_schema(service));

    log::info!(
        "Listening on {}:{} ({})",
        config.server.host,
        config.server.port,
        config.server.environment
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(api_state.clone())
            .app_data(schema.clone())
            .configure(configure_routes)
    })
    .bind(format!("{}:{}", config.server.host, config.server.port))?
    .run()
    .await
}
