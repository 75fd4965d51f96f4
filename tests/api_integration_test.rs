use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tara_engine::analysis::{AnalysisService, AnalysisSettings, AttackPathAnalyzer};
use tara_engine::api::server::configure_routes;
use tara_engine::api::ApiState;
use tara_engine::graph::DEFAULT_STEP_RULES;
use tara_engine::graphql::build_schema;
use tara_engine::jobs::JobRetention;
use tara_engine::risk::{FrameworkDefinition, FrameworkRegistry};
use tara_engine::storage::{AnalysisRepository, Database, FrameworkRepository};

fn service() -> AnalysisService {
    let db = Database::in_memory().unwrap();
    let frameworks =
        FrameworkRegistry::new(FrameworkRepository::new(db.clone()), FrameworkDefinition::builtin())
            .unwrap();
    AnalysisService::new(
        AttackPathAnalyzer::new(Arc::new(DEFAULT_STEP_RULES.clone()), AnalysisSettings::default()),
        AnalysisRepository::new(db),
        frameworks,
        Duration::from_secs(30),
    )
}

macro_rules! test_app {
    () => {{
        let service = service();
        test::init_service(
            App::new()
                .app_data(web::Data::new(ApiState::new(service.clone(), JobRetention::default())))
                .app_data(web::Data::new(build_schema(service)))
                .configure(configure_routes),
        )
        .await
    }};
}

fn analysis_request() -> Value {
    json!({
        "primary_component_id": "ECU-002",
        "component_ids": ["TBOX-001", "CAN-BUS-001", "ECU-002"],
        "components": [
            {
                "id": "TBOX-001",
                "type": "telematics",
                "trust_zone": "Boundary",
                "interfaces": ["CAN"],
                "access_points": [
                    { "id": "TBOX-001-WIFI", "interface_type": "WiFi", "external": true }
                ]
            },
            { "id": "CAN-BUS-001", "type": "bus", "trust_zone": "Trusted", "interfaces": ["CAN"] },
            {
                "id": "ECU-002",
                "type": "ecu",
                "trust_zone": "Critical",
                "interfaces": ["CAN"],
                "access_points": [{ "id": "ECU-002-CAN", "interface_type": "CAN" }]
            }
        ],
        "constraints": [{ "id": "C-1", "type": "exclude_physical_access" }],
        "include_chains": true
    })
}

#[actix_rt::test]
async fn test_health() {
    let app = test_app!();
    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");
}

#[actix_rt::test]
async fn test_analyze_then_lookup() {
    let app = test_app!();

    let req = test::TestRequest::post()
        .uri("/api/v1/attack-paths/analyze")
        .set_json(analysis_request())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let result: Value = test::read_body_json(resp).await;
    let total = result["total_paths"].as_u64().unwrap();
    assert!(total > 0);

    let analysis_id = result["analysis_id"].as_str().unwrap();
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/attack-paths?analysis_id={}&limit=1", analysis_id))
        .to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["total"].as_u64().unwrap(), total);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["limit"], 1);

    let path_id = result["paths"][0]["path_id"].as_str().unwrap();
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/attack-paths/{}", path_id))
        .to_request();
    let path: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(path["path_id"], path_id);
    assert_eq!(path["steps"][0]["step_type"], "Initial Access");
}

#[actix_rt::test]
async fn test_invalid_request_names_the_field() {
    let app = test_app!();
    let mut body = analysis_request();
    body["max_depth"] = json!(0);

    let req = test::TestRequest::post()
        .uri("/api/v1/attack-paths/analyze")
        .set_json(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let error: Value = test::read_body_json(resp).await;
    assert_eq!(error["field"], "max_depth");

    let mut body = analysis_request();
    body["entry_point_ids"] = json!(["NOT-IN-SET"]);
    let req = test::TestRequest::post()
        .uri("/api/v1/attack-paths/analyze")
        .set_json(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let error: Value = test::read_body_json(resp).await;
    assert_eq!(error["field"], "entry_point_ids");
}

#[actix_rt::test]
async fn test_unknown_ids_are_404() {
    let app = test_app!();

    for uri in [
        "/api/v1/attack-paths/missing",
        "/api/v1/attack-chains/missing",
        "/api/v1/attack-paths?analysis_id=missing",
        "/api/v1/risk-frameworks/missing",
        "/api/v1/jobs/missing",
    ] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[actix_rt::test]
async fn test_framework_lifecycle() {
    let app = test_app!();

    let req = test::TestRequest::get()
        .uri("/api/v1/risk-frameworks/active")
        .to_request();
    let active: Value = test::call_and_read_body_json(&app, req).await;
    let active_id = active["id"].as_str().unwrap().to_string();
    assert_eq!(active["is_active"], true);

    // Deleting the active framework conflicts
    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/risk-frameworks/{}", active_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // A framework without a name is rejected
    let mut invalid = serde_json::to_value(FrameworkDefinition::builtin()).unwrap();
    invalid["name"] = json!("");
    let req = test::TestRequest::post()
        .uri("/api/v1/risk-frameworks")
        .set_json(invalid)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let mut valid = serde_json::to_value(FrameworkDefinition::builtin()).unwrap();
    valid["name"] = json!("strict");
    valid["activate"] = json!(true);
    let req = test::TestRequest::post()
        .uri("/api/v1/risk-frameworks")
        .set_json(valid)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    assert_eq!(created["is_active"], true);

    let req = test::TestRequest::get().uri("/api/v1/risk-frameworks").to_request();
    let all: Value = test::call_and_read_body_json(&app, req).await;
    let all = all.as_array().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all.iter().filter(|f| f["is_active"] == true).count(), 1);

    // The old framework is no longer active and can go
    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/risk-frameworks/{}", active_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[actix_rt::test]
async fn test_feasibility_rating() {
    let app = test_app!();

    let req = test::TestRequest::post()
        .uri("/api/v1/feasibility")
        .set_json(json!({
            "elapsed_time": 3,
            "specialist_expertise": 3,
            "knowledge_of_target": 3,
            "window_of_opportunity": 3,
            "equipment": 3
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["overall_rating"], 15);
    assert_eq!(body["feasibility_level"], "Medium");
    assert_eq!(body["likelihood_level"], 3);

    let req = test::TestRequest::post()
        .uri("/api/v1/feasibility")
        .set_json(json!({
            "elapsed_time": 6,
            "specialist_expertise": 0,
            "knowledge_of_target": 0,
            "window_of_opportunity": 0,
            "equipment": 0
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let error: Value = test::read_body_json(resp).await;
    assert_eq!(error["field"], "elapsed_time");
}

#[actix_rt::test]
async fn test_risk_evaluation() {
    let app = test_app!();

    let req = test::TestRequest::post()
        .uri("/api/v1/risk/evaluate")
        .set_json(json!({ "impact": 5, "likelihood": 5 }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["numerical_score"], 25);
    assert_eq!(body["risk_level"], "critical");
    assert_eq!(body["requires_approval"], true);

    let req = test::TestRequest::post()
        .uri("/api/v1/risk/evaluate")
        .set_json(json!({ "impact": 1, "likelihood": 2 }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["numerical_score"], 2);
    assert_eq!(body["risk_level"], "low");
    assert_eq!(body["requires_approval"], false);
}

#[actix_rt::test]
async fn test_background_job_completes() {
    let app = test_app!();

    let req = test::TestRequest::post()
        .uri("/api/v1/jobs")
        .set_json(analysis_request())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let job: Value = test::read_body_json(resp).await;
    let job_id = job["id"].as_str().unwrap().to_string();

    let mut status = Value::Null;
    for _ in 0..100 {
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/jobs/{}", job_id))
            .to_request();
        status = test::call_and_read_body_json(&app, req).await;
        if status["status"] == "completed" || status["status"] == "failed" {
            break;
        }
        actix_rt::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status["status"], "completed");
    assert!(status["total_paths"].as_u64().unwrap() > 0);
    assert!(status["analysis_id"].is_string());
}

#[actix_rt::test]
async fn test_graphql_reads_stored_paths() {
    let app = test_app!();

    let req = test::TestRequest::post()
        .uri("/api/v1/attack-paths/analyze")
        .set_json(analysis_request())
        .to_request();
    let result: Value = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/graphql")
        .set_json(json!({
            "query": "{ attackPaths(page: { limit: 10 }) { total items { pathId riskScore } } }"
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["attackPaths"]["total"], result["total_paths"]);
}
