//! Integration tests for the decision API endpoints

use allocator_lib::{DecisionLogger, Policy, ResourceCatalog};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use runner_allocator::{
    api::{create_router, AppState, RequestDefaults},
    health::{components, HealthRegistry},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app(defaults: RequestDefaults) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::ENGINE).await;
    health_registry.register(components::CATALOG).await;
    health_registry.set_ready(true).await;

    let state = Arc::new(AppState::new(
        ResourceCatalog::builtin(),
        defaults,
        health_registry,
        DecisionLogger::new("test"),
    ));
    (create_router(state.clone()), state)
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_healthz_ok_when_catalog_degraded() {
    let (app, state) = setup_test_app(RequestDefaults::default()).await;
    state
        .health_registry
        .set_degraded(components::CATALOG, "using built-in catalog")
        .await;

    let (status, body) = send(app, "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_readyz_unavailable_before_ready() {
    let (app, state) = setup_test_app(RequestDefaults::default()).await;
    state.health_registry.set_ready(false).await;

    let (status, body) = send(app, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _state) = setup_test_app(RequestDefaults::default()).await;

    // Produce at least one decision so the counters are exported
    let (status, _) = send(
        app.clone(),
        "POST",
        "/v1/allocations",
        Some(json!({"workload_type": "lint"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("runner_allocator_allocations_total"));
}

#[tokio::test]
async fn test_catalog_lists_builtin_classes() {
    let (app, _state) = setup_test_app(RequestDefaults::default()).await;
    let (status, body) = send(app, "GET", "/v1/catalog", None).await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"ubuntu-latest"));
    assert!(ids.contains(&"self-hosted-linux"));
}

#[tokio::test]
async fn test_allocation_for_unit_tests() {
    let (app, _state) = setup_test_app(RequestDefaults::default()).await;
    let (status, body) = send(
        app,
        "POST",
        "/v1/allocations",
        Some(json!({
            "workload_type": "unit-tests",
            "estimated_duration_minutes": 5.0,
            "policy": "balanced"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"]["chosen_resource_class"], "ubuntu-latest");
    assert!(body.get("adjustment").is_none());
}

#[tokio::test]
async fn test_default_policy_applies() {
    let defaults = RequestDefaults {
        policy: Policy::CostOptimization,
        cost_ceiling: None,
    };
    let (app, _state) = setup_test_app(defaults).await;
    let (_, body) = send(
        app,
        "POST",
        "/v1/allocations",
        Some(json!({"workload_type": "unit-tests"})),
    )
    .await;
    assert_eq!(body["decision"]["chosen_resource_class"], "self-hosted-linux");
}

#[tokio::test]
async fn test_allocation_with_live_conditions() {
    let (app, _state) = setup_test_app(RequestDefaults::default()).await;
    let (status, body) = send(
        app,
        "POST",
        "/v1/allocations",
        Some(json!({
            "workload_type": "unit-tests",
            "estimated_duration_minutes": 5.0,
            "priority": "critical",
            "live_conditions": {
                "queue_times": {"ubuntu-latest": 12.0, "ubuntu-latest-4-cores": 4.0},
                "current_hour": 2
            }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["adjustment"]["runner_changed"], true);
    assert_eq!(body["adjustment"]["adjusted_runner"], "ubuntu-latest-4-cores");
    assert_eq!(body["adjustment"]["performance_impact"], "improved");
}

#[tokio::test]
async fn test_unsatisfiable_request_is_422() {
    let (app, _state) = setup_test_app(RequestDefaults::default()).await;
    let (status, body) = send(
        app,
        "POST",
        "/v1/allocations",
        Some(json!({
            "workload_type": "build",
            "resource_hints": {"cores": 64}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "no_suitable_resource");
}

#[tokio::test]
async fn test_invalid_hour_is_400() {
    let (app, _state) = setup_test_app(RequestDefaults::default()).await;
    let (status, _) = send(
        app,
        "POST",
        "/v1/allocations",
        Some(json!({
            "workload_type": "lint",
            "live_conditions": {"current_hour": 30}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_adjustment_endpoint_round_trips_decision() {
    let (app, _state) = setup_test_app(RequestDefaults::default()).await;
    let (_, allocated) = send(
        app.clone(),
        "POST",
        "/v1/allocations",
        Some(json!({"workload_type": "unit-tests", "estimated_duration_minutes": 5.0})),
    )
    .await;

    let (status, body) = send(
        app,
        "POST",
        "/v1/adjustments",
        Some(json!({
            "decision": allocated["decision"],
            "live_conditions": {"current_hour": 10},
            "priority": "normal"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["adjusted_runner"], "self-hosted-linux");
    assert_eq!(body["rule"], "peak-hours");
}

#[tokio::test]
async fn test_impact_classification() {
    let (app, _state) = setup_test_app(RequestDefaults::default()).await;
    let (status, body) = send(
        app,
        "POST",
        "/v1/impact",
        Some(json!({"changed_paths": ["package-lock.json", "README.md"]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_files"], 2);
    assert!(body["categories"].get("dependencies").is_some());
}

#[tokio::test]
async fn test_strategy_for_dependency_change() {
    let (app, _state) = setup_test_app(RequestDefaults::default()).await;
    let (status, body) = send(
        app,
        "POST",
        "/v1/strategies",
        Some(json!({"changed_paths": ["package-lock.json"]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_all"], true);
    assert_eq!(body["parallel_groups"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_strategy_for_nested_manifest_runs_all() {
    let (app, _state) = setup_test_app(RequestDefaults::default()).await;
    let (status, body) = send(
        app,
        "POST",
        "/v1/strategies",
        Some(json!({"changed_paths": ["web/package.json"]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_all"], true);
}

#[tokio::test]
async fn test_strategy_groups_adjusted_at_peak_hours() {
    let (app, _state) = setup_test_app(RequestDefaults::default()).await;
    let (status, body) = send(
        app,
        "POST",
        "/v1/strategies",
        Some(json!({
            "changed_paths": ["api/users.ts"],
            "live_conditions": {"current_hour": 11}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let fast = body["parallel_groups"]
        .as_array()
        .unwrap()
        .iter()
        .find(|g| g["name"] == "fast")
        .unwrap();
    assert_eq!(fast["adjustment"]["rule"], "peak-hours");
    assert_eq!(fast["recommended_resource_class"], fast["adjustment"]["adjusted_runner"]);
    assert_ne!(
        fast["recommended_resource_class"],
        fast["allocation"]["chosen_resource_class"]
    );
}

#[tokio::test]
async fn test_strategy_rejects_invalid_hour() {
    let (app, _state) = setup_test_app(RequestDefaults::default()).await;
    let (status, _) = send(
        app,
        "POST",
        "/v1/strategies",
        Some(json!({
            "changed_paths": ["api/users.ts"],
            "live_conditions": {"current_hour": 24}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cost_report_skips_malformed_records() {
    let (app, _state) = setup_test_app(RequestDefaults::default()).await;
    let (status, body) = send(
        app,
        "POST",
        "/v1/cost-reports",
        Some(json!([
            {
                "run_id": "1",
                "workload_type": "unit-tests",
                "resource_class": "ubuntu-latest",
                "duration_minutes": 5.0,
                "outcome": "success",
                "started_at": "2024-03-04T10:00:00Z"
            },
            {"run_id": "2"}
        ])),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["total_runs"], 1);
    assert_eq!(body["summary"]["skipped_records"], 1);
}

#[tokio::test]
async fn test_cost_report_rejects_non_array() {
    let (app, _state) = setup_test_app(RequestDefaults::default()).await;
    let (status, body) = send(
        app,
        "POST",
        "/v1/cost-reports",
        Some(json!({"runs": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}
