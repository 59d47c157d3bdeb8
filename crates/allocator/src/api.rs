//! HTTP decision API, health checks and Prometheus metrics

use crate::config::ServiceConfig;
use crate::health::{ComponentStatus, HealthRegistry};
use allocator_lib::{
    adjust, parse_run_records, AllocationDecision, AllocationError, AllocationRequest, Allocator,
    ChangeClassifier, CostAggregator, DecisionLogger, DynamicAdjustment, EngineMetrics,
    FileChangeFlags, LiveConditions, Policy, Priority, ResourceCatalog, ResourceHints,
    TestPlanner, WorkloadProfiler,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Timelike;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Defaults applied to requests that leave a field out
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestDefaults {
    pub policy: Policy,
    pub cost_ceiling: Option<f64>,
}

impl From<&ServiceConfig> for RequestDefaults {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            policy: config.default_policy,
            cost_ceiling: config.default_cost_ceiling,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub allocator: Allocator,
    pub planner: TestPlanner,
    pub classifier: ChangeClassifier,
    pub aggregator: CostAggregator,
    pub defaults: RequestDefaults,
    pub health_registry: HealthRegistry,
    pub metrics: EngineMetrics,
    pub logger: DecisionLogger,
}

impl AppState {
    pub fn new(
        catalog: ResourceCatalog,
        defaults: RequestDefaults,
        health_registry: HealthRegistry,
        logger: DecisionLogger,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let profiler = Arc::new(WorkloadProfiler::new());
        let allocator = Allocator::new(catalog.clone(), profiler.clone());

        Self {
            planner: TestPlanner::new(allocator.clone()).with_policy(defaults.policy),
            classifier: ChangeClassifier::new(),
            aggregator: CostAggregator::new(catalog, profiler),
            allocator,
            defaults,
            health_registry,
            metrics: EngineMetrics::new(),
            logger,
        }
    }
}

/// Errors surfaced to API callers as JSON
#[derive(Debug)]
pub enum ApiError {
    Allocation(AllocationError),
    BadRequest(String),
}

impl From<AllocationError> for ApiError {
    fn from(e: AllocationError) -> Self {
        ApiError::Allocation(e)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Allocation(e @ AllocationError::NoSuitableResource { .. }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "no_suitable_resource",
                e.to_string(),
            ),
            ApiError::Allocation(e @ AllocationError::InvalidRequest(_)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_request",
                e.to_string(),
            ),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad_request", message),
        };
        (
            status,
            Json(ErrorBody {
                error: kind.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

/// Live conditions on the wire; the hour defaults to the current UTC hour
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiveConditionsBody {
    #[serde(default)]
    pub queue_times: BTreeMap<String, f64>,
    #[serde(default)]
    pub runner_availability: BTreeMap<String, f64>,
    #[serde(default)]
    pub current_hour: Option<u32>,
}

impl LiveConditionsBody {
    fn into_conditions(self) -> Result<LiveConditions, ApiError> {
        let current_hour = self
            .current_hour
            .unwrap_or_else(|| chrono::Utc::now().hour());
        if current_hour > 23 {
            return Err(ApiError::BadRequest(format!(
                "current_hour must be 0..=23, got {current_hour}"
            )));
        }
        Ok(LiveConditions {
            queue_times: self.queue_times,
            runner_availability: self.runner_availability,
            current_hour,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationBody {
    pub workload_type: String,
    #[serde(default)]
    pub estimated_duration_minutes: Option<f64>,
    #[serde(default)]
    pub parallelism: Option<u32>,
    #[serde(default)]
    pub resource_hints: Option<ResourceHints>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub policy: Option<Policy>,
    #[serde(default)]
    pub cost_ceiling: Option<f64>,
    /// When present, the decision is also run through the adjuster
    #[serde(default)]
    pub live_conditions: Option<LiveConditionsBody>,
}

impl AllocationBody {
    fn request(&self, defaults: RequestDefaults) -> AllocationRequest {
        AllocationRequest {
            workload_type: self.workload_type.clone(),
            estimated_duration_minutes: self.estimated_duration_minutes,
            parallelism: self.parallelism.unwrap_or(1),
            resource_hints: self.resource_hints.clone(),
            priority: self.priority.unwrap_or_default(),
            policy: self.policy.unwrap_or(defaults.policy),
            cost_ceiling: self.cost_ceiling.or(defaults.cost_ceiling),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocationResponse {
    pub decision: AllocationDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<DynamicAdjustment>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustmentBody {
    pub decision: AllocationDecision,
    #[serde(default)]
    pub live_conditions: LiveConditionsBody,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Deserialize)]
pub struct ImpactBody {
    pub changed_paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct StrategyBody {
    pub changed_paths: Vec<String>,
    /// Extra facts from the caller; merged with what the paths imply
    #[serde(default)]
    pub flags: Option<FileChangeFlags>,
    #[serde(default)]
    pub policy: Option<Policy>,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Ceiling for each group's allocation
    #[serde(default)]
    pub cost_ceiling: Option<f64>,
    /// When present, each group decision is also run through the adjuster
    #[serde(default)]
    pub live_conditions: Option<LiveConditionsBody>,
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;
    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn catalog(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.allocator.catalog().classes().to_vec())
}

async fn create_allocation(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AllocationBody>,
) -> Result<Json<AllocationResponse>, ApiError> {
    let request = body.request(state.defaults);
    let started = Instant::now();
    let result = state.allocator.allocate(&request);
    state
        .metrics
        .observe_allocation_latency(started.elapsed().as_secs_f64());

    let decision = match result {
        Ok(decision) => decision,
        Err(e) => {
            state.metrics.inc_allocation_failures();
            state.logger.log_allocation_failure(&request.workload_type, &e);
            return Err(e.into());
        }
    };
    state.metrics.record_decision(request.policy, &decision);
    state.logger.log_allocation(request.policy, &decision);

    let adjustment = match body.live_conditions {
        Some(live) => {
            let live = live.into_conditions()?;
            let adjustment = adjust(&decision, &live, request.priority);
            state.metrics.record_adjustment(&adjustment);
            state.logger.log_adjustment(&adjustment, live.current_hour);
            Some(adjustment)
        }
        None => None,
    };

    Ok(Json(AllocationResponse {
        decision,
        adjustment,
    }))
}

async fn create_adjustment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AdjustmentBody>,
) -> Result<Json<DynamicAdjustment>, ApiError> {
    let live = body.live_conditions.into_conditions()?;
    let adjustment = adjust(&body.decision, &live, body.priority);
    state.metrics.record_adjustment(&adjustment);
    state.logger.log_adjustment(&adjustment, live.current_hour);
    Ok(Json(adjustment))
}

async fn classify_impact(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ImpactBody>,
) -> impl IntoResponse {
    Json(state.classifier.classify(&body.changed_paths))
}

async fn create_strategy(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StrategyBody>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = state.classifier.classify(&body.changed_paths);
    let flags = body
        .flags
        .unwrap_or_else(|| FileChangeFlags::from_scope(&scope));

    let live = body
        .live_conditions
        .map(LiveConditionsBody::into_conditions)
        .transpose()?;
    let current_hour = live.as_ref().map(|l| l.current_hour);

    let planner = state
        .planner
        .clone()
        .with_policy(body.policy.unwrap_or(state.defaults.policy))
        .with_priority(body.priority.unwrap_or_default())
        .with_cost_ceiling(body.cost_ceiling.or(state.defaults.cost_ceiling))
        .with_live_conditions(live);
    let strategy = planner.plan(&scope, &flags)?;
    state.metrics.record_strategy(&strategy);
    state.logger.log_strategy(&strategy);
    for adjustment in strategy
        .parallel_groups
        .iter()
        .filter_map(|g| g.adjustment.as_ref())
    {
        state.metrics.record_adjustment(adjustment);
        if let Some(hour) = current_hour {
            state.logger.log_adjustment(adjustment, hour);
        }
    }
    Ok(Json(strategy))
}

async fn create_cost_report(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    let parsed = parse_run_records(&body)
        .map_err(|e| ApiError::BadRequest(format!("expected a JSON array of run records: {e}")))?;

    let mut report = state.aggregator.aggregate(&parsed.records);
    report.summary.skipped_records += parsed.malformed;
    state
        .metrics
        .add_skipped_records(report.summary.skipped_records);
    state.logger.log_cost_report(&report);
    Ok(Json(report))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/catalog", get(catalog))
        .route("/v1/allocations", post(create_allocation))
        .route("/v1/adjustments", post(create_adjustment))
        .route("/v1/impact", post(classify_impact))
        .route("/v1/strategies", post(create_strategy))
        .route("/v1/cost-reports", post(create_cost_report))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
