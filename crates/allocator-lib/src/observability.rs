//! Observability for the allocation engine
//!
//! Provides:
//! - Prometheus metrics (allocation latency, decisions by policy, fallbacks,
//!   adjustments, planned strategies, skipped run records)
//! - Structured decision logging with tracing

use crate::adjuster::is_business_hour;
use crate::aggregator::CostReport;
use crate::models::{AllocationDecision, DynamicAdjustment, Policy};
use crate::planner::TestStrategy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for decision latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.05,
];

static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    allocation_latency_seconds: Histogram,
    allocations: IntCounterVec,
    allocation_failures: IntCounter,
    cost_ceiling_fallbacks: IntCounter,
    adjustments: IntCounterVec,
    strategies_planned: IntCounterVec,
    run_records_skipped: IntCounter,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            allocation_latency_seconds: register_histogram!(
                "runner_allocator_allocation_latency_seconds",
                "Time spent producing one allocation decision",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register allocation_latency_seconds"),

            allocations: register_int_counter_vec!(
                "runner_allocator_allocations_total",
                "Allocation decisions produced, by policy and chosen class",
                &["policy", "resource_class"]
            )
            .expect("Failed to register allocations_total"),

            allocation_failures: register_int_counter!(
                "runner_allocator_allocation_failures_total",
                "Allocation requests that produced no decision"
            )
            .expect("Failed to register allocation_failures_total"),

            cost_ceiling_fallbacks: register_int_counter!(
                "runner_allocator_cost_ceiling_fallbacks_total",
                "Decisions that fell back to the cheapest class over the ceiling"
            )
            .expect("Failed to register cost_ceiling_fallbacks_total"),

            adjustments: register_int_counter_vec!(
                "runner_allocator_adjustments_total",
                "Dynamic adjustment outcomes, by rule",
                &["rule"]
            )
            .expect("Failed to register adjustments_total"),

            strategies_planned: register_int_counter_vec!(
                "runner_allocator_strategies_planned_total",
                "Test strategies planned, by mode",
                &["mode"]
            )
            .expect("Failed to register strategies_planned_total"),

            run_records_skipped: register_int_counter!(
                "runner_allocator_run_records_skipped_total",
                "Historical run records skipped as malformed or invalid"
            )
            .expect("Failed to register run_records_skipped_total"),
        }
    }
}

/// Handle to the process-wide engine metrics. Clones share the same
/// underlying collectors.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn observe_allocation_latency(&self, duration_secs: f64) {
        self.inner().allocation_latency_seconds.observe(duration_secs);
    }

    /// Count a decision; over-budget decisions also count as fallbacks
    pub fn record_decision(&self, policy: Policy, decision: &AllocationDecision) {
        self.inner()
            .allocations
            .with_label_values(&[policy.as_str(), &decision.chosen_resource_class])
            .inc();
        if !decision.within_budget {
            self.inner().cost_ceiling_fallbacks.inc();
        }
    }

    pub fn inc_allocation_failures(&self) {
        self.inner().allocation_failures.inc();
    }

    pub fn record_adjustment(&self, adjustment: &DynamicAdjustment) {
        let rule = adjustment.rule.map_or("none", |r| r.as_str());
        self.inner().adjustments.with_label_values(&[rule]).inc();
    }

    pub fn record_strategy(&self, strategy: &TestStrategy) {
        let mode = if strategy.run_all { "run-all" } else { "targeted" };
        self.inner().strategies_planned.with_label_values(&[mode]).inc();
    }

    pub fn add_skipped_records(&self, count: usize) {
        self.inner().run_records_skipped.inc_by(count as u64);
    }
}

/// Structured logger for engine decisions
#[derive(Clone)]
pub struct DecisionLogger {
    source: String,
}

impl DecisionLogger {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn log_allocation(&self, policy: Policy, decision: &AllocationDecision) {
        if decision.within_budget {
            info!(
                event = "allocation_decided",
                source = %self.source,
                workload_type = %decision.workload_type,
                resource_class = %decision.chosen_resource_class,
                policy = %policy,
                estimated_cost = decision.estimated_cost,
                utilization_percent = decision.utilization.overall_percent,
                alternates = decision.alternates.len(),
                hints = decision.optimization_hints.len(),
                "Allocation decided"
            );
        } else {
            warn!(
                event = "allocation_over_budget",
                source = %self.source,
                workload_type = %decision.workload_type,
                resource_class = %decision.chosen_resource_class,
                policy = %policy,
                estimated_cost = decision.estimated_cost,
                "Allocation exceeds cost ceiling"
            );
        }
    }

    pub fn log_allocation_failure(&self, workload_type: &str, error: &dyn std::error::Error) {
        warn!(
            event = "allocation_failed",
            source = %self.source,
            workload_type = %workload_type,
            error = %error,
            "Allocation failed"
        );
    }

    pub fn log_adjustment(&self, adjustment: &DynamicAdjustment, current_hour: u32) {
        info!(
            event = "adjustment_evaluated",
            source = %self.source,
            original = %adjustment.original_runner,
            adjusted = %adjustment.adjusted_runner,
            changed = adjustment.runner_changed,
            rule = adjustment.rule.map_or("none", |r| r.as_str()),
            cost_delta = adjustment.cost_delta,
            peak_hours = is_business_hour(current_hour),
            reason = %adjustment.reason,
            "Adjustment evaluated"
        );
    }

    pub fn log_strategy(&self, strategy: &TestStrategy) {
        info!(
            event = "strategy_planned",
            source = %self.source,
            run_all = strategy.run_all,
            tests = strategy.selected_tests.len(),
            groups = strategy.parallel_groups.len(),
            critical_path = %strategy.critical_path.join(">"),
            estimated_minutes = strategy.estimated_duration_minutes,
            "Test strategy planned"
        );
    }

    pub fn log_cost_report(&self, report: &CostReport) {
        info!(
            event = "cost_report",
            source = %self.source,
            runs = report.summary.total_runs,
            skipped = report.summary.skipped_records,
            total_cost = report.summary.total_cost,
            wasted_cost = report.summary.wasted_cost,
            inefficiencies = report.inefficiencies.len(),
            recommendations = report.recommendations.len(),
            "Cost report aggregated"
        );
    }

    pub fn log_startup(&self, version: &str, catalog_classes: usize) {
        info!(
            event = "service_started",
            source = %self.source,
            version = %version,
            catalog_classes = catalog_classes,
            "Runner allocator started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            source = %self.source,
            reason = %reason,
            "Runner allocator shutting down"
        );
    }
}
