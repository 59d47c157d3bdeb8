//! Allocation pipeline
//!
//! Runs one request through profiler, scorer and selector and assembles the
//! immutable [`AllocationDecision`] with utilization figures and
//! right-sizing hints.

use crate::catalog::ResourceCatalog;
use crate::error::AllocationError;
use crate::models::{
    AllocationDecision, AllocationRequest, AlternateKind, HintKind, OptimizationHint,
    ResourceClass, ResourceRequirements, Utilization,
};
use crate::profiler::{WorkloadProfiler, FALLBACK_WORKLOAD};
use crate::scorer;
use crate::selector;
use std::sync::Arc;

/// Overall utilization below this suggests a smaller class
pub const DOWNGRADE_UTILIZATION_PERCENT: f64 = 40.0;

/// Overall utilization above this suggests a larger class
pub const UPGRADE_UTILIZATION_PERCENT: f64 = 90.0;

/// Serial parallelizable work longer than this should be sharded
pub const PARALLELIZE_AFTER_MINUTES: f64 = 10.0;

/// Upper bound on the shard count suggested by a parallelize hint
pub const MAX_SUGGESTED_SHARDS: u32 = 4;

/// Stateless allocator over a shared catalog and profile registry.
///
/// Cloning is cheap and every call is independent, so one instance can serve
/// concurrent requests.
#[derive(Debug, Clone)]
pub struct Allocator {
    catalog: Arc<ResourceCatalog>,
    profiler: Arc<WorkloadProfiler>,
}

impl Allocator {
    pub fn new(catalog: Arc<ResourceCatalog>, profiler: Arc<WorkloadProfiler>) -> Self {
        Self { catalog, profiler }
    }

    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    pub fn profiler(&self) -> &WorkloadProfiler {
        &self.profiler
    }

    /// Merge the workload profile with the request's hints and overrides
    pub fn requirements(
        &self,
        request: &AllocationRequest,
    ) -> Result<ResourceRequirements, AllocationError> {
        validate(request)?;

        let profile = self.profiler.profile(&request.workload_type);
        let hints = request.resource_hints.clone().unwrap_or_default();

        Ok(ResourceRequirements {
            cores: hints.cores.unwrap_or(profile.min_cores),
            memory_gb: hints.memory_gb.unwrap_or(profile.min_memory_gb),
            duration_minutes: request
                .estimated_duration_minutes
                .unwrap_or(profile.avg_duration_minutes),
            parallelism: request.parallelism,
        })
    }

    /// Produce a decision for one request
    pub fn allocate(
        &self,
        request: &AllocationRequest,
    ) -> Result<AllocationDecision, AllocationError> {
        let requirements = self.requirements(request)?;
        let candidates = scorer::score(&requirements, &request.workload_type, &self.catalog)?;

        let selection = selector::select(&candidates, request.cost_ceiling, request.policy)
            .ok_or_else(|| AllocationError::NoSuitableResource {
                workload_type: request.workload_type.clone(),
                cores: requirements.cores,
                memory_gb: requirements.memory_gb,
            })?;

        let mut reasoning = Vec::new();
        if !self.profiler.is_known(&request.workload_type) {
            reasoning.push(format!(
                "Unknown workload type '{}'; using the '{}' profile",
                request.workload_type, FALLBACK_WORKLOAD
            ));
        }
        reasoning.push(format!(
            "Requires {} cores and {} GB for {:.1} min x {} under {} policy",
            requirements.cores,
            requirements.memory_gb,
            requirements.duration_minutes,
            requirements.parallelism,
            request.policy
        ));
        reasoning.extend(selection.reasoning);

        let utilization = utilization(&requirements, &selection.chosen.class);
        let mut decision = AllocationDecision {
            workload_type: request.workload_type.clone(),
            chosen_resource_class: selection.chosen.class.id.clone(),
            alternates: selection.alternates,
            estimated_cost: selection.chosen.estimated_cost,
            within_budget: selection.within_budget,
            utilization,
            reasoning,
            optimization_hints: Vec::new(),
        };

        let parallelizable = self.profiler.profile(&request.workload_type).parallelizable;
        decision.optimization_hints = optimization_hints(&decision, &requirements, parallelizable);

        Ok(decision)
    }
}

fn validate(request: &AllocationRequest) -> Result<(), AllocationError> {
    if request.workload_type.trim().is_empty() {
        return Err(AllocationError::InvalidRequest(
            "workload_type must not be empty".to_string(),
        ));
    }
    if request.parallelism == 0 {
        return Err(AllocationError::InvalidRequest(
            "parallelism must be at least 1".to_string(),
        ));
    }
    if let Some(duration) = request.estimated_duration_minutes {
        if !(duration.is_finite() && duration > 0.0) {
            return Err(AllocationError::InvalidRequest(format!(
                "estimated duration must be positive, got {duration}"
            )));
        }
    }
    if let Some(ceiling) = request.cost_ceiling {
        if !(ceiling.is_finite() && ceiling >= 0.0) {
            return Err(AllocationError::InvalidRequest(format!(
                "cost ceiling must be non-negative, got {ceiling}"
            )));
        }
    }
    if let Some(hints) = &request.resource_hints {
        if hints.cores == Some(0) {
            return Err(AllocationError::InvalidRequest(
                "core hint must be positive".to_string(),
            ));
        }
        if let Some(memory) = hints.memory_gb {
            if !(memory.is_finite() && memory > 0.0) {
                return Err(AllocationError::InvalidRequest(format!(
                    "memory hint must be positive, got {memory}"
                )));
            }
        }
    }
    Ok(())
}

/// Requested resources as percentages of the class capacity
pub fn utilization(requirements: &ResourceRequirements, class: &ResourceClass) -> Utilization {
    let cpu_percent = requirements.cores as f64 / class.cores as f64 * 100.0;
    let memory_percent = requirements.memory_gb / class.memory_gb * 100.0;
    Utilization {
        cpu_percent,
        memory_percent,
        overall_percent: (cpu_percent + memory_percent) / 2.0,
    }
}

fn optimization_hints(
    decision: &AllocationDecision,
    requirements: &ResourceRequirements,
    parallelizable: bool,
) -> Vec<OptimizationHint> {
    let mut hints = Vec::new();
    let overall = decision.utilization.overall_percent;

    if overall < DOWNGRADE_UTILIZATION_PERCENT {
        if let Some(cheaper) = decision.alternate(AlternateKind::Cheaper) {
            hints.push(OptimizationHint {
                kind: HintKind::Downgrade,
                message: format!(
                    "Only {:.0}% of {} is requested; {} would save ${:.4} per run",
                    overall,
                    decision.chosen_resource_class,
                    cheaper.resource_class,
                    -cheaper.cost_delta
                ),
                target: Some(cheaper.resource_class.clone()),
            });
        }
    }

    if overall > UPGRADE_UTILIZATION_PERCENT {
        if let Some(faster) = decision.alternate(AlternateKind::Faster) {
            hints.push(OptimizationHint {
                kind: HintKind::Upgrade,
                message: format!(
                    "{:.0}% of {} is requested; {} leaves headroom for ${:.4} more per run",
                    overall,
                    decision.chosen_resource_class,
                    faster.resource_class,
                    faster.cost_delta
                ),
                target: Some(faster.resource_class.clone()),
            });
        }
    }

    if parallelizable
        && requirements.parallelism == 1
        && requirements.duration_minutes > PARALLELIZE_AFTER_MINUTES
    {
        let shards = ((requirements.duration_minutes / PARALLELIZE_AFTER_MINUTES).ceil() as u32)
            .clamp(2, MAX_SUGGESTED_SHARDS);
        hints.push(OptimizationHint {
            kind: HintKind::Parallelize,
            message: format!(
                "{:.0} min of serial parallelizable work; split into {} shards",
                requirements.duration_minutes, shards
            ),
            target: None,
        });
    }

    hints
}
