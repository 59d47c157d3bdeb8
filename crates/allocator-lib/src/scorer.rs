//! Allocation scoring
//!
//! Ranks every resource class that can hold a request. The composite score is
//! a plain weighted sum so each term can be tuned and tested on its own:
//!
//! ```text
//! score = EFFICIENCY_WEIGHT * efficiency
//!       + min(COST_SCORE_CAP, COST_SCORE_NUMERATOR / (cost_per_minute + COST_EPSILON))
//!       + AFFINITY_BONUS (when the class is affine to the workload)
//!       + min(CONCURRENCY_SCORE_CAP, max_concurrency / CONCURRENCY_DIVISOR)
//! ```

use crate::catalog::ResourceCatalog;
use crate::error::AllocationError;
use crate::models::{ResourceClass, ResourceRequirements, ScoredCandidate};
use tracing::debug;

pub const EFFICIENCY_WEIGHT: f64 = 40.0;
pub const COST_SCORE_NUMERATOR: f64 = 10.0;
/// The cost term saturates here for any class under about $0.33/min, which
/// covers every built-in class. Cost therefore never separates the built-in
/// classes, and a small request on the balanced policy goes to the best fit
/// (`ubuntu-latest` for unit tests) rather than the cheapest class.
pub const COST_SCORE_CAP: f64 = 30.0;
/// Keeps free classes from dividing by zero
pub const COST_EPSILON: f64 = 0.001;
pub const AFFINITY_BONUS: f64 = 20.0;
pub const CONCURRENCY_DIVISOR: f64 = 10.0;
pub const CONCURRENCY_SCORE_CAP: f64 = 10.0;

/// Fit of a request on a class: mean of the cores and memory ratios
pub fn efficiency(requirements: &ResourceRequirements, class: &ResourceClass) -> f64 {
    let cpu = requirements.cores as f64 / class.cores as f64;
    let memory = requirements.memory_gb / class.memory_gb;
    (cpu + memory) / 2.0
}

pub fn estimated_cost(requirements: &ResourceRequirements, class: &ResourceClass) -> f64 {
    class.cost_per_minute * requirements.duration_minutes * requirements.parallelism as f64
}

/// Composite score for one class; higher is better
pub fn composite_score(efficiency: f64, class: &ResourceClass, affine: bool) -> f64 {
    let efficiency_score = EFFICIENCY_WEIGHT * efficiency;
    let cost_score =
        (COST_SCORE_NUMERATOR / (class.cost_per_minute + COST_EPSILON)).min(COST_SCORE_CAP);
    let affinity_score = if affine { AFFINITY_BONUS } else { 0.0 };
    let concurrency_score =
        (class.max_concurrency as f64 / CONCURRENCY_DIVISOR).min(CONCURRENCY_SCORE_CAP);

    efficiency_score + cost_score + affinity_score + concurrency_score
}

/// Score all classes that meet the minimums, best first.
///
/// Returns `NoSuitableResource` when nothing in the catalog is large enough;
/// an undersized class is never returned.
pub fn score(
    requirements: &ResourceRequirements,
    workload_type: &str,
    catalog: &ResourceCatalog,
) -> Result<Vec<ScoredCandidate>, AllocationError> {
    let mut candidates: Vec<ScoredCandidate> = catalog
        .iter()
        .filter(|class| class.satisfies(requirements))
        .map(|class| {
            let efficiency = efficiency(requirements, class);
            let affine = class.is_affine_to(workload_type);
            let score = composite_score(efficiency, class, affine);
            let estimated_cost = estimated_cost(requirements, class);

            debug!(
                resource_class = %class.id,
                workload_type = %workload_type,
                efficiency = efficiency,
                affine = affine,
                estimated_cost = estimated_cost,
                score = score,
                "Scored resource class"
            );

            ScoredCandidate {
                class: class.clone(),
                efficiency,
                affine,
                estimated_cost,
                score,
            }
        })
        .collect();

    if candidates.is_empty() {
        return Err(AllocationError::NoSuitableResource {
            workload_type: workload_type.to_string(),
            cores: requirements.cores,
            memory_gb: requirements.memory_gb,
        });
    }

    // Ties keep catalog order, so the ranking is stable across calls
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(candidates)
}
