//! Cost-constrained selection
//!
//! Narrows a ranked candidate list to one resource class under a cost ceiling
//! and operator policy, and derives the cheaper/faster alternates that the
//! dynamic adjuster can later switch to.

use crate::models::{Alternate, AlternateKind, Policy, ScoredCandidate};
use tracing::warn;

/// Outcome of a selection over scored candidates
#[derive(Debug, Clone)]
pub struct Selection {
    pub chosen: ScoredCandidate,
    pub alternates: Vec<Alternate>,
    /// False when nothing fit the ceiling and the cheapest class was taken
    pub within_budget: bool,
    pub reasoning: Vec<String>,
}

/// Pick a class from `candidates` (sorted best first, as produced by the
/// scorer). Returns `None` only for an empty slice.
///
/// Exceeding the ceiling never fails the selection: the globally cheapest
/// candidate is taken and a warning is recorded, since an over-budget run is
/// preferable to a blocked pipeline.
pub fn select(
    candidates: &[ScoredCandidate],
    cost_ceiling: Option<f64>,
    policy: Policy,
) -> Option<Selection> {
    let mut reasoning = Vec::new();

    let affordable: Vec<&ScoredCandidate> = candidates
        .iter()
        .filter(|c| cost_ceiling.map_or(true, |ceiling| c.estimated_cost <= ceiling))
        .collect();

    let (chosen, within_budget) = if affordable.is_empty() {
        let cheapest = candidates
            .iter()
            .min_by(|a, b| a.estimated_cost.total_cmp(&b.estimated_cost))?;
        let ceiling = cost_ceiling.unwrap_or_default();

        warn!(
            resource_class = %cheapest.class.id,
            estimated_cost = cheapest.estimated_cost,
            cost_ceiling = ceiling,
            "No resource class within cost ceiling, falling back to cheapest"
        );
        reasoning.push(format!(
            "Warning: no resource class fits the ${:.4} cost ceiling; falling back to cheapest class {} (${:.4})",
            ceiling, cheapest.class.id, cheapest.estimated_cost
        ));
        (cheapest, false)
    } else {
        let top = affordable[0];
        let chosen = match policy {
            Policy::CostOptimization => match affordable.iter().find(|c| c.class.self_hosted) {
                Some(low_cost) => {
                    reasoning.push(format!(
                        "Cost optimization: preferring low-cost class {} over top-scored {}",
                        low_cost.class.id, top.class.id
                    ));
                    *low_cost
                }
                None => {
                    reasoning.push(
                        "Cost optimization: no low-cost class within budget, using top-scored class"
                            .to_string(),
                    );
                    top
                }
            },
            Policy::PerformanceOptimization | Policy::Balanced => top,
        };
        (chosen, true)
    };

    reasoning.push(format!(
        "Selected {} ({} cores, {} GB) with score {:.1}",
        chosen.class.id, chosen.class.cores, chosen.class.memory_gb, chosen.score
    ));
    if chosen.affine {
        reasoning.push(format!("{} is tuned for this workload type", chosen.class.id));
    }

    let alternates = alternates_for(chosen, candidates, policy);

    Some(Selection {
        chosen: chosen.clone(),
        alternates,
        within_budget,
        reasoning,
    })
}

/// One cheaper and one faster alternate, ordered by policy
pub fn alternates_for(
    chosen: &ScoredCandidate,
    candidates: &[ScoredCandidate],
    policy: Policy,
) -> Vec<Alternate> {
    let others = || candidates.iter().filter(|c| c.class.id != chosen.class.id);

    // Candidates are sorted by score, so the first match is the best-scored one
    let cheaper = others()
        .find(|c| c.class.cost_per_minute < chosen.class.cost_per_minute)
        .map(|c| alternate(chosen, c, AlternateKind::Cheaper));

    // Smallest step up in cores; among equal steps the first is best-scored
    let faster = others()
        .filter(|c| c.class.cores > chosen.class.cores)
        .fold(None::<&ScoredCandidate>, |best, c| match best {
            Some(b) if b.class.cores <= c.class.cores => Some(b),
            _ => Some(c),
        })
        .map(|c| alternate(chosen, c, AlternateKind::Faster));

    let ordered = match policy {
        Policy::PerformanceOptimization => [faster, cheaper],
        Policy::CostOptimization | Policy::Balanced => [cheaper, faster],
    };
    ordered.into_iter().flatten().collect()
}

fn alternate(chosen: &ScoredCandidate, other: &ScoredCandidate, kind: AlternateKind) -> Alternate {
    let cost_delta = other.estimated_cost - chosen.estimated_cost;
    let tradeoff = match kind {
        AlternateKind::Cheaper => format!(
            "Saves ${:.4} per run on {} cores (vs {}); expect longer runtimes or tighter memory",
            -cost_delta, other.class.cores, chosen.class.cores
        ),
        AlternateKind::Faster => format!(
            "{} cores (vs {}) for ${:.4} more per run; shorter wall-clock time for CPU-bound work",
            other.class.cores, chosen.class.cores, cost_delta
        ),
    };

    Alternate {
        resource_class: other.class.id.clone(),
        kind,
        cores: other.class.cores,
        cost_per_minute: other.class.cost_per_minute,
        estimated_cost: other.estimated_cost,
        cost_delta,
        tradeoff,
    }
}
