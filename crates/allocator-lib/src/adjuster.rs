//! Dynamic adjustment against live runner conditions
//!
//! Rules run in a fixed order and later rules only fire when no earlier rule
//! changed the class:
//!
//! 1. critical work stuck in a long queue moves to the fastest alternate with
//!    a much shorter queue
//! 2. a class that is nearly exhausted moves to a well-available alternate
//! 3. during business hours, non-critical work moves to the cheaper alternate
//!
//! The wrapped decision is never modified; the result is a separate record.

use crate::models::{
    AdjustmentRule, AllocationDecision, Alternate, AlternateKind, DynamicAdjustment,
    LiveConditions, PerformanceImpact, Priority,
};

/// Queue time (minutes) above which critical work is moved
pub const CRITICAL_QUEUE_THRESHOLD_MINUTES: f64 = 10.0;

/// An alternate must queue for less than this fraction of the current wait
pub const QUEUE_IMPROVEMENT_FACTOR: f64 = 0.5;

/// Availability below which the chosen class is considered exhausted
pub const LOW_AVAILABILITY_THRESHOLD: f64 = 0.3;

/// Availability an alternate needs before work is moved onto it
pub const HIGH_AVAILABILITY_THRESHOLD: f64 = 0.7;

/// First hour of the peak window, inclusive
pub const BUSINESS_HOURS_START: u32 = 9;

/// Last hour of the peak window, inclusive
pub const BUSINESS_HOURS_END: u32 = 17;

pub fn is_business_hour(hour: u32) -> bool {
    (BUSINESS_HOURS_START..=BUSINESS_HOURS_END).contains(&hour)
}

/// Re-evaluate `decision` against `live`. Deterministic for identical input.
pub fn adjust(
    decision: &AllocationDecision,
    live: &LiveConditions,
    priority: Priority,
) -> DynamicAdjustment {
    let original = decision.chosen_resource_class.as_str();
    let current_queue = live.queue_time(original);
    let current_availability = live.availability(original);

    if priority == Priority::Critical && current_queue > CRITICAL_QUEUE_THRESHOLD_MINUTES {
        let limit = current_queue * QUEUE_IMPROVEMENT_FACTOR;
        let fastest = decision
            .alternates
            .iter()
            .filter(|a| live.queue_time(&a.resource_class) < limit)
            .fold(None::<&Alternate>, |best, a| match best {
                Some(b)
                    if b.cores > a.cores
                        || (b.cores == a.cores
                            && live.queue_time(&b.resource_class)
                                <= live.queue_time(&a.resource_class)) =>
                {
                    Some(b)
                }
                _ => Some(a),
            });

        if let Some(alt) = fastest {
            return changed(
                original,
                alt,
                AdjustmentRule::CriticalQueue,
                PerformanceImpact::Improved,
                format!(
                    "Critical priority: {} queue is {:.1} min; moved to {} with {:.1} min queue",
                    original,
                    current_queue,
                    alt.resource_class,
                    live.queue_time(&alt.resource_class)
                ),
            );
        }
    }

    if current_availability < LOW_AVAILABILITY_THRESHOLD {
        let available = decision
            .alternates
            .iter()
            .filter(|a| live.availability(&a.resource_class) > HIGH_AVAILABILITY_THRESHOLD)
            .fold(None::<&Alternate>, |best, a| match best {
                Some(b)
                    if live.availability(&b.resource_class)
                        >= live.availability(&a.resource_class) =>
                {
                    Some(b)
                }
                _ => Some(a),
            });

        if let Some(alt) = available {
            return changed(
                original,
                alt,
                AdjustmentRule::LowAvailability,
                PerformanceImpact::Minimal,
                format!(
                    "Low availability on {} ({:.0}%); moved to {} ({:.0}% available)",
                    original,
                    current_availability * 100.0,
                    alt.resource_class,
                    live.availability(&alt.resource_class) * 100.0
                ),
            );
        }
    }

    if is_business_hour(live.current_hour) && priority != Priority::Critical {
        if let Some(cheaper) = decision.alternate(AlternateKind::Cheaper) {
            return changed(
                original,
                cheaper,
                AdjustmentRule::PeakHours,
                PerformanceImpact::Minimal,
                format!(
                    "Peak hours ({:02}:00): moved {} priority work from {} to cheaper {}, saving ${:.4}",
                    live.current_hour,
                    priority,
                    original,
                    cheaper.resource_class,
                    -cheaper.cost_delta
                ),
            );
        }
    }

    DynamicAdjustment {
        original_runner: original.to_string(),
        adjusted_runner: original.to_string(),
        runner_changed: false,
        reason: "Live conditions do not warrant a change".to_string(),
        cost_delta: 0.0,
        performance_impact: PerformanceImpact::None,
        rule: None,
    }
}

fn changed(
    original: &str,
    alt: &Alternate,
    rule: AdjustmentRule,
    performance_impact: PerformanceImpact,
    reason: String,
) -> DynamicAdjustment {
    DynamicAdjustment {
        original_runner: original.to_string(),
        adjusted_runner: alt.resource_class.clone(),
        runner_changed: true,
        reason,
        cost_delta: alt.cost_delta,
        performance_impact,
        rule: Some(rule),
    }
}
