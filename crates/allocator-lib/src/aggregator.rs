//! Cost and trend reporting over historical runs
//!
//! Offline batch computation. Records come from an external collector; a
//! record that fails to parse or validate is skipped and counted, and the
//! report covers the remainder.

use crate::allocator::{MAX_SUGGESTED_SHARDS, PARALLELIZE_AFTER_MINUTES};
use crate::catalog::ResourceCatalog;
use crate::profiler::WorkloadProfiler;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Average utilization below this marks a run group as oversized
pub const OVERSIZED_UTILIZATION: f64 = 0.4;

/// Failure ratio above this marks a run group as failure-prone
pub const HIGH_FAILURE_RATE: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Success,
    Failure,
    Cancelled,
}

/// One completed job run as reported by the CI system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub workload_type: String,
    pub resource_class: String,
    pub duration_minutes: f64,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    /// Fraction of CPU used, 0.0..=1.0
    #[serde(default)]
    pub cpu_utilization: Option<f64>,
    /// Fraction of memory used, 0.0..=1.0
    #[serde(default)]
    pub memory_utilization: Option<f64>,
}

fn default_parallelism() -> u32 {
    1
}

impl RunRecord {
    /// Mean of whichever utilization figures were reported
    pub fn utilization(&self) -> Option<f64> {
        match (self.cpu_utilization, self.memory_utilization) {
            (Some(cpu), Some(memory)) => Some((cpu + memory) / 2.0),
            (Some(u), None) | (None, Some(u)) => Some(u),
            (None, None) => None,
        }
    }

    /// Runner minutes consumed across all shards
    pub fn billed_minutes(&self) -> f64 {
        self.duration_minutes * self.parallelism as f64
    }
}

/// Records decoded from a JSON array plus the count that failed to decode
#[derive(Debug, Clone, Default)]
pub struct ParsedRuns {
    pub records: Vec<RunRecord>,
    pub malformed: usize,
}

/// Decode a JSON array of run records, skipping entries that do not fit the
/// record shape. Only a document that is not an array is an error.
pub fn parse_run_records(json: &str) -> Result<ParsedRuns, serde_json::Error> {
    let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let mut parsed = ParsedRuns::default();

    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<RunRecord>(value) {
            Ok(record) => parsed.records.push(record),
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed run record");
                parsed.malformed += 1;
            }
        }
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub cancelled_runs: usize,
    pub total_cost: f64,
    pub total_minutes: f64,
    pub average_cost_per_run: f64,
    pub failure_rate: f64,
    pub average_utilization: Option<f64>,
    /// Cost of failed runs
    pub wasted_cost: f64,
    pub skipped_records: usize,
}

/// Totals for one resource class or workload type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub runs: usize,
    pub failed_runs: usize,
    pub cost: f64,
    pub minutes: f64,
    pub average_utilization: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub by_resource_class: BTreeMap<String, UsageStats>,
    pub by_workload_type: BTreeMap<String, UsageStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub runs: usize,
    pub failed_runs: usize,
    pub cost: f64,
    pub minutes: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InefficiencyKind {
    Oversized,
    HighFailureRate,
}

/// A run group (workload type on a resource class) that wastes money
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inefficiency {
    pub kind: InefficiencyKind,
    pub workload_type: String,
    pub resource_class: String,
    pub runs: usize,
    pub detail: String,
    pub wasted_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_resource_class: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendationKind {
    RightSize,
    Parallelize,
    ReduceFailures,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub workload_type: String,
    pub resource_class: String,
    pub message: String,
    /// Dollars over the reported period
    pub estimated_savings: f64,
    /// Wall-clock minutes over the reported period
    pub time_saved_minutes: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    pub summary: CostSummary,
    pub breakdown: CostBreakdown,
    pub trends: Vec<DailyTrend>,
    pub inefficiencies: Vec<Inefficiency>,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Default)]
struct Accumulator {
    runs: usize,
    failed: usize,
    cost: f64,
    failed_cost: f64,
    minutes: f64,
    duration_sum: f64,
    serial_runs: usize,
    utilization_sum: f64,
    utilization_samples: usize,
}

impl Accumulator {
    fn add(&mut self, record: &RunRecord, cost: f64) {
        self.runs += 1;
        self.cost += cost;
        self.minutes += record.billed_minutes();
        self.duration_sum += record.duration_minutes;
        if record.parallelism == 1 {
            self.serial_runs += 1;
        }
        if record.outcome == RunOutcome::Failure {
            self.failed += 1;
            self.failed_cost += cost;
        }
        if let Some(u) = record.utilization() {
            self.utilization_sum += u;
            self.utilization_samples += 1;
        }
    }

    fn average_utilization(&self) -> Option<f64> {
        (self.utilization_samples > 0)
            .then(|| self.utilization_sum / self.utilization_samples as f64)
    }

    fn failure_rate(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.failed as f64 / self.runs as f64
        }
    }

    fn stats(&self) -> UsageStats {
        UsageStats {
            runs: self.runs,
            failed_runs: self.failed,
            cost: self.cost,
            minutes: self.minutes,
            average_utilization: self.average_utilization(),
        }
    }
}

/// Batch aggregator; holds only the immutable catalog and profiles
#[derive(Debug, Clone)]
pub struct CostAggregator {
    catalog: Arc<ResourceCatalog>,
    profiler: Arc<WorkloadProfiler>,
}

impl CostAggregator {
    pub fn new(catalog: Arc<ResourceCatalog>, profiler: Arc<WorkloadProfiler>) -> Self {
        Self { catalog, profiler }
    }

    /// Why a record cannot be costed, if it cannot
    fn rejection(&self, record: &RunRecord) -> Option<String> {
        if record.workload_type.trim().is_empty() {
            return Some("empty workload type".to_string());
        }
        if !(record.duration_minutes.is_finite() && record.duration_minutes >= 0.0) {
            return Some(format!("invalid duration {}", record.duration_minutes));
        }
        if record.parallelism == 0 {
            return Some("parallelism of 0".to_string());
        }
        for u in [record.cpu_utilization, record.memory_utilization].into_iter().flatten() {
            if !(0.0..=1.0).contains(&u) {
                return Some(format!("utilization {u} outside 0..=1"));
            }
        }
        if self.catalog.get(&record.resource_class).is_none() {
            return Some(format!("unknown resource class {}", record.resource_class));
        }
        None
    }

    pub fn aggregate(&self, runs: &[RunRecord]) -> CostReport {
        let mut total = Accumulator::default();
        let mut skipped = 0usize;
        let mut successful = 0usize;
        let mut cancelled = 0usize;
        let mut by_class: BTreeMap<String, Accumulator> = BTreeMap::new();
        let mut by_workload: BTreeMap<String, Accumulator> = BTreeMap::new();
        let mut groups: BTreeMap<(String, String), Accumulator> = BTreeMap::new();
        let mut daily: BTreeMap<NaiveDate, Accumulator> = BTreeMap::new();

        for record in runs {
            if let Some(reason) = self.rejection(record) {
                warn!(run_id = %record.run_id, reason = %reason, "Skipping invalid run record");
                skipped += 1;
                continue;
            }
            let Some(class) = self.catalog.get(&record.resource_class) else {
                skipped += 1;
                continue;
            };
            let cost = record.billed_minutes() * class.cost_per_minute;

            match record.outcome {
                RunOutcome::Success => successful += 1,
                RunOutcome::Cancelled => cancelled += 1,
                RunOutcome::Failure => {}
            }
            total.add(record, cost);
            by_class
                .entry(record.resource_class.clone())
                .or_default()
                .add(record, cost);
            by_workload
                .entry(record.workload_type.clone())
                .or_default()
                .add(record, cost);
            groups
                .entry((record.workload_type.clone(), record.resource_class.clone()))
                .or_default()
                .add(record, cost);
            daily
                .entry(record.started_at.date_naive())
                .or_default()
                .add(record, cost);
        }

        let summary = CostSummary {
            total_runs: total.runs,
            successful_runs: successful,
            failed_runs: total.failed,
            cancelled_runs: cancelled,
            total_cost: total.cost,
            total_minutes: total.minutes,
            average_cost_per_run: if total.runs == 0 {
                0.0
            } else {
                total.cost / total.runs as f64
            },
            failure_rate: total.failure_rate(),
            average_utilization: total.average_utilization(),
            wasted_cost: total.failed_cost,
            skipped_records: skipped,
        };

        let breakdown = CostBreakdown {
            by_resource_class: by_class.iter().map(|(k, a)| (k.clone(), a.stats())).collect(),
            by_workload_type: by_workload.iter().map(|(k, a)| (k.clone(), a.stats())).collect(),
        };

        let trends = daily
            .iter()
            .map(|(date, a)| DailyTrend {
                date: *date,
                runs: a.runs,
                failed_runs: a.failed,
                cost: a.cost,
                minutes: a.minutes,
            })
            .collect();

        let mut inefficiencies = Vec::new();
        let mut recommendations = Vec::new();
        for ((workload_type, resource_class), group) in &groups {
            self.review_group(
                workload_type,
                resource_class,
                group,
                &mut inefficiencies,
                &mut recommendations,
            );
        }
        recommendations.sort_by(|a, b| {
            (b.estimated_savings, b.time_saved_minutes)
                .partial_cmp(&(a.estimated_savings, a.time_saved_minutes))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        CostReport {
            summary,
            breakdown,
            trends,
            inefficiencies,
            recommendations,
        }
    }

    fn review_group(
        &self,
        workload_type: &str,
        resource_class: &str,
        group: &Accumulator,
        inefficiencies: &mut Vec<Inefficiency>,
        recommendations: &mut Vec<Recommendation>,
    ) {
        let Some(class) = self.catalog.get(resource_class) else {
            return;
        };

        if let Some(avg) = group.average_utilization() {
            if avg < OVERSIZED_UTILIZATION {
                if let Some(smaller) = self.catalog.next_smaller(resource_class) {
                    let savings =
                        group.cost * (1.0 - smaller.cost_per_minute / class.cost_per_minute);
                    inefficiencies.push(Inefficiency {
                        kind: InefficiencyKind::Oversized,
                        workload_type: workload_type.to_string(),
                        resource_class: resource_class.to_string(),
                        runs: group.runs,
                        detail: format!(
                            "Average utilization {:.0}% on {} cores",
                            avg * 100.0,
                            class.cores
                        ),
                        wasted_cost: savings.max(0.0),
                        suggested_resource_class: Some(smaller.id.clone()),
                    });
                    recommendations.push(Recommendation {
                        kind: RecommendationKind::RightSize,
                        workload_type: workload_type.to_string(),
                        resource_class: resource_class.to_string(),
                        message: format!(
                            "Move {} from {} to {} ({} cores)",
                            workload_type, resource_class, smaller.id, smaller.cores
                        ),
                        estimated_savings: savings.max(0.0),
                        time_saved_minutes: 0.0,
                    });
                }
            }
        }

        let failure_rate = group.failure_rate();
        if failure_rate > HIGH_FAILURE_RATE {
            inefficiencies.push(Inefficiency {
                kind: InefficiencyKind::HighFailureRate,
                workload_type: workload_type.to_string(),
                resource_class: resource_class.to_string(),
                runs: group.runs,
                detail: format!(
                    "{} of {} runs failed ({:.0}%)",
                    group.failed,
                    group.runs,
                    failure_rate * 100.0
                ),
                wasted_cost: group.failed_cost,
                suggested_resource_class: None,
            });
            recommendations.push(Recommendation {
                kind: RecommendationKind::ReduceFailures,
                workload_type: workload_type.to_string(),
                resource_class: resource_class.to_string(),
                message: format!(
                    "Stabilize {}: failed runs cost ${:.2}",
                    workload_type, group.failed_cost
                ),
                estimated_savings: group.failed_cost,
                time_saved_minutes: 0.0,
            });
        }

        let parallelizable = self.profiler.is_known(workload_type)
            && self.profiler.profile(workload_type).parallelizable;
        if parallelizable && group.serial_runs > 0 {
            let average = group.duration_sum / group.runs as f64;
            if average > PARALLELIZE_AFTER_MINUTES {
                let shards = ((average / PARALLELIZE_AFTER_MINUTES).ceil() as u32)
                    .clamp(2, MAX_SUGGESTED_SHARDS);
                let saved = (average - average / shards as f64) * group.serial_runs as f64;
                recommendations.push(Recommendation {
                    kind: RecommendationKind::Parallelize,
                    workload_type: workload_type.to_string(),
                    resource_class: resource_class.to_string(),
                    message: format!(
                        "Split {} ({:.0} min average) into {} shards",
                        workload_type, average, shards
                    ),
                    estimated_savings: 0.0,
                    time_saved_minutes: saved,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{UBUNTU_16_CORES, UBUNTU_4_CORES, UBUNTU_8_CORES, UBUNTU_LATEST};
    use chrono::TimeZone;

    fn aggregator() -> CostAggregator {
        CostAggregator::new(
            Arc::new(ResourceCatalog::builtin()),
            Arc::new(WorkloadProfiler::new()),
        )
    }

    fn run(id: &str, workload: &str, class: &str, minutes: f64, outcome: RunOutcome) -> RunRecord {
        RunRecord {
            run_id: id.to_string(),
            workload_type: workload.to_string(),
            resource_class: class.to_string(),
            duration_minutes: minutes,
            parallelism: 1,
            outcome,
            started_at: Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap(),
            cpu_utilization: None,
            memory_utilization: None,
        }
    }

    #[test]
    fn test_summary_totals() {
        let runs = vec![
            run("1", "unit-tests", UBUNTU_LATEST, 5.0, RunOutcome::Success),
            run("2", "unit-tests", UBUNTU_LATEST, 5.0, RunOutcome::Cancelled),
            run("3", "integration-tests", UBUNTU_4_CORES, 10.0, RunOutcome::Success),
        ];
        let report = aggregator().aggregate(&runs);

        assert_eq!(report.summary.total_runs, 3);
        assert_eq!(report.summary.successful_runs, 2);
        assert_eq!(report.summary.cancelled_runs, 1);
        // 5 * 0.008 * 2 + 10 * 0.016
        assert!((report.summary.total_cost - 0.24).abs() < 1e-9);
        assert_eq!(report.breakdown.by_resource_class[UBUNTU_LATEST].runs, 2);
        assert_eq!(report.breakdown.by_workload_type["integration-tests"].minutes, 10.0);
    }

    #[test]
    fn test_parallelism_multiplies_cost() {
        let mut record = run("1", "e2e-tests", UBUNTU_8_CORES, 10.0, RunOutcome::Success);
        record.parallelism = 3;
        let report = aggregator().aggregate(&[record]);
        assert!((report.summary.total_cost - 0.96).abs() < 1e-9);
    }

    #[test]
    fn test_oversized_group_flagged() {
        let mut runs = Vec::new();
        for i in 0..4 {
            let mut r = run(
                &i.to_string(),
                "performance-tests",
                UBUNTU_16_CORES,
                30.0,
                RunOutcome::Success,
            );
            r.cpu_utilization = Some(0.2);
            r.memory_utilization = Some(0.3);
            runs.push(r);
        }
        let report = aggregator().aggregate(&runs);

        let flagged = report
            .inefficiencies
            .iter()
            .find(|i| i.kind == InefficiencyKind::Oversized)
            .unwrap();
        assert_eq!(flagged.suggested_resource_class.as_deref(), Some(UBUNTU_8_CORES));
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.kind == RecommendationKind::RightSize && r.estimated_savings > 0.0));
    }

    #[test]
    fn test_smallest_class_never_oversized() {
        let mut r = run("1", "lint", crate::catalog::SELF_HOSTED_LINUX, 3.0, RunOutcome::Success);
        r.cpu_utilization = Some(0.05);
        let report = aggregator().aggregate(&[r]);
        assert!(report.inefficiencies.is_empty());
    }

    #[test]
    fn test_high_failure_rate_counts_waste() {
        let mut runs: Vec<RunRecord> = (0..8)
            .map(|i| run(&i.to_string(), "api-tests", UBUNTU_LATEST, 10.0, RunOutcome::Success))
            .collect();
        runs.push(run("f1", "api-tests", UBUNTU_LATEST, 10.0, RunOutcome::Failure));
        runs.push(run("f2", "api-tests", UBUNTU_LATEST, 10.0, RunOutcome::Failure));
        let report = aggregator().aggregate(&runs);

        let flagged = report
            .inefficiencies
            .iter()
            .find(|i| i.kind == InefficiencyKind::HighFailureRate)
            .unwrap();
        assert!((flagged.wasted_cost - 0.16).abs() < 1e-9);
        assert!((report.summary.wasted_cost - 0.16).abs() < 1e-9);
    }

    #[test]
    fn test_failure_rate_at_threshold_not_flagged() {
        // 3 of 20 is exactly 0.15
        let runs: Vec<RunRecord> = (0..20)
            .map(|i| {
                let outcome = if i < 3 { RunOutcome::Failure } else { RunOutcome::Success };
                run(&i.to_string(), "unit-tests", UBUNTU_LATEST, 5.0, outcome)
            })
            .collect();
        let report = aggregator().aggregate(&runs);
        assert!(report.inefficiencies.is_empty());
    }

    #[test]
    fn test_parallelize_recommendation() {
        let runs = vec![run("1", "e2e-tests", UBUNTU_8_CORES, 25.0, RunOutcome::Success)];
        let report = aggregator().aggregate(&runs);
        let rec = report
            .recommendations
            .iter()
            .find(|r| r.kind == RecommendationKind::Parallelize)
            .unwrap();
        assert!(rec.message.contains("3 shards"));
        assert!(rec.time_saved_minutes > 0.0);
    }

    #[test]
    fn test_invalid_records_skipped() {
        let bad_class = run("1", "unit-tests", "mainframe", 5.0, RunOutcome::Success);
        let negative = run("2", "unit-tests", UBUNTU_LATEST, -1.0, RunOutcome::Success);
        let mut bad_util = run("3", "unit-tests", UBUNTU_LATEST, 5.0, RunOutcome::Success);
        bad_util.memory_utilization = Some(1.5);
        let good = run("4", "unit-tests", UBUNTU_LATEST, 5.0, RunOutcome::Success);

        let report = aggregator().aggregate(&[bad_class, negative, bad_util, good]);
        assert_eq!(report.summary.total_runs, 1);
        assert_eq!(report.summary.skipped_records, 3);
    }

    #[test]
    fn test_daily_trends_sorted() {
        let mut late = run("1", "unit-tests", UBUNTU_LATEST, 5.0, RunOutcome::Success);
        late.started_at = Utc.with_ymd_and_hms(2024, 3, 6, 23, 59, 0).unwrap();
        let early = run("2", "unit-tests", UBUNTU_LATEST, 5.0, RunOutcome::Success);

        let report = aggregator().aggregate(&[late, early]);
        let dates: Vec<String> = report.trends.iter().map(|t| t.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-03-04", "2024-03-06"]);
    }

    #[test]
    fn test_parse_tolerates_malformed_entries() {
        let json = r#"[
            {"run_id": "a", "workload_type": "unit-tests", "resource_class": "ubuntu-latest",
             "duration_minutes": 4.5, "outcome": "success", "started_at": "2024-03-04T10:00:00Z"},
            {"run_id": "b", "duration_minutes": "soon"},
            42
        ]"#;
        let parsed = parse_run_records(json).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].parallelism, 1);
        assert_eq!(parsed.malformed, 2);
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(parse_run_records(r#"{"runs": []}"#).is_err());
    }

    #[test]
    fn test_empty_input() {
        let report = aggregator().aggregate(&[]);
        assert_eq!(report.summary.total_runs, 0);
        assert_eq!(report.summary.average_cost_per_run, 0.0);
        assert!(report.trends.is_empty());
    }
}
