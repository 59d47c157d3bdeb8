//! Runner allocation and test-parallelization engine
//!
//! This crate provides the core functionality for:
//! - Workload profiling and resource-class scoring
//! - Cost-constrained selection and live-condition adjustment
//! - Change-impact classification and parallel test planning
//! - Offline cost and trend reporting
//! - Metrics and structured decision logging

pub mod adjuster;
pub mod aggregator;
pub mod allocator;
pub mod catalog;
pub mod error;
pub mod impact;
pub mod models;
pub mod observability;
pub mod planner;
pub mod profiler;
pub mod scorer;
pub mod selector;

pub use adjuster::adjust;
pub use aggregator::{parse_run_records, CostAggregator, CostReport, RunOutcome, RunRecord};
pub use allocator::Allocator;
pub use catalog::ResourceCatalog;
pub use error::{AllocationError, CatalogError, ParseEnumError};
pub use impact::{ChangeCategory, ChangeClassifier, ChangeScope, ImpactLevel};
pub use models::*;
pub use observability::{DecisionLogger, EngineMetrics};
pub use planner::{FileChangeFlags, ParallelGroup, TestPlanner, TestStrategy};
pub use profiler::WorkloadProfiler;
