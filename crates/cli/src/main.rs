//! Runner Allocation Engine CLI
//!
//! Runs the allocation engine over local inputs: pick a runner for a job,
//! classify a change set, plan parallel test groups and report costs.

mod commands;
mod config;
mod output;

use allocator_lib::{
    AllocationRequest, Allocator, CostAggregator, LiveConditions, Policy, Priority, ResourceHints,
    TestPlanner, WorkloadProfiler,
};
use anyhow::Result;
use chrono::Timelike;
use clap::{Args, Parser, Subcommand};
use commands::{allocate, catalog, classify, costs, plan};
use std::path::PathBuf;
use std::sync::Arc;

/// Runner Allocation Engine CLI
#[derive(Parser)]
#[command(name = "rae")]
#[command(author, version, about = "CLI for the Runner Allocation Engine", long_about = None)]
pub struct Cli {
    /// Resource catalog JSON file (built-in catalog if not specified)
    #[arg(long, global = true, env = "RAE_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Output format (config file default, else table)
    #[arg(long, short, global = true)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List resource classes
    Catalog,

    /// Choose a resource class for one workload
    Allocate(AllocateArgs),

    /// Classify changed files by impact
    Classify(PathArgs),

    /// Plan parallel test groups for changed files
    Plan {
        #[command(flatten)]
        paths: PathArgs,

        /// Selection policy for group runners
        #[arg(long)]
        policy: Option<Policy>,

        /// Priority of the test run (normal, high, critical)
        #[arg(long, default_value = "normal")]
        priority: Priority,

        /// Maximum acceptable estimated cost per group, in dollars
        #[arg(long)]
        cost_ceiling: Option<f64>,

        #[command(flatten)]
        live: LiveArgs,
    },

    /// Aggregate costs from a JSON array of run records
    Costs {
        /// Run records file
        runs: PathBuf,
    },
}

#[derive(Args)]
pub struct AllocateArgs {
    /// Workload type (e.g. unit-tests, build, e2e-tests)
    pub workload_type: String,

    /// Estimated duration in minutes (profile average if not specified)
    #[arg(long)]
    pub duration: Option<f64>,

    /// Number of parallel shards
    #[arg(long, default_value_t = 1)]
    pub parallelism: u32,

    /// Minimum cores, overriding the profile
    #[arg(long)]
    pub cores: Option<u32>,

    /// Minimum memory in GB, overriding the profile
    #[arg(long)]
    pub memory_gb: Option<f64>,

    /// Priority (normal, high, critical)
    #[arg(long, default_value = "normal")]
    pub priority: Priority,

    /// Selection policy (cost-optimization, performance-optimization, balanced)
    #[arg(long)]
    pub policy: Option<Policy>,

    /// Maximum acceptable estimated cost in dollars
    #[arg(long)]
    pub cost_ceiling: Option<f64>,

    #[command(flatten)]
    pub live: LiveArgs,
}

/// Live runner conditions fed to the adjuster
#[derive(Args)]
pub struct LiveArgs {
    /// Current queue time, as CLASS=MINUTES (repeatable)
    #[arg(long = "queue", value_parser = commands::parse_class_value)]
    pub queue_times: Vec<(String, f64)>,

    /// Current availability, as CLASS=FRACTION (repeatable)
    #[arg(long = "availability", value_parser = commands::parse_class_value)]
    pub availability: Vec<(String, f64)>,

    /// Hour of day for peak-hour rules (defaults to the current UTC hour)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..24))]
    pub hour: Option<u32>,

    /// Evaluate live conditions even when no queue or availability is given
    #[arg(long)]
    pub live: bool,
}

impl AllocateArgs {
    fn request(&self, config: &config::Config) -> AllocationRequest {
        let mut request = AllocationRequest::new(&self.workload_type)
            .with_parallelism(self.parallelism)
            .with_priority(self.priority)
            .with_policy(config.policy(self.policy));
        if let Some(duration) = self.duration {
            request = request.with_duration(duration);
        }
        if self.cores.is_some() || self.memory_gb.is_some() {
            request = request.with_hints(ResourceHints {
                cores: self.cores,
                memory_gb: self.memory_gb,
            });
        }
        if let Some(ceiling) = config.cost_ceiling(self.cost_ceiling) {
            request = request.with_cost_ceiling(ceiling);
        }
        request
    }
}

impl LiveArgs {
    fn conditions(&self) -> Option<LiveConditions> {
        let wanted = self.live
            || self.hour.is_some()
            || !self.queue_times.is_empty()
            || !self.availability.is_empty();
        if !wanted {
            return None;
        }

        let hour = self.hour.unwrap_or_else(|| chrono::Utc::now().hour());
        let mut live = LiveConditions::at_hour(hour);
        for (class, minutes) in &self.queue_times {
            live = live.with_queue_time(class.clone(), *minutes);
        }
        for (class, fraction) in &self.availability {
            live = live.with_availability(class.clone(), *fraction);
        }
        Some(live)
    }
}

#[derive(Args)]
pub struct PathArgs {
    /// Changed file paths
    pub paths: Vec<String>,

    /// Read additional newline-separated paths from a file ("-" for stdin)
    #[arg(long)]
    pub from_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let format = config.format(cli.format);
    let catalog = Arc::new(config.catalog(cli.catalog.as_deref())?);
    let profiler = Arc::new(WorkloadProfiler::new());
    let allocator = Allocator::new(catalog.clone(), profiler.clone());

    match cli.command {
        Commands::Catalog => catalog::show_catalog(&catalog, format)?,
        Commands::Allocate(args) => {
            let request = args.request(&config);
            allocate::run_allocate(&allocator, &request, args.live.conditions(), format)?;
        }
        Commands::Classify(args) => {
            let paths = commands::collect_paths(args.paths, args.from_file.as_deref())?;
            classify::run_classify(&paths, format)?;
        }
        Commands::Plan {
            paths,
            policy,
            priority,
            cost_ceiling,
            live,
        } => {
            let changed = commands::collect_paths(paths.paths, paths.from_file.as_deref())?;
            let planner = TestPlanner::new(allocator)
                .with_policy(config.policy(policy))
                .with_priority(priority)
                .with_cost_ceiling(config.cost_ceiling(cost_ceiling))
                .with_live_conditions(live.conditions());
            plan::run_plan(&planner, &changed, format)?;
        }
        Commands::Costs { runs } => {
            let aggregator = CostAggregator::new(catalog, profiler);
            costs::show_costs(&aggregator, &runs, format)?;
        }
    }

    Ok(())
}
