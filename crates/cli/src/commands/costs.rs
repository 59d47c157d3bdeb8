//! `rae costs`: cost report over historical run records

use allocator_lib::{parse_run_records, CostAggregator, CostReport};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{
    format_currency, format_minutes, format_percent, print_heading, print_info, print_json,
    print_rows, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct UsageRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Runs")]
    runs: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Minutes")]
    minutes: String,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "Utilization")]
    utilization: String,
}

#[derive(Tabled)]
struct TrendRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Runs")]
    runs: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Cost")]
    cost: String,
}

/// Aggregate a JSON array of run records read from `path`
pub fn show_costs(aggregator: &CostAggregator, path: &Path, format: OutputFormat) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read run records from {}", path.display()))?;
    let parsed = parse_run_records(&content)
        .with_context(|| format!("{} is not a JSON array of run records", path.display()))?;

    let mut report = aggregator.aggregate(&parsed.records);
    report.summary.skipped_records += parsed.malformed;

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => {
            print_report(&report);
            Ok(())
        }
    }
}

fn usage_rows<'a>(
    stats: impl Iterator<Item = (&'a String, &'a allocator_lib::aggregator::UsageStats)>,
) -> Vec<UsageRow> {
    stats
        .map(|(name, s)| UsageRow {
            name: name.clone(),
            runs: s.runs,
            failed: s.failed_runs,
            minutes: format_minutes(s.minutes),
            cost: format_currency(s.cost),
            utilization: s.average_utilization.map_or("-".to_string(), format_percent),
        })
        .collect()
}

fn print_report(report: &CostReport) {
    let summary = &report.summary;

    println!("{}", "Cost Report".bold());
    println!("{}", "=".repeat(50));
    println!("Runs:                   {}", summary.total_runs);
    println!(
        "Outcomes:               {} ok, {} failed, {} cancelled",
        summary.successful_runs, summary.failed_runs, summary.cancelled_runs
    );
    println!("Runner time:            {}", format_minutes(summary.total_minutes));
    println!(
        "{}  {}",
        "Total cost:".bold(),
        format_currency(summary.total_cost).bold()
    );
    println!(
        "Failed-run waste:       {} ({} failure rate)",
        format_currency(summary.wasted_cost).red(),
        format_percent(summary.failure_rate)
    );
    if summary.skipped_records > 0 {
        print_warning(&format!(
            "{} record(s) skipped as malformed or invalid",
            summary.skipped_records
        ));
    }
    println!();

    print_heading("By resource class");
    print_rows(usage_rows(report.breakdown.by_resource_class.iter()));
    println!();

    print_heading("By workload type");
    print_rows(usage_rows(report.breakdown.by_workload_type.iter()));
    println!();

    if !report.trends.is_empty() {
        print_heading("Daily trend");
        let rows = report
            .trends
            .iter()
            .map(|t| TrendRow {
                date: t.date.format("%Y-%m-%d").to_string(),
                runs: t.runs,
                failed: t.failed_runs,
                cost: format_currency(t.cost),
            })
            .collect();
        print_rows::<TrendRow>(rows);
        println!();
    }

    if !report.inefficiencies.is_empty() {
        print_heading("Inefficiencies");
        for i in &report.inefficiencies {
            print_warning(&format!(
                "{} on {}: {} (waste {})",
                i.workload_type,
                i.resource_class,
                i.detail,
                format_currency(i.wasted_cost)
            ));
        }
        println!();
    }

    if !report.recommendations.is_empty() {
        print_heading("Recommendations");
        for r in &report.recommendations {
            let gain = if r.estimated_savings > 0.0 {
                format!("saves {}", format_currency(r.estimated_savings))
            } else {
                format!("saves {} wall-clock", format_minutes(r.time_saved_minutes))
            };
            print_info(&format!("{} ({})", r.message, gain.green()));
        }
    }
}
