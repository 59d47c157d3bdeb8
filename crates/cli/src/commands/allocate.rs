//! `rae allocate`: one allocation decision, optionally adjusted

use allocator_lib::{
    adjust, AllocationDecision, AllocationRequest, Allocator, DynamicAdjustment, LiveConditions,
    Priority,
};
use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{
    color_utilization, format_currency, format_delta, print_heading, print_info, print_json,
    print_rows, print_success, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct AlternateRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Cores")]
    cores: u32,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "Delta")]
    delta: String,
    #[tabled(rename = "Trade-off")]
    tradeoff: String,
}

#[derive(Serialize)]
struct AllocationOutput<'a> {
    decision: &'a AllocationDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    adjustment: Option<&'a DynamicAdjustment>,
}

pub fn run_allocate(
    allocator: &Allocator,
    request: &AllocationRequest,
    live: Option<LiveConditions>,
    format: OutputFormat,
) -> Result<()> {
    let decision = allocator.allocate(request)?;
    let adjustment = live.map(|live| adjust(&decision, &live, request.priority));

    match format {
        OutputFormat::Json => print_json(&AllocationOutput {
            decision: &decision,
            adjustment: adjustment.as_ref(),
        }),
        OutputFormat::Table => {
            print_decision(&decision, request.priority);
            if let Some(adjustment) = &adjustment {
                println!();
                print_adjustment(adjustment);
            }
            Ok(())
        }
    }
}

fn print_decision(decision: &AllocationDecision, priority: Priority) {
    print_heading(&format!("Allocation for {}", decision.workload_type));
    println!(
        "Resource class:         {}",
        decision.chosen_resource_class.cyan().bold()
    );
    println!("Priority:               {}", priority);
    println!(
        "Estimated cost:         {}",
        format_currency(decision.estimated_cost)
    );
    println!(
        "Utilization:            {} cpu, {} memory",
        color_utilization(decision.utilization.cpu_percent),
        color_utilization(decision.utilization.memory_percent)
    );
    if decision.within_budget {
        print_success("Within cost ceiling");
    } else {
        print_warning("No class fits the cost ceiling; cheapest class selected");
    }
    println!();

    if !decision.alternates.is_empty() {
        print_heading("Alternates");
        let rows = decision
            .alternates
            .iter()
            .map(|a| AlternateRow {
                kind: format!("{:?}", a.kind).to_lowercase(),
                class: a.resource_class.clone(),
                cores: a.cores,
                cost: format_currency(a.estimated_cost),
                delta: format_delta(a.cost_delta),
                tradeoff: a.tradeoff.clone(),
            })
            .collect();
        print_rows::<AlternateRow>(rows);
        println!();
    }

    print_heading("Reasoning");
    for line in &decision.reasoning {
        println!("  {}", line);
    }

    for hint in &decision.optimization_hints {
        print_info(&hint.message);
    }
}

fn print_adjustment(adjustment: &DynamicAdjustment) {
    print_heading("Live adjustment");
    if adjustment.runner_changed {
        println!(
            "{} -> {}  ({})",
            adjustment.original_runner,
            adjustment.adjusted_runner.cyan().bold(),
            format_delta(adjustment.cost_delta)
        );
    } else {
        println!("Keeping {}", adjustment.original_runner.cyan());
    }
    println!("{}", adjustment.reason.dimmed());
}
