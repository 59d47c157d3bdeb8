//! `rae plan`: test strategy for a change set

use allocator_lib::{ChangeClassifier, FileChangeFlags, TestPlanner, TestStrategy};
use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::commands::classify::print_scope;
use crate::output::{
    format_currency, format_minutes, print_heading, print_json, print_rows, print_warning,
    OutputFormat,
};

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "Group")]
    name: String,
    #[tabled(rename = "Tests")]
    members: String,
    #[tabled(rename = "Shards")]
    parallelism: u32,
    #[tabled(rename = "Starts")]
    start: String,
    #[tabled(rename = "Ends")]
    finish: String,
    #[tabled(rename = "After")]
    depends_on: String,
    #[tabled(rename = "Runner")]
    runner: String,
    #[tabled(rename = "Cost")]
    cost: String,
}

#[derive(Serialize)]
struct PlanOutput<'a> {
    scope: &'a allocator_lib::ChangeScope,
    strategy: &'a TestStrategy,
}

pub fn run_plan(planner: &TestPlanner, paths: &[String], format: OutputFormat) -> Result<()> {
    let scope = ChangeClassifier::new().classify(paths);
    let strategy = planner.plan(&scope, &FileChangeFlags::from_scope(&scope))?;

    match format {
        OutputFormat::Json => print_json(&PlanOutput {
            scope: &scope,
            strategy: &strategy,
        }),
        OutputFormat::Table => {
            print_scope(&scope);
            println!();
            print_strategy(&strategy);
            Ok(())
        }
    }
}

fn print_strategy(strategy: &TestStrategy) {
    print_heading("Test strategy");
    if strategy.run_all {
        print_warning("Running the full suite");
    }
    if strategy.selected_tests.is_empty() {
        println!("No tests selected");
    } else {
        println!("Selected tests:         {}", strategy.selected_tests.join(", "));
    }
    println!(
        "Estimated duration:     {}",
        format_minutes(strategy.estimated_duration_minutes).bold()
    );
    if !strategy.critical_path.is_empty() {
        println!("Critical path:          {}", strategy.critical_path.join(" -> "));
    }
    println!();

    if !strategy.parallel_groups.is_empty() {
        let rows = strategy
            .parallel_groups
            .iter()
            .map(|g| GroupRow {
                name: if g.fail_fast {
                    format!("{} (gate)", g.name)
                } else {
                    g.name.clone()
                },
                members: g.members.join(", "),
                parallelism: g.parallelism,
                start: format_minutes(g.start_offset_minutes),
                finish: format_minutes(g.finish_offset_minutes),
                depends_on: g.depends_on.join(", "),
                runner: match &g.adjustment {
                    Some(adj) if adj.runner_changed => format!(
                        "{} (was {})",
                        g.recommended_resource_class, g.allocation.chosen_resource_class
                    ),
                    _ => g.recommended_resource_class.clone(),
                },
                cost: format_currency(g.estimated_cost()),
            })
            .collect();
        print_rows::<GroupRow>(rows);
        println!(
            "Total estimated cost:   {}",
            format_currency(strategy.total_estimated_cost())
        );
        println!();
    }

    print_heading("Reasoning");
    for line in &strategy.reasoning {
        println!("  {}", line);
    }
}
