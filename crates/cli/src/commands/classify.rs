//! `rae classify`: change-impact classification

use allocator_lib::{ChangeClassifier, ChangeScope};
use anyhow::Result;
use tabled::Tabled;

use crate::output::{color_impact, print_heading, print_json, print_rows, OutputFormat};

#[derive(Tabled)]
struct CategoryRow {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Files")]
    files: usize,
    #[tabled(rename = "Weight")]
    weight: String,
    #[tabled(rename = "Examples")]
    examples: String,
}

pub fn run_classify(paths: &[String], format: OutputFormat) -> Result<()> {
    let scope = ChangeClassifier::new().classify(paths);
    match format {
        OutputFormat::Json => print_json(&scope),
        OutputFormat::Table => {
            print_scope(&scope);
            Ok(())
        }
    }
}

pub fn print_scope(scope: &ChangeScope) {
    print_heading("Change impact");
    println!("Files changed:          {}", scope.total_files);
    if !scope.categories.is_empty() {
        println!("Categories:             {}", scope.category_names().join(", "));
    }
    if !scope.dependency_manifests.is_empty() {
        println!("Dependency manifests:   {}", scope.dependency_manifests.join(", "));
    }
    println!(
        "Overall impact:         {} (weighted average {:.2})",
        color_impact(scope.overall_impact),
        scope.weighted_average
    );
    println!();

    let rows = scope
        .categories
        .iter()
        .map(|(category, matched)| CategoryRow {
            category: category.to_string(),
            files: matched.files.len(),
            weight: format!("{:?}", matched.impact).to_lowercase(),
            examples: matched
                .files
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect();
    print_rows::<CategoryRow>(rows);
}
