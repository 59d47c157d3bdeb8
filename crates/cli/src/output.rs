//! Output formatting utilities

use allocator_lib::ImpactLevel;
use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table
pub fn print_rows<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    println!("{}", Table::new(rows).with(Style::rounded()));
}

/// Print a section heading with an underline
pub fn print_heading(title: &str) {
    println!("{}", title.bold());
    println!("{}", "-".repeat(50));
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Dollar amount; per-run costs need more precision than totals
pub fn format_currency(amount: f64) -> String {
    if amount.abs() < 1.0 {
        format!("${:.4}", amount)
    } else {
        format!("${:.2}", amount)
    }
}

/// Signed dollar delta
pub fn format_delta(amount: f64) -> String {
    let formatted = format_currency(amount.abs());
    if amount < 0.0 {
        format!("-{}", formatted).green().to_string()
    } else if amount > 0.0 {
        format!("+{}", formatted).red().to_string()
    } else {
        formatted
    }
}

pub fn format_minutes(minutes: f64) -> String {
    if minutes >= 60.0 {
        format!("{}h {:02.0}m", (minutes / 60.0).floor(), minutes % 60.0)
    } else {
        format!("{:.0}m", minutes)
    }
}

pub fn format_percent(fraction: f64) -> String {
    format!("{:.0}%", fraction * 100.0)
}

pub fn color_impact(level: ImpactLevel) -> String {
    let text = level.as_str();
    match level {
        ImpactLevel::High => text.red().bold().to_string(),
        ImpactLevel::Medium => text.yellow().to_string(),
        ImpactLevel::Low => text.green().to_string(),
    }
}

/// Color a utilization percentage by how well the class fits
pub fn color_utilization(percent: f64) -> String {
    let formatted = format!("{:.0}%", percent);
    if percent > 90.0 {
        formatted.red().to_string()
    } else if percent < 40.0 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}
