//! Subcommand implementations

pub mod allocate;
pub mod catalog;
pub mod classify;
pub mod costs;
pub mod plan;

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

/// Changed paths from arguments plus an optional newline-separated file
/// (`-` reads stdin)
pub fn collect_paths(mut paths: Vec<String>, from_file: Option<&Path>) -> Result<Vec<String>> {
    if let Some(file) = from_file {
        let content = if file == Path::new("-") {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read changed paths from stdin")?;
            buffer
        } else {
            std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?
        };
        paths.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from),
        );
    }
    Ok(paths)
}

/// Parse `CLASS=VALUE` pairs given on the command line
pub fn parse_class_value(raw: &str) -> Result<(String, f64), String> {
    let (class, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected CLASS=VALUE, got '{raw}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    Ok((class.trim().to_string(), value))
}
