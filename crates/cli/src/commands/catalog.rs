//! `rae catalog`: list resource classes

use allocator_lib::ResourceCatalog;
use anyhow::Result;
use tabled::Tabled;

use crate::output::{format_currency, print_json, print_rows, OutputFormat};

#[derive(Tabled)]
struct ClassRow {
    #[tabled(rename = "Class")]
    id: String,
    #[tabled(rename = "Cores")]
    cores: u32,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Storage")]
    storage: String,
    #[tabled(rename = "$/min")]
    cost: String,
    #[tabled(rename = "Max Jobs")]
    max_concurrency: u32,
    #[tabled(rename = "Self-hosted")]
    self_hosted: String,
    #[tabled(rename = "Tuned For")]
    affinity: String,
}

pub fn show_catalog(catalog: &ResourceCatalog, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(catalog.classes()),
        OutputFormat::Table => {
            let rows = catalog
                .iter()
                .map(|c| ClassRow {
                    id: c.id.clone(),
                    cores: c.cores,
                    memory: format!("{} GB", c.memory_gb),
                    storage: format!("{} GB", c.storage_gb),
                    cost: format_currency(c.cost_per_minute),
                    max_concurrency: c.max_concurrency,
                    self_hosted: if c.self_hosted { "yes" } else { "no" }.to_string(),
                    affinity: c.affinity.iter().cloned().collect::<Vec<_>>().join(", "),
                })
                .collect();
            print_rows::<ClassRow>(rows);
            Ok(())
        }
    }
}
