//! `folio providers`.

use console::style;
use serde::Serialize;

use crate::app::AppServices;
use crate::cli::helpers::{heading, print_json};
use crate::models::Capability;

#[derive(Serialize)]
struct ProviderRow {
    name: String,
    kind: &'static str,
    confidence: u8,
    available: bool,
    capabilities: Vec<Capability>,
}

pub async fn cmd_providers(services: &AppServices, json: bool) -> anyhow::Result<()> {
    let ctx = services.context();
    let mut rows = Vec::new();
    for provider in services.books.registry().all() {
        rows.push(ProviderRow {
            name: provider.name().to_string(),
            kind: provider.kind().as_str(),
            confidence: provider.confidence(),
            available: provider.is_available(&ctx).await,
            capabilities: provider.capabilities(),
        });
    }

    if json {
        return print_json(&rows);
    }

    heading("Providers");
    for row in rows {
        let availability = if row.available {
            style("available").green()
        } else {
            style("unavailable").dim()
        };
        let capabilities: Vec<&str> = row.capabilities.iter().map(|c| c.as_str()).collect();
        println!(
            "  {:<14} {:<5} {:>3}  {:<12} {}",
            style(&row.name).bold(),
            row.kind,
            row.confidence,
            availability,
            capabilities.join(", ")
        );
    }
    Ok(())
}
