//! Shared output helpers for CLI commands.

use console::style;
use serde::Serialize;

use crate::models::Lookup;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a lookup result, either as JSON or through `render`.
pub fn print_lookup<T: Serialize>(
    lookup: &Lookup<T>,
    json: bool,
    what: &str,
    render: impl FnOnce(&T),
) -> anyhow::Result<()> {
    if json {
        return print_json(lookup);
    }
    match lookup {
        Lookup::Found(value) => render(value),
        Lookup::NotFound => println!("{} No {} found", style("!").yellow(), what),
    }
    Ok(())
}

/// Print an optional labelled value, skipping it when absent.
pub fn field(label: &str, value: Option<&str>) {
    if let Some(value) = value {
        println!("  {:<14} {}", style(label).dim(), value);
    }
}

pub fn heading(text: &str) {
    println!("\n{}", style(text).bold());
    println!("{}", "-".repeat(text.chars().count().max(20)));
}
