//! `folio quota ...`.

use console::style;
use serde_json::json;

use crate::app::AppServices;
use crate::cli::helpers::{field, heading, print_json};
use crate::quota::OperationKind;

pub async fn cmd_status(services: &AppServices, json: bool) -> anyhow::Result<()> {
    let status = services.quota.get_quota_status().await;
    if json {
        return print_json(&status);
    }

    heading("Quota");
    field("used today", Some(&status.used_today.to_string()));
    field("remaining", Some(&status.remaining.to_string()));
    field("daily limit", Some(&status.daily_limit.to_string()));
    field("last reset", Some(&status.last_reset.to_string()));
    if status.degraded {
        println!(
            "  {} quota store unreachable; figures are a fallback",
            style("!").yellow()
        );
    }
    Ok(())
}

pub async fn cmd_batch_size(services: &AppServices, max: u64, json: bool) -> anyhow::Result<()> {
    let size = services.quota.get_safe_batch_size(max).await;
    if json {
        return print_json(&json!({ "requested": max, "safe_batch_size": size }));
    }
    println!("Safe batch size: {} (of {} requested)", size, max);
    Ok(())
}

pub async fn cmd_check(
    services: &AppServices,
    kind: OperationKind,
    amount: u64,
    json: bool,
) -> anyhow::Result<()> {
    let decision = services.quota.should_allow_operation(kind, amount).await;
    if json {
        return print_json(&decision);
    }
    if decision.allowed {
        println!(
            "{} {} operation of {} allowed",
            style("✓").green(),
            kind.as_str(),
            amount
        );
    } else {
        println!(
            "{} {} operation of {} refused: {}",
            style("✗").red(),
            kind.as_str(),
            amount,
            decision.reason.unwrap_or_default()
        );
    }
    Ok(())
}
