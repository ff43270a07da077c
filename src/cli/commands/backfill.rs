//! `folio backfill ...`.

use std::time::Duration;

use anyhow::Context;
use console::style;
use serde_json::json;
use tracing::error;

use crate::app::AppServices;
use crate::cli::helpers::{field, heading, print_json};
use crate::models::{SeedRange, UnitKey, UnitStatus};
use crate::scheduler::{BackfillScheduler, BatchReport, UnitOutcome};

fn parse_month(raw: &str) -> anyhow::Result<UnitKey> {
    UnitKey::parse(raw).with_context(|| format!("expected YYYY-MM, got '{raw}'"))
}

pub async fn cmd_seed(
    services: &AppServices,
    from: Option<String>,
    to: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let scheduler = services.scheduler();
    let configured = scheduler.config().seed_range()?;
    let range = SeedRange {
        start: from.as_deref().map(parse_month).transpose()?.unwrap_or(configured.start),
        end: to.as_deref().map(parse_month).transpose()?.unwrap_or(configured.end),
    };
    anyhow::ensure!(
        range.start <= range.end,
        "start {} is after end {}",
        range.start,
        range.end
    );

    let inserted = scheduler.seed(range).await?;
    if json {
        return print_json(&json!({
            "start": range.start.to_string(),
            "end": range.end.to_string(),
            "inserted": inserted,
        }));
    }
    println!(
        "{} Seeded {} new unit(s) from {} to {}",
        style("✓").green(),
        inserted,
        range.start,
        range.end
    );
    Ok(())
}

pub async fn cmd_candidates(services: &AppServices, limit: usize, json: bool) -> anyhow::Result<()> {
    let units = services.scheduler().list_candidates(limit).await?;
    if json {
        return print_json(&units);
    }
    if units.is_empty() {
        println!("{} No claimable units", style("!").yellow());
        return Ok(());
    }
    heading("Claimable units");
    for unit in units {
        let retries = if unit.retry_count > 0 {
            format!("retry {}", unit.retry_count)
        } else {
            String::new()
        };
        println!("  {}  {:<8} {}", unit.key, unit.status.as_str(), retries);
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    let claim = &report.claim;
    let mode = if claim.dry_run { " (dry run)" } else { "" };
    println!(
        "Batch {}{}: requested {}, claimed {}, skipped {} locked / {} taken",
        &report.run_id[..8.min(report.run_id.len())],
        mode,
        report.requested,
        claim.claimed.len(),
        claim.skipped_locked.len(),
        claim.skipped_taken.len()
    );
    if claim.dry_run {
        for key in &claim.claimed {
            println!("  would claim {}", key);
        }
        return;
    }
    for unit in &report.units {
        match &unit.outcome {
            UnitOutcome::Completed { stats } => println!(
                "  {} {} {} generated, {} resolved",
                style("✓").green(),
                unit.key,
                stats.books_generated,
                stats.isbns_resolved
            ),
            UnitOutcome::Retry { error, transient } => println!(
                "  {} {} retry{}: {}",
                style("↻").yellow(),
                unit.key,
                if *transient { " (transient)" } else { "" },
                error
            ),
            UnitOutcome::Failed { error } => {
                println!("  {} {} failed: {}", style("✗").red(), unit.key, error)
            }
            UnitOutcome::Duplicate { status } => println!(
                "  {} {} already {}",
                style("-").dim(),
                unit.key,
                status.as_str()
            ),
        }
    }
}

/// One scheduler pass. A daemon logs store failures and carries on so the
/// next tick can retry; a one-shot run surfaces them.
async fn run_tick(
    scheduler: &BackfillScheduler,
    limit: Option<u64>,
    dry_run: bool,
    daemon: bool,
) -> anyhow::Result<Option<BatchReport>> {
    if daemon {
        if let Err(e) = scheduler.reclaim_stale().await {
            error!("Stale claim recovery failed: {}", e);
        }
    }
    match scheduler.run_batch(limit, dry_run).await {
        Ok(report) => Ok(Some(report)),
        Err(e) if daemon => {
            error!("Batch failed: {}", e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn cmd_run(
    services: &AppServices,
    limit: Option<u64>,
    dry_run: bool,
    daemon: bool,
    interval: u64,
    json: bool,
) -> anyhow::Result<()> {
    let scheduler = services.scheduler();

    loop {
        if let Some(report) = run_tick(&scheduler, limit, dry_run, daemon).await? {
            if json {
                print_json(&report)?;
            } else {
                print_report(&report);
            }
        }

        if !daemon {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(interval)).await;
    }
}

pub async fn cmd_status(services: &AppServices, json: bool) -> anyhow::Result<()> {
    let summary = services.scheduler().status().await?;
    if json {
        return print_json(&json!({
            "summary": summary,
            "percent_complete": summary.percent_complete(),
        }));
    }

    heading("Backfill");
    field("total", Some(&summary.total.to_string()));
    for status in [
        UnitStatus::Pending,
        UnitStatus::Processing,
        UnitStatus::Completed,
        UnitStatus::Retry,
        UnitStatus::Failed,
    ] {
        field(status.as_str(), Some(&summary.count(status).to_string()));
    }
    field("complete", Some(&format!("{:.1}%", summary.percent_complete())));
    field("generated", Some(&summary.books_generated.to_string()));
    field("resolved", Some(&summary.isbns_resolved.to_string()));

    if !summary.recent_failures.is_empty() {
        heading("Recent failures");
        for note in &summary.recent_failures {
            println!(
                "  {} {:<6} retries {}  {}",
                note.key,
                note.status.as_str(),
                note.retry_count,
                note.error_message.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}

pub async fn cmd_reclaim(services: &AppServices, json: bool) -> anyhow::Result<()> {
    let reclaimed = services.scheduler().reclaim_stale().await?;
    if json {
        return print_json(&reclaimed);
    }
    println!("Reclaimed {} stale unit(s)", reclaimed.len());
    for key in reclaimed {
        println!("  {}", key);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::models::{BackfillUnit, FailureKind, StatusSummary, UnitStats};
    use crate::repository::{
        BackfillStore, ClaimOutcome, InMemoryBackfillStore, StoreError, StoreResult,
    };
    use crate::scheduler::{ProcessError, SchedulerConfig, UnitProcessor};

    /// Serves claims normally but cannot recover stale claims.
    struct NoReclaim(InMemoryBackfillStore);

    #[async_trait]
    impl BackfillStore for NoReclaim {
        async fn seed_units(&self, keys: &[UnitKey]) -> StoreResult<u64> {
            self.0.seed_units(keys).await
        }
        async fn list_candidates(&self, limit: usize) -> StoreResult<Vec<BackfillUnit>> {
            self.0.list_candidates(limit).await
        }
        async fn claim_batch(&self, limit: usize, dry_run: bool) -> StoreResult<ClaimOutcome> {
            self.0.claim_batch(limit, dry_run).await
        }
        async fn get_unit(&self, key: UnitKey) -> StoreResult<Option<BackfillUnit>> {
            self.0.get_unit(key).await
        }
        async fn mark_completed(&self, key: UnitKey, stats: &UnitStats) -> StoreResult<()> {
            self.0.mark_completed(key, stats).await
        }
        async fn mark_failed(
            &self,
            key: UnitKey,
            error: &str,
            kind: FailureKind,
            max_retries: u32,
        ) -> StoreResult<UnitStatus> {
            self.0.mark_failed(key, error, kind, max_retries).await
        }
        async fn reclaim_stale(&self, _older_than: Duration) -> StoreResult<Vec<UnitKey>> {
            Err(StoreError::Pool("connection refused".to_string()))
        }
        async fn status_summary(&self, recent_failures: usize) -> StoreResult<StatusSummary> {
            self.0.status_summary(recent_failures).await
        }
    }

    struct Done;

    #[async_trait]
    impl UnitProcessor for Done {
        async fn process(&self, _key: UnitKey) -> Result<UnitStats, ProcessError> {
            Ok(UnitStats::default())
        }
    }

    #[tokio::test]
    async fn test_daemon_tick_survives_reclaim_failure() {
        let store = Arc::new(NoReclaim(InMemoryBackfillStore::new()));
        let unit = UnitKey::new(1988, 3).unwrap();
        store.seed_units(&[unit]).await.unwrap();
        let scheduler = BackfillScheduler::new(
            Arc::clone(&store) as Arc<dyn BackfillStore>,
            Arc::new(Done),
            SchedulerConfig::default(),
        );

        let report = run_tick(&scheduler, Some(1), false, true)
            .await
            .unwrap()
            .expect("batch should still run");
        assert_eq!(report.completed(), 1);
        assert_eq!(
            store.get_unit(unit).await.unwrap().unwrap().status,
            UnitStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_one_shot_tick_skips_reclaim() {
        let store = Arc::new(NoReclaim(InMemoryBackfillStore::new()));
        let scheduler = BackfillScheduler::new(
            store as Arc<dyn BackfillStore>,
            Arc::new(Done),
            SchedulerConfig::default(),
        );
        let report = run_tick(&scheduler, Some(1), false, false).await.unwrap();
        assert!(report.is_some_and(|r| r.claim.claimed.is_empty()));
    }
}
