//! Idempotent schema setup for the Postgres backend.

use diesel_async::SimpleAsyncConnection;
use tracing::info;

use super::pool::PgPool;
use super::StoreResult;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS backfill_log (
    year INTEGER NOT NULL,
    month INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
    status TEXT NOT NULL DEFAULT 'pending',
    retry_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ,
    last_retry_at TIMESTAMPTZ,
    books_generated INTEGER,
    isbns_resolved INTEGER,
    provider_calls TEXT,
    resolution_rate DOUBLE PRECISION,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (year, month)
);

CREATE INDEX IF NOT EXISTS idx_backfill_log_claimable
    ON backfill_log (year DESC, month DESC)
    WHERE status IN ('pending', 'retry');

CREATE INDEX IF NOT EXISTS idx_backfill_log_status ON backfill_log (status);

CREATE TABLE IF NOT EXISTS books (
    isbn TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    authors TEXT NOT NULL DEFAULT '[]',
    publisher TEXT,
    published_date TEXT,
    description TEXT,
    cover_url TEXT,
    external_ids TEXT NOT NULL DEFAULT '{}',
    resolved_by TEXT NOT NULL DEFAULT '',
    discovered_year INTEGER,
    discovered_month INTEGER,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_books_discovered ON books (discovered_year, discovered_month);
"#;

/// Create tables and indexes that do not exist yet.
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    let mut conn = pool.get().await?;
    conn.batch_execute(SCHEMA).await?;
    info!("Database schema is up to date");
    Ok(())
}
