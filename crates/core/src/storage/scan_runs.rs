use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Audit row for one scan batch; the cache mutations themselves live in
/// `classification_cache`.
#[allow(clippy::too_many_arguments)]
pub async fn record_scan_run(
    pool: &sqlx::PgPool,
    mode: &str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    total: i32,
    successful: i32,
    failed: i32,
    summary: Option<Value>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO scan_runs (id, mode, started_at, finished_at, total, successful, failed, summary) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .persistent(false)
    .bind(id)
    .bind(mode)
    .bind(started_at)
    .bind(finished_at)
    .bind(total)
    .bind(successful)
    .bind(failed)
    .bind(summary)
    .execute(pool)
    .await
    .context("insert scan_runs failed")?;

    Ok(id)
}
