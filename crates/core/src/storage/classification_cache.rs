use crate::domain::classification::{ClassificationRecord, Exchange, RatingBand};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;

pub const DEFAULT_MAX_AGE_HOURS: i64 = 24;

/// A record written at `scan_timestamp` is fresh iff strictly younger than
/// the cutoff; an age of exactly `max_age_hours` counts as stale.
pub fn freshness_cutoff(now: DateTime<Utc>, max_age_hours: i64) -> DateTime<Utc> {
    now - Duration::hours(max_age_hours)
}

pub fn is_fresh(scan_timestamp: DateTime<Utc>, now: DateTime<Utc>, max_age_hours: i64) -> bool {
    scan_timestamp > freshness_cutoff(now, max_age_hours)
}

pub fn age_hours(scan_timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - scan_timestamp).num_seconds() as f64 / 3600.0
}

#[derive(Debug, Clone, Serialize)]
pub struct OutdatedEntry {
    pub symbol: String,
    pub last_scan: DateTime<Utc>,
    pub age_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total: i64,
    pub fresh_count: i64,
    pub outdated_count: i64,
    pub last_scan_time: Option<DateTime<Utc>>,
    pub coverage_pct: f64,
}

#[derive(Debug, Clone)]
pub struct ListFilter {
    pub exchange: Option<Exchange>,
    pub max_age_hours: i64,
    pub min_rating: Option<RatingBand>,
    pub limit: Option<i64>,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            exchange: None,
            max_age_hours: DEFAULT_MAX_AGE_HOURS,
            min_rating: None,
            limit: None,
        }
    }
}

/// Narrow contract over the classification cache. One writer (the scan
/// worker) plus any number of readers; an upsert is atomic per symbol.
#[async_trait::async_trait]
pub trait ClassificationStore: Send + Sync {
    /// Replaces any existing record for `record.symbol`. Denormalized filter
    /// columns are written in the same statement as the JSON body, so a
    /// reader can never observe them out of sync.
    async fn upsert(&self, record: &ClassificationRecord) -> anyhow::Result<()>;

    /// A stale record behaves exactly like a missing one.
    async fn get(
        &self,
        symbol: &str,
        max_age_hours: i64,
    ) -> anyhow::Result<Option<ClassificationRecord>>;

    /// Fresh records only, ordered by overall score descending.
    async fn list(&self, filter: &ListFilter) -> anyhow::Result<Vec<ClassificationRecord>>;

    /// Refresh priority queue: stale records, oldest scan first.
    async fn list_outdated(
        &self,
        max_age_hours: i64,
        limit: Option<i64>,
    ) -> anyhow::Result<Vec<OutdatedEntry>>;

    async fn stats(&self) -> anyhow::Result<CacheStats>;

    /// Explicit bulk clear; the only way records are ever deleted.
    async fn clear_all(&self) -> anyhow::Result<u64>;
}

/// Denormalized filter columns stored alongside the JSON body. Always
/// derived from the record itself, so they cannot disagree with
/// `classification_json`.
#[derive(Debug, PartialEq)]
struct FilterColumns {
    exchange: &'static str,
    growth_category: &'static str,
    growth_score: f64,
    risk_category: &'static str,
    risk_score: f64,
    market_cap_category: &'static str,
    momentum_category: &'static str,
    overall_rating: &'static str,
    overall_score: f64,
}

fn filter_columns(record: &ClassificationRecord) -> FilterColumns {
    FilterColumns {
        exchange: record.exchange.as_str(),
        growth_category: record.growth.category.as_str(),
        growth_score: record.growth.score,
        risk_category: record.risk.category.as_str(),
        risk_score: record.risk.risk_score,
        market_cap_category: record.market_cap.category.as_str(),
        momentum_category: record.momentum.category.as_str(),
        overall_rating: record.overall_rating.rating.as_str(),
        overall_score: record.overall_rating.score,
    }
}

#[derive(Debug, Clone)]
pub struct PgClassificationStore {
    pool: PgPool,
}

impl PgClassificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ClassificationStore for PgClassificationStore {
    async fn upsert(&self, record: &ClassificationRecord) -> anyhow::Result<()> {
        let symbol = record.symbol.to_ascii_uppercase();
        let json = serde_json::to_value(record).context("serialize classification record")?;
        let cols = filter_columns(record);

        sqlx::query(
            "INSERT INTO classification_cache \
             (symbol, classification_json, scan_timestamp, exchange, \
              growth_category, growth_score, risk_category, risk_score, \
              market_cap_category, momentum_category, overall_rating, overall_score) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (symbol) DO UPDATE SET \
               classification_json = EXCLUDED.classification_json, \
               scan_timestamp = EXCLUDED.scan_timestamp, \
               exchange = EXCLUDED.exchange, \
               growth_category = EXCLUDED.growth_category, \
               growth_score = EXCLUDED.growth_score, \
               risk_category = EXCLUDED.risk_category, \
               risk_score = EXCLUDED.risk_score, \
               market_cap_category = EXCLUDED.market_cap_category, \
               momentum_category = EXCLUDED.momentum_category, \
               overall_rating = EXCLUDED.overall_rating, \
               overall_score = EXCLUDED.overall_score",
        )
        .persistent(false)
        .bind(&symbol)
        .bind(json)
        .bind(record.scan_timestamp)
        .bind(cols.exchange)
        .bind(cols.growth_category)
        .bind(cols.growth_score)
        .bind(cols.risk_category)
        .bind(cols.risk_score)
        .bind(cols.market_cap_category)
        .bind(cols.momentum_category)
        .bind(cols.overall_rating)
        .bind(cols.overall_score)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert classification_cache failed (symbol={symbol})"))?;

        Ok(())
    }

    async fn get(
        &self,
        symbol: &str,
        max_age_hours: i64,
    ) -> anyhow::Result<Option<ClassificationRecord>> {
        let cutoff = freshness_cutoff(Utc::now(), max_age_hours);

        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            "SELECT classification_json FROM classification_cache \
             WHERE symbol = $1 AND scan_timestamp > $2",
        )
        .persistent(false)
        .bind(symbol.to_ascii_uppercase())
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await
        .context("select classification_cache failed")?;

        row.map(|(json,)| {
            serde_json::from_value(json).context("deserialize classification record")
        })
        .transpose()
    }

    async fn list(&self, filter: &ListFilter) -> anyhow::Result<Vec<ClassificationRecord>> {
        let cutoff = freshness_cutoff(Utc::now(), filter.max_age_hours);

        let mut qb = sqlx::QueryBuilder::new(
            "SELECT classification_json FROM classification_cache WHERE scan_timestamp > ",
        );
        qb.push_bind(cutoff);
        if let Some(exchange) = filter.exchange {
            qb.push(" AND exchange = ").push_bind(exchange.as_str());
        }
        if let Some(min_rating) = filter.min_rating {
            qb.push(" AND overall_score >= ").push_bind(min_rating.min_score());
        }
        qb.push(" ORDER BY overall_score DESC, symbol ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows: Vec<(serde_json::Value,)> = qb
            .build_query_as()
            .persistent(false)
            .fetch_all(&self.pool)
            .await
            .context("list classification_cache failed")?;

        let mut out = Vec::with_capacity(rows.len());
        for (json,) in rows {
            out.push(serde_json::from_value(json).context("deserialize classification record")?);
        }
        Ok(out)
    }

    async fn list_outdated(
        &self,
        max_age_hours: i64,
        limit: Option<i64>,
    ) -> anyhow::Result<Vec<OutdatedEntry>> {
        let now = Utc::now();
        let cutoff = freshness_cutoff(now, max_age_hours);

        let mut qb = sqlx::QueryBuilder::new(
            "SELECT symbol, scan_timestamp FROM classification_cache WHERE scan_timestamp <= ",
        );
        qb.push_bind(cutoff);
        qb.push(" ORDER BY scan_timestamp ASC");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows: Vec<(String, DateTime<Utc>)> = qb
            .build_query_as()
            .persistent(false)
            .fetch_all(&self.pool)
            .await
            .context("list outdated classifications failed")?;

        Ok(rows
            .into_iter()
            .map(|(symbol, last_scan)| OutdatedEntry {
                symbol,
                last_scan,
                age_hours: age_hours(last_scan, now),
            })
            .collect())
    }

    async fn stats(&self) -> anyhow::Result<CacheStats> {
        let cutoff = freshness_cutoff(Utc::now(), DEFAULT_MAX_AGE_HOURS);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM classification_cache")
            .persistent(false)
            .fetch_one(&self.pool)
            .await
            .context("count classification_cache failed")?;

        let fresh_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM classification_cache WHERE scan_timestamp > $1",
        )
        .persistent(false)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await
        .context("count fresh classifications failed")?;

        let last_scan_time: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(scan_timestamp) FROM classification_cache")
                .persistent(false)
                .fetch_one(&self.pool)
                .await
                .context("select last scan time failed")?;

        let coverage_pct = if total > 0 {
            (fresh_count as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        Ok(CacheStats {
            total,
            fresh_count,
            outdated_count: total - fresh_count,
            last_scan_time,
            coverage_pct,
        })
    }

    async fn clear_all(&self) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM classification_cache")
            .persistent(false)
            .execute(&self.pool)
            .await
            .context("clear classification_cache failed")?;
        Ok(res.rows_affected())
    }
}
