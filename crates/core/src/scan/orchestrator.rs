use crate::classify::{classify, metrics, ClassifierInput};
use crate::domain::classification::{ClassificationRecord, Exchange};
use crate::ingest::provider::{validate_symbol, MarketDataProvider};
use crate::scan::universe;
use crate::storage::classification_cache::{ClassificationStore, DEFAULT_MAX_AGE_HOURS};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Delay between symbols for the nightly full sweep. Conservative, the
/// upstream source rate-limits aggressively.
pub const DEFAULT_FULL_SCAN_DELAY: Duration = Duration::from_secs(10);

/// Delay between symbols for incremental refreshes.
pub const DEFAULT_INCREMENTAL_DELAY: Duration = Duration::from_secs(8);

pub const DEFAULT_INCREMENTAL_LIMIT: i64 = 50;

const TECHNICAL_PERIOD_DAYS: u32 = 365;
const HISTORY_DAYS: i64 = 365;

#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub mode: String,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub failed_symbols: Vec<String>,
    pub rating_distribution: BTreeMap<String, usize>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Drives full and incremental sweeps over the symbol universe. Sequential
/// per symbol; the only intra-batch pacing is the caller-supplied delay
/// inserted between symbols.
pub struct MarketScanner<P, S> {
    provider: P,
    store: S,
    progress_every: usize,
}

impl<P: MarketDataProvider, S: ClassificationStore> MarketScanner<P, S> {
    pub fn new(provider: P, store: S) -> Self {
        let progress_every = std::env::var("SCAN_PROGRESS_EVERY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(20);

        Self {
            provider,
            store,
            progress_every,
        }
    }

    /// Unconditionally reclassifies the configured universe for the
    /// requested exchanges. `limit` truncates the universe before iterating.
    pub async fn run_full_scan(
        &self,
        exchanges: &[Exchange],
        limit: Option<usize>,
        delay: Duration,
    ) -> anyhow::Result<ScanSummary> {
        let mut symbols: Vec<(String, Exchange)> = universe::universe(exchanges)
            .into_iter()
            .map(|(s, e)| (s.to_string(), e))
            .collect();
        if let Some(limit) = limit {
            symbols.truncate(limit);
        }

        tracing::info!(
            total = symbols.len(),
            exchanges = ?exchanges,
            delay_secs = delay.as_secs_f64(),
            "starting full market scan"
        );
        self.scan_batch("full", symbols, delay).await
    }

    /// Reclassifies only the N oldest stale cache entries; everything else
    /// is left untouched.
    pub async fn run_incremental_scan(
        &self,
        max_age_hours: i64,
        limit: i64,
        delay: Duration,
    ) -> anyhow::Result<ScanSummary> {
        let outdated = self.store.list_outdated(max_age_hours, Some(limit)).await?;
        if outdated.is_empty() {
            tracing::info!(max_age_hours, "no outdated entries; cache is fresh");
        } else {
            tracing::info!(
                outdated = outdated.len(),
                max_age_hours,
                "starting incremental refresh"
            );
        }

        let symbols: Vec<(String, Exchange)> = outdated
            .into_iter()
            .map(|entry| {
                let exchange = universe::exchange_for_symbol(&entry.symbol);
                tracing::debug!(
                    symbol = %entry.symbol,
                    age_hours = format!("{:.1}", entry.age_hours),
                    "refreshing stale entry"
                );
                (entry.symbol, exchange)
            })
            .collect();

        self.scan_batch("incremental", symbols, delay).await
    }

    /// Single-symbol path used by on-demand callers. A fresh cached record
    /// short-circuits unless `bypass_cache` is set.
    pub async fn classify_one(
        &self,
        symbol: &str,
        bypass_cache: bool,
    ) -> anyhow::Result<ClassificationRecord> {
        let symbol = validate_symbol(symbol)?;

        if !bypass_cache {
            if let Some(cached) = self.store.get(&symbol, DEFAULT_MAX_AGE_HOURS).await? {
                tracing::debug!(symbol = %symbol, "serving classification from cache");
                return Ok(cached);
            }
        }

        let exchange = universe::exchange_for_symbol(&symbol);
        self.classify_and_store(&symbol, exchange).await
    }

    async fn scan_batch(
        &self,
        mode: &str,
        symbols: Vec<(String, Exchange)>,
        delay: Duration,
    ) -> anyhow::Result<ScanSummary> {
        let started_at = Utc::now();
        let total = symbols.len();
        let mut successful: usize = 0;
        let mut failed_symbols: Vec<String> = Vec::new();
        let mut rating_distribution: BTreeMap<String, usize> = BTreeMap::new();

        for (idx, (symbol, exchange)) in symbols.iter().enumerate() {
            if idx != 0 {
                tokio::time::sleep(delay).await;
            }

            match self.classify_and_store(symbol, *exchange).await {
                Ok(record) => {
                    successful += 1;
                    *rating_distribution
                        .entry(record.overall_rating.rating.as_str().to_string())
                        .or_insert(0) += 1;
                }
                Err(err) => {
                    // One symbol failing never aborts the batch; the old
                    // cache row (if any) stays as-is.
                    failed_symbols.push(symbol.clone());
                    tracing::warn!(
                        idx,
                        symbol = %symbol,
                        error = %err,
                        "classification failed; skipping symbol"
                    );
                }
            }

            if self.progress_every != 0 {
                let n = idx + 1;
                if n == 1 || n == total || n % self.progress_every == 0 {
                    tracing::info!(
                        mode,
                        processed = n,
                        total,
                        successful,
                        failed = failed_symbols.len(),
                        "scan progress"
                    );
                }
            }
        }

        let summary = ScanSummary {
            mode: mode.to_string(),
            total,
            successful,
            failed: failed_symbols.len(),
            failed_symbols,
            rating_distribution,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            mode = %summary.mode,
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            rating_distribution = ?summary.rating_distribution,
            "scan complete"
        );

        Ok(summary)
    }

    async fn classify_and_store(
        &self,
        symbol: &str,
        exchange: Exchange,
    ) -> anyhow::Result<ClassificationRecord> {
        // Fundamental ratios are required; a failure here fails the symbol.
        let ratios = self.provider.get_ratios(symbol).await?;

        // Technical data is optional; momentum degrades to unknown.
        let technical = match self.provider.get_technical(symbol, TECHNICAL_PERIOD_DAYS).await {
            Ok(t) => Some(t),
            Err(err) => {
                tracing::warn!(
                    symbol = %symbol,
                    error = %err,
                    "technical fetch failed; momentum degrades to unknown"
                );
                None
            }
        };

        let end = Utc::now().date_naive();
        let start = end - chrono::Duration::days(HISTORY_DAYS);
        let volatility_pct = match self.provider.get_price_history(symbol, start, end).await {
            Ok(bars) => {
                let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
                metrics::annualized_volatility_pct(&closes)
            }
            Err(err) => {
                tracing::debug!(
                    symbol = %symbol,
                    error = %err,
                    "price history fetch failed; using fallback volatility"
                );
                metrics::VOLATILITY_FETCH_FAILED_PCT
            }
        };

        let market_cap_vnd = ratios.market_cap_vnd.unwrap_or(0.0);
        let record = classify(
            symbol,
            exchange,
            ClassifierInput {
                ratios: &ratios,
                technical: technical.as_ref(),
                volatility_pct,
                market_cap_vnd,
            },
            Utc::now(),
        );

        self.store.upsert(&record).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::classification::{MomentumCategory, RatingBand};
    use crate::ingest::provider::{ProviderError, ProviderErrorKind};
    use crate::ingest::types::{OhlcvBar, RatioSnapshot, TechnicalSnapshot};
    use crate::storage::classification_cache::{
        age_hours, is_fresh, CacheStats, ListFilter, OutdatedEntry,
    };
    use chrono::{Duration as ChronoDuration, NaiveDate};
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    struct FakeProvider {
        fail_ratios: HashSet<String>,
        fail_technical: bool,
        ratio_calls: Arc<AtomicUsize>,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                fail_ratios: HashSet::new(),
                fail_technical: false,
                ratio_calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(symbols: &[&str]) -> Self {
            let mut p = Self::new();
            p.fail_ratios = symbols.iter().map(|s| s.to_string()).collect();
            p
        }
    }

    #[async_trait::async_trait]
    impl MarketDataProvider for FakeProvider {
        fn provider_name(&self) -> &'static str {
            "fake"
        }

        async fn get_ratios(&self, symbol: &str) -> Result<RatioSnapshot, ProviderError> {
            self.ratio_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_ratios.contains(symbol) {
                return Err(ProviderError::unavailable(symbol, "upstream down"));
            }
            Ok(RatioSnapshot {
                pe: Some(18.0),
                roe: Some(22.0),
                npm: Some(17.0),
                debt_equity: Some(0.6),
                market_cap_vnd: Some(450_000_000_000_000.0),
                ..RatioSnapshot::empty(symbol)
            })
        }

        async fn get_technical(
            &self,
            symbol: &str,
            _period_days: u32,
        ) -> Result<TechnicalSnapshot, ProviderError> {
            if self.fail_technical {
                return Err(ProviderError::insufficient_data(symbol, "no indicator data"));
            }
            Ok(TechnicalSnapshot {
                symbol: symbol.to_string(),
                ma50: Some(1.0),
                ma200: Some(1.0),
                rsi14: Some(55.0),
                macd_line: None,
                macd_signal: None,
                macd_histogram: None,
                signals: vec![
                    "BULLISH: Golden Cross detected".to_string(),
                    "BULLISH: RSI Oversold".to_string(),
                    "BULLISH: MACD above Signal".to_string(),
                ],
            })
        }

        async fn get_price_history(
            &self,
            _symbol: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<OhlcvBar>, ProviderError> {
            let date = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
            Ok((0..30)
                .map(|i| OhlcvBar {
                    date: date + ChronoDuration::days(i),
                    open: 100.0,
                    high: 101.0,
                    low: 99.0,
                    close: 100.0,
                    volume: 1_000_000.0,
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<BTreeMap<String, ClassificationRecord>>,
    }

    #[async_trait::async_trait]
    impl ClassificationStore for MemoryStore {
        async fn upsert(&self, record: &ClassificationRecord) -> anyhow::Result<()> {
            self.rows
                .lock()
                .await
                .insert(record.symbol.clone(), record.clone());
            Ok(())
        }

        async fn get(
            &self,
            symbol: &str,
            max_age_hours: i64,
        ) -> anyhow::Result<Option<ClassificationRecord>> {
            let now = Utc::now();
            Ok(self
                .rows
                .lock()
                .await
                .get(&symbol.to_ascii_uppercase())
                .filter(|r| is_fresh(r.scan_timestamp, now, max_age_hours))
                .cloned())
        }

        async fn list(&self, filter: &ListFilter) -> anyhow::Result<Vec<ClassificationRecord>> {
            let now = Utc::now();
            let mut out: Vec<ClassificationRecord> = self
                .rows
                .lock()
                .await
                .values()
                .filter(|r| is_fresh(r.scan_timestamp, now, filter.max_age_hours))
                .cloned()
                .collect();
            out.sort_by(|a, b| {
                b.overall_rating
                    .score
                    .partial_cmp(&a.overall_rating.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Ok(out)
        }

        async fn list_outdated(
            &self,
            max_age_hours: i64,
            limit: Option<i64>,
        ) -> anyhow::Result<Vec<OutdatedEntry>> {
            let now = Utc::now();
            let mut out: Vec<OutdatedEntry> = self
                .rows
                .lock()
                .await
                .values()
                .filter(|r| !is_fresh(r.scan_timestamp, now, max_age_hours))
                .map(|r| OutdatedEntry {
                    symbol: r.symbol.clone(),
                    last_scan: r.scan_timestamp,
                    age_hours: age_hours(r.scan_timestamp, now),
                })
                .collect();
            out.sort_by_key(|e| e.last_scan);
            if let Some(limit) = limit {
                out.truncate(limit as usize);
            }
            Ok(out)
        }

        async fn stats(&self) -> anyhow::Result<CacheStats> {
            let rows = self.rows.lock().await;
            let total = rows.len() as i64;
            Ok(CacheStats {
                total,
                fresh_count: total,
                outdated_count: 0,
                last_scan_time: rows.values().map(|r| r.scan_timestamp).max(),
                coverage_pct: if total > 0 { 100.0 } else { 0.0 },
            })
        }

        async fn clear_all(&self) -> anyhow::Result<u64> {
            let mut rows = self.rows.lock().await;
            let n = rows.len() as u64;
            rows.clear();
            Ok(n)
        }
    }

    fn record_for(symbol: &str, scan_timestamp: DateTime<Utc>) -> ClassificationRecord {
        let ratios = RatioSnapshot {
            pe: Some(18.0),
            roe: Some(22.0),
            npm: Some(17.0),
            debt_equity: Some(0.6),
            ..RatioSnapshot::empty(symbol)
        };
        classify(
            symbol,
            Exchange::Hose,
            ClassifierInput {
                ratios: &ratios,
                technical: None,
                volatility_pct: 15.0,
                market_cap_vnd: 0.0,
            },
            scan_timestamp,
        )
    }

    #[tokio::test]
    async fn one_failing_symbol_does_not_abort_the_batch() {
        let scanner = MarketScanner::new(FakeProvider::failing(&["VHM"]), MemoryStore::default());

        let summary = scanner
            .run_full_scan(&[Exchange::Hose], Some(3), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed_symbols, vec!["VHM".to_string()]);

        assert!(scanner.store.get("VCB", 24).await.unwrap().is_some());
        assert!(scanner.store.get("VIC", 24).await.unwrap().is_some());
        assert!(scanner.store.get("VHM", 24).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn technical_failure_degrades_momentum_instead_of_failing() {
        let mut provider = FakeProvider::new();
        provider.fail_technical = true;
        let scanner = MarketScanner::new(provider, MemoryStore::default());

        let record = scanner.classify_one("FPT", true).await.unwrap();
        assert_eq!(record.momentum.category, MomentumCategory::Unknown);
        assert_eq!(record.momentum.momentum_score, 5.0);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_existing_record() {
        let store = MemoryStore::default();
        let stale_ts = Utc::now() - ChronoDuration::hours(48);
        let old = record_for("VCB", stale_ts);
        store.upsert(&old).await.unwrap();

        let scanner = MarketScanner::new(FakeProvider::failing(&["VCB"]), store);
        let summary = scanner
            .run_incremental_scan(24, 10, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        // Still present, still carrying the old timestamp.
        let kept = scanner.store.get("VCB", 24 * 7).await.unwrap().unwrap();
        assert_eq!(kept.scan_timestamp, stale_ts);
    }

    #[tokio::test]
    async fn incremental_scan_touches_only_outdated_entries() {
        let store = MemoryStore::default();
        let fresh_ts = Utc::now() - ChronoDuration::hours(1);
        let stale_ts = Utc::now() - ChronoDuration::hours(30);
        store.upsert(&record_for("VNM", fresh_ts)).await.unwrap();
        store.upsert(&record_for("PVS", stale_ts)).await.unwrap();

        let scanner = MarketScanner::new(FakeProvider::new(), store);
        let summary = scanner
            .run_incremental_scan(24, 10, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.successful, 1);

        let rows = scanner.store.rows.lock().await;
        assert_eq!(rows["VNM"].scan_timestamp, fresh_ts);
        assert!(rows["PVS"].scan_timestamp > stale_ts);
        // Refresh re-derives the exchange tag from the universe.
        assert_eq!(rows["PVS"].exchange, Exchange::Hnx);
    }

    #[tokio::test]
    async fn classify_one_serves_fresh_cache_without_fetching() {
        let store = MemoryStore::default();
        store
            .upsert(&record_for("VCB", Utc::now() - ChronoDuration::hours(1)))
            .await
            .unwrap();

        let provider = FakeProvider::new();
        let calls = provider.ratio_calls.clone();
        let scanner = MarketScanner::new(provider, store);

        let record = scanner.classify_one("vcb", false).await.unwrap();
        assert_eq!(record.symbol, "VCB");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // bypass_cache forces a refetch.
        scanner.classify_one("vcb", true).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn classify_one_rejects_invalid_symbols_fast() {
        let scanner = MarketScanner::new(FakeProvider::new(), MemoryStore::default());

        let err = scanner.classify_one("VN-INDEX", false).await.unwrap_err();
        let provider_err = err.downcast_ref::<ProviderError>().unwrap();
        assert_eq!(provider_err.kind, ProviderErrorKind::InvalidSymbol);
    }

    #[tokio::test]
    async fn full_scan_reports_rating_distribution() {
        let scanner = MarketScanner::new(FakeProvider::new(), MemoryStore::default());
        let summary = scanner
            .run_full_scan(&[Exchange::Hose], Some(2), Duration::ZERO)
            .await
            .unwrap();

        // growth 9, low risk (vol 0 from flat history) -> 8 adjusted,
        // momentum 9: overall 8.7 across the board.
        assert_eq!(summary.rating_distribution.get("A+"), Some(&2));
        assert_eq!(
            RatingBand::from_score(8.7),
            RatingBand::APlus
        );
    }
}
