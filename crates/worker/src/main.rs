use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vnscan_core::domain::classification::Exchange;
use vnscan_core::ingest::provider::HttpJsonMarketData;
use vnscan_core::scan::orchestrator::{
    MarketScanner, ScanSummary, DEFAULT_FULL_SCAN_DELAY, DEFAULT_INCREMENTAL_DELAY,
    DEFAULT_INCREMENTAL_LIMIT,
};
use vnscan_core::scan::scheduler::{Scheduler, Trigger};
use vnscan_core::storage::classification_cache::{ClassificationStore, PgClassificationStore};

#[derive(Debug, Parser)]
#[command(name = "vnscan_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Unconditionally reclassify the symbol universe for the given exchanges.
    FullScan {
        #[arg(long, value_delimiter = ',', default_value = "HOSE,HNX")]
        exchanges: Vec<String>,

        /// Truncate the universe before iterating.
        #[arg(long)]
        limit: Option<usize>,

        /// Delay between symbols (upstream rate-limit protection).
        #[arg(long, default_value_t = 10)]
        delay_secs: u64,
    },
    /// Refresh only the oldest stale cache entries.
    Incremental {
        #[arg(long, default_value_t = 24)]
        max_age_hours: i64,

        #[arg(long, default_value_t = DEFAULT_INCREMENTAL_LIMIT)]
        limit: i64,

        #[arg(long, default_value_t = 8)]
        delay_secs: u64,
    },
    /// Classify one symbol and print the record as JSON.
    Classify {
        symbol: String,

        /// Refetch even if a fresh cached record exists.
        #[arg(long)]
        bypass_cache: bool,
    },
    /// Long-running mode: nightly full scan plus periodic incremental scans.
    Schedule {
        /// Wall-clock time (UTC, HH:MM) of the nightly full scan.
        #[arg(long, default_value = "02:00")]
        full_scan_at: String,

        #[arg(long, default_value_t = 4)]
        incremental_every_hours: i64,
    },
    /// Print cache statistics.
    CacheStats,
    /// Delete every cached classification.
    ClearCache {
        /// Required confirmation.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = vnscan_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    vnscan_core::storage::migrate(&pool).await?;

    let store = PgClassificationStore::new(pool.clone());

    match args.command {
        Command::FullScan {
            exchanges,
            limit,
            delay_secs,
        } => {
            let exchanges = parse_exchanges(&exchanges)?;
            let provider = HttpJsonMarketData::from_settings(&settings)?;
            let scanner = MarketScanner::new(provider, store);

            let summary = scanner
                .run_full_scan(&exchanges, limit, Duration::from_secs(delay_secs))
                .await?;
            persist_summary(&pool, &summary).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Incremental {
            max_age_hours,
            limit,
            delay_secs,
        } => {
            let provider = HttpJsonMarketData::from_settings(&settings)?;
            let scanner = MarketScanner::new(provider, store);

            let summary = scanner
                .run_incremental_scan(max_age_hours, limit, Duration::from_secs(delay_secs))
                .await?;
            persist_summary(&pool, &summary).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Classify {
            symbol,
            bypass_cache,
        } => {
            let provider = HttpJsonMarketData::from_settings(&settings)?;
            let scanner = MarketScanner::new(provider, store);

            match scanner.classify_one(&symbol, bypass_cache).await {
                Ok(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                Err(err) => {
                    sentry_anyhow::capture_anyhow(&err);
                    tracing::error!(%symbol, error = %err, "classification failed");
                    return Err(err);
                }
            }
        }
        Command::Schedule {
            full_scan_at,
            incremental_every_hours,
        } => {
            let (hour, minute) = parse_hh_mm(&full_scan_at)?;
            let provider = HttpJsonMarketData::from_settings(&settings)?;
            let scanner = Arc::new(MarketScanner::new(provider, store));

            let mut scheduler = Scheduler::new();

            {
                let scanner = scanner.clone();
                let pool = pool.clone();
                scheduler.add_job("full_scan", Trigger::DailyAt { hour, minute }, move || {
                    let scanner = scanner.clone();
                    let pool = pool.clone();
                    async move {
                        let summary = scanner
                            .run_full_scan(
                                &[Exchange::Hose, Exchange::Hnx],
                                Some(500),
                                DEFAULT_FULL_SCAN_DELAY,
                            )
                            .await?;
                        persist_summary(&pool, &summary).await
                    }
                });
            }

            {
                let scanner = scanner.clone();
                let pool = pool.clone();
                scheduler.add_job(
                    "incremental_scan",
                    Trigger::Every(chrono::Duration::hours(incremental_every_hours)),
                    move || {
                        let scanner = scanner.clone();
                        let pool = pool.clone();
                        async move {
                            let summary = scanner
                                .run_incremental_scan(
                                    24,
                                    DEFAULT_INCREMENTAL_LIMIT,
                                    DEFAULT_INCREMENTAL_DELAY,
                                )
                                .await?;
                            persist_summary(&pool, &summary).await
                        }
                    },
                );
            }

            tracing::info!(
                full_scan_at = %full_scan_at,
                incremental_every_hours,
                "scheduler starting"
            );
            tokio::select! {
                _ = scheduler.run() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received; stopping scheduler");
                }
            }
        }
        Command::CacheStats => {
            let stats = store.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::ClearCache { yes } => {
            anyhow::ensure!(yes, "clearing the cache requires --yes");
            let deleted = store.clear_all().await?;
            tracing::warn!(deleted, "classification cache cleared");
        }
    }

    Ok(())
}

async fn persist_summary(pool: &PgPool, summary: &ScanSummary) -> anyhow::Result<()> {
    let raw = serde_json::to_value(summary).ok();
    let run_id = vnscan_core::storage::scan_runs::record_scan_run(
        pool,
        &summary.mode,
        summary.started_at,
        summary.finished_at,
        summary.total as i32,
        summary.successful as i32,
        summary.failed as i32,
        raw,
    )
    .await?;
    tracing::info!(%run_id, mode = %summary.mode, "scan run recorded");
    Ok(())
}

fn parse_exchanges(raw: &[String]) -> anyhow::Result<Vec<Exchange>> {
    let mut out = Vec::with_capacity(raw.len());
    for s in raw {
        out.push(s.parse::<Exchange>()?);
    }
    anyhow::ensure!(!out.is_empty(), "at least one exchange is required");
    Ok(out)
}

fn parse_hh_mm(s: &str) -> anyhow::Result<(u32, u32)> {
    let (h, m) = s
        .split_once(':')
        .with_context(|| format!("expected HH:MM, got {s}"))?;
    let hour: u32 = h.parse().with_context(|| format!("bad hour in {s}"))?;
    let minute: u32 = m.parse().with_context(|| format!("bad minute in {s}"))?;
    anyhow::ensure!(hour < 24 && minute < 60, "time out of range: {s}");
    Ok((hour, minute))
}

fn init_sentry(settings: &vnscan_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_schedule_times() {
        assert_eq!(parse_hh_mm("02:00").unwrap(), (2, 0));
        assert_eq!(parse_hh_mm("23:59").unwrap(), (23, 59));
        assert!(parse_hh_mm("24:00").is_err());
        assert!(parse_hh_mm("0200").is_err());
    }

    #[test]
    fn parses_exchange_lists() {
        let parsed = parse_exchanges(&["HOSE".to_string(), "hnx".to_string()]).unwrap();
        assert_eq!(parsed, vec![Exchange::Hose, Exchange::Hnx]);
        assert!(parse_exchanges(&["NASDAQ".to_string()]).is_err());
    }
}
