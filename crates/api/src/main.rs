use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vnscan_core::domain::classification::{ClassificationRecord, Exchange, RatingBand};
use vnscan_core::storage::classification_cache::{
    CacheStats, ClassificationStore, ListFilter, PgClassificationStore, DEFAULT_MAX_AGE_HOURS,
};

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

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match vnscan_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let state = AppState {
        store: pool.map(PgClassificationStore::new),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/classifications", get(list_classifications))
        .route("/classifications/:symbol", get(get_classification))
        .route("/cache/stats", get(cache_stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    store: Option<PgClassificationStore>,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    exchange: Option<String>,
    max_age_hours: Option<i64>,
    min_rating: Option<String>,
    limit: Option<i64>,
}

impl ListParams {
    fn into_filter(self) -> Result<ListFilter, StatusCode> {
        let exchange = self
            .exchange
            .map(|s| s.parse::<Exchange>())
            .transpose()
            .map_err(|_| StatusCode::BAD_REQUEST)?;
        let min_rating = self
            .min_rating
            .map(|s| s.parse::<RatingBand>())
            .transpose()
            .map_err(|_| StatusCode::BAD_REQUEST)?;

        let max_age_hours = self.max_age_hours.unwrap_or(DEFAULT_MAX_AGE_HOURS);
        if max_age_hours <= 0 {
            return Err(StatusCode::BAD_REQUEST);
        }
        if self.limit.is_some_and(|l| l <= 0) {
            return Err(StatusCode::BAD_REQUEST);
        }

        Ok(ListFilter {
            exchange,
            max_age_hours,
            min_rating,
            limit: self.limit,
        })
    }
}

async fn list_classifications(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ClassificationRecord>>, StatusCode> {
    let Some(store) = &state.store else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let filter = params.into_filter()?;
    let records = store.list(&filter).await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(records))
}

#[derive(Debug, Deserialize)]
struct GetParams {
    max_age_hours: Option<i64>,
}

async fn get_classification(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<GetParams>,
) -> Result<Json<ClassificationRecord>, StatusCode> {
    let Some(store) = &state.store else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let max_age_hours = params.max_age_hours.unwrap_or(DEFAULT_MAX_AGE_HOURS);
    if max_age_hours <= 0 {
        return Err(StatusCode::BAD_REQUEST);
    }

    // A stale record reads the same as a missing one.
    let record = store
        .get(&symbol, max_age_hours)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(record))
}

async fn cache_stats(State(state): State<AppState>) -> Result<Json<CacheStats>, StatusCode> {
    let Some(store) = &state.store else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let stats = store.stats().await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(stats))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
