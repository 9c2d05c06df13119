use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use radar_core::dedup::DedupRecord;
use radar_core::domain::WatchEntry;
use radar_core::options::RadarOptions;
use radar_core::pick::Band;
use radar_core::quotes::yahoo::YahooChartClient;
use radar_core::quotes::QuoteSource;
use radar_core::storage::{Snapshot, SnapshotStore};
use radar_core::tracker::{track, TrackRow};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = radar_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let options = RadarOptions::from_env()?;
    let quotes = YahooChartClient::from_env()?;

    let state = AppState {
        store: SnapshotStore::new(settings.state_file.clone()),
        options: Arc::new(options),
        quotes: Arc::new(quotes),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ledger", get(get_ledger))
        .route("/dedup", get(get_dedup))
        .route("/summary", get(get_summary))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, state_file = %settings.state_file.display(), "api listening");

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
    store: SnapshotStore,
    options: Arc<RadarOptions>,
    quotes: Arc<YahooChartClient>,
}

impl AppState {
    /// 404 before the worker's first save, 500 when the file is unreadable.
    fn snapshot(&self) -> Result<Snapshot, StatusCode> {
        self.store
            .load()
            .map_err(|e| {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %format!("{e:#}"), "snapshot load failed");
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .ok_or(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Serialize)]
struct LedgerView {
    date: NaiveDate,
    /// The stored ledger belongs to an earlier day; the next worker run resets it.
    stale: bool,
    trading_day: bool,
    current_phase: Option<String>,
    entries: Vec<WatchEntry>,
    selection_timestamp: Option<DateTime<Utc>>,
    band_used: Option<Band>,
    phase_done: BTreeMap<String, bool>,
    command_cursor: i64,
    news_seen: usize,
}

fn ledger_view(snap: Snapshot, options: &RadarOptions, now: DateTime<Utc>) -> LedgerView {
    let calendar = options.schedule.calendar();
    let today = calendar.today(now);
    LedgerView {
        date: snap.ledger.date,
        stale: snap.ledger.date != today,
        trading_day: calendar.is_trading_day(today),
        current_phase: options.schedule.current_phase(now).map(|p| p.id.clone()),
        entries: snap.ledger.entries,
        selection_timestamp: snap.ledger.selection_timestamp,
        band_used: snap.ledger.band_used,
        phase_done: snap.ledger.phase_done,
        command_cursor: snap.command_cursor,
        news_seen: snap.news_seen.len(),
    }
}

async fn get_ledger(State(state): State<AppState>) -> Result<Json<LedgerView>, StatusCode> {
    let snap = state.snapshot()?;
    Ok(Json(ledger_view(snap, &state.options, Utc::now())))
}

async fn get_dedup(State(state): State<AppState>) -> Result<Json<Vec<DedupRecord>>, StatusCode> {
    let snap = state.snapshot()?;
    Ok(Json(snap.dedup.records().cloned().collect()))
}

#[derive(Debug, Serialize)]
struct SummaryView {
    date: NaiveDate,
    hits: usize,
    basket: usize,
    missing: usize,
    rows: Vec<TrackRow>,
}

/// Live baseline-relative moves for the stored basket.
async fn get_summary(State(state): State<AppState>) -> Result<Json<SummaryView>, StatusCode> {
    let snap = state.snapshot()?;
    let ids = snap.ledger.ids();
    let quotes = if ids.is_empty() {
        Default::default()
    } else {
        state.quotes.get_quotes(&ids).await.map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %format!("{e:#}"), "basket quote fetch failed");
            StatusCode::BAD_GATEWAY
        })?
    };

    let report = track(&snap.ledger, &quotes);
    Ok(Json(SummaryView {
        date: snap.ledger.date,
        hits: report.hits(),
        basket: report.len(),
        missing: report.missing(),
        rows: report.rows,
    }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &radar_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
