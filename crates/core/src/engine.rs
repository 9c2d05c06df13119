//! One scheduled invocation: roll over, find the active phase, act on it at most once.
//!
//! Every "have we already done this" decision is re-derived from the snapshot and the wall
//! clock. Handler errors are logged at error level (the binaries forward those to Sentry) and
//! never escape, so the caller always gets to persist the snapshot.

use crate::domain::quote::Quote;
use crate::movers::{summarize, MoversCache, MoversSummary};
use crate::news::{NewsItem, NewsSource};
use crate::notify::NotificationChannel;
use crate::options::RadarOptions;
use crate::pick::pick;
use crate::quotes::QuoteSource;
use crate::render;
use crate::schedule::{Phase, PhaseKind};
use crate::storage::Snapshot;
use crate::tracker::{track, TrackReport};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Dedup key for configuration diagnostics.
pub const ERROR_KEY: &str = "err";

pub struct RadarContext<'a> {
    pub options: &'a RadarOptions,
    /// Symbol universe in file order; the picker's tie-break follows it.
    pub universe: &'a [String],
    pub quotes: &'a dyn QuoteSource,
    pub channel: &'a dyn NotificationChannel,
    pub news: &'a dyn NewsSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Suppressed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Outside every window, or not a trading day.
    Idle,
    AlreadyDone { phase: String },
    /// Tracking with an empty basket; the phase stays open.
    EmptyBasket { phase: String },
    /// No band filled the basket; retried on the next invocation.
    NoPick { phase: String },
    Delivered { phase: String, send: SendOutcome },
    ConfigError { send: SendOutcome },
    Failed { phase: String },
}

pub async fn run_scheduled(
    ctx: &RadarContext<'_>,
    snap: &mut Snapshot,
    now: DateTime<Utc>,
) -> PhaseOutcome {
    let calendar = ctx.options.schedule.calendar();
    let today = calendar.today(now);
    if snap.roll_over(today) {
        tracing::info!(%today, "rolled over to a new day");
    }

    let Some(phase) = ctx.options.schedule.current_phase(now).cloned() else {
        tracing::debug!(local = %calendar.format_local(now), "no active phase");
        return PhaseOutcome::Idle;
    };

    if ctx.universe.is_empty() {
        tracing::error!(phase = %phase.id, "configuration invalid: empty symbol universe");
        let send =
            report_config_error(ctx, snap, "Symbol universe is empty; nothing to scan.", now).await;
        return PhaseOutcome::ConfigError { send };
    }

    if snap.ledger.is_done(&phase.id) {
        tracing::debug!(phase = %phase.id, "phase already done today");
        return PhaseOutcome::AlreadyDone { phase: phase.id };
    }

    tracing::info!(phase = %phase.id, kind = %phase.kind, "phase active");
    let result = match phase.kind {
        PhaseKind::Open => run_open(ctx, snap, &phase, now).await,
        PhaseKind::Pick => run_pick(ctx, snap, &phase, now).await,
        PhaseKind::Track | PhaseKind::PreClose => run_track(ctx, snap, &phase, now).await,
        PhaseKind::Eod => run_eod(ctx, snap, &phase, now).await,
    };

    match result {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(phase = %phase.id, error = %format!("{err:#}"), "phase handler failed");
            PhaseOutcome::Failed { phase: phase.id }
        }
    }
}

/// Stands in for [`run_scheduled`] when configuration failed to load: inside a phase window
/// the problem is reported instead of acting on the phase. Nothing is marked done.
pub async fn run_misconfigured(
    ctx: &RadarContext<'_>,
    snap: &mut Snapshot,
    problem: &str,
    now: DateTime<Utc>,
) -> PhaseOutcome {
    let today = ctx.options.schedule.calendar().today(now);
    if snap.roll_over(today) {
        tracing::info!(%today, "rolled over to a new day");
    }
    let Some(phase) = ctx.options.schedule.current_phase(now) else {
        return PhaseOutcome::Idle;
    };
    tracing::error!(phase = %phase.id, problem, "configuration invalid; phase skipped");
    let send = report_config_error(ctx, snap, problem, now).await;
    PhaseOutcome::ConfigError { send }
}

/// Configuration diagnostic under [`ERROR_KEY`], at most once per error cooldown while unchanged.
pub async fn report_config_error(
    ctx: &RadarContext<'_>,
    snap: &mut Snapshot,
    problem: &str,
    now: DateTime<Utc>,
) -> SendOutcome {
    let today = ctx.options.schedule.calendar().today(now);
    let text = render::render_config_error(problem, &today.format("%d.%m.%Y").to_string());
    guarded_send(ctx, snap, ERROR_KEY, &text, ctx.options.cooldowns.error, now).await
}

/// Sends unless the dedup guard suppresses; the record is only written after delivery.
pub async fn guarded_send(
    ctx: &RadarContext<'_>,
    snap: &mut Snapshot,
    key: &str,
    text: &str,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> SendOutcome {
    if !snap.dedup.should_send(key, text, now, cooldown) {
        tracing::info!(key, "unchanged content within cooldown; suppressed");
        return SendOutcome::Suppressed;
    }

    match ctx.channel.send(text, None).await {
        Ok(()) => {
            snap.dedup.record_sent(key, text, now);
            tracing::info!(key, channel = ctx.channel.channel_name(), "notification sent");
            SendOutcome::Sent
        }
        Err(err) => {
            tracing::error!(key, channel = ctx.channel.channel_name(), error = %format!("{err:#}"), "send failed");
            SendOutcome::Failed
        }
    }
}

/// Cached movers, refreshed from `prefetched` or a universe scan once the cache expires.
/// A failed scan falls back to whatever the cache still holds.
pub async fn load_movers(
    ctx: &RadarContext<'_>,
    snap: &mut Snapshot,
    now: DateTime<Utc>,
    prefetched: Option<&[Quote]>,
) -> Option<MoversSummary> {
    let fresh = snap
        .movers_cache
        .as_ref()
        .is_some_and(|c| c.is_fresh(now, ctx.options.movers_cache));

    if !fresh {
        match prefetched {
            Some(quotes) => snap.movers_cache = Some(MoversCache::from_quotes(quotes, now)),
            None => match ctx.quotes.get_quotes(ctx.universe).await {
                Ok(map) if !map.is_empty() => {
                    let ordered = in_universe_order(ctx.universe, &map);
                    snap.movers_cache = Some(MoversCache::from_quotes(&ordered, now));
                }
                Ok(_) => tracing::warn!("movers scan returned no quotes"),
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "movers scan failed")
                }
            },
        }
    }

    snap.movers_cache
        .as_ref()
        .filter(|c| !c.movers.is_empty())
        .map(|c| summarize(&c.movers, ctx.options.movers_top_n))
}

/// Unseen headlines for the next message. Nothing is marked; see [`crate::news::NewsSeenMap::mark_seen`].
pub async fn take_news(
    ctx: &RadarContext<'_>,
    snap: &mut Snapshot,
    now: DateTime<Utc>,
) -> Vec<NewsItem> {
    if ctx.options.news_max_items == 0 {
        return Vec::new();
    }
    let items = match ctx.news.fetch_news().await {
        Ok(items) => items,
        Err(err) => {
            tracing::warn!(source = ctx.news.source_name(), error = %format!("{err:#}"), "news fetch failed");
            return Vec::new();
        }
    };
    snap.news_seen.select_new(
        &items,
        now,
        ctx.options.news_retention,
        ctx.options.news_max_items,
    )
}

fn in_universe_order(universe: &[String], map: &HashMap<String, Quote>) -> Vec<Quote> {
    universe.iter().filter_map(|id| map.get(id).cloned()).collect()
}

fn cooldown_for(ctx: &RadarContext<'_>, kind: PhaseKind) -> Duration {
    let c = &ctx.options.cooldowns;
    match kind {
        PhaseKind::Open => c.open,
        PhaseKind::Pick => c.pick,
        PhaseKind::Track => c.track,
        PhaseKind::PreClose => c.preclose,
        PhaseKind::Eod => c.eod,
    }
}

pub(crate) fn compose(head: String, movers: Option<&MoversSummary>, news: &[NewsItem]) -> String {
    render::join_blocks([head, render::render_movers(movers), render::render_news(news)])
}

/// Sends a phase report and consumes the phase when delivered or already delivered.
async fn deliver_and_mark(
    ctx: &RadarContext<'_>,
    snap: &mut Snapshot,
    phase: &Phase,
    text: &str,
    news: &[NewsItem],
    now: DateTime<Utc>,
) -> PhaseOutcome {
    let send = guarded_send(ctx, snap, &phase.id, text, cooldown_for(ctx, phase.kind), now).await;
    if send == SendOutcome::Sent {
        snap.news_seen.mark_seen(news, now);
    }
    if send != SendOutcome::Failed {
        snap.ledger.mark_done(&phase.id);
    }
    PhaseOutcome::Delivered {
        phase: phase.id.clone(),
        send,
    }
}

pub(crate) async fn ledger_quotes(ctx: &RadarContext<'_>, snap: &Snapshot) -> HashMap<String, Quote> {
    let ids = snap.ledger.ids();
    if ids.is_empty() {
        return HashMap::new();
    }
    match ctx.quotes.get_quotes(&ids).await {
        Ok(map) => map,
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "basket quotes unavailable; reporting no data");
            HashMap::new()
        }
    }
}

async fn run_open(
    ctx: &RadarContext<'_>,
    snap: &mut Snapshot,
    phase: &Phase,
    now: DateTime<Utc>,
) -> anyhow::Result<PhaseOutcome> {
    let schedule = &ctx.options.schedule;
    let head = render::render_open(
        &schedule.calendar().format_local(now),
        schedule.first_of_kind(PhaseKind::Pick).map(|p| p.start),
    );
    let movers = load_movers(ctx, snap, now, None).await;
    let news = take_news(ctx, snap, now).await;
    let text = compose(head, movers.as_ref(), &news);
    Ok(deliver_and_mark(ctx, snap, phase, &text, &news, now).await)
}

async fn run_pick(
    ctx: &RadarContext<'_>,
    snap: &mut Snapshot,
    phase: &Phase,
    now: DateTime<Utc>,
) -> anyhow::Result<PhaseOutcome> {
    let map = ctx
        .quotes
        .get_quotes(ctx.universe)
        .await
        .with_context(|| format!("quote scan via {} failed", ctx.quotes.source_name()))?;
    let batch = in_universe_order(ctx.universe, &map);

    let opts = &ctx.options.pick;
    let Some(result) = pick(&batch, &opts.bands, opts.count, opts.rank_mode) else {
        tracing::info!(phase = %phase.id, quotes = batch.len(), "no band filled the basket; will retry");
        return Ok(PhaseOutcome::NoPick {
            phase: phase.id.clone(),
        });
    };

    let added = snap.ledger.select(&phase.id, &result, now, opts.count);
    tracing::info!(
        phase = %phase.id,
        band = %result.band,
        selected = result.selection.len(),
        added = added.len(),
        "basket picked"
    );

    let schedule = &ctx.options.schedule;
    let head = render::render_pick(
        &result,
        &schedule.calendar().format_local(now),
        &schedule.track_starts(),
    );
    let movers = load_movers(ctx, snap, now, Some(&batch)).await;
    let news = take_news(ctx, snap, now).await;
    let text = compose(head, movers.as_ref(), &news);

    let send = guarded_send(ctx, snap, &phase.id, &text, ctx.options.cooldowns.pick, now).await;
    if send == SendOutcome::Sent {
        snap.news_seen.mark_seen(&news, now);
    }
    Ok(PhaseOutcome::Delivered {
        phase: phase.id.clone(),
        send,
    })
}

/// Hourly tracking waits for a basket; the pre-close report goes out regardless.
async fn run_track(
    ctx: &RadarContext<'_>,
    snap: &mut Snapshot,
    phase: &Phase,
    now: DateTime<Utc>,
) -> anyhow::Result<PhaseOutcome> {
    if phase.kind == PhaseKind::Track && snap.ledger.is_empty() {
        tracing::info!(phase = %phase.id, "no basket yet; tracking skipped");
        return Ok(PhaseOutcome::EmptyBasket {
            phase: phase.id.clone(),
        });
    }

    let quotes = ledger_quotes(ctx, snap).await;
    let report = track(&snap.ledger, &quotes);
    if report.missing() > 0 {
        tracing::warn!(phase = %phase.id, missing = report.missing(), "some basket quotes unavailable");
    }

    let title = match phase.kind {
        PhaseKind::PreClose => "⏳ <b>PRE-CLOSE REPORT</b>",
        _ => "⏱️ <b>HOURLY TRACKING</b>",
    };
    let calendar = ctx.options.schedule.calendar();
    let picked_at = snap.ledger.selection_timestamp.map(|t| calendar.format_local(t));
    let head = render::render_track(
        title,
        &snap.ledger,
        &report,
        &calendar.format_local(now),
        picked_at.as_deref(),
    );
    let movers = load_movers(ctx, snap, now, None).await;
    let news = take_news(ctx, snap, now).await;
    let text = compose(head, movers.as_ref(), &news);
    Ok(deliver_and_mark(ctx, snap, phase, &text, &news, now).await)
}

/// End-of-day summary. Runs even without a basket so the day is always closed out once.
async fn run_eod(
    ctx: &RadarContext<'_>,
    snap: &mut Snapshot,
    phase: &Phase,
    now: DateTime<Utc>,
) -> anyhow::Result<PhaseOutcome> {
    let quotes = ledger_quotes(ctx, snap).await;
    let report: TrackReport = track(&snap.ledger, &quotes);
    tracing::info!(
        phase = %phase.id,
        hits = report.hits(),
        basket = report.len(),
        missing = report.missing(),
        "end of day"
    );

    let calendar = ctx.options.schedule.calendar();
    let picked_at = snap.ledger.selection_timestamp.map(|t| calendar.format_local(t));
    let head = render::render_eod(&report, &calendar.format_local(now), picked_at.as_deref());
    let movers = load_movers(ctx, snap, now, None).await;
    let news = take_news(ctx, snap, now).await;
    let text = compose(head, movers.as_ref(), &news);
    Ok(deliver_and_mark(ctx, snap, phase, &text, &news, now).await)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeQuotes {
        pub quotes: HashMap<String, Quote>,
        pub fail: AtomicBool,
        pub calls: AtomicUsize,
    }

    impl FakeQuotes {
        pub fn with(quotes: Vec<Quote>) -> Self {
            Self {
                quotes: quotes.into_iter().map(|q| (q.id.clone(), q)).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl QuoteSource for FakeQuotes {
        fn source_name(&self) -> &'static str {
            "fake"
        }

        async fn get_quotes(&self, ids: &[String]) -> anyhow::Result<HashMap<String, Quote>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(!self.fail.load(Ordering::SeqCst), "quote source down");
            Ok(ids
                .iter()
                .filter_map(|id| self.quotes.get(id).map(|q| (id.clone(), q.clone())))
                .collect())
        }
    }

    #[derive(Default)]
    pub struct FakeChannel {
        pub sent: Mutex<Vec<(Option<String>, String)>>,
        pub fail: AtomicBool,
    }

    impl FakeChannel {
        pub fn texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, t)| t.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl NotificationChannel for FakeChannel {
        fn channel_name(&self) -> &'static str {
            "fake"
        }

        async fn send(&self, text: &str, destination: Option<&str>) -> anyhow::Result<()> {
            anyhow::ensure!(!self.fail.load(Ordering::SeqCst), "transport down");
            self.sent
                .lock()
                .unwrap()
                .push((destination.map(str::to_string), text.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeNews {
        pub items: Vec<NewsItem>,
    }

    #[async_trait::async_trait]
    impl NewsSource for FakeNews {
        fn source_name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_news(&self) -> anyhow::Result<Vec<NewsItem>> {
            Ok(self.items.clone())
        }
    }

    pub fn quote(id: &str, price: f64, volume_ratio: f64) -> Quote {
        Quote::new(id, price, 100.0)
            .unwrap()
            .with_volume(Some(volume_ratio * 100.0), Some(100.0))
    }

    /// A, B, C from the picker scenario plus a decliner.
    pub fn market() -> Vec<Quote> {
        vec![
            quote("A.IS", 100.5, 1.0),
            quote("B.IS", 100.8, 2.0),
            quote("C.IS", 101.1, 0.5),
            quote("D.IS", 99.0, 1.0),
        ]
    }

    pub fn universe() -> Vec<String> {
        ["A.IS", "B.IS", "C.IS", "D.IS"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn options() -> RadarOptions {
        let mut opts = RadarOptions::bist_default().unwrap();
        opts.pick.count = 2;
        opts.pick.bands = crate::options::parse_bands("0.4-0.9,0.0-3.0").unwrap();
        opts
    }
}
