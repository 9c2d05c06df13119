use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use radar_core::commands::run_commands;
use radar_core::config::Settings;
use radar_core::engine::{run_misconfigured, run_scheduled, RadarContext};
use radar_core::news::google::GoogleNewsClient;
use radar_core::notify::telegram::TelegramClient;
use radar_core::notify::{LogOnlyChannel, NotificationChannel, UnconfiguredChannel};
use radar_core::options::RadarOptions;
use radar_core::quotes::yahoo::YahooChartClient;
use radar_core::storage::SnapshotStore;
use std::path::PathBuf;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod universe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Mode {
    /// Answer commands, then run the active scheduled phase.
    Auto,
    /// Answer commands only.
    Command,
}

#[derive(Debug, Parser)]
#[command(name = "radar_worker")]
struct Args {
    #[arg(long, env = "RADAR_MODE", value_enum, default_value_t = Mode::Auto)]
    mode: Mode,

    /// Log notifications instead of sending them and do not write the snapshot.
    #[arg(long)]
    dry_run: bool,

    /// Evaluate as if it were this instant (RFC 3339). Defaults to now.
    #[arg(long)]
    now: Option<String>,

    /// Overrides STATE_FILE.
    #[arg(long)]
    state_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("radar_run", %run_id, mode = ?args.mode, dry_run = args.dry_run);

    if let Err(err) = run(args, settings).instrument(span).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(%run_id, error = %format!("{err:#}"), "radar run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(args: Args, settings: Settings) -> anyhow::Result<()> {
    let now = resolve_now(args.now.as_deref())?;
    let (options, universe, config_problem) = load_config(&settings)?;

    let quotes = YahooChartClient::from_env()?;
    let news = GoogleNewsClient::from_env()?;
    let telegram = match TelegramClient::from_settings(&settings) {
        Ok(client) => Some(client),
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "telegram disabled");
            None
        }
    };
    if telegram.is_some() && settings.require_chat_id().is_err() {
        tracing::warn!("CHAT_ID unset; scheduled notifications cannot be delivered");
    }

    let log_only = LogOnlyChannel;
    let unconfigured = UnconfiguredChannel {
        reason: "BOT_TOKEN is unset; notifications cannot be delivered".into(),
    };
    let channel = select_channel(args.dry_run, telegram.as_ref(), &log_only, &unconfigured);

    let ctx = RadarContext {
        options: &options,
        universe: &universe,
        quotes: &quotes,
        channel,
        news: &news,
    };

    let store = SnapshotStore::new(args.state_file.unwrap_or(settings.state_file.clone()));
    let today = options.schedule.calendar().today(now);
    let mut snap = store.load_or_fresh(today);
    if snap.roll_over(today) {
        tracing::info!(%today, "rolled over to a new day");
    }

    match &telegram {
        Some(client) => {
            match run_commands(&ctx, client, &mut snap, now, settings.chat_id.as_deref()).await {
                Ok(stats) => tracing::info!(
                    replied = stats.replied,
                    skipped = stats.skipped,
                    cursor = snap.command_cursor,
                    "commands processed"
                ),
                Err(err) => {
                    sentry_anyhow::capture_anyhow(&err);
                    tracing::error!(error = %format!("{err:#}"), "command processing failed");
                }
            }
        }
        None => tracing::info!("no bot token; commands skipped"),
    }

    if args.mode == Mode::Auto {
        let outcome = match &config_problem {
            Some(problem) => run_misconfigured(&ctx, &mut snap, problem, now).await,
            None => run_scheduled(&ctx, &mut snap, now).await,
        };
        tracing::info!(?outcome, "scheduled run finished");
    }

    if args.dry_run {
        tracing::info!(path = %store.path().display(), "dry-run: snapshot not written");
        return Ok(());
    }
    store
        .save(&snap)
        .with_context(|| format!("failed to save snapshot {}", store.path().display()))?;
    tracing::info!(path = %store.path().display(), date = %snap.ledger.date, "snapshot saved");
    Ok(())
}

/// Broken tuning or an unreadable symbols file degrades to defaults plus a reported problem,
/// so commands are still answered and the snapshot is still saved.
fn load_config(
    settings: &Settings,
) -> anyhow::Result<(RadarOptions, Vec<String>, Option<String>)> {
    let mut problems = Vec::new();

    let options = match RadarOptions::from_env() {
        Ok(options) => options,
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "invalid radar options; using defaults");
            problems.push(format!("{err:#}"));
            RadarOptions::bist_default()?
        }
    };

    let universe = match universe::load_universe(
        &settings.symbols_file,
        &universe::UniverseOptions::from_env(),
    ) {
        Ok(universe) => universe,
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "symbol universe unavailable");
            problems.push(format!("{err:#}"));
            Vec::new()
        }
    };

    let problem = (!problems.is_empty()).then(|| problems.join("; "));
    Ok((options, universe, problem))
}

/// Dry runs only log. Without a bot token sends fail, so phases stay open and nothing is deduped.
fn select_channel<'a>(
    dry_run: bool,
    telegram: Option<&'a TelegramClient>,
    log_only: &'a LogOnlyChannel,
    unconfigured: &'a UnconfiguredChannel,
) -> &'a dyn NotificationChannel {
    match telegram {
        _ if dry_run => log_only,
        Some(client) => client,
        None => unconfigured,
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

fn resolve_now(now_arg: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    match now_arg {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("--now must be RFC 3339 (got {s:?})"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}
