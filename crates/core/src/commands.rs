//! On-demand chat commands.
//!
//! Replies are read-only views of the day's ledger: they never touch phase flags or dedup
//! records. They may refresh the movers cache and consume unseen headlines.

use crate::engine::{compose, ledger_quotes, load_movers, take_news, RadarContext};
use crate::notify::{CommandFeed, IncomingCommand};
use crate::render;
use crate::schedule::PhaseKind;
use crate::storage::Snapshot;
use crate::tracker::track;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Id,
    Help,
    /// `/radar`, `/summary`
    Summary,
    /// `/radar pro`, `/status`
    Status,
    /// `/radar top`, `/top`
    Top,
    /// `/radar news`, `/news`
    News,
}

impl Command {
    fn shares_reply_cooldown(self) -> bool {
        !matches!(self, Command::Ping | Command::Id)
    }
}

/// Recognizes `/cmd` and `/cmd@botname`, case-insensitively. Anything else is not a command.
pub fn parse_command(text: &str) -> Option<Command> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?.to_lowercase();
    let head = head.strip_prefix('/')?;
    let head = head.split('@').next().unwrap_or(head);

    let cmd = match head {
        "ping" => Command::Ping,
        "id" => Command::Id,
        "help" | "start" => Command::Help,
        "status" => Command::Status,
        "summary" => Command::Summary,
        "top" => Command::Top,
        "news" => Command::News,
        "radar" => match parts.next().map(str::to_lowercase).as_deref() {
            None | Some("summary") => Command::Summary,
            Some("pro") | Some("status") => Command::Status,
            Some("top") => Command::Top,
            Some("news") => Command::News,
            Some(_) => Command::Help,
        },
        _ => return None,
    };
    Some(cmd)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandStats {
    pub replied: usize,
    pub skipped: usize,
}

/// Polls once from the stored cursor and answers what is addressed to `target_chat`.
///
/// The cursor moves past every polled update, including ones that are skipped or carry no
/// command. It is only durable once the caller saves the snapshot.
pub async fn run_commands(
    ctx: &RadarContext<'_>,
    feed: &dyn CommandFeed,
    snap: &mut Snapshot,
    now: DateTime<Utc>,
    target_chat: Option<&str>,
) -> anyhow::Result<CommandStats> {
    let batch = feed
        .poll(snap.command_cursor)
        .await
        .context("command poll failed")?;
    if let Some(max) = batch.max_update_id {
        snap.command_cursor = snap.command_cursor.max(max);
    }

    let mut stats = CommandStats::default();
    for incoming in batch.commands {
        let Some(command) = admissible(ctx, snap, &incoming, now, target_chat) else {
            stats.skipped += 1;
            continue;
        };

        let (text, news) = reply(ctx, snap, command, &incoming, now).await;
        match ctx.channel.send(&text, Some(&incoming.chat_id)).await {
            Ok(()) => {
                stats.replied += 1;
                snap.news_seen.mark_seen(&news, now);
                if command == Command::Id {
                    snap.last_id_reply_at = Some(now);
                } else if command.shares_reply_cooldown() {
                    snap.last_command_reply_at = Some(now);
                }
                tracing::info!(update_id = incoming.update_id, ?command, "command answered");
            }
            Err(err) => {
                stats.skipped += 1;
                tracing::warn!(update_id = incoming.update_id, ?command, error = %format!("{err:#}"), "command reply failed");
            }
        }
    }
    Ok(stats)
}

fn admissible(
    ctx: &RadarContext<'_>,
    snap: &Snapshot,
    incoming: &IncomingCommand,
    now: DateTime<Utc>,
    target_chat: Option<&str>,
) -> Option<Command> {
    if target_chat.is_some_and(|c| c != incoming.chat_id) {
        tracing::debug!(update_id = incoming.update_id, chat = %incoming.chat_id, "foreign chat; ignored");
        return None;
    }
    let opts = &ctx.options.commands;
    if incoming.sent_at.is_some_and(|t| now - t > opts.max_age) {
        tracing::debug!(update_id = incoming.update_id, "stale command; ignored");
        return None;
    }
    let command = parse_command(&incoming.text)?;

    let within = |last: Option<DateTime<Utc>>, cooldown: Duration| {
        last.is_some_and(|t| now - t < cooldown)
    };
    let limited = match command {
        Command::Id => within(snap.last_id_reply_at, opts.id_cooldown),
        c if c.shares_reply_cooldown() => within(snap.last_command_reply_at, opts.reply_cooldown),
        _ => false,
    };
    if limited {
        tracing::info!(update_id = incoming.update_id, ?command, "rate limited");
        return None;
    }
    Some(command)
}

async fn reply(
    ctx: &RadarContext<'_>,
    snap: &mut Snapshot,
    command: Command,
    incoming: &IncomingCommand,
    now: DateTime<Utc>,
) -> (String, Vec<crate::news::NewsItem>) {
    let schedule = &ctx.options.schedule;
    let now_local = schedule.calendar().format_local(now);
    let chat_title = incoming.chat_title.as_deref();

    match command {
        Command::Ping => (render::render_ping(&now_local, chat_title), Vec::new()),
        Command::Id => (
            render::render_chat_id(&incoming.chat_id, chat_title),
            Vec::new(),
        ),
        Command::Help => (render::render_help(), Vec::new()),
        Command::Top => {
            let movers = load_movers(ctx, snap, now, None).await;
            let text = render::join_blocks([
                render::render_command_header(&now_local),
                render::render_movers(movers.as_ref()),
            ]);
            (text, Vec::new())
        }
        Command::News => {
            let news = take_news(ctx, snap, now).await;
            let body = if news.is_empty() {
                "📰 No new headlines.".to_string()
            } else {
                render::render_news(&news)
            };
            let text = render::join_blocks([render::render_command_header(&now_local), body]);
            (text, news)
        }
        Command::Summary => {
            let head = render::join_blocks([
                render::render_command_header(&now_local),
                render::render_watch_presence(&snap.ledger.ids()),
            ]);
            let movers = load_movers(ctx, snap, now, None).await;
            let news = take_news(ctx, snap, now).await;
            (compose(head, movers.as_ref(), &news), news)
        }
        Command::Status => {
            let detail = if snap.ledger.is_empty() {
                render::render_day_plan(
                    schedule.first_of_kind(PhaseKind::Pick).map(|p| p.start),
                    ctx.options.pick.bands.first().map(|b| b.to_string()),
                    &schedule.track_starts(),
                )
            } else {
                let quotes = ledger_quotes(ctx, snap).await;
                let report = track(&snap.ledger, &quotes);
                let picked_at = snap
                    .ledger
                    .selection_timestamp
                    .map(|t| schedule.calendar().format_local(t));
                render::render_track(
                    "📋 <b>WATCH LIST</b>",
                    &snap.ledger,
                    &report,
                    &now_local,
                    picked_at.as_deref(),
                )
            };
            let head = render::join_blocks([render::render_command_header(&now_local), detail]);
            let movers = load_movers(ctx, snap, now, None).await;
            let news = take_news(ctx, snap, now).await;
            (compose(head, movers.as_ref(), &news), news)
        }
    }
}
