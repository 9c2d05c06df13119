//! Telegram HTML rendering for scheduled notifications and command replies.
//!
//! Renderers are pure: timestamps arrive pre-formatted so identical inputs give identical text,
//! which is what the dedup guard hashes.

use crate::domain::ledger::WatchLedger;
use crate::movers::{Mover, MoversSummary};
use crate::news::NewsItem;
use crate::pick::PickResult;
use crate::tracker::TrackReport;
use chrono::NaiveTime;

const BRAND: &str = "BIST RADAR";
const RULE: &str = "──────────────────────────────";
const COMMAND_HINT: &str =
    "⌨️ <code>/radar</code> | <code>/radar pro</code> | <code>/radar top</code> | <code>/radar news</code> | <code>/ping</code> | <code>/id</code>";

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `THYAO.IS` → `THYAO`.
pub fn clean_symbol(id: &str) -> &str {
    id.strip_suffix(".IS").unwrap_or(id)
}

pub fn trend_emoji(pct: f64) -> &'static str {
    if pct >= 0.0 {
        "🟢⬆️"
    } else {
        "🔴⬇️"
    }
}

pub fn pct_str(pct: f64) -> String {
    if pct >= 0.0 {
        format!("+{pct:.2}%")
    } else {
        format!("{pct:.2}%")
    }
}

fn boxed(title: &str, line: &str) -> Vec<String> {
    vec![
        format!("┌{RULE}"),
        format!("│ {title}"),
        format!("│ {line}"),
        format!("└{RULE}"),
    ]
}

fn volume_suffix(volume_ratio: Option<f64>) -> String {
    volume_ratio
        .map(|vr| format!(" • vol x{vr:.2}"))
        .unwrap_or_default()
}

fn hours_line(track_starts: &[NaiveTime]) -> String {
    track_starts
        .iter()
        .map(|t| t.format("%H:%M").to_string())
        .collect::<Vec<_>>()
        .join(" • ")
}

pub fn render_open(now_local: &str, pick_start: Option<NaiveTime>) -> String {
    let mut lines = vec![
        format!("🟦 <b>OPENING REPORT</b> – {BRAND}"),
        format!("🕒 {now_local}"),
        String::new(),
    ];
    if let Some(t) = pick_start {
        lines.push(format!(
            "ℹ️ The early-breakout watch list is published automatically at <b>{}</b>.",
            t.format("%H:%M")
        ));
    }
    lines.push(COMMAND_HINT.to_string());
    lines.join("\n")
}

pub fn render_pick(result: &PickResult, picked_at_local: &str, track_starts: &[NaiveTime]) -> String {
    let mut lines = vec![format!("✅ <b>Early Breakout</b> – {BRAND}"), String::new()];
    lines.extend(boxed("📊 <b>BREAKOUT RADAR</b>", picked_at_local));
    lines.push(String::new());
    lines.push(format!("🎯 <b>Band (auto):</b> {}", result.band));
    lines.push(String::new());
    lines.push(format!(
        "🟢 <b>Selected {}</b> (watch list)",
        result.selection.len()
    ));
    for q in &result.selection {
        lines.push(format!(
            "• <code>{}</code>  {:.2}   {}  {}{}",
            escape_html(clean_symbol(&q.id)),
            q.price,
            trend_emoji(q.change_pct),
            pct_str(q.change_pct),
            volume_suffix(q.volume_ratio)
        ));
    }
    if !track_starts.is_empty() {
        lines.push(String::new());
        lines.push(format!("🕒 Tracking: {}", hours_line(track_starts)));
    }
    lines.push(COMMAND_HINT.to_string());
    lines.join("\n")
}

/// Baseline-relative tracking block; rows without a fresh quote read "no data".
pub fn render_track(
    title: &str,
    ledger: &WatchLedger,
    report: &TrackReport,
    now_local: &str,
    picked_at_local: Option<&str>,
) -> String {
    let mut lines = vec![format!("{title} – {BRAND}"), String::new()];
    lines.extend(boxed("🕒 <b>TRACKING</b>", now_local));
    lines.push(String::new());
    if let Some(p) = picked_at_local {
        lines.push(format!("🎯 Selected at: {p}"));
    }
    if let Some(band) = ledger.band_used {
        lines.push(format!("🎚️ Band: {band}"));
    }

    if report.is_empty() {
        lines.push("⚠️ No watch list for today yet.".to_string());
        lines.push("⌨️ <code>/radar</code>".to_string());
        return lines.join("\n");
    }

    lines.push(String::new());
    lines.extend(report.rows.iter().map(|row| {
        let sym = escape_html(clean_symbol(&row.id));
        match (row.price, row.move_pct) {
            (Some(price), Some(pct)) => format!(
                "<code>{sym}</code>  {:.2} → {price:.2}   {}  {}",
                row.baseline_price,
                trend_emoji(pct),
                pct_str(pct)
            ),
            _ => format!("<code>{sym}</code> → no data"),
        }
    }));
    lines.push(String::new());
    lines.push("⌨️ <code>/radar</code>".to_string());
    lines.join("\n")
}

pub fn render_eod(report: &TrackReport, now_local: &str, picked_at_local: Option<&str>) -> String {
    let mut lines = vec![
        format!("🏁 <b>END OF DAY REPORT</b> – {BRAND}"),
        format!("🕒 {now_local}"),
    ];
    if let Some(p) = picked_at_local {
        lines.push(format!("🎯 Selected at: {p}"));
    }
    lines.push(String::new());

    if report.is_empty() {
        lines.push("⚠️ No watch list was formed today.".to_string());
        return lines.join("\n");
    }

    for row in &report.rows {
        let sym = escape_html(clean_symbol(&row.id));
        match (row.price, row.move_pct) {
            (Some(price), Some(pct)) => lines.push(format!(
                "• <code>{sym}</code>  {:.2} → {price:.2}  {} {}",
                row.baseline_price,
                trend_emoji(pct),
                pct_str(pct)
            )),
            _ => lines.push(format!("• <code>{sym}</code> → no data")),
        }
    }
    lines.push(String::new());
    lines.push(format!(
        "✅ Close: <b>{}/{}</b> in the green",
        report.hits(),
        report.len()
    ));
    lines.join("\n")
}

fn mover_line(m: &Mover) -> String {
    format!(
        "• <code>{}</code> {:.2}  {} {}  | Score {:.2}{}",
        escape_html(clean_symbol(&m.id)),
        m.price,
        trend_emoji(m.change_pct),
        pct_str(m.change_pct),
        m.score,
        volume_suffix(m.volume_ratio)
    )
}

pub fn render_movers(summary: Option<&MoversSummary>) -> String {
    let Some(s) = summary.filter(|s| s.up + s.down + s.flat > 0) else {
        return "⚠️ Movers data unavailable.".to_string();
    };

    let mut lines = boxed(
        "📌 <b>MARKET SUMMARY</b>",
        &format!(
            "🟢 Up: <b>{}</b>  🔴 Down: <b>{}</b>  ⚪️ Flat: <b>{}</b>",
            s.up, s.down, s.flat
        ),
    );
    lines.push(String::new());
    lines.push(format!("📈 <b>Top {} gainers</b>", s.top.len()));
    lines.extend(s.top.iter().map(mover_line));
    lines.push(String::new());
    lines.push(format!("📉 <b>Top {} losers</b>", s.bottom.len()));
    lines.extend(s.bottom.iter().map(mover_line));
    lines.join("\n")
}

/// Empty string when there is nothing new.
pub fn render_news(items: &[NewsItem]) -> String {
    if items.is_empty() {
        return String::new();
    }
    let mut lines = vec![format!("📰 <b>News Radar</b> (max {} • new)", items.len())];
    for it in items {
        lines.push(format!(
            "• 🔥 {} | <a href=\"{}\">open</a>",
            escape_html(&it.title),
            escape_html(&it.link)
        ));
    }
    lines.join("\n")
}

pub fn render_help() -> String {
    [
        "🧭 <b>Radar commands</b>",
        "",
        "• <code>/radar</code> or <code>/summary</code> → summary (breadth + movers + news)",
        "• <code>/radar pro</code> or <code>/status</code> → watch list detail + movers + news",
        "• <code>/radar top</code> → movers only",
        "• <code>/radar news</code> → news only",
        "• <code>/ping</code> → liveness check",
        "• <code>/id</code> → chat id",
    ]
    .join("\n")
}

pub fn render_ping(now_local: &str, chat_title: Option<&str>) -> String {
    let mut out = format!("🏓 <b>PONG</b>\n🕒 {now_local}");
    if let Some(t) = chat_title {
        out.push_str(&format!("\n👥 <b>Group:</b> {}", escape_html(t)));
    }
    out
}

pub fn render_chat_id(chat_id: &str, chat_title: Option<&str>) -> String {
    let mut out = format!("🆔 <b>Chat ID:</b> <code>{}</code>", escape_html(chat_id));
    if let Some(t) = chat_title {
        out.push_str(&format!("\n👥 <b>Group:</b> {}", escape_html(t)));
    }
    out
}

pub fn render_command_header(now_local: &str) -> String {
    format!("🛰️ <b>{BRAND}</b>\n🕒 {now_local}\n")
}

/// Shown by `/radar pro` before the day's basket exists.
pub fn render_day_plan(
    pick_start: Option<NaiveTime>,
    first_band: Option<String>,
    track_starts: &[NaiveTime],
) -> String {
    let mut lines = vec!["⚠️ No watch list for today yet.".to_string()];
    if let Some(t) = pick_start {
        lines.push(format!("⏰ Pick: <b>{}</b>", t.format("%H:%M")));
    }
    if let Some(b) = first_band {
        lines.push(format!("🎯 Target band: {b} (widens automatically)"));
    }
    if !track_starts.is_empty() {
        lines.push(format!("🕒 Hourly tracking: {}", hours_line(track_starts)));
    }
    lines.join("\n")
}

/// One-line basket presence for the short summary.
pub fn render_watch_presence(ids: &[String]) -> String {
    if ids.is_empty() {
        return "🎯 Watch list: <i>not formed yet</i>".to_string();
    }
    let names = ids
        .iter()
        .map(|id| format!("<code>{}</code>", escape_html(clean_symbol(id))))
        .collect::<Vec<_>>()
        .join(", ");
    format!("🎯 Watch list: {names}")
}

pub fn render_config_error(problem: &str, when: &str) -> String {
    format!("⚠️ <b>{}</b>\n🕒 {when}", escape_html(problem))
}

/// Joins non-empty blocks with a blank line.
pub fn join_blocks<I, S>(blocks: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    blocks
        .into_iter()
        .filter(|b| !b.as_ref().trim().is_empty())
        .map(|b| b.as_ref().trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n\n")
}
