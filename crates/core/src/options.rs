use crate::pick::{Band, RankMode};
use crate::schedule::{parse_window, Schedule};
use crate::time::MarketCalendar;
use anyhow::{ensure, Context};
use chrono::Duration;
use std::str::FromStr;

const DEFAULT_BANDS: &str = "0.40-0.90,0.40-1.00,0.40-1.20,0.30-1.20,0.20-1.50,0.10-2.00,0.00-3.00";

#[derive(Debug, Clone)]
pub struct PickOptions {
    /// Basket size; every successful pick returns exactly this many quotes.
    pub count: usize,
    /// Tried in order, narrowest first.
    pub bands: Vec<Band>,
    pub rank_mode: RankMode,
}

impl Default for PickOptions {
    fn default() -> Self {
        Self {
            count: 3,
            bands: parse_bands(DEFAULT_BANDS).unwrap_or_default(),
            rank_mode: RankMode::VolumeWeighted,
        }
    }
}

/// Dedup cooldown per logical message key.
#[derive(Debug, Clone)]
pub struct Cooldowns {
    pub open: Duration,
    pub pick: Duration,
    pub track: Duration,
    pub preclose: Duration,
    pub eod: Duration,
    pub error: Duration,
}

impl Default for Cooldowns {
    fn default() -> Self {
        Self {
            open: Duration::seconds(1800),
            pick: Duration::seconds(1800),
            track: Duration::seconds(1500),
            preclose: Duration::seconds(1800),
            eod: Duration::seconds(1800),
            error: Duration::seconds(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandOptions {
    pub reply_cooldown: Duration,
    pub id_cooldown: Duration,
    /// Commands older than this are skipped (but still consumed).
    pub max_age: Duration,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            reply_cooldown: Duration::seconds(10),
            id_cooldown: Duration::seconds(30),
            max_age: Duration::seconds(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RadarOptions {
    pub schedule: Schedule,
    pub pick: PickOptions,
    pub cooldowns: Cooldowns,
    pub commands: CommandOptions,
    pub news_max_items: usize,
    pub news_retention: Duration,
    pub movers_top_n: usize,
    pub movers_cache: Duration,
}

impl RadarOptions {
    pub fn bist_default() -> anyhow::Result<Self> {
        let calendar = MarketCalendar::bist()?;
        Ok(Self {
            schedule: Schedule::bist_default(calendar)?,
            pick: PickOptions::default(),
            cooldowns: Cooldowns::default(),
            commands: CommandOptions::default(),
            news_max_items: 3,
            news_retention: Duration::days(7),
            movers_top_n: 5,
            movers_cache: Duration::seconds(120),
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let mut out = Self::bist_default()?;

        if let Some(n) = env_parse::<usize>("PICK_COUNT")? {
            out.pick.count = n;
        }
        if let Some(s) = env_str("PICK_BANDS") {
            out.pick.bands = parse_bands(&s)?;
        }
        if let Some(mode) = env_parse::<RankMode>("PICK_RANK_MODE")? {
            out.pick.rank_mode = mode;
        }

        out.schedule = schedule_from_env(out.schedule.calendar().clone())?;

        let c = &mut out.cooldowns;
        for (key, slot) in [
            ("COOLDOWN_OPEN_SECS", &mut c.open),
            ("COOLDOWN_PICK_SECS", &mut c.pick),
            ("COOLDOWN_TRACK_SECS", &mut c.track),
            ("COOLDOWN_PRECLOSE_SECS", &mut c.preclose),
            ("COOLDOWN_EOD_SECS", &mut c.eod),
            ("COOLDOWN_ERROR_SECS", &mut c.error),
        ] {
            if let Some(d) = env_secs(key)? {
                *slot = d;
            }
        }

        if let Some(d) = env_secs("COMMAND_COOLDOWN_SECS")? {
            out.commands.reply_cooldown = d;
        }
        if let Some(d) = env_secs("ID_COOLDOWN_SECS")? {
            out.commands.id_cooldown = d;
        }
        if let Some(d) = env_secs("COMMAND_MAX_AGE_SECS")? {
            out.commands.max_age = d;
        }

        if let Some(n) = env_parse::<usize>("NEWS_MAX_ITEMS")? {
            out.news_max_items = n;
        }
        if let Some(days) = env_parse::<i64>("NEWS_RETENTION_DAYS")? {
            out.news_retention = days_duration("NEWS_RETENTION_DAYS", days)?;
        }
        if let Some(n) = env_parse::<usize>("MOVERS_TOP_N")? {
            out.movers_top_n = n;
        }
        if let Some(d) = env_secs("MOVERS_CACHE_SECS")? {
            out.movers_cache = d;
        }

        out.validate()?;
        Ok(out)
    }

    /// Basic sanity only; anything beyond this is the operator's business.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.pick.bands.is_empty(), "PICK_BANDS must not be empty");
        ensure!(self.pick.count >= 1, "PICK_COUNT must be >= 1");
        ensure!(
            self.news_retention > Duration::zero(),
            "NEWS_RETENTION_DAYS must be positive"
        );
        Ok(())
    }
}

fn schedule_from_env(calendar: MarketCalendar) -> anyhow::Result<Schedule> {
    let window = |key: &str, default: &str| {
        let raw = env_str(key).unwrap_or_else(|| default.to_string());
        parse_window(&raw).with_context(|| format!("{key} is invalid"))
    };

    let hours = match env_str("TRACK_HOURS") {
        Some(s) => s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<u32>().with_context(|| format!("TRACK_HOURS has invalid hour {p:?}")))
            .collect::<anyhow::Result<Vec<_>>>()?,
        None => vec![11, 12, 13, 14, 15, 16, 17],
    };
    let tolerance = env_parse::<u32>("TRACK_TOLERANCE_MIN")?.unwrap_or(9);

    Schedule::from_parts(
        window("OPEN_WINDOW", "10:00-10:09")?,
        window("PICK_WINDOW", "10:10-10:40")?,
        &hours,
        tolerance,
        window("PRECLOSE_WINDOW", "17:30-17:39")?,
        window("EOD_WINDOW", "18:10-18:40")?,
        calendar,
    )
}

pub fn parse_bands(s: &str) -> anyhow::Result<Vec<Band>> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<Band>().with_context(|| format!("invalid band {p:?}")))
        .collect()
}

fn secs_duration(key: &str, secs: i64) -> anyhow::Result<Duration> {
    Duration::try_seconds(secs).with_context(|| format!("{key} is out of range ({secs})"))
}

fn days_duration(key: &str, days: i64) -> anyhow::Result<Duration> {
    Duration::try_days(days).with_context(|| format!("{key} is out of range ({days})"))
}

fn env_secs(key: &str) -> anyhow::Result<Option<Duration>> {
    env_parse::<i64>(key)?
        .map(|secs| secs_duration(key, secs))
        .transpose()
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_str(key) {
        Some(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{key} is invalid ({s:?}): {e}")),
        None => Ok(None),
    }
}
