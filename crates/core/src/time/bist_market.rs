use anyhow::Context;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use std::collections::HashSet;

// Turkey has stayed on UTC+3 all year since 2016.
const TRT_OFFSET_SECS: i32 = 3 * 3600;

/// Borsa Istanbul wall clock and trading-day calendar.
#[derive(Debug, Clone)]
pub struct MarketCalendar {
    offset: FixedOffset,
    holidays: HashSet<NaiveDate>,
}

impl MarketCalendar {
    pub fn bist() -> anyhow::Result<Self> {
        let offset = FixedOffset::east_opt(TRT_OFFSET_SECS).context("invalid TRT offset")?;
        Ok(Self {
            offset,
            holidays: configured_holidays(),
        })
    }

    pub fn with_holidays(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(dates);
        self
    }

    pub fn local(&self, now_utc: DateTime<Utc>) -> DateTime<FixedOffset> {
        now_utc.with_timezone(&self.offset)
    }

    /// Calendar date in market-local time; the ledger rolls over when this changes.
    pub fn today(&self, now_utc: DateTime<Utc>) -> NaiveDate {
        self.local(now_utc).date_naive()
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !is_weekend(date) && !self.holidays.contains(&date)
    }

    pub fn format_local(&self, now_utc: DateTime<Utc>) -> String {
        self.local(now_utc).format("%d.%m.%Y %H:%M").to_string()
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn configured_holidays() -> HashSet<NaiveDate> {
    // Fixed-date national holidays only; religious holidays move every year.
    // Extend via BIST_MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD".
    let mut out = HashSet::new();
    let fixed = [(1, 1), (4, 23), (5, 1), (5, 19), (7, 15), (8, 30), (10, 29)];
    for y in 2024..=2030 {
        for (m, d) in fixed {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                out.insert(date);
            }
        }
    }

    if let Ok(s) = std::env::var("BIST_MARKET_HOLIDAYS") {
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match NaiveDate::parse_from_str(part, "%Y-%m-%d") {
                Ok(d) => {
                    out.insert(d);
                }
                Err(err) => {
                    tracing::warn!(value = part, error = %err, "ignoring malformed holiday date");
                }
            }
        }
    }

    out
}
