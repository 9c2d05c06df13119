use crate::time::MarketCalendar;
use anyhow::{ensure, Context};
use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Open,
    Pick,
    Track,
    PreClose,
    Eod,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseKind::Open => "open",
            PhaseKind::Pick => "pick",
            PhaseKind::Track => "track",
            PhaseKind::PreClose => "preclose",
            PhaseKind::Eod => "eod",
        };
        f.write_str(s)
    }
}

/// A named closed window `[start, end]` of market-local time, compared at minute resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub id: String,
    pub kind: PhaseKind,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Phase {
    pub fn new(
        id: impl Into<String>,
        kind: PhaseKind,
        start: NaiveTime,
        end: NaiveTime,
    ) -> anyhow::Result<Self> {
        let id = id.into();
        ensure!(!id.trim().is_empty(), "phase id must be non-empty");
        ensure!(
            minute_of_day(start) <= minute_of_day(end),
            "phase {id} ends ({end}) before it starts ({start})"
        );
        Ok(Self {
            id,
            kind,
            start,
            end,
        })
    }

    pub fn contains(&self, local_time: NaiveTime) -> bool {
        let m = minute_of_day(local_time);
        minute_of_day(self.start) <= m && m <= minute_of_day(self.end)
    }
}

fn minute_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Parses `"HH:MM-HH:MM"`.
pub fn parse_window(s: &str) -> anyhow::Result<(NaiveTime, NaiveTime)> {
    let (start, end) = s
        .split_once('-')
        .with_context(|| format!("window must look like HH:MM-HH:MM (got {s:?})"))?;
    let start = NaiveTime::parse_from_str(start.trim(), "%H:%M")
        .with_context(|| format!("invalid window start in {s:?}"))?;
    let end = NaiveTime::parse_from_str(end.trim(), "%H:%M")
        .with_context(|| format!("invalid window end in {s:?}"))?;
    Ok((start, end))
}

/// Window evaluator: maps wall-clock time to at most one phase.
///
/// Holds no state about previous invocations; whether a phase was already acted on is tracked
/// by the watch ledger and the dedup guard.
#[derive(Debug, Clone)]
pub struct Schedule {
    phases: Vec<Phase>,
    calendar: MarketCalendar,
}

impl Schedule {
    pub fn new(phases: Vec<Phase>, calendar: MarketCalendar) -> anyhow::Result<Self> {
        ensure!(!phases.is_empty(), "schedule must contain at least one phase");
        for (i, p) in phases.iter().enumerate() {
            ensure!(
                !phases[..i].iter().any(|q| q.id == p.id),
                "duplicate phase id {}",
                p.id
            );
        }
        Ok(Self { phases, calendar })
    }

    /// Open 10:00, pick 10:10, hourly tracking 11:00..17:00, pre-close 17:30, EOD 18:10.
    pub fn bist_default(calendar: MarketCalendar) -> anyhow::Result<Self> {
        let hm = |h: u32, m: u32| {
            NaiveTime::from_hms_opt(h, m, 0).with_context(|| format!("invalid time {h}:{m}"))
        };
        Self::from_parts(
            (hm(10, 0)?, hm(10, 9)?),
            (hm(10, 10)?, hm(10, 40)?),
            &[11, 12, 13, 14, 15, 16, 17],
            9,
            (hm(17, 30)?, hm(17, 39)?),
            (hm(18, 10)?, hm(18, 40)?),
            calendar,
        )
    }

    /// Builds the standard day layout. Hourly tracking instants become
    /// `[HH:00, HH:00 + tolerance]` windows so a skipped or late trigger still lands inside.
    pub fn from_parts(
        open: (NaiveTime, NaiveTime),
        pick: (NaiveTime, NaiveTime),
        track_hours: &[u32],
        track_tolerance_min: u32,
        preclose: (NaiveTime, NaiveTime),
        eod: (NaiveTime, NaiveTime),
        calendar: MarketCalendar,
    ) -> anyhow::Result<Self> {
        ensure!(track_tolerance_min < 60, "tracking tolerance must be under an hour");

        let mut phases = vec![
            Phase::new("open", PhaseKind::Open, open.0, open.1)?,
            Phase::new("pick", PhaseKind::Pick, pick.0, pick.1)?,
        ];
        for &h in track_hours {
            let start = NaiveTime::from_hms_opt(h, 0, 0)
                .with_context(|| format!("invalid tracking hour {h}"))?;
            let end = NaiveTime::from_hms_opt(h, track_tolerance_min, 0)
                .with_context(|| format!("invalid tracking hour {h}"))?;
            phases.push(Phase::new(format!("track-{h:02}"), PhaseKind::Track, start, end)?);
        }
        phases.push(Phase::new("preclose", PhaseKind::PreClose, preclose.0, preclose.1)?);
        phases.push(Phase::new("eod", PhaseKind::Eod, eod.0, eod.1)?);

        Self::new(phases, calendar)
    }

    pub fn calendar(&self) -> &MarketCalendar {
        &self.calendar
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// First configured phase whose window contains `now`; `None` outside every window and on
    /// non-trading days.
    pub fn current_phase(&self, now: DateTime<Utc>) -> Option<&Phase> {
        let local = self.calendar.local(now);
        if !self.calendar.is_trading_day(local.date_naive()) {
            return None;
        }
        let t = local.time();
        self.phases.iter().find(|p| p.contains(t))
    }

    pub fn is_active(&self, phase_id: &str, now: DateTime<Utc>) -> bool {
        self.current_phase(now).is_some_and(|p| p.id == phase_id)
    }

    /// Start times of tracking phases, for rendering the day plan.
    pub fn track_starts(&self) -> Vec<NaiveTime> {
        self.phases
            .iter()
            .filter(|p| p.kind == PhaseKind::Track)
            .map(|p| p.start)
            .collect()
    }

    pub fn first_of_kind(&self, kind: PhaseKind) -> Option<&Phase> {
        self.phases.iter().find(|p| p.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule() -> Schedule {
        Schedule::bist_default(MarketCalendar::bist().unwrap()).unwrap()
    }

    // 2026-03-03 is a Tuesday; Istanbul is UTC+3.
    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 3, h - 3, m, s).unwrap()
    }

    fn phase_id(now: DateTime<Utc>) -> Option<String> {
        schedule().current_phase(now).map(|p| p.id.clone())
    }

    #[test]
    fn windows_are_closed_intervals() {
        assert_eq!(phase_id(at(10, 10, 0)).as_deref(), Some("pick"));
        assert_eq!(phase_id(at(10, 40, 59)).as_deref(), Some("pick"));
        assert_eq!(phase_id(at(10, 41, 0)), None);
        assert_eq!(phase_id(at(10, 9, 59)).as_deref(), Some("open"));
    }

    #[test]
    fn hourly_tracking_tolerates_late_triggers() {
        assert_eq!(phase_id(at(11, 0, 0)).as_deref(), Some("track-11"));
        assert_eq!(phase_id(at(11, 5, 0)).as_deref(), Some("track-11"));
        assert_eq!(phase_id(at(11, 9, 30)).as_deref(), Some("track-11"));
        assert_eq!(phase_id(at(11, 10, 0)), None);
        assert_eq!(phase_id(at(17, 3, 0)).as_deref(), Some("track-17"));
    }

    #[test]
    fn eod_and_preclose_windows() {
        assert_eq!(phase_id(at(17, 35, 0)).as_deref(), Some("preclose"));
        assert_eq!(phase_id(at(18, 25, 0)).as_deref(), Some("eod"));
        assert_eq!(phase_id(at(19, 0, 0)), None);
    }

    #[test]
    fn weekend_short_circuits_every_phase() {
        // 2026-03-07 is a Saturday.
        let sat = Utc.with_ymd_and_hms(2026, 3, 7, 7, 15, 0).unwrap();
        assert!(schedule().current_phase(sat).is_none());
    }

    #[test]
    fn evaluation_is_pure() {
        let s = schedule();
        let now = at(10, 15, 0);
        assert_eq!(s.current_phase(now), s.current_phase(now));
        assert!(s.is_active("pick", now));
        assert!(!s.is_active("open", now));
    }

    #[test]
    fn rejects_inverted_or_duplicate_windows() {
        let cal = MarketCalendar::bist().unwrap();
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert!(Phase::new("x", PhaseKind::Open, t(11, 0), t(10, 0)).is_err());

        let p = Phase::new("x", PhaseKind::Open, t(10, 0), t(10, 5)).unwrap();
        assert!(Schedule::new(vec![p.clone(), p], cal.clone()).is_err());
        assert!(Schedule::new(vec![], cal).is_err());
    }

    #[test]
    fn parses_windows() {
        let (start, end) = parse_window("10:10-10:40").unwrap();
        assert_eq!(start, NaiveTime::from_hms_opt(10, 10, 0).unwrap());
        assert_eq!(end, NaiveTime::from_hms_opt(10, 40, 0).unwrap());
        assert!(parse_window("10:10").is_err());
        assert!(parse_window("25:00-26:00").is_err());
    }

    #[test]
    fn lists_tracking_starts() {
        let starts = schedule().track_starts();
        assert_eq!(starts.len(), 7);
        assert_eq!(starts[0], NaiveTime::from_hms_opt(11, 0, 0).unwrap());
    }
}
