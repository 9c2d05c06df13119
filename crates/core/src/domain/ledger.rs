use crate::pick::{Band, PickResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub id: String,
    pub baseline_price: f64,
}

/// The day's watch basket plus per-phase "already acted" flags.
///
/// Entries keep selection order and are append-only within a day. Phase flags only move from
/// unset to set; both are cleared solely by [`WatchLedger::roll_over`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchLedger {
    pub date: NaiveDate,
    #[serde(default)]
    pub entries: Vec<WatchEntry>,
    #[serde(default)]
    pub selection_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub band_used: Option<Band>,
    #[serde(default)]
    pub phase_done: BTreeMap<String, bool>,
}

impl WatchLedger {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            entries: Vec::new(),
            selection_timestamp: None,
            band_used: None,
            phase_done: BTreeMap::new(),
        }
    }

    /// Replaces the ledger with an empty one when `today` differs from the stored date.
    /// Returns whether a reset happened.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.date == today {
            return false;
        }
        tracing::info!(previous = %self.date, %today, entries = self.entries.len(), "watch ledger rollover");
        *self = Self::new(today);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn entry(&self, id: &str) -> Option<&WatchEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn is_done(&self, phase_id: &str) -> bool {
        self.phase_done.get(phase_id).copied().unwrap_or(false)
    }

    /// Returns true only on the first call for `phase_id` within the day.
    pub fn mark_done(&mut self, phase_id: &str) -> bool {
        if self.is_done(phase_id) {
            return false;
        }
        self.phase_done.insert(phase_id.to_string(), true);
        true
    }

    /// Folds a successful pick into the basket and consumes `phase_id`.
    ///
    /// Already-watched instruments keep their original baseline. The phase flag is set even
    /// when nothing new fits so the phase is not retried for the rest of the day.
    pub fn select(
        &mut self,
        phase_id: &str,
        result: &PickResult,
        now: DateTime<Utc>,
        max_entries: usize,
    ) -> Vec<WatchEntry> {
        let mut added = Vec::new();
        for quote in &result.selection {
            if self.entries.len() >= max_entries {
                break;
            }
            if self.contains(&quote.id) {
                continue;
            }
            let entry = WatchEntry {
                id: quote.id.clone(),
                baseline_price: quote.price,
            };
            self.entries.push(entry.clone());
            added.push(entry);
        }

        self.selection_timestamp = Some(now);
        self.band_used = Some(result.band);
        self.mark_done(phase_id);
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::Quote;
    use chrono::TimeZone;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn result(ids: &[(&str, f64)]) -> PickResult {
        PickResult {
            selection: ids
                .iter()
                .map(|(id, price)| Quote::new(*id, *price, price / 1.01).unwrap())
                .collect(),
            band: Band::new(0.4, 0.9).unwrap(),
        }
    }

    #[test]
    fn rollover_resets_everything_on_new_date() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 7, 15, 0).unwrap();
        let mut ledger = WatchLedger::new(day(1));
        ledger.select("pick", &result(&[("A", 10.0)]), now, 3);
        assert!(ledger.is_done("pick"));

        assert!(!ledger.roll_over(day(1)));
        assert_eq!(ledger.entries.len(), 1);

        assert!(ledger.roll_over(day(2)));
        assert_eq!(ledger.date, day(2));
        assert!(ledger.entries.is_empty());
        assert!(ledger.phase_done.is_empty());
        assert!(ledger.band_used.is_none());
    }

    #[test]
    fn baseline_is_kept_on_later_picks() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 7, 15, 0).unwrap();
        let mut ledger = WatchLedger::new(day(1));
        ledger.select("pick-1", &result(&[("A", 10.0), ("B", 20.0)]), now, 3);

        let added = ledger.select("pick-2", &result(&[("A", 12.0), ("C", 30.0)]), now, 3);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].id, "C");
        assert_eq!(ledger.entry("A").unwrap().baseline_price, 10.0);
        assert_eq!(ledger.ids(), vec!["A", "B", "C"]);
    }

    #[test]
    fn full_basket_still_consumes_phase() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 7, 15, 0).unwrap();
        let mut ledger = WatchLedger::new(day(1));
        ledger.select("pick-1", &result(&[("A", 10.0), ("B", 20.0)]), now, 2);

        let added = ledger.select("pick-2", &result(&[("C", 30.0)]), now, 2);
        assert!(added.is_empty());
        assert_eq!(ledger.entries.len(), 2);
        assert!(ledger.is_done("pick-2"));
    }

    #[test]
    fn mark_done_transitions_once() {
        let mut ledger = WatchLedger::new(day(1));
        assert!(ledger.mark_done("eod"));
        assert!(!ledger.mark_done("eod"));
        assert!(ledger.is_done("eod"));
    }
}
