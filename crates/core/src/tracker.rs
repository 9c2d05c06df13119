use crate::domain::ledger::{WatchEntry, WatchLedger};
use crate::domain::quote::Quote;
use serde::Serialize;
use std::collections::HashMap;

/// Percentage move of `fresh` relative to the entry's stored baseline.
pub fn relative_move(entry: &WatchEntry, fresh: &Quote) -> f64 {
    (fresh.price - entry.baseline_price) / entry.baseline_price * 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRow {
    pub id: String,
    pub baseline_price: f64,
    /// `None` when no quote could be obtained for this instrument.
    pub price: Option<f64>,
    pub move_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackReport {
    pub rows: Vec<TrackRow>,
}

impl TrackReport {
    /// Rows with data whose move is non-negative.
    pub fn hits(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.move_pct.is_some_and(|p| p >= 0.0))
            .count()
    }

    pub fn missing(&self) -> usize {
        self.rows.iter().filter(|r| r.move_pct.is_none()).count()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Recomputes every watched instrument against whatever quotes were obtained. Missing quotes
/// yield "no data" rows; the ledger itself is never modified.
pub fn track(ledger: &WatchLedger, quotes: &HashMap<String, Quote>) -> TrackReport {
    let rows = ledger
        .entries
        .iter()
        .map(|entry| match quotes.get(&entry.id) {
            Some(q) => TrackRow {
                id: entry.id.clone(),
                baseline_price: entry.baseline_price,
                price: Some(q.price),
                move_pct: Some(relative_move(entry, q)),
            },
            None => TrackRow {
                id: entry.id.clone(),
                baseline_price: entry.baseline_price,
                price: None,
                move_pct: None,
            },
        })
        .collect();

    TrackReport { rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ledger() -> WatchLedger {
        let mut ledger = WatchLedger::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        ledger.entries = vec![
            WatchEntry {
                id: "A".into(),
                baseline_price: 100.0,
            },
            WatchEntry {
                id: "B".into(),
                baseline_price: 50.0,
            },
            WatchEntry {
                id: "C".into(),
                baseline_price: 10.0,
            },
        ];
        ledger
    }

    #[test]
    fn relative_move_uses_baseline_not_reference() {
        let entry = WatchEntry {
            id: "A".into(),
            baseline_price: 100.0,
        };
        let fresh = Quote::new("A", 103.0, 90.0).unwrap();
        assert!((relative_move(&entry, &fresh) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn missing_quote_is_reported_per_row() {
        let ledger = ledger();
        let mut quotes = HashMap::new();
        quotes.insert("A".to_string(), Quote::new("A", 101.0, 99.0).unwrap());
        quotes.insert("C".to_string(), Quote::new("C", 9.0, 9.5).unwrap());

        let report = track(&ledger, &quotes);
        assert_eq!(report.len(), 3);
        assert_eq!(report.rows[1].id, "B");
        assert_eq!(report.rows[1].price, None);
        assert_eq!(report.missing(), 1);
        assert_eq!(report.hits(), 1);
    }

    #[test]
    fn tracking_never_touches_baselines() {
        let ledger = ledger();
        let before = ledger.clone();
        let mut quotes = HashMap::new();
        quotes.insert("A".to_string(), Quote::new("A", 150.0, 99.0).unwrap());
        let _ = track(&ledger, &quotes);
        let _ = track(&ledger, &quotes);
        assert_eq!(ledger, before);
    }

    #[test]
    fn flat_move_counts_as_hit() {
        let ledger = ledger();
        let mut quotes = HashMap::new();
        quotes.insert("B".to_string(), Quote::new("B", 50.0, 49.0).unwrap());
        assert_eq!(track(&ledger, &quotes).hits(), 1);
    }
}
