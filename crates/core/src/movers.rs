use crate::domain::quote::Quote;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const VOLUME_SCORE_WEIGHT: f64 = 0.35;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mover {
    pub id: String,
    pub price: f64,
    pub change_pct: f64,
    pub volume_ratio: Option<f64>,
    pub score: f64,
}

impl Mover {
    pub fn from_quote(q: &Quote) -> Self {
        Self {
            id: q.id.clone(),
            price: q.price,
            change_pct: q.change_pct,
            volume_ratio: q.volume_ratio,
            score: q.change_pct + q.volume_ratio.unwrap_or(0.0) * VOLUME_SCORE_WEIGHT,
        }
    }
}

/// Market breadth plus the strongest and weakest names of a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoversSummary {
    pub up: usize,
    pub down: usize,
    pub flat: usize,
    pub top: Vec<Mover>,
    /// Weakest first.
    pub bottom: Vec<Mover>,
}

pub fn summarize(movers: &[Mover], top_n: usize) -> MoversSummary {
    let up = movers.iter().filter(|m| m.change_pct > 0.0).count();
    let down = movers.iter().filter(|m| m.change_pct < 0.0).count();

    let mut sorted: Vec<&Mover> = movers.iter().collect();
    sorted.sort_by(|a, b| b.change_pct.total_cmp(&a.change_pct));

    let top = sorted.iter().take(top_n).map(|m| (*m).clone()).collect();
    let bottom = sorted.iter().rev().take(top_n).map(|m| (*m).clone()).collect();

    MoversSummary {
        up,
        down,
        flat: movers.len() - up - down,
        top,
        bottom,
    }
}

/// Last universe scan, reused by invocations that land within the cache lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoversCache {
    pub fetched_at: DateTime<Utc>,
    pub movers: Vec<Mover>,
}

impl MoversCache {
    pub fn from_quotes<'a>(quotes: impl IntoIterator<Item = &'a Quote>, now: DateTime<Utc>) -> Self {
        let mut movers: Vec<Mover> = quotes.into_iter().map(Mover::from_quote).collect();
        movers.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            fetched_at: now,
            movers,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        !self.movers.is_empty() && now - self.fetched_at <= ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mover(id: &str, change_pct: f64) -> Mover {
        let q = Quote::new(id, 100.0 + change_pct, 100.0).unwrap();
        Mover::from_quote(&q)
    }

    #[test]
    fn counts_breadth_and_orders_extremes() {
        let movers = vec![
            mover("A", 1.0),
            mover("B", -2.0),
            mover("C", 0.0),
            mover("D", 3.0),
            mover("E", -0.5),
        ];
        let s = summarize(&movers, 2);
        assert_eq!((s.up, s.down, s.flat), (2, 2, 1));
        assert_eq!(s.top.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["D", "A"]);
        assert_eq!(s.bottom.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["B", "E"]);
    }

    #[test]
    fn score_adds_weighted_volume_ratio() {
        let q = Quote::new("A", 101.0, 100.0)
            .unwrap()
            .with_volume(Some(200.0), Some(100.0));
        let m = Mover::from_quote(&q);
        assert!((m.score - (1.0 + 0.7)).abs() < 1e-9);
    }

    #[test]
    fn cache_expires_after_ttl() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap();
        let q = Quote::new("A", 101.0, 100.0).unwrap();
        let cache = MoversCache::from_quotes([&q], t0);
        let ttl = Duration::seconds(120);
        assert!(cache.is_fresh(t0 + Duration::seconds(120), ttl));
        assert!(!cache.is_fresh(t0 + Duration::seconds(121), ttl));

        let empty = MoversCache::from_quotes(Vec::<&Quote>::new(), t0);
        assert!(!empty.is_fresh(t0, ttl));
    }
}
