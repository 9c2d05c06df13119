use crate::domain::quote::Quote;
use anyhow::ensure;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Last resort when none of the configured bands fills the basket.
pub const FALLBACK_BAND: Band = Band { lo: 0.0, hi: 3.0 };

/// Closed percentage-change interval `[lo, hi]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub lo: f64,
    pub hi: f64,
}

impl Band {
    pub fn new(lo: f64, hi: f64) -> anyhow::Result<Self> {
        ensure!(lo.is_finite() && hi.is_finite(), "band bounds must be finite");
        ensure!(lo <= hi, "band lower bound {lo} exceeds upper bound {hi}");
        Ok(Self { lo, hi })
    }

    pub fn contains(&self, pct: f64) -> bool {
        self.lo <= pct && pct <= self.hi
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}% – {:.2}%", self.lo, self.hi)
    }
}

impl FromStr for Band {
    type Err = anyhow::Error;

    /// Parses `"0.40-0.90"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // Skip a leading sign so "-0.5-1.0" still splits on the separator.
        let split_at = s
            .char_indices()
            .skip(1)
            .find(|(_, c)| *c == '-')
            .map(|(i, _)| i);
        let Some(i) = split_at else {
            anyhow::bail!("band must look like LO-HI (got {s:?})");
        };
        let lo = s[..i].trim().parse::<f64>()?;
        let hi = s[i + 1..].trim().parse::<f64>()?;
        Band::new(lo, hi)
    }
}

/// How candidates inside a band are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMode {
    /// `volume_ratio * 10 + change_pct`; volume surprise dominates momentum.
    #[default]
    VolumeWeighted,
    ChangeOnly,
}

impl FromStr for RankMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "volume" | "volume_weighted" => Ok(Self::VolumeWeighted),
            "change" | "change_only" => Ok(Self::ChangeOnly),
            other => anyhow::bail!("unknown rank mode {other:?} (expected volume|change)"),
        }
    }
}

pub fn rank(q: &Quote, mode: RankMode) -> f64 {
    match mode {
        RankMode::VolumeWeighted => q.volume_ratio.unwrap_or(0.0) * 10.0 + q.change_pct,
        RankMode::ChangeOnly => q.change_pct,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PickResult {
    pub selection: Vec<Quote>,
    pub band: Band,
}

/// Progressive band widening with early stop.
///
/// Bands are tried in the given order; the first one holding at least `count` positive movers
/// wins and its top `count` by [`rank`] are returned. Equal ranks keep input order. When no band
/// qualifies, [`FALLBACK_BAND`] is used only if it yields exactly `count` candidates.
pub fn pick(quotes: &[Quote], bands: &[Band], count: usize, mode: RankMode) -> Option<PickResult> {
    if count == 0 {
        return None;
    }

    let positive: Vec<&Quote> = quotes
        .iter()
        .filter(|q| q.change_pct.is_finite() && q.change_pct > 0.0)
        .collect();

    for band in bands {
        let pool = ranked_in_band(&positive, *band, mode);
        if pool.len() >= count {
            return Some(PickResult {
                selection: pool.into_iter().take(count).cloned().collect(),
                band: *band,
            });
        }
    }

    let fallback: Vec<&Quote> = ranked_in_band(&positive, FALLBACK_BAND, mode)
        .into_iter()
        .take(count)
        .collect();
    if fallback.len() == count {
        return Some(PickResult {
            selection: fallback.into_iter().cloned().collect(),
            band: FALLBACK_BAND,
        });
    }

    None
}

fn ranked_in_band<'a>(candidates: &[&'a Quote], band: Band, mode: RankMode) -> Vec<&'a Quote> {
    let mut pool: Vec<&Quote> = candidates
        .iter()
        .copied()
        .filter(|q| band.contains(q.change_pct))
        .collect();
    // sort_by is stable, so ties keep input order.
    pool.sort_by(|a, b| rank(b, mode).total_cmp(&rank(a, mode)));
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(id: &str, change_pct: f64, volume_ratio: Option<f64>) -> Quote {
        Quote {
            id: id.to_string(),
            price: 100.0 + change_pct,
            reference_price: 100.0,
            change_pct,
            volume: None,
            average_volume: None,
            volume_ratio,
        }
    }

    fn bands(pairs: &[(f64, f64)]) -> Vec<Band> {
        pairs.iter().map(|(lo, hi)| Band::new(*lo, *hi).unwrap()).collect()
    }

    fn ids(result: &PickResult) -> Vec<&str> {
        result.selection.iter().map(|q| q.id.as_str()).collect()
    }

    #[test]
    fn narrow_band_ranked_by_volume_surprise() {
        let quotes = vec![
            quote("A", 0.5, Some(1.0)),
            quote("B", 0.8, Some(2.0)),
            quote("C", 1.1, Some(0.5)),
        ];
        let result = pick(
            &quotes,
            &bands(&[(0.4, 0.9), (0.0, 3.0)]),
            2,
            RankMode::VolumeWeighted,
        )
        .unwrap();

        assert_eq!(ids(&result), vec!["B", "A"]);
        assert_eq!(result.band, Band::new(0.4, 0.9).unwrap());
    }

    #[test]
    fn stops_at_first_band_that_fills_the_basket() {
        let quotes = vec![
            quote("A", 0.5, None),
            quote("B", 0.6, None),
            quote("C", 2.5, Some(9.0)),
        ];
        let result = pick(
            &quotes,
            &bands(&[(0.4, 0.9), (0.0, 3.0)]),
            2,
            RankMode::VolumeWeighted,
        )
        .unwrap();

        // C would rank first in the wider band but is never considered.
        assert_eq!(ids(&result), vec!["B", "A"]);
        assert_eq!(result.band.hi, 0.9);
    }

    #[test]
    fn widens_until_count_is_reached() {
        let quotes = vec![
            quote("A", 0.5, None),
            quote("B", 1.1, None),
            quote("C", 1.4, None),
        ];
        let result = pick(
            &quotes,
            &bands(&[(0.4, 0.9), (0.4, 1.2), (0.2, 1.5)]),
            3,
            RankMode::VolumeWeighted,
        )
        .unwrap();

        assert_eq!(result.band, Band::new(0.2, 1.5).unwrap());
        assert_eq!(result.selection.len(), 3);
    }

    #[test]
    fn ignores_flat_and_negative_movers() {
        let quotes = vec![
            quote("A", 0.0, Some(5.0)),
            quote("B", -0.5, Some(5.0)),
            quote("C", 0.5, None),
        ];
        assert!(pick(&quotes, &bands(&[(-1.0, 1.0)]), 2, RankMode::VolumeWeighted).is_none());
    }

    #[test]
    fn fallback_band_applies_when_configured_bands_fall_short() {
        let quotes = vec![quote("A", 2.0, None), quote("B", 2.5, None)];
        let result = pick(&quotes, &bands(&[(0.4, 0.9)]), 2, RankMode::ChangeOnly).unwrap();
        assert_eq!(result.band, FALLBACK_BAND);
        assert_eq!(ids(&result), vec!["B", "A"]);
    }

    #[test]
    fn empty_when_even_fallback_is_short() {
        let quotes = vec![quote("A", 2.0, None), quote("B", 4.0, None)];
        assert!(pick(&quotes, &bands(&[(0.4, 0.9)]), 2, RankMode::ChangeOnly).is_none());
    }

    #[test]
    fn returns_exactly_count() {
        let quotes: Vec<Quote> = (1..=10)
            .map(|i| quote(&format!("S{i}"), 0.1 * i as f64, None))
            .collect();
        for count in 1..=5 {
            let result = pick(&quotes, &bands(&[(0.0, 3.0)]), count, RankMode::ChangeOnly).unwrap();
            assert_eq!(result.selection.len(), count);
        }
    }

    #[test]
    fn ties_keep_input_order() {
        let quotes = vec![
            quote("A", 0.5, None),
            quote("B", 0.5, None),
            quote("C", 0.5, None),
        ];
        let result = pick(&quotes, &bands(&[(0.0, 1.0)]), 2, RankMode::ChangeOnly).unwrap();
        assert_eq!(ids(&result), vec!["A", "B"]);
    }

    #[test]
    fn change_only_mode_ignores_volume() {
        let quotes = vec![quote("A", 0.5, Some(9.0)), quote("B", 0.8, None)];
        let result = pick(&quotes, &bands(&[(0.0, 1.0)]), 1, RankMode::ChangeOnly).unwrap();
        assert_eq!(ids(&result), vec!["B"]);
    }

    #[test]
    fn parses_band_and_rank_mode() {
        assert_eq!("0.40-0.90".parse::<Band>().unwrap(), Band::new(0.4, 0.9).unwrap());
        assert_eq!("-0.5-1".parse::<Band>().unwrap(), Band::new(-0.5, 1.0).unwrap());
        assert!("0.9-0.4".parse::<Band>().is_err());
        assert!("abc".parse::<Band>().is_err());
        assert_eq!("change".parse::<RankMode>().unwrap(), RankMode::ChangeOnly);
        assert!("momentum".parse::<RankMode>().is_err());
    }
}
