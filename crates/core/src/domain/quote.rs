use serde::{Deserialize, Serialize};

/// Best-effort snapshot of one instrument at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: String,
    pub price: f64,
    pub reference_price: f64,
    pub change_pct: f64,
    pub volume: Option<f64>,
    pub average_volume: Option<f64>,
    pub volume_ratio: Option<f64>,
}

impl Quote {
    /// Returns `None` when the reference price is missing, zero or not finite, since the
    /// percentage change is undefined for such quotes.
    pub fn new(id: impl Into<String>, price: f64, reference_price: f64) -> Option<Self> {
        if !price.is_finite() || price <= 0.0 {
            return None;
        }
        if !reference_price.is_finite() || reference_price <= 0.0 {
            return None;
        }

        Some(Self {
            id: id.into(),
            price,
            reference_price,
            change_pct: (price - reference_price) / reference_price * 100.0,
            volume: None,
            average_volume: None,
            volume_ratio: None,
        })
    }

    pub fn with_volume(mut self, volume: Option<f64>, average_volume: Option<f64>) -> Self {
        self.volume = volume.filter(|v| v.is_finite() && *v >= 0.0);
        self.average_volume = average_volume.filter(|v| v.is_finite() && *v > 0.0);
        self.volume_ratio = match (self.volume, self.average_volume) {
            (Some(v), Some(avg)) => Some(v / avg),
            _ => None,
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_change_pct_from_reference() {
        let q = Quote::new("AKBNK.IS", 101.0, 100.0).unwrap();
        assert!((q.change_pct - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_missing_or_zero_reference() {
        assert!(Quote::new("X", 10.0, 0.0).is_none());
        assert!(Quote::new("X", 10.0, f64::NAN).is_none());
        assert!(Quote::new("X", 0.0, 10.0).is_none());
    }

    #[test]
    fn volume_ratio_needs_positive_average() {
        let q = Quote::new("X", 10.0, 9.0)
            .unwrap()
            .with_volume(Some(300.0), Some(150.0));
        assert_eq!(q.volume_ratio, Some(2.0));

        let q = Quote::new("X", 10.0, 9.0)
            .unwrap()
            .with_volume(Some(300.0), Some(0.0));
        assert_eq!(q.volume_ratio, None);
        assert_eq!(q.volume, Some(300.0));
    }
}
