pub mod google;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
}

#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_news(&self) -> anyhow::Result<Vec<NewsItem>>;
}

/// Lowercased, whitespace-collapsed title used as the dedup key.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalized title → first time it was delivered. Governs at-most-once delivery of a headline
/// for as long as it is retained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NewsSeenMap {
    seen: BTreeMap<String, DateTime<Utc>>,
}

impl NewsSeenMap {
    pub fn prune(&mut self, now: DateTime<Utc>, retention: Duration) {
        let cutoff = now - retention;
        self.seen.retain(|_, first_seen| *first_seen >= cutoff);
    }

    pub fn contains(&self, title: &str) -> bool {
        self.seen.contains_key(&normalize_title(title))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Up to `max` unseen items, in input order, skipping duplicates within `items`. Prunes
    /// expired entries first but does not mark anything; call [`NewsSeenMap::mark_seen`] once
    /// the message carrying them was delivered.
    pub fn select_new(
        &mut self,
        items: &[NewsItem],
        now: DateTime<Utc>,
        retention: Duration,
        max: usize,
    ) -> Vec<NewsItem> {
        self.prune(now, retention);

        let mut batch = HashSet::new();
        let mut out = Vec::new();
        for item in items {
            if out.len() >= max {
                break;
            }
            let key = normalize_title(&item.title);
            if key.is_empty() || self.seen.contains_key(&key) || !batch.insert(key) {
                continue;
            }
            out.push(item.clone());
        }
        out
    }

    pub fn mark_seen(&mut self, items: &[NewsItem], now: DateTime<Utc>) {
        for item in items {
            self.seen.entry(normalize_title(&item.title)).or_insert(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(title: &str) -> NewsItem {
        NewsItem {
            title: title.to_string(),
            link: format!("https://example.com/{}", title.len()),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap()
    }

    #[test]
    fn selects_unseen_up_to_max() {
        let mut map = NewsSeenMap::default();
        let items = vec![item("A"), item("b"), item("C"), item("D")];
        let picked = map.select_new(&items, t0(), Duration::days(7), 3);
        assert_eq!(picked.len(), 3);
        assert!(map.is_empty());

        map.mark_seen(&picked, t0());
        let next = map.select_new(&items, t0(), Duration::days(7), 3);
        assert_eq!(next, vec![item("D")]);
    }

    #[test]
    fn titles_compare_normalized() {
        let mut map = NewsSeenMap::default();
        map.mark_seen(&[item("BIST  100 rallies")], t0());
        assert!(map.contains("bist 100 RALLIES"));

        let dupes = vec![item("Same Title"), item("same   title")];
        assert_eq!(map.select_new(&dupes, t0(), Duration::days(7), 5).len(), 1);
    }

    #[test]
    fn entries_expire_after_retention() {
        let mut map = NewsSeenMap::default();
        map.mark_seen(&[item("old")], t0());

        let later = t0() + Duration::days(7) + Duration::seconds(1);
        let picked = map.select_new(&[item("old")], later, Duration::days(7), 3);
        assert_eq!(picked.len(), 1);
        assert!(map.is_empty());
    }
}
