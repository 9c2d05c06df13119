use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub key: String,
    pub content_hash: String,
    pub last_sent_at: DateTime<Utc>,
}

/// Stable across processes, unlike `std::hash`.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Content-hash + cooldown suppression, one record per logical message key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupGuard {
    records: BTreeMap<String, DedupRecord>,
}

impl DedupGuard {
    /// Changed content is always allowed; identical content waits for the cooldown.
    pub fn should_send(
        &self,
        key: &str,
        content: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> bool {
        let Some(prev) = self.records.get(key) else {
            return true;
        };
        if prev.content_hash != content_hash(content) {
            return true;
        }
        now - prev.last_sent_at >= cooldown
    }

    /// Only call after the transport confirmed delivery.
    pub fn record_sent(&mut self, key: &str, content: &str, now: DateTime<Utc>) {
        self.records.insert(
            key.to_string(),
            DedupRecord {
                key: key.to_string(),
                content_hash: content_hash(content),
                last_sent_at: now,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&DedupRecord> {
        self.records.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &DedupRecord> {
        self.records.values()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
