use crate::dedup::DedupGuard;
use crate::domain::ledger::WatchLedger;
use crate::movers::MoversCache;
use crate::news::NewsSeenMap;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SNAPSHOT_VERSION: u32 = 1;

fn current_version() -> u32 {
    SNAPSHOT_VERSION
}

/// Everything that must survive between invocations, loaded and saved as one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default = "current_version")]
    pub version: u32,
    pub ledger: WatchLedger,
    #[serde(default)]
    pub dedup: DedupGuard,
    #[serde(default)]
    pub news_seen: NewsSeenMap,
    /// Highest command-stream update id already consumed.
    #[serde(default)]
    pub command_cursor: i64,
    #[serde(default)]
    pub last_command_reply_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_id_reply_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub movers_cache: Option<MoversCache>,
}

impl Snapshot {
    pub fn fresh(today: NaiveDate) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            ledger: WatchLedger::new(today),
            dedup: DedupGuard::default(),
            news_seen: NewsSeenMap::default(),
            command_cursor: 0,
            last_command_reply_at: None,
            last_id_reply_at: None,
            movers_cache: None,
        }
    }

    /// Day rollover: the ledger, dedup records and movers cache are per-day. The news map and
    /// the command cursor carry over.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if !self.ledger.roll_over(today) {
            return false;
        }
        self.dedup.clear();
        self.movers_cache = None;
        true
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-only load. `Ok(None)` when the file does not exist.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        let snapshot = serde_json::from_str::<Snapshot>(&raw)
            .with_context(|| format!("{} is not a valid snapshot", self.path.display()))?;
        Ok(Some(snapshot))
    }

    /// Never fails: a missing file starts fresh, an unreadable one is moved aside to
    /// `<name>.corrupt` and also starts fresh.
    pub fn load_or_fresh(&self, today: NaiveDate) -> Snapshot {
        match self.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::info!(path = %self.path.display(), "no snapshot yet; starting fresh");
                Snapshot::fresh(today)
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %format!("{err:#}"), "snapshot unreadable; starting fresh");
                let quarantine = self.path.with_extension("corrupt");
                if let Err(e) = fs::rename(&self.path, &quarantine) {
                    tracing::warn!(error = %e, "failed to move corrupt snapshot aside");
                }
                Snapshot::fresh(today)
            }
        }
    }

    /// Write-temp-then-rename so a crash mid-write leaves the previous snapshot intact.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(snapshot).context("serialize snapshot")?;
        {
            let mut file = File::create(&tmp).context("create snapshot tmp")?;
            file.write_all(&payload).context("write snapshot tmp")?;
            file.sync_all().context("sync snapshot tmp")?;
        }

        if let Err(err) = fs::rename(&tmp, &self.path) {
            if self.path.exists() {
                let _ = fs::remove_file(&self.path);
                fs::rename(&tmp, &self.path).context("replace snapshot file")?;
            } else {
                return Err(err).context("rename snapshot tmp");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state.json"));

        let mut snap = Snapshot::fresh(day(2));
        snap.ledger.mark_done("open");
        snap.command_cursor = 42;
        snap.dedup
            .record_sent("open", "hi", Utc.with_ymd_and_hms(2024, 1, 2, 7, 0, 0).unwrap());
        store.save(&snap).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, snap);
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn missing_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested").join("state.json"));
        assert!(store.load().unwrap().is_none());

        let snap = store.load_or_fresh(day(2));
        assert_eq!(snap, Snapshot::fresh(day(2)));

        store.save(&snap).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn corrupt_file_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SnapshotStore::new(&path);
        let snap = store.load_or_fresh(day(2));
        assert_eq!(snap.ledger.date, day(2));
        assert!(snap.ledger.is_empty());
        assert!(dir.path().join("state.corrupt").exists());
    }

    #[test]
    fn older_documents_fill_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"ledger": {"date": "2024-01-01"}}"#).unwrap();

        let snap = SnapshotStore::new(&path).load().unwrap().unwrap();
        assert_eq!(snap.version, SNAPSHOT_VERSION);
        assert_eq!(snap.command_cursor, 0);
        assert!(snap.ledger.phase_done.is_empty());
    }

    #[test]
    fn rollover_resets_day_state_but_keeps_cursor_and_news() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 15, 0, 0).unwrap();
        let mut snap = Snapshot::fresh(day(1));
        snap.ledger.mark_done("eod");
        snap.dedup.record_sent("eod", "x", now);
        snap.command_cursor = 7;
        snap.news_seen
            .mark_seen(&[crate::news::NewsItem { title: "t".into(), link: "l".into() }], now);

        assert!(!snap.roll_over(day(1)));
        assert!(snap.roll_over(day(2)));
        assert!(snap.ledger.phase_done.is_empty());
        assert!(snap.dedup.get("eod").is_none());
        assert_eq!(snap.command_cursor, 7);
        assert_eq!(snap.news_seen.len(), 1);
    }
}
