//! Persistence of per-application usage history.
//!
//! The whole history lives in a single `activity.json` document mapping
//! application name to [UsageRecord]. Loads are tolerant: a missing or
//! malformed file degrades to an empty document with a logged warning, never
//! an error. Saves write a sibling temp file and atomically rename it over the
//! document so an interrupted write can't leave a half-written file behind.

use std::{
    collections::HashMap,
    marker::PhantomData,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use fs4::tokio::AsyncFileExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::warn;

/// One contiguous interval during which an application was judged running.
/// Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Seconds between start and end, stored explicitly so statistics stay a
    /// plain sum.
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageRecord {
    pub total_time: f64,
    pub launch_count: u64,
    #[serde(with = "last_used_ser", default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

pub type UsageDocument = HashMap<String, UsageRecord>;

pub type UsageStore = DocumentFile<UsageDocument>;

pub fn usage_store(data_dir: &Path) -> UsageStore {
    DocumentFile::new(data_dir.join("activity.json"))
}

/// The launcher historically stored "never used" as an empty string, so the
/// document keeps that shape on disk.
mod last_used_ser {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_str(&v.to_rfc3339()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(None);
        }
        DateTime::parse_from_rfc3339(&s)
            .map(|v| Some(v.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom)
    }
}

/// A JSON document on disk, shared between the daemon and CLI processes.
/// Readers take a shared advisory lock; writers are serialized internally and
/// replace the document atomically.
pub struct DocumentFile<T> {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned + Default> DocumentFile<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: tokio::sync::Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Loads the document, degrading to the empty default on any failure.
    pub async fn load(&self) -> T {
        match self.load_inner().await {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Failed to load document {:?}: {e}", self.path);
                T::default()
            }
        }
    }

    async fn load_inner(&self) -> Result<T> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(e.into()),
        };

        file.lock_shared()?;
        let mut content = String::new();
        let read = file.read_to_string(&mut content).await;
        file.unlock_async().await?;
        read?;

        Ok(serde_json::from_str(&content)?)
    }

    /// Writes the full document. All-or-nothing: the temp file replaces the
    /// document only after a successful write and flush.
    pub async fn save(&self, document: &T) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let content = serde_json::to_vec_pretty(document)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let mut tmp = tokio::fs::File::create(&tmp_path).await?;
        tmp.write_all(&content).await?;
        tmp.flush().await?;
        tmp.sync_all().await?;
        drop(tmp);

        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

/// Time-windowed view over one application's usage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppStatistics {
    pub total_time: f64,
    pub period_time: f64,
    pub total_launches: u64,
    pub period_launches: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub avg_session_time: f64,
}

/// Computes per-application statistics over the trailing `period_days` window.
/// Pure and side-effect free; O(total sessions).
pub fn statistics(
    document: &UsageDocument,
    period_days: i64,
    now: DateTime<Utc>,
) -> HashMap<String, AppStatistics> {
    let cutoff = now - Duration::days(period_days);

    document
        .iter()
        .map(|(name, record)| {
            let mut period_time = 0.;
            let mut period_launches = 0u64;
            for session in &record.sessions {
                if session.start >= cutoff {
                    period_time += session.duration;
                    period_launches += 1;
                }
            }

            let avg_session_time = if period_launches > 0 {
                period_time / period_launches as f64
            } else {
                0.
            };

            (
                name.clone(),
                AppStatistics {
                    total_time: record.total_time,
                    period_time,
                    total_launches: record.launch_count,
                    period_launches,
                    last_used: record.last_used,
                    avg_session_time,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use super::{statistics, usage_store, Session, UsageDocument, UsageRecord};

    fn record_with_sessions(sessions: Vec<Session>) -> UsageRecord {
        UsageRecord {
            total_time: sessions.iter().map(|s| s.duration).sum(),
            launch_count: sessions.len() as u64,
            last_used: sessions.last().map(|s| s.start),
            sessions,
        }
    }

    fn session(start: chrono::DateTime<Utc>, duration: f64) -> Session {
        Session {
            start,
            end: start + Duration::seconds(duration as i64),
            duration,
        }
    }

    #[tokio::test]
    async fn save_load_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let store = usage_store(dir.path());

        let start = Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap();
        let mut document = UsageDocument::new();
        document.insert(
            "Chrome".into(),
            record_with_sessions(vec![session(start, 120.), session(start, 45.5)]),
        );
        document.insert("Never Run".into(), UsageRecord::default());

        store.save(&document).await?;
        let loaded = store.load().await;

        assert_eq!(loaded, document);
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = usage_store(dir.path());
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_file_loads_empty() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("activity.json"), "{{{ definitely not json").unwrap();
        let store = usage_store(dir.path());
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn save_replaces_previous_content() -> Result<()> {
        let dir = tempdir()?;
        let store = usage_store(dir.path());

        let mut first = UsageDocument::new();
        first.insert("Old".into(), UsageRecord::default());
        store.save(&first).await?;

        let second = UsageDocument::new();
        store.save(&second).await?;

        assert!(store.load().await.is_empty());
        assert!(!dir.path().join("activity.json.tmp").exists());
        Ok(())
    }

    #[test]
    fn statistics_filters_sessions_by_window() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let recent = now - Duration::hours(2);
        let old = now - Duration::days(10);

        let mut document = UsageDocument::new();
        document.insert(
            "Editor".into(),
            record_with_sessions(vec![session(old, 600.), session(recent, 300.)]),
        );

        let stats = statistics(&document, 7, now);
        let editor = &stats["Editor"];

        assert_eq!(editor.total_time, 900.);
        assert_eq!(editor.period_time, 300.);
        assert_eq!(editor.total_launches, 2);
        assert_eq!(editor.period_launches, 1);
        assert_eq!(editor.avg_session_time, 300.);
    }

    #[test]
    fn statistics_without_recent_launches_has_zero_average() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let old = now - Duration::days(30);

        let mut document = UsageDocument::new();
        document.insert(
            "Dormant".into(),
            record_with_sessions(vec![session(old, 1000.)]),
        );

        let stats = statistics(&document, 7, now);
        assert_eq!(stats["Dormant"].period_time, 0.);
        assert_eq!(stats["Dormant"].avg_session_time, 0.);
        assert_eq!(stats["Dormant"].total_time, 1000.);
    }
}
