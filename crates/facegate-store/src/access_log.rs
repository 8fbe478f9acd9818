//! Bounded, append-only log of access decisions.

use crate::error::StoreError;
use crate::files::{read_json_or_default, write_json};
use crate::metadata::MetadataStore;
use crate::photos::UNKNOWN_IDENTITY;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Entries kept on disk; older ones are dropped first.
pub const MAX_LOG_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessStatus {
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub timestamp: DateTime<Utc>,
    pub user_name: String,
    /// Percentage, rounded to two decimals.
    pub confidence: f32,
    #[serde(default)]
    pub emotion: String,
    #[serde(default)]
    pub suspicious: bool,
    pub status: AccessStatus,
}

/// Convert a 0–1 confidence to the 0–100 scale stored in the log.
pub fn to_percent(confidence: f32) -> f32 {
    (confidence * 100.0 * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCounts {
    pub total_accesses: usize,
    pub total_denials: usize,
    pub suspicious_count: usize,
    pub total_logs: usize,
}

#[derive(Debug, Clone)]
pub struct AccessLogger {
    path: PathBuf,
    retention: usize,
    metadata: MetadataStore,
}

impl AccessLogger {
    pub fn new(path: impl Into<PathBuf>, metadata: MetadataStore) -> Self {
        Self {
            path: path.into(),
            retention: MAX_LOG_ENTRIES,
            metadata,
        }
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    /// All stored entries, oldest first. A corrupt log reads as empty.
    pub fn entries(&self) -> Vec<AccessLogEntry> {
        read_json_or_default(&self.path)
    }

    fn append(&self, entry: AccessLogEntry) -> Result<(), StoreError> {
        let mut entries = self.entries();
        entries.push(entry);
        if entries.len() > self.retention {
            let excess = entries.len() - self.retention;
            entries.drain(..excess);
            tracing::debug!(dropped = excess, "access log trimmed");
        }
        write_json(&self.path, &entries)
    }

    /// Log a granted access and stamp the identity's last-seen time and
    /// access counter.
    ///
    /// The log entry and the metadata update are two separate writes; a
    /// crash between them leaves the counter one behind the log.
    pub fn record_grant(
        &self,
        identity: &str,
        confidence: f32,
        emotion: &str,
        suspicious: bool,
        at: DateTime<Utc>,
    ) -> Result<AccessLogEntry, StoreError> {
        let entry = AccessLogEntry {
            timestamp: at,
            user_name: identity.to_string(),
            confidence: to_percent(confidence),
            emotion: emotion.to_string(),
            suspicious,
            status: AccessStatus::Granted,
        };
        self.append(entry.clone())?;
        self.metadata.touch(identity, at)?;
        tracing::info!(identity, confidence = entry.confidence, suspicious, "access granted");
        Ok(entry)
    }

    /// Log a denied access against the `Unknown` identity.
    pub fn record_deny(&self, confidence: f32, at: DateTime<Utc>) -> Result<AccessLogEntry, StoreError> {
        let entry = AccessLogEntry {
            timestamp: at,
            user_name: UNKNOWN_IDENTITY.to_string(),
            confidence: to_percent(confidence),
            emotion: String::new(),
            suspicious: false,
            status: AccessStatus::Denied,
        };
        self.append(entry.clone())?;
        tracing::info!(confidence = entry.confidence, "access denied");
        Ok(entry)
    }

    /// The `limit` most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AccessLogEntry> {
        let entries = self.entries();
        entries.into_iter().rev().take(limit).collect()
    }

    /// Grant/deny/suspicious counts over the whole log.
    pub fn counts(&self) -> LogCounts {
        let entries = self.entries();
        LogCounts {
            total_accesses: entries.iter().filter(|e| e.status == AccessStatus::Granted).count(),
            total_denials: entries.iter().filter(|e| e.status == AccessStatus::Denied).count(),
            suspicious_count: entries.iter().filter(|e| e.suspicious).count(),
            total_logs: entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Profile, UserRecord};
    use chrono::Duration;

    fn logger(dir: &std::path::Path) -> AccessLogger {
        let metadata = MetadataStore::new(dir.join("users.json"));
        AccessLogger::new(dir.join("access_log.json"), metadata)
    }

    #[test]
    fn test_default_retention() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(logger(dir.path()).retention, MAX_LOG_ENTRIES);
    }

    #[test]
    fn test_fifo_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(dir.path()).with_retention(5);
        let t0 = Utc::now();
        for i in 0..12 {
            log.record_deny(i as f32 / 100.0, t0 + Duration::seconds(i)).unwrap();
            assert!(log.entries().len() <= 5);
        }

        let entries = log.entries();
        assert_eq!(entries.len(), 5);
        // Survivors are the last five appended, still in order.
        let kept: Vec<f32> = entries.iter().map(|e| e.confidence).collect();
        assert_eq!(kept, vec![7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_default_cap_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(dir.path());
        let t0 = Utc::now();
        let full: Vec<AccessLogEntry> = (0..MAX_LOG_ENTRIES as i64)
            .map(|i| AccessLogEntry {
                timestamp: t0 + Duration::seconds(i),
                user_name: UNKNOWN_IDENTITY.to_string(),
                confidence: 0.0,
                emotion: String::new(),
                suspicious: false,
                status: AccessStatus::Denied,
            })
            .collect();
        write_json(&log.path, &full).unwrap();

        let newest = t0 + Duration::seconds(MAX_LOG_ENTRIES as i64);
        log.record_deny(0.0, newest).unwrap();

        let entries = log.entries();
        assert_eq!(entries.len(), MAX_LOG_ENTRIES);
        assert_eq!(entries[0].timestamp, t0 + Duration::seconds(1));
        assert_eq!(entries[MAX_LOG_ENTRIES - 1].timestamp, newest);
        assert_eq!(log.counts().total_logs, MAX_LOG_ENTRIES);
    }

    #[test]
    fn test_recent_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(dir.path());
        let t0 = Utc::now();
        for i in 0..4 {
            log.record_deny(0.0, t0 + Duration::seconds(i)).unwrap();
        }
        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].timestamp, t0 + Duration::seconds(3));
        assert_eq!(recent[1].timestamp, t0 + Duration::seconds(2));
        assert_eq!(log.recent(50).len(), 4);
    }

    #[test]
    fn test_grant_updates_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(dir.path());
        let t0 = Utc::now();
        log.metadata
            .upsert("alice", UserRecord::new("alice", Profile::default(), 3, t0))
            .unwrap();

        let entry = log.record_grant("alice", 0.7, "happy", false, t0).unwrap();
        assert_eq!(entry.confidence, 70.0);
        assert_eq!(entry.status, AccessStatus::Granted);

        let record = log.metadata.get("alice").unwrap();
        assert_eq!(record.total_access_count, 1);
        assert_eq!(record.last_seen, Some(t0));
    }

    #[test]
    fn test_deny_uses_unknown_identity() {
        let dir = tempfile::tempdir().unwrap();
        let entry = logger(dir.path()).record_deny(0.0, Utc::now()).unwrap();
        assert_eq!(entry.user_name, UNKNOWN_IDENTITY);
        assert_eq!(entry.confidence, 0.0);
        assert_eq!(entry.status, AccessStatus::Denied);
    }

    #[test]
    fn test_counts() {
        let dir = tempfile::tempdir().unwrap();
        let log = logger(dir.path());
        let t = Utc::now();
        log.record_grant("a", 0.9, "happy", false, t).unwrap();
        log.record_grant("a", 0.8, "angry", true, t).unwrap();
        log.record_deny(0.0, t).unwrap();

        assert_eq!(
            log.counts(),
            LogCounts {
                total_accesses: 2,
                total_denials: 1,
                suspicious_count: 1,
                total_logs: 3,
            }
        );
    }

    #[test]
    fn test_corrupt_log_reads_empty_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("access_log.json"), "[{").unwrap();
        let log = logger(dir.path());
        assert!(log.entries().is_empty());
        log.record_deny(0.0, Utc::now()).unwrap();
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(to_percent(0.123456), 12.35);
        assert_eq!(to_percent(0.0), 0.0);
    }
}
