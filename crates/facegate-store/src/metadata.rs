//! Per-identity metadata records, kept in one JSON file keyed by name.

use crate::error::StoreError;
use crate::files::{read_json_or_default, write_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Descriptive fields supplied at registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub employee_id: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub full_name: String,
    #[serde(default)]
    pub employee_id: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub notes: String,
    pub photo_count: usize,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_access_count: u64,
}

impl UserRecord {
    pub fn new(name: &str, profile: Profile, photo_count: usize, now: DateTime<Utc>) -> Self {
        Self {
            full_name: name.to_string(),
            employee_id: profile.employee_id,
            department: profile.department,
            notes: profile.notes,
            photo_count,
            registered_at: now,
            last_seen: None,
            total_access_count: 0,
        }
    }
}

pub type MetadataMap = BTreeMap<String, UserRecord>;

#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load_all(&self) -> MetadataMap {
        read_json_or_default(&self.path)
    }

    pub fn save_all(&self, records: &MetadataMap) -> Result<(), StoreError> {
        write_json(&self.path, records)
    }

    pub fn get(&self, name: &str) -> Option<UserRecord> {
        self.load_all().remove(name)
    }

    pub fn upsert(&self, name: &str, record: UserRecord) -> Result<(), StoreError> {
        let mut all = self.load_all();
        all.insert(name.to_string(), record);
        self.save_all(&all)
    }

    /// Drop a record. Returns whether one existed.
    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        let mut all = self.load_all();
        if all.remove(name).is_none() {
            return Ok(false);
        }
        self.save_all(&all)?;
        Ok(true)
    }

    /// Stamp a successful access: set last-seen and bump the counter.
    /// Unknown names are ignored.
    pub fn touch(&self, name: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut all = self.load_all();
        let Some(record) = all.get_mut(name) else {
            tracing::debug!(identity = name, "no metadata to update for access");
            return Ok(());
        };
        record.last_seen = Some(at);
        record.total_access_count += 1;
        self.save_all(&all)
    }
}
