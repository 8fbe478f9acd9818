//! Facade tying photo directories, metadata, embeddings and the access log
//! together.
//!
//! Mutating methods take `&mut self`: one owner drives all writes, so the
//! on-disk files only ever see a single writer.

use crate::access_log::{AccessLogEntry, AccessLogger, LogCounts};
use crate::embeddings::EmbeddingStore;
use crate::error::{RegistrationError, StoreError};
use crate::layout::StoreLayout;
use crate::metadata::{MetadataStore, Profile, UserRecord};
use crate::photos::{validate_name, PhotoDirectory};
use chrono::{DateTime, Utc};
use facegate_core::{EmbeddingDatabase, FaceAnalyzer};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Allowed number of reference photos per registration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationLimits {
    pub min_photos: usize,
    pub max_photos: usize,
    /// Shown to operators; not enforced.
    pub recommended_photos: usize,
}

impl Default for RegistrationLimits {
    fn default() -> Self {
        Self {
            min_photos: 3,
            max_photos: 7,
            recommended_photos: 4,
        }
    }
}

impl RegistrationLimits {
    pub fn check(&self, count: usize) -> Result<(), RegistrationError> {
        if count < self.min_photos || count > self.max_photos {
            return Err(RegistrationError::PhotoCount {
                count,
                min: self.min_photos,
                max: self.max_photos,
            });
        }
        Ok(())
    }
}

/// A registration request.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub profile: Profile,
    pub photos: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registered {
    pub name: String,
    pub record: UserRecord,
    /// Embeddings extracted for the new identity. Zero means it is stored
    /// but cannot be matched.
    pub embeddings: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub name: String,
    pub photo_count: usize,
    pub record: Option<UserRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_users: usize,
    pub total_photos: usize,
    pub total_accesses: usize,
    pub total_denials: usize,
    pub suspicious_count: usize,
    pub total_logs: usize,
}

pub struct Database {
    photos: PhotoDirectory,
    metadata: MetadataStore,
    embeddings: EmbeddingStore,
    access: AccessLogger,
    limits: RegistrationLimits,
    /// Last database loaded or rebuilt; dropped whenever the files change.
    cached: Option<EmbeddingDatabase>,
}

impl Database {
    pub fn open(layout: &StoreLayout, limits: RegistrationLimits) -> Result<Self, StoreError> {
        let faces = layout.faces_dir();
        std::fs::create_dir_all(&faces).map_err(|e| StoreError::io(&faces, e))?;

        let photos = PhotoDirectory::new(faces);
        let metadata = MetadataStore::new(layout.users_path());
        tracing::info!(root = %layout.root().display(), "opened face database");

        Ok(Self {
            embeddings: EmbeddingStore::new(layout.embeddings_path(), photos.clone()),
            access: AccessLogger::new(layout.access_log_path(), metadata.clone()),
            photos,
            metadata,
            limits,
            cached: None,
        })
    }

    pub fn with_log_retention(mut self, retention: usize) -> Self {
        self.access = self.access.with_retention(retention);
        self
    }

    pub fn limits(&self) -> RegistrationLimits {
        self.limits
    }

    /// Copy the photos in, save metadata, then rebuild the embedding
    /// database.
    pub fn register(
        &mut self,
        request: Registration,
        analyzer: &dyn FaceAnalyzer,
        now: DateTime<Utc>,
    ) -> Result<Registered, StoreError> {
        let name = validate_name(&request.name)?;
        self.limits.check(request.photos.len())?;
        if self.photos.exists(&name) {
            return Err(RegistrationError::AlreadyRegistered(name).into());
        }

        self.cached = None;
        let count = self.photos.create(&name, &request.photos)?;
        let record = UserRecord::new(&name, request.profile, count, now);
        if let Err(e) = self.metadata.upsert(&name, record.clone()) {
            // Keep directory and metadata paired.
            if let Err(cleanup) = self.photos.remove(&name) {
                tracing::warn!(identity = %name, error = %cleanup, "failed to roll back photos");
            }
            return Err(e);
        }

        // The identity is committed from here on; a failed rebuild leaves it
        // registered but unmatchable until the next successful rebuild.
        let embeddings = match self.rebuild(analyzer) {
            Ok(database) => database.get(&name).map_or(0, Vec::len),
            Err(e) => {
                tracing::warn!(identity = %name, error = %e, "embedding rebuild failed after registration");
                0
            }
        };
        if embeddings == 0 {
            tracing::warn!(identity = %name, "registered without any usable face; it will never match");
        }
        tracing::info!(identity = %name, photos = count, embeddings, "identity registered");

        Ok(Registered {
            name,
            record,
            embeddings,
        })
    }

    /// Remove the photo directory and the metadata record of `name`, then
    /// rebuild. Returns false when neither existed.
    pub fn delete(&mut self, name: &str, analyzer: &dyn FaceAnalyzer) -> Result<bool, StoreError> {
        let name = validate_name(name)?;
        self.cached = None;
        let had_photos = self.photos.remove(&name)?;
        // Embeddings follow the photos even if the metadata write fails.
        let had_record = self.metadata.remove(&name);
        if had_photos {
            self.rebuild(analyzer)?;
        }
        let had_record = had_record?;
        if !had_photos && !had_record {
            return Ok(false);
        }
        tracing::info!(identity = %name, "identity deleted");
        Ok(true)
    }

    pub fn rebuild(&mut self, analyzer: &dyn FaceAnalyzer) -> Result<&EmbeddingDatabase, StoreError> {
        let database = self.embeddings.rebuild(analyzer)?;
        Ok(&*self.cached.insert(database))
    }

    /// The embedding database, loading (or rebuilding) it on first use.
    pub fn embeddings(&mut self, analyzer: &dyn FaceAnalyzer) -> Result<&EmbeddingDatabase, StoreError> {
        if self.cached.is_none() {
            let mut database = self.embeddings.load(analyzer)?;
            // A blob left behind by an interrupted delete may still name
            // identities whose photos are gone.
            database.retain(|name, _| {
                let present = self.photos.exists(name);
                if !present {
                    tracing::warn!(identity = %name, "dropping embeddings without photos");
                }
                present
            });
            self.cached = Some(database);
        }
        Ok(&*self.cached.get_or_insert_with(EmbeddingDatabase::new))
    }

    pub fn identities(&self) -> Vec<String> {
        self.photos.identities()
    }

    /// Registered identities whose name or employee id contains `search`
    /// (case-insensitive).
    pub fn users(&self, search: Option<&str>) -> Vec<UserSummary> {
        let needle = search.map(str::to_lowercase).filter(|s| !s.is_empty());
        let mut records = self.metadata.load_all();

        self.photos
            .identities()
            .into_iter()
            .map(|name| UserSummary {
                photo_count: self.photos.photo_count(&name),
                record: records.remove(&name),
                name,
            })
            .filter(|u| match &needle {
                None => true,
                Some(n) => {
                    u.name.to_lowercase().contains(n)
                        || u.record
                            .as_ref()
                            .is_some_and(|r| r.employee_id.to_lowercase().contains(n))
                }
            })
            .collect()
    }

    pub fn user(&self, name: &str) -> Option<UserSummary> {
        let name = validate_name(name).ok()?;
        if !self.photos.exists(&name) {
            return None;
        }
        Some(UserSummary {
            photo_count: self.photos.photo_count(&name),
            record: self.metadata.get(&name),
            name,
        })
    }

    pub fn record_grant(
        &mut self,
        identity: &str,
        confidence: f32,
        emotion: &str,
        suspicious: bool,
        at: DateTime<Utc>,
    ) -> Result<AccessLogEntry, StoreError> {
        self.access.record_grant(identity, confidence, emotion, suspicious, at)
    }

    pub fn record_deny(&mut self, confidence: f32, at: DateTime<Utc>) -> Result<AccessLogEntry, StoreError> {
        self.access.record_deny(confidence, at)
    }

    pub fn recent(&self, limit: usize) -> Vec<AccessLogEntry> {
        self.access.recent(limit)
    }

    pub fn statistics(&self) -> Statistics {
        let identities = self.photos.identities();
        let LogCounts {
            total_accesses,
            total_denials,
            suspicious_count,
            total_logs,
        } = self.access.counts();

        Statistics {
            total_users: identities.len(),
            total_photos: identities.iter().map(|n| self.photos.photo_count(n)).sum(),
            total_accesses,
            total_denials,
            suspicious_count,
            total_logs,
        }
    }
}
