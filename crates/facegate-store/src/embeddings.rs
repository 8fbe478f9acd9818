//! Persisted identity → embeddings mapping, always rebuilt wholesale.

use crate::error::StoreError;
use crate::files::write_atomic;
use crate::photos::PhotoDirectory;
use facegate_core::{EmbeddingDatabase, FaceAnalyzer};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    path: PathBuf,
    photos: PhotoDirectory,
}

impl EmbeddingStore {
    pub fn new(path: impl Into<PathBuf>, photos: PhotoDirectory) -> Self {
        Self {
            path: path.into(),
            photos,
        }
    }

    /// Embed every reference photo of every identity and replace the
    /// persisted database.
    ///
    /// Photos the analyzer cannot embed are skipped. An identity left with
    /// no embeddings is left out of the database entirely and so can never
    /// be matched.
    pub fn rebuild(&self, analyzer: &dyn FaceAnalyzer) -> Result<EmbeddingDatabase, StoreError> {
        let mut database = EmbeddingDatabase::new();

        for name in self.photos.identities() {
            let mut embeddings = Vec::new();
            for photo in self.photos.photos(&name) {
                match analyzer.embed(&photo) {
                    Ok(e) => embeddings.push(e),
                    Err(e) => tracing::warn!(
                        identity = %name,
                        photo = %photo.display(),
                        error = %e,
                        "skipping photo without usable embedding"
                    ),
                }
            }

            if embeddings.is_empty() {
                tracing::warn!(identity = %name, "no valid embeddings; identity excluded");
                continue;
            }
            tracing::debug!(identity = %name, count = embeddings.len(), "embedded identity");
            database.insert(name, embeddings);
        }

        self.save(&database)?;
        tracing::info!(identities = database.len(), "embedding database rebuilt");
        Ok(database)
    }

    /// Load the persisted database, rebuilding it when it is absent or
    /// cannot be decoded.
    pub fn load(&self, analyzer: &dyn FaceAnalyzer) -> Result<EmbeddingDatabase, StoreError> {
        match std::fs::read(&self.path) {
            Ok(raw) => match postcard::from_bytes(&raw) {
                Ok(db) => return Ok(db),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "corrupt embedding database")
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no embedding database yet")
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        }
        self.rebuild(analyzer)
    }

    fn save(&self, database: &EmbeddingDatabase) -> Result<(), StoreError> {
        let data = postcard::to_allocvec(database).map_err(|e| StoreError::Encode {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        write_atomic(&self.path, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_core::testing::{solid_image, ColorAnalyzer};

    fn store(root: &std::path::Path) -> (EmbeddingStore, PhotoDirectory) {
        let photos = PhotoDirectory::new(root.join("faces"));
        (EmbeddingStore::new(root.join("embeddings.bin"), photos.clone()), photos)
    }

    #[test]
    fn test_rebuild_skips_faceless_photos() {
        let dir = tempfile::tempdir().unwrap();
        let (store, photos) = store(dir.path());
        let srcs = vec![
            solid_image(dir.path(), "a.png", [200, 0, 0]),
            solid_image(dir.path(), "b.png", [0, 0, 0]),
            solid_image(dir.path(), "c.png", [210, 5, 5]),
        ];
        photos.create("alice", &srcs).unwrap();

        let db = store.rebuild(&ColorAnalyzer).unwrap();
        assert_eq!(db["alice"].len(), 2);
    }

    #[test]
    fn test_identity_without_faces_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let (store, photos) = store(dir.path());
        photos
            .create("ghost", &[solid_image(dir.path(), "dark.png", [1, 1, 1])])
            .unwrap();

        let db = store.rebuild(&ColorAnalyzer).unwrap();
        assert!(db.is_empty());
        assert!(photos.exists("ghost"));
    }

    #[test]
    fn test_load_falls_back_to_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let (store, photos) = store(dir.path());
        photos
            .create("bob", &[solid_image(dir.path(), "b.png", [0, 200, 0])])
            .unwrap();

        assert!(!dir.path().join("embeddings.bin").exists());
        let db = store.load(&ColorAnalyzer).unwrap();
        assert_eq!(db.len(), 1);
        assert!(dir.path().join("embeddings.bin").exists());

        // Corrupt blob is rebuilt rather than fatal.
        std::fs::write(dir.path().join("embeddings.bin"), [0xff; 3]).unwrap();
        let db = store.load(&ColorAnalyzer).unwrap();
        assert_eq!(db["bob"].len(), 1);
    }
}
