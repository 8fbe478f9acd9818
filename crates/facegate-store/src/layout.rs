use std::path::{Path, PathBuf};

/// On-disk layout of a facegate data directory.
///
/// ```text
/// <root>/faces/<identity>/photo_N.jpg
/// <root>/embeddings.bin
/// <root>/users.json
/// <root>/access_log.json
/// ```
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn faces_dir(&self) -> PathBuf {
        self.root.join("faces")
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.root.join("embeddings.bin")
    }

    pub fn users_path(&self) -> PathBuf {
        self.root.join("users.json")
    }

    pub fn access_log_path(&self) -> PathBuf {
        self.root.join("access_log.json")
    }
}
