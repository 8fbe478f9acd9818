//! Reference photo directories, one per identity.

use crate::error::{RegistrationError, StoreError};
use std::path::{Path, PathBuf};

/// Name logged for captures that matched nobody. Never a valid identity.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

const PHOTO_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Trim and check an identity name. Names become directory names, so path
/// separators and dot entries are refused.
pub fn validate_name(raw: &str) -> Result<String, RegistrationError> {
    let name = raw.trim();
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name == UNKNOWN_IDENTITY
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(RegistrationError::InvalidName(raw.to_string()));
    }
    Ok(name.to_string())
}

fn is_photo(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PHOTO_EXTENSIONS.iter().any(|p| e.eq_ignore_ascii_case(p)))
}

#[derive(Debug, Clone)]
pub struct PhotoDirectory {
    root: PathBuf,
}

impl PhotoDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn identity_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.identity_dir(name).is_dir()
    }

    /// Names of all identities with a photo directory, sorted.
    pub fn identities(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.root.display(), error = %e, "cannot list identities");
                }
                return Vec::new();
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }

    /// Photo files of an identity, sorted by file name.
    pub fn photos(&self, name: &str) -> Vec<PathBuf> {
        if validate_name(name).is_err() {
            return Vec::new();
        }
        let Ok(entries) = std::fs::read_dir(self.identity_dir(name)) else {
            return Vec::new();
        };
        let mut photos: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_photo(p))
            .collect();
        photos.sort();
        photos
    }

    pub fn photo_count(&self, name: &str) -> usize {
        self.photos(name).len()
    }

    /// Decode every source image and write it as `photo_<i>.jpg` in a new
    /// directory for `name`. On failure the directory is removed again.
    pub fn create(&self, name: &str, sources: &[PathBuf]) -> Result<usize, StoreError> {
        let dir = self.identity_dir(name);
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let written = sources
            .iter()
            .enumerate()
            .try_for_each(|(i, src)| write_photo(src, &dir.join(format!("photo_{}.jpg", i + 1))));

        if let Err(e) = written {
            if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                tracing::warn!(path = %dir.display(), error = %cleanup, "failed to clean up photo directory");
            }
            return Err(e);
        }
        Ok(sources.len())
    }

    /// Delete the photo directory of `name`. Returns whether it existed.
    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        validate_name(name)?;
        let dir = self.identity_dir(name);
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(true)
    }
}

fn write_photo(src: &Path, dest: &Path) -> Result<(), StoreError> {
    let bad_photo = |reason: String| RegistrationError::BadPhoto {
        path: src.to_path_buf(),
        reason,
    };
    let img = image::open(src).map_err(|e| bad_photo(e.to_string()))?;
    // JPEG has no alpha channel
    img.to_rgb8()
        .save_with_format(dest, image::ImageFormat::Jpeg)
        .map_err(|e| StoreError::Encode {
            path: dest.to_path_buf(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_core::testing::solid_image;

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Alice ").unwrap(), "Alice");
        for bad in ["", "   ", ".", "..", "a/b", "a\\b", UNKNOWN_IDENTITY] {
            assert!(validate_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_create_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let photos = PhotoDirectory::new(dir.path().join("faces"));
        let srcs = vec![
            solid_image(dir.path(), "1.png", [200, 10, 10]),
            solid_image(dir.path(), "2.png", [190, 20, 10]),
        ];

        assert_eq!(photos.create("alice", &srcs).unwrap(), 2);
        assert_eq!(photos.identities(), vec!["alice".to_string()]);
        let names: Vec<_> = photos
            .photos("alice")
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["photo_1.jpg", "photo_2.jpg"]);
    }

    #[test]
    fn test_create_cleans_up_on_bad_photo() {
        let dir = tempfile::tempdir().unwrap();
        let photos = PhotoDirectory::new(dir.path().join("faces"));
        let garbage = dir.path().join("garbage.jpg");
        std::fs::write(&garbage, b"definitely not a jpeg").unwrap();
        let srcs = vec![solid_image(dir.path(), "ok.png", [50, 60, 70]), garbage];

        let err = photos.create("carol", &srcs).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Registration(RegistrationError::BadPhoto { .. })
        ));
        assert!(!photos.exists("carol"));
    }

    #[test]
    fn test_remove_refuses_paths_outside_identity() {
        let dir = tempfile::tempdir().unwrap();
        let photos = PhotoDirectory::new(dir.path().join("faces"));
        photos
            .create("alice", &[solid_image(dir.path(), "a.png", [200, 10, 10])])
            .unwrap();

        for bad in ["", ".", "..", "../faces", UNKNOWN_IDENTITY] {
            assert!(photos.remove(bad).is_err(), "{bad:?} should be refused");
            assert!(!photos.exists(bad));
            assert_eq!(photos.photo_count(bad), 0);
        }
        assert!(photos.exists("alice"));
    }

    #[test]
    fn test_missing_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let photos = PhotoDirectory::new(dir.path().join("absent"));
        assert!(photos.identities().is_empty());
        assert_eq!(photos.photo_count("x"), 0);
        assert!(!photos.remove("x").unwrap());
    }
}
