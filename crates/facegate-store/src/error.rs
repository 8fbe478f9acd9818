use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {reason}")]
    Encode { path: PathBuf, reason: String },
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Reasons a registration request is refused before anything is written.
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("invalid identity name {0:?}")]
    InvalidName(String),
    #[error("identity {0:?} is already registered")]
    AlreadyRegistered(String),
    #[error("{count} photos supplied, expected between {min} and {max}")]
    PhotoCount { count: usize, min: usize, max: usize },
    #[error("photo {path} could not be decoded: {reason}")]
    BadPhoto { path: PathBuf, reason: String },
}
