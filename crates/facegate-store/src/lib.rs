//! facegate-store — File-backed identity, embedding and access-log storage.

pub mod access_log;
pub mod database;
pub mod embeddings;
pub mod error;
mod files;
pub mod layout;
pub mod metadata;
pub mod photos;

pub use access_log::{AccessLogEntry, AccessLogger, AccessStatus, MAX_LOG_ENTRIES};
pub use database::{Database, Registered, Registration, RegistrationLimits, Statistics, UserSummary};
pub use embeddings::EmbeddingStore;
pub use error::{RegistrationError, StoreError};
pub use layout::StoreLayout;
pub use metadata::{Profile, UserRecord};
pub use photos::UNKNOWN_IDENTITY;
