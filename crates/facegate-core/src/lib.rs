//! facegate-core — Embeddings, distance metrics and identity matching.
//!
//! Face detection, embedding extraction and emotion classification are
//! delegated to an external analyzer; this crate holds the logic around it.

pub mod analyzer;
pub mod emotion;
pub mod matcher;
pub mod types;
pub mod verify;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use analyzer::{has_face, AnalyzerConfig, AnalyzerError, CommandAnalyzer, FaceAnalyzer};
pub use emotion::{SuspicionAssessment, SuspicionPolicy};
pub use matcher::{MatchOutcome, Matcher, MeanDistanceMatcher};
pub use types::{DistanceMetric, Embedding, EmbeddingDatabase, EmotionAnalysis, FaceRegion};
pub use verify::{PairVerification, PairVerifier};
