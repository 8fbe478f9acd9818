//! One-to-one verification of two images.

use crate::analyzer::FaceAnalyzer;
use crate::types::DistanceMetric;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairVerification {
    pub verified: bool,
    /// `1 - distance / threshold` below the threshold, 0 otherwise.
    pub confidence: f32,
    /// `None` when either image produced no embedding.
    pub distance: Option<f32>,
    pub threshold: f32,
    pub error: Option<String>,
}

/// Compares two images with a fixed metric and threshold.
#[derive(Debug, Clone, Copy)]
pub struct PairVerifier {
    pub metric: DistanceMetric,
    pub threshold: f32,
}

impl PairVerifier {
    pub fn new(metric: DistanceMetric, threshold: f32) -> Self {
        Self { metric, threshold }
    }

    pub fn verify(&self, analyzer: &dyn FaceAnalyzer, a: &Path, b: &Path) -> PairVerification {
        let embeddings = analyzer.embed(a).and_then(|ea| Ok((ea, analyzer.embed(b)?)));
        let (ea, eb) = match embeddings {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "pair verification failed");
                return PairVerification {
                    verified: false,
                    confidence: 0.0,
                    distance: None,
                    threshold: self.threshold,
                    error: Some(e.to_string()),
                };
            }
        };

        if !ea.same_dimensions(&eb) {
            tracing::warn!(a = ea.dimensions(), b = eb.dimensions(), "embedding dimensions differ");
            return PairVerification {
                verified: false,
                confidence: 0.0,
                distance: None,
                threshold: self.threshold,
                error: Some(format!(
                    "embedding dimensions differ ({} vs {})",
                    ea.dimensions(),
                    eb.dimensions()
                )),
            };
        }

        let distance = self.metric.distance(&ea, &eb);
        let confidence = if distance < self.threshold && self.threshold > 0.0 {
            1.0 - distance / self.threshold
        } else {
            0.0
        };

        PairVerification {
            verified: distance <= self.threshold,
            confidence,
            distance: Some(distance),
            threshold: self.threshold,
            error: None,
        }
    }
}
