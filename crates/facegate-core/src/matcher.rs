//! Nearest-identity search over the embedding database.

use crate::types::{DistanceMetric, Embedding, EmbeddingDatabase};
use std::collections::BTreeMap;

/// Result of matching a probe embedding against the database.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// Identity accepted under the threshold, if any.
    pub identity: Option<String>,
    /// `1 - distance` for an accepted identity, 0.0 otherwise.
    pub confidence: f32,
    /// Mean distance from the probe to every identity in the database.
    pub distances: BTreeMap<String, f32>,
}

impl MatchOutcome {
    pub fn no_match() -> Self {
        Self {
            identity: None,
            confidence: 0.0,
            distances: BTreeMap::new(),
        }
    }

    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }

    /// The `n` closest identities, nearest first.
    pub fn closest(&self, n: usize) -> Vec<(String, f32)> {
        let mut ranked: Vec<(String, f32)> = self
            .distances
            .iter()
            .map(|(name, d)| (name.clone(), *d))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(n);
        ranked
    }
}

/// Strategy for comparing a probe embedding against the enrolled identities.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, database: &EmbeddingDatabase) -> MatchOutcome;
}

/// Confidence for an accepted distance. Clamped at 0 so Euclidean
/// thresholds above 1.0 never produce a negative confidence.
pub fn confidence_for(distance: f32) -> f32 {
    (1.0 - distance).max(0.0)
}

/// Scores each identity by the arithmetic mean of the distances from the
/// probe to all of its reference embeddings, then picks the lowest mean.
///
/// Identities are visited in name order and only a strictly smaller mean
/// replaces the current best, so ties go to the lexicographically smallest
/// name.
#[derive(Debug, Clone, Copy)]
pub struct MeanDistanceMatcher {
    pub metric: DistanceMetric,
    pub threshold: f32,
}

impl MeanDistanceMatcher {
    pub fn new(metric: DistanceMetric, threshold: f32) -> Self {
        Self { metric, threshold }
    }

    /// Mean distance to `references`, or `None` when there is nothing
    /// comparable to the probe.
    fn mean_distance(&self, probe: &Embedding, references: &[Embedding]) -> Option<f32> {
        if references.is_empty() {
            return None;
        }
        if let Some(other) = references.iter().find(|r| !r.same_dimensions(probe)) {
            tracing::warn!(
                probe = probe.dimensions(),
                stored = other.dimensions(),
                "embedding dimensions differ; identity skipped"
            );
            return None;
        }
        let total: f32 = references
            .iter()
            .map(|r| self.metric.distance(probe, r))
            .sum();
        Some(total / references.len() as f32)
    }
}

impl Matcher for MeanDistanceMatcher {
    fn compare(&self, probe: &Embedding, database: &EmbeddingDatabase) -> MatchOutcome {
        let mut distances = BTreeMap::new();
        let mut best: Option<(&str, f32)> = None;

        for (name, references) in database {
            let Some(mean) = self.mean_distance(probe, references) else {
                continue;
            };
            distances.insert(name.clone(), mean);

            let is_better = match best {
                None => true,
                Some((_, best_distance)) => mean < best_distance,
            };
            if is_better {
                best = Some((name.as_str(), mean));
            }
        }

        match best {
            Some((name, distance)) if distance <= self.threshold => {
                tracing::debug!(identity = name, distance, "probe matched");
                MatchOutcome {
                    identity: Some(name.to_string()),
                    confidence: confidence_for(distance),
                    distances,
                }
            }
            _ => {
                tracing::debug!(
                    best = ?best,
                    threshold = self.threshold,
                    "no identity within threshold"
                );
                MatchOutcome {
                    identity: None,
                    confidence: 0.0,
                    distances,
                }
            }
        }
    }
}
