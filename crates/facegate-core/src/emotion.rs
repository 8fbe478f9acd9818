//! Emotion-based suspicion scoring layered on top of a successful match.

use crate::analyzer::FaceAnalyzer;
use crate::types::EmotionAnalysis;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Dominant-emotion label used when analysis fails.
pub const UNKNOWN_EMOTION: &str = "unknown";

/// Weighted emotions and the score at which a capture is flagged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspicionPolicy {
    /// Emotion label → weight. Unlisted emotions contribute nothing.
    pub weights: BTreeMap<String, f32>,
    pub threshold: f32,
}

impl Default for SuspicionPolicy {
    fn default() -> Self {
        let weights = [("angry", 0.3), ("fear", 0.25), ("sad", 0.2), ("disgust", 0.15)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            weights,
            threshold: 0.5,
        }
    }
}

/// Emotion analysis of a capture, scored against a [`SuspicionPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspicionAssessment {
    pub dominant_emotion: String,
    pub emotions: BTreeMap<String, f32>,
    pub score: f32,
    pub suspicious: bool,
}

impl SuspicionAssessment {
    /// Outcome used when the emotion model produced nothing.
    pub fn unknown() -> Self {
        Self {
            dominant_emotion: UNKNOWN_EMOTION.to_string(),
            emotions: BTreeMap::new(),
            score: 0.0,
            suspicious: false,
        }
    }
}

impl SuspicionPolicy {
    /// Sum of `percentage * weight / 100` over the weighted emotions.
    pub fn score(&self, emotions: &BTreeMap<String, f32>) -> f32 {
        self.weights
            .iter()
            .filter_map(|(emotion, weight)| emotions.get(emotion).map(|pct| pct * weight / 100.0))
            .sum()
    }

    pub fn assess(&self, analysis: EmotionAnalysis) -> SuspicionAssessment {
        let score = self.score(&analysis.emotions);
        SuspicionAssessment {
            dominant_emotion: analysis.dominant,
            emotions: analysis.emotions,
            score,
            suspicious: score >= self.threshold,
        }
    }

    /// Analyze `image` and score it. Analysis failures degrade to
    /// [`SuspicionAssessment::unknown`].
    pub fn evaluate(&self, analyzer: &dyn FaceAnalyzer, image: &Path) -> SuspicionAssessment {
        match analyzer.analyze_emotion(image) {
            Ok(analysis) => self.assess(analysis),
            Err(e) => {
                tracing::warn!(image = %image.display(), error = %e, "emotion analysis failed");
                SuspicionAssessment::unknown()
            }
        }
    }
}
