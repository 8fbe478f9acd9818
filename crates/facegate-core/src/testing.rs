//! Deterministic stand-in for the external analyzer.
//!
//! Images are reduced to their mean colour: the embedding is the normalised
//! mean RGB, near-black images have no face, and the dominant channel picks
//! the emotion (red → angry, green → happy, blue → sad).

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::types::{Embedding, EmotionAnalysis, FaceRegion};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Mean channel value below which an image is treated as faceless.
const DARK_LEVEL: f32 = 10.0;

pub struct ColorAnalyzer;

impl ColorAnalyzer {
    fn mean_rgb(image: &Path) -> Result<[f32; 3], AnalyzerError> {
        let img = image::open(image)
            .map_err(|e| AnalyzerError::Unreadable {
                path: image.to_path_buf(),
                reason: e.to_string(),
            })?
            .to_rgb8();

        let mut sum = [0.0f64; 3];
        for px in img.pixels() {
            for (acc, v) in sum.iter_mut().zip(px.0.iter()) {
                *acc += f64::from(*v);
            }
        }
        let n = f64::from(img.width() * img.height()).max(1.0);
        Ok(sum.map(|s| (s / n) as f32))
    }

    fn is_dark(rgb: &[f32; 3]) -> bool {
        rgb.iter().all(|c| *c < DARK_LEVEL)
    }
}

impl FaceAnalyzer for ColorAnalyzer {
    fn detect(&self, image: &Path) -> Result<Vec<FaceRegion>, AnalyzerError> {
        let rgb = Self::mean_rgb(image)?;
        if Self::is_dark(&rgb) {
            return Ok(Vec::new());
        }
        Ok(vec![FaceRegion {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
            confidence: 1.0,
        }])
    }

    fn embed(&self, image: &Path) -> Result<Embedding, AnalyzerError> {
        let rgb = Self::mean_rgb(image)?;
        if Self::is_dark(&rgb) {
            return Err(AnalyzerError::NoFace(image.to_path_buf()));
        }
        Ok(Embedding::new(rgb.iter().map(|c| c / 255.0).collect()))
    }

    fn analyze_emotion(&self, image: &Path) -> Result<EmotionAnalysis, AnalyzerError> {
        let [r, g, b] = Self::mean_rgb(image)?;
        let dominant = if r >= g && r >= b {
            "angry"
        } else if g >= b {
            "happy"
        } else {
            "sad"
        };
        let mut emotions = BTreeMap::new();
        emotions.insert(dominant.to_string(), 100.0);
        Ok(EmotionAnalysis {
            emotions,
            dominant: dominant.to_string(),
        })
    }
}

/// Write a small solid-colour PNG and return its path.
pub fn solid_image(dir: &Path, name: &str, rgb: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::from_pixel(16, 16, image::Rgb(rgb))
        .save(&path)
        .expect("write test image");
    path
}
