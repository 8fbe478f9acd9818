//! Boundary to the pretrained face-analysis model.
//!
//! Detection, embedding extraction and emotion classification are not done
//! in-process. They are delegated to an external analyzer program that
//! speaks JSON on stdout, wrapped here behind the [`FaceAnalyzer`] trait.

use crate::types::{Embedding, EmotionAnalysis, FaceRegion};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("no face detected in {0}")]
    NoFace(PathBuf),
    #[error("cannot read image {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("failed to launch analyzer {program}: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },
    #[error("analyzer exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
    #[error("unreadable analyzer output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("analyzer returned an empty embedding")]
    EmptyEmbedding,
}

/// The three operations consumed from the face-analysis model.
pub trait FaceAnalyzer {
    /// Locate faces in an image. An image with no face yields an empty list.
    fn detect(&self, image: &Path) -> Result<Vec<FaceRegion>, AnalyzerError>;

    /// Extract the embedding of the face in `image`.
    fn embed(&self, image: &Path) -> Result<Embedding, AnalyzerError>;

    /// Classify the emotion of the face in `image`.
    fn analyze_emotion(&self, image: &Path) -> Result<EmotionAnalysis, AnalyzerError>;
}

impl<T: FaceAnalyzer + ?Sized> FaceAnalyzer for Box<T> {
    fn detect(&self, image: &Path) -> Result<Vec<FaceRegion>, AnalyzerError> {
        (**self).detect(image)
    }

    fn embed(&self, image: &Path) -> Result<Embedding, AnalyzerError> {
        (**self).embed(image)
    }

    fn analyze_emotion(&self, image: &Path) -> Result<EmotionAnalysis, AnalyzerError> {
        (**self).analyze_emotion(image)
    }
}

/// Cheap presence check run before the matching path. Any detector failure
/// counts as "no face".
pub fn has_face(analyzer: &dyn FaceAnalyzer, image: &Path) -> bool {
    match analyzer.detect(image) {
        Ok(faces) => !faces.is_empty(),
        Err(e) => {
            tracing::debug!(image = %image.display(), error = %e, "face check failed");
            false
        }
    }
}

/// Settings for the external analyzer program.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Executable invoked as
    /// `<program> [args..] <action> <image> --model .. --detector ..`.
    pub program: String,
    /// Leading arguments, e.g. the script path when `program` is an interpreter.
    pub args: Vec<String>,
    pub model_name: String,
    pub detector_backend: String,
    /// Fail embedding extraction when no face is confidently detected.
    pub enforce_detection: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            program: "facegate-analyzer".to_string(),
            args: Vec::new(),
            model_name: "Facenet512".to_string(),
            detector_backend: "opencv".to_string(),
            enforce_detection: true,
        }
    }
}

#[derive(Deserialize)]
struct DetectOutput {
    faces: Vec<FaceRegion>,
}

#[derive(Deserialize)]
struct EmbedOutput {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmotionOutput {
    emotion: std::collections::BTreeMap<String, f32>,
    dominant_emotion: String,
}

/// [`FaceAnalyzer`] backed by an external program.
///
/// Exit code 2 from `embed` means "no face"; any other non-zero exit is a
/// generic failure carrying the program's stderr.
pub struct CommandAnalyzer {
    config: AnalyzerConfig,
}

const EXIT_NO_FACE: i32 = 2;

impl CommandAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        tracing::info!(
            program = %config.program,
            model = %config.model_name,
            detector = %config.detector_backend,
            "using external face analyzer"
        );
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    fn run(&self, action: &str, image: &Path, enforce: bool) -> Result<Vec<u8>, AnalyzerError> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg(action)
            .arg(image)
            .arg("--model")
            .arg(&self.config.model_name)
            .arg("--detector")
            .arg(&self.config.detector_backend);
        if enforce {
            cmd.arg("--enforce-detection");
        }

        let output = cmd.output().map_err(|source| AnalyzerError::Launch {
            program: self.config.program.clone(),
            source,
        })?;

        if output.status.success() {
            return Ok(output.stdout);
        }
        if output.status.code() == Some(EXIT_NO_FACE) {
            return Err(AnalyzerError::NoFace(image.to_path_buf()));
        }
        Err(AnalyzerError::Exit {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl FaceAnalyzer for CommandAnalyzer {
    fn detect(&self, image: &Path) -> Result<Vec<FaceRegion>, AnalyzerError> {
        let raw = self.run("detect", image, false)?;
        let parsed: DetectOutput = serde_json::from_slice(&raw)?;
        Ok(parsed.faces)
    }

    fn embed(&self, image: &Path) -> Result<Embedding, AnalyzerError> {
        let raw = self.run("embed", image, self.config.enforce_detection)?;
        let parsed: EmbedOutput = serde_json::from_slice(&raw)?;
        if parsed.embedding.is_empty() {
            return Err(AnalyzerError::EmptyEmbedding);
        }
        Ok(Embedding::new(parsed.embedding))
    }

    fn analyze_emotion(&self, image: &Path) -> Result<EmotionAnalysis, AnalyzerError> {
        let raw = self.run("emotion", image, false)?;
        let parsed: EmotionOutput = serde_json::from_slice(&raw)?;
        Ok(EmotionAnalysis {
            emotions: parsed.emotion,
            dominant: parsed.dominant_emotion,
        })
    }
}
