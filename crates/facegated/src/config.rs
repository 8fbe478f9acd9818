use anyhow::{bail, Context, Result};
use facegate_core::{AnalyzerConfig, DistanceMetric, SuspicionPolicy};
use facegate_store::RegistrationLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "/etc/facegate/config.toml";
/// One week.
const MAX_SESSION_MINUTES: u64 = 7 * 24 * 60;

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    Session,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub metric: DistanceMetric,
    /// Maximum mean distance accepted as a match.
    pub threshold: f32,
    /// Maximum distance for one-to-one photo comparison.
    pub verification_threshold: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Cosine,
            threshold: 0.50,
            verification_threshold: 0.50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub default_pin: String,
    pub session_timeout_minutes: u64,
    pub bcrypt_cost: u32,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            default_pin: "1234".to_string(),
            session_timeout_minutes: 30,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Daemon configuration, loaded from TOML with `FACEGATE_*` overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the face database. Empty means `$XDG_DATA_HOME/facegate`.
    pub data_dir: PathBuf,
    pub bus: BusKind,
    pub analyzer: AnalyzerConfig,
    pub recognition: RecognitionConfig,
    pub suspicion: SuspicionPolicy,
    pub registration: RegistrationLimits,
    pub admin: AdminConfig,
}

impl Config {
    /// Load from `$FACEGATE_CONFIG` (or the default path), apply environment
    /// overrides and validate.
    pub fn load() -> Result<Self> {
        let path = std::env::var("FACEGATE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut cfg = Self::from_file(&path)?;
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut cfg: Config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config at {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
        } else {
            tracing::info!(path = %path.display(), "no config file; using defaults");
            Config::default()
        };
        if cfg.data_dir.as_os_str().is_empty() {
            cfg.data_dir = default_data_dir();
        }
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("FACEGATE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(bus) = std::env::var("FACEGATE_BUS") {
            match bus.as_str() {
                "system" => self.bus = BusKind::System,
                "session" => self.bus = BusKind::Session,
                other => tracing::warn!(value = other, "ignoring unknown FACEGATE_BUS"),
            }
        }
        if let Ok(program) = std::env::var("FACEGATE_ANALYZER") {
            self.analyzer.program = program;
        }
        self.recognition.threshold = env_f32("FACEGATE_THRESHOLD", self.recognition.threshold);
    }

    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            ("recognition.threshold", self.recognition.threshold),
            ("recognition.verification_threshold", self.recognition.verification_threshold),
            ("suspicion.threshold", self.suspicion.threshold),
        ];
        for (key, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                bail!("{key} must be a non-negative number, got {value}");
            }
        }
        let limits = &self.registration;
        if limits.min_photos == 0 || limits.min_photos > limits.max_photos {
            bail!(
                "registration limits must satisfy 0 < min_photos <= max_photos, got {}..{}",
                limits.min_photos,
                limits.max_photos
            );
        }
        if self.admin.default_pin.is_empty() {
            bail!("admin.default_pin must not be empty");
        }
        if !(1..=MAX_SESSION_MINUTES).contains(&self.admin.session_timeout_minutes) {
            bail!(
                "admin.session_timeout_minutes must be between 1 and {MAX_SESSION_MINUTES}, got {}",
                self.admin.session_timeout_minutes
            );
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.recognition.metric, DistanceMetric::Cosine);
        assert_eq!(cfg.recognition.threshold, 0.50);
        assert_eq!(cfg.registration.min_photos, 3);
        assert_eq!(cfg.registration.max_photos, 7);
        assert_eq!(cfg.admin.session_timeout_minutes, 30);
        assert_eq!(cfg.admin.default_pin, "1234");
        assert_eq!(cfg.suspicion.weights["angry"], 0.3);
        assert_eq!(cfg.analyzer.model_name, "Facenet512");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "/var/lib/facegate"
bus = "system"

[recognition]
metric = "euclidean"
threshold = 0.9

[suspicion.weights]
angry = 0.6
"#,
        )
        .unwrap();

        let cfg = Config::from_file(&path).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/facegate"));
        assert_eq!(cfg.bus, BusKind::System);
        assert_eq!(cfg.recognition.metric, DistanceMetric::Euclidean);
        assert_eq!(cfg.recognition.threshold, 0.9);
        assert_eq!(cfg.recognition.verification_threshold, 0.50);
        assert_eq!(cfg.suspicion.weights.len(), 1);
        assert_eq!(cfg.suspicion.threshold, 0.5);
        assert_eq!(cfg.registration.max_photos, 7);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::from_file(&dir.path().join("absent.toml")).unwrap();
        assert!(!cfg.data_dir.as_os_str().is_empty());
        assert_eq!(cfg.admin.default_pin, "1234");
    }

    #[test]
    fn test_validate_rejects_bad_limits_and_thresholds() {
        let mut cfg = Config::default();
        cfg.registration.min_photos = 8;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.recognition.threshold = f32::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.admin.default_pin.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.admin.session_timeout_minutes = 0;
        assert!(cfg.validate().is_err());
    }
}
