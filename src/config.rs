use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use facematch_vision::{AnalyzerOptions, ModelPaths, DEFAULT_MAX_DIMENSION};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::matcher::RankingMode;

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("", "", "facematch"));

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| match option_env!("FACEMATCH_CONFIG") {
    Some(path) => PathBuf::from(path),
    None => PROJECT_DIRS
        .as_ref()
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("facematch.toml")),
});

pub static MODEL_DIR: Lazy<PathBuf> = Lazy::new(|| match option_env!("FACEMATCH_MODEL_DIR") {
    Some(path) => PathBuf::from(path),
    None => PROJECT_DIRS
        .as_ref()
        .map(|dirs| dirs.data_dir().join("models"))
        .unwrap_or_else(|| PathBuf::from("models")),
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub models: ModelsConfig,
    pub detection: DetectionConfig,
    pub matching: MatchingConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            detector: MODEL_DIR.join("face_detection_yunet_2023mar.onnx"),
            recognizer: MODEL_DIR.join("face_recognition_sface_2021dec.onnx"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    /// Larger side of an input image is scaled down to this many pixels.
    pub max_dimension: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.6,
            nms_threshold: 0.3,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

/// Deliberately empty by default: a match request has to get its threshold
/// either from here or from its own arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub threshold: Option<f64>,
    pub mode: Option<RankingMode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Load the models before reading the first request.
    pub eager_init: bool,
    /// 1 keeps strictly sequential processing.
    pub workers: usize,
    /// Delete `matchFromFile` inputs once they have been read.
    pub cleanup_match_files: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            eager_init: true,
            workers: 1,
            cleanup_match_files: true,
        }
    }
}

impl Config {
    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths {
            detector: self.models.detector.clone(),
            recognizer: self.models.recognizer.clone(),
        }
    }

    pub fn analyzer_options(&self) -> AnalyzerOptions {
        AnalyzerOptions {
            score_threshold: self.detection.score_threshold,
            nms_threshold: self.detection.nms_threshold,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
