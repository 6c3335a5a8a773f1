//! Configuration management for the treatment prediction pipeline

use crate::models::gbdt::ModelParams;
use crate::preprocess::GenderTable;
use crate::types::outcome::ConfidenceThresholds;
use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Configuration file read when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub training: TrainingConfig,
    pub model: ModelParams,
    pub inference: InferenceConfig,
    pub preprocessing: PreprocessingConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Filesystem locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Raw survey CSV used by `train`
    pub dataset: String,
    /// Where the model bundle is written and loaded from
    pub bundle: String,
}

/// Training pipeline settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fraction of rows held out for evaluation
    pub test_size: f64,
    /// Number of stratified cross-validation folds
    pub cv_folds: usize,
    /// Name of the target column in the raw dataset
    pub target_column: String,
}

/// Serving settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Confidence bucketing thresholds on max(probability)
    pub confidence: ConfidenceThresholds,
    /// Number of factors reported per outcome
    pub top_factors: usize,
}

/// Cleaning and encoding settings captured into the bundle at fit time
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Most frequent categories kept per open nominal field; the rest encode as UNK
    pub max_categories: usize,
    /// Free-text gender consolidation table
    pub gender: GenderTable,
}

/// Batch scoring configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of records scored concurrently
    pub workers: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            training: TrainingConfig::default(),
            model: ModelParams::default(),
            inference: InferenceConfig::default(),
            preprocessing: PreprocessingConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset: "data/survey.csv".to_string(),
            bundle: "artifacts/model_bundle.json".to_string(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            cv_folds: 5,
            target_column: "treatment".to_string(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            confidence: ConfidenceThresholds::default(),
            top_factors: 5,
        }
    }
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            max_categories: 10,
            gender: GenderTable::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
