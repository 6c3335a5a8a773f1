//! Error types for training and bundle loading

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with the training data itself
#[derive(Debug, Error)]
pub enum TrainingDataError {
    #[error("failed to read dataset")]
    Csv(#[from] csv::Error),

    #[error("dataset has no {0:?} column")]
    MissingTarget(String),

    #[error("dataset contains no usable rows")]
    Empty,

    #[error("class {class:?} has {count} samples, at least {required} are needed")]
    ClassTooSmall {
        class: &'static str,
        count: usize,
        required: usize,
    },
}

/// Training pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadRaw,
    Clean,
    Split,
    FitModel,
    FitExplainer,
    Evaluate,
    Importances,
    Assemble,
    Persist,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::LoadRaw => "load_raw",
            Stage::Clean => "clean",
            Stage::Split => "split",
            Stage::FitModel => "fit_model",
            Stage::FitExplainer => "fit_explainer",
            Stage::Evaluate => "evaluate",
            Stage::Importances => "importances",
            Stage::Assemble => "assemble",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A training run aborted in `stage`
#[derive(Debug, Error)]
#[error("training failed at stage {stage}")]
pub struct TrainingError {
    pub stage: Stage,
    #[source]
    pub source: Box<dyn StdError + Send + Sync + 'static>,
}

/// Attach the failing stage to any error
pub trait StageContext<T> {
    fn stage(self, stage: Stage) -> Result<T, TrainingError>;
}

impl<T, E> StageContext<T> for Result<T, E>
where
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
{
    fn stage(self, stage: Stage) -> Result<T, TrainingError> {
        self.map_err(|e| TrainingError {
            stage,
            source: e.into(),
        })
    }
}

/// A persisted bundle could not be loaded
#[derive(Debug, Error)]
pub enum BundleLoadError {
    #[error("failed to read bundle {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bundle {path} is malformed")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("bundle checksum mismatch: recorded {recorded}, computed {computed}")]
    Checksum { recorded: String, computed: String },

    #[error("unsupported bundle format version {found}, expected {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("bundle is internally inconsistent: {0}")]
    Inconsistent(String),
}
