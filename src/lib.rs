//! Treatment Predictor Library
//!
//! Predicts whether a tech-industry employee is likely to seek mental health
//! treatment from their OSMI survey answers, and explains each prediction
//! with signed per-field contributions.

pub mod config;
pub mod dataset;
pub mod error;
pub mod explain;
pub mod metrics;
pub mod models;
pub mod preprocess;
pub mod schema;
pub mod scoring;
pub mod synthetic;
pub mod training;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::AppConfig;
pub use dataset::{Dataset, DatasetSummary};
pub use error::{BundleLoadError, Stage, TrainingDataError, TrainingError};
pub use models::inference::{predict, InferenceService, Insights};
pub use models::ModelBundle;
pub use preprocess::Preprocessor;
pub use training::TrainingPipeline;
pub use types::{Outcome, SurveyRecord};
