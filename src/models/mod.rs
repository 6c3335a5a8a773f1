//! Model training, persistence and inference components

pub mod bundle;
pub mod evaluation;
pub mod gbdt;
pub mod inference;
pub mod loader;
pub mod tree;

pub use bundle::ModelBundle;
pub use gbdt::{GradientBoostedClassifier, ModelParams};
pub use inference::InferenceService;
pub use loader::{load_bundle, save_bundle};
