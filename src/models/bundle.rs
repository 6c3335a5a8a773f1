//! The versioned unit of trained artifacts

use crate::dataset::DatasetSummary;
use crate::error::BundleLoadError;
use crate::explain::TreeExplainer;
use crate::models::evaluation::EvaluationMetrics;
use crate::models::gbdt::{FeatureImportance, GradientBoostedClassifier};
use crate::preprocess::Preprocessor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything needed to serve predictions, produced by one training run
/// and never modified afterwards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub bundle_id: Uuid,
    pub trained_at: DateTime<Utc>,
    /// Schema, gender table, imputation constants and encoders
    pub preprocessor: Preprocessor,
    pub model: GradientBoostedClassifier,
    pub explainer: TreeExplainer,
    pub metrics: EvaluationMetrics,
    /// Ranked, normalized split gains
    pub feature_importances: Vec<FeatureImportance>,
    pub dataset_summary: DatasetSummary,
}

impl ModelBundle {
    /// Identifier reported as `model_version` in outcomes
    pub fn version(&self) -> String {
        self.bundle_id.to_string()
    }

    /// Cross-check the parts of the bundle against each other
    pub fn validate(&self) -> Result<(), BundleLoadError> {
        let features = self.preprocessor.feature_count();
        if self.model.feature_count() != features {
            return Err(BundleLoadError::Inconsistent(format!(
                "model expects {} features, preprocessor produces {}",
                self.model.feature_count(),
                features
            )));
        }
        if self.feature_importances.len() != features {
            return Err(BundleLoadError::Inconsistent(
                "feature importances do not cover every feature".to_string(),
            ));
        }
        self.model.validate().map_err(BundleLoadError::Inconsistent)?;
        self.explainer
            .validate(&self.model)
            .map_err(BundleLoadError::Inconsistent)?;
        Ok(())
    }
}
