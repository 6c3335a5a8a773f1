//! Inference service: one loaded bundle, many concurrent predictions

use super::bundle::ModelBundle;
use super::evaluation::EvaluationMetrics;
use super::gbdt::FeatureImportance;
use super::loader::load_bundle;
use crate::config::InferenceConfig;
use crate::dataset::DatasetSummary;
use crate::error::BundleLoadError;
use crate::types::{Factor, Outcome, SurveyRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Number of ranked features reported by [`InferenceService::insights`]
pub const INSIGHT_FEATURES: usize = 15;

/// Model overview served alongside predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    pub metrics: EvaluationMetrics,
    pub top_features: Vec<FeatureImportance>,
    pub dataset_summary: DatasetSummary,
}

/// Score one record against a bundle.
///
/// Never fails: unknown keys are ignored and malformed values imputed.
pub fn predict(record: &SurveyRecord, bundle: &ModelBundle, settings: &InferenceConfig) -> Outcome {
    let preprocessor = &bundle.preprocessor;

    let unknown = preprocessor.unknown_fields(record);
    if !unknown.is_empty() {
        debug!(fields = ?unknown, "Ignoring unknown record fields");
    }

    let features = preprocessor.transform(record);
    let p_yes = bundle.model.predict_proba(&features);
    let attributions = bundle.explainer.explain(&bundle.model, &features);

    // One factor per schema field: one-hot columns are summed
    let sources = preprocessor.encoder().feature_sources();
    let mut per_field = vec![0.0; preprocessor.schema().len()];
    for (&field, impact) in sources.iter().zip(&attributions) {
        per_field[field] += *impact;
    }

    let mut factors: Vec<Factor> = preprocessor
        .schema()
        .fields()
        .iter()
        .zip(per_field)
        .filter(|(_, impact)| *impact != 0.0)
        .map(|(spec, impact)| Factor::new(spec.name.clone(), impact))
        .collect();
    factors.sort_by(|a, b| b.impact.abs().total_cmp(&a.impact.abs()));
    factors.truncate(settings.top_factors);

    Outcome::new(p_yes, &settings.confidence, factors, bundle.version())
}

/// Holds the current bundle behind an `Arc` that is swapped as a whole
pub struct InferenceService {
    bundle: RwLock<Arc<ModelBundle>>,
    settings: InferenceConfig,
}

impl InferenceService {
    /// Serve `bundle` after checking its parts agree
    pub fn new(bundle: ModelBundle, settings: InferenceConfig) -> Result<Self, BundleLoadError> {
        bundle.validate()?;
        info!(
            bundle_id = %bundle.bundle_id,
            top_factors = settings.top_factors,
            high = settings.confidence.high,
            medium = settings.confidence.medium,
            "Inference service initialized"
        );
        Ok(Self {
            bundle: RwLock::new(Arc::new(bundle)),
            settings,
        })
    }

    /// Load a bundle from disk and serve it
    pub fn load<P: AsRef<Path>>(path: P, settings: InferenceConfig) -> Result<Self, BundleLoadError> {
        Self::new(load_bundle(path)?, settings)
    }

    /// Snapshot of the bundle currently being served
    pub fn current(&self) -> Arc<ModelBundle> {
        self.bundle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn settings(&self) -> &InferenceConfig {
        &self.settings
    }

    pub fn predict(&self, record: &SurveyRecord) -> Outcome {
        let bundle = self.current();
        predict(record, &bundle, &self.settings)
    }

    /// Replace the served bundle, returning the previous one
    pub fn swap(&self, bundle: ModelBundle) -> Result<Arc<ModelBundle>, BundleLoadError> {
        bundle.validate()?;
        let next = Arc::new(bundle);
        let mut slot = self.bundle.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *slot, next);
        info!(
            previous = %previous.bundle_id,
            current = %slot.bundle_id,
            "Model bundle swapped"
        );
        Ok(previous)
    }

    /// Load a complete bundle from disk, then swap it in
    pub fn reload<P: AsRef<Path>>(&self, path: P) -> Result<Arc<ModelBundle>, BundleLoadError> {
        let bundle = load_bundle(path)?;
        self.swap(bundle)
    }

    pub fn insights(&self) -> Insights {
        let bundle = self.current();
        Insights {
            model_version: bundle.version(),
            trained_at: bundle.trained_at,
            metrics: bundle.metrics.clone(),
            top_features: bundle
                .feature_importances
                .iter()
                .take(INSIGHT_FEATURES)
                .cloned()
                .collect(),
            dataset_summary: bundle.dataset_summary.clone(),
        }
    }
}
