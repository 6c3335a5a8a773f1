//! Training pipeline: raw survey CSV to a persisted model bundle.
//!
//! Stages run strictly in order. A failure in any stage aborts the run with
//! that stage attached; nothing is written unless every stage before
//! `persist` succeeded.

use crate::config::{AppConfig, PreprocessingConfig, TrainingConfig};
use crate::dataset::{Dataset, DatasetSummary};
use crate::error::{Stage, StageContext, TrainingError};
use crate::explain::TreeExplainer;
use crate::models::bundle::ModelBundle;
use crate::models::evaluation::{
    mean_std, roc_auc, stratified_kfold, stratified_split, weighted_f1, ConfusionMatrix,
    EvaluationMetrics,
};
use crate::models::gbdt::{GradientBoostedClassifier, ModelParams};
use crate::models::loader::save_bundle;
use crate::preprocess::{CleanRecord, FeatureVector, Preprocessor};
use crate::types::outcome::DECISION_THRESHOLD;
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

pub struct TrainingPipeline {
    training: TrainingConfig,
    preprocessing: PreprocessingConfig,
    params: ModelParams,
    output: PathBuf,
}

impl TrainingPipeline {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            training: config.training.clone(),
            preprocessing: config.preprocessing.clone(),
            params: config.model.clone(),
            output: PathBuf::from(&config.paths.bundle),
        }
    }

    /// Write the bundle somewhere other than the configured path
    pub fn with_output<P: Into<PathBuf>>(mut self, output: P) -> Self {
        self.output = output.into();
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Run every stage, from reading `dataset_path` to persisting the bundle
    pub fn train<P: AsRef<Path>>(&self, dataset_path: P) -> Result<ModelBundle, TrainingError> {
        let started = Instant::now();

        enter(Stage::LoadRaw);
        let dataset = Dataset::from_csv(dataset_path, &self.training.target_column)
            .stage(Stage::LoadRaw)?;

        let bundle = self.fit(&dataset)?;

        enter(Stage::Persist);
        save_bundle(&bundle, &self.output).stage(Stage::Persist)?;

        info!(
            bundle_id = %bundle.bundle_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            output = %self.output.display(),
            "Training complete"
        );
        Ok(bundle)
    }

    /// Stages `clean` through `assemble` on an already loaded dataset
    pub fn fit(&self, dataset: &Dataset) -> Result<ModelBundle, TrainingError> {
        enter(Stage::Clean);
        let preprocessor =
            Preprocessor::fit(&dataset.records, &self.preprocessing).stage(Stage::Clean)?;
        let cleaned: Vec<CleanRecord> = dataset.records.iter().map(|r| preprocessor.clean(r)).collect();
        let features = preprocessor.transform_batch(&dataset.records);
        let dataset_summary = DatasetSummary::compute(&preprocessor, &cleaned, &dataset.labels);
        info!(
            samples = dataset_summary.total_samples,
            treatment_rate = dataset_summary.treatment_rate,
            features = preprocessor.feature_count(),
            "Dataset cleaned and encoded"
        );

        enter(Stage::Split);
        let (train_idx, test_idx) =
            stratified_split(&dataset.labels, self.training.test_size, self.params.seed)
                .stage(Stage::Split)?;
        let (train_x, train_y) = select(&features, &dataset.labels, &train_idx);
        let (test_x, test_y) = select(&features, &dataset.labels, &test_idx);
        info!(train = train_idx.len(), test = test_idx.len(), "Stratified split");

        enter(Stage::FitModel);
        let model =
            GradientBoostedClassifier::fit(&train_x, &train_y, &self.params).stage(Stage::FitModel)?;

        enter(Stage::FitExplainer);
        let explainer = TreeExplainer::fit(&model, &train_x).stage(Stage::FitExplainer)?;

        enter(Stage::Evaluate);
        let metrics = self
            .evaluate(&model, &train_x, &train_y, &test_x, &test_y)
            .stage(Stage::Evaluate)?;
        info!(
            roc_auc = metrics.roc_auc,
            f1_weighted = metrics.f1_weighted,
            cv_auc_mean = metrics.cv_auc_mean,
            cv_auc_std = metrics.cv_auc_std,
            "Model evaluated"
        );

        enter(Stage::Importances);
        let feature_importances = model.ranked_importances(preprocessor.feature_names());
        for item in feature_importances.iter().take(5) {
            debug!(feature = %item.feature, importance = item.importance, "Top feature");
        }

        enter(Stage::Assemble);
        let bundle = ModelBundle {
            bundle_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            preprocessor,
            model,
            explainer,
            metrics,
            feature_importances,
            dataset_summary,
        };
        bundle.validate().stage(Stage::Assemble)?;

        Ok(bundle)
    }

    fn evaluate(
        &self,
        model: &GradientBoostedClassifier,
        train_x: &[FeatureVector],
        train_y: &[bool],
        test_x: &[FeatureVector],
        test_y: &[bool],
    ) -> Result<EvaluationMetrics> {
        let probabilities = model.predict_proba_batch(test_x);
        let predictions: Vec<bool> = probabilities.iter().map(|&p| p >= DECISION_THRESHOLD).collect();
        let auc = roc_auc(test_y, &probabilities)
            .ok_or_else(|| anyhow!("held-out split contains a single class"))?;

        let mut fold_aucs = Vec::with_capacity(self.training.cv_folds);
        for (fold, (fit_idx, val_idx)) in stratified_kfold(train_y, self.training.cv_folds, self.params.seed)?
            .into_iter()
            .enumerate()
        {
            let (fit_x, fit_y) = select(train_x, train_y, &fit_idx);
            let (val_x, val_y) = select(train_x, train_y, &val_idx);
            let fold_model = GradientBoostedClassifier::fit(&fit_x, &fit_y, &self.params)?;
            let fold_auc = roc_auc(&val_y, &fold_model.predict_proba_batch(&val_x))
                .ok_or_else(|| anyhow!("cross-validation fold {} contains a single class", fold))?;
            debug!(fold, auc = fold_auc, "Cross-validation fold");
            fold_aucs.push(fold_auc);
        }
        let (cv_auc_mean, cv_auc_std) = mean_std(&fold_aucs);

        Ok(EvaluationMetrics {
            roc_auc: auc,
            f1_weighted: weighted_f1(test_y, &predictions),
            cv_auc_mean,
            cv_auc_std,
            cv_auc_folds: fold_aucs,
            confusion_matrix: ConfusionMatrix::from_predictions(test_y, &predictions),
            train_samples: train_x.len(),
            test_samples: test_x.len(),
        })
    }
}

fn enter(stage: Stage) {
    debug!(stage = %stage, "Training stage started");
}

fn select(features: &[FeatureVector], labels: &[bool], indices: &[usize]) -> (Vec<FeatureVector>, Vec<bool>) {
    indices
        .iter()
        .map(|&i| (features[i].clone(), labels[i]))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_config, synthetic_dataset, write_survey_csv};

    #[test]
    fn test_fit_produces_consistent_bundle() {
        let dataset = synthetic_dataset(400, 3);
        let bundle = TrainingPipeline::new(&fast_config()).fit(&dataset).unwrap();

        assert!(bundle.validate().is_ok());
        assert_eq!(bundle.metrics.train_samples + bundle.metrics.test_samples, 400);
        assert_eq!(bundle.metrics.cv_auc_folds.len(), 5);
        assert!(bundle.metrics.roc_auc > 0.6, "roc_auc = {}", bundle.metrics.roc_auc);
        assert_eq!(bundle.dataset_summary.total_samples, 400);

        let top: Vec<&str> = bundle
            .feature_importances
            .iter()
            .take(3)
            .map(|f| f.feature.as_str())
            .collect();
        assert!(top.contains(&"family_history"), "top features: {top:?}");
    }

    #[test]
    fn test_training_is_deterministic() {
        let dataset = synthetic_dataset(300, 9);
        let pipeline = TrainingPipeline::new(&fast_config());
        let a = pipeline.fit(&dataset).unwrap();
        let b = pipeline.fit(&dataset).unwrap();

        assert_eq!(a.model, b.model);
        assert_eq!(a.preprocessor, b.preprocessor);
        assert_eq!(a.explainer, b.explainer);
        assert_eq!(a.metrics, b.metrics);
    }

    #[test]
    fn test_train_persists_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("survey.csv");
        write_survey_csv(&csv, 300, 5);

        let output = dir.path().join("artifacts").join("bundle.json");
        let pipeline = TrainingPipeline::new(&fast_config()).with_output(&output);
        let bundle = pipeline.train(&csv).unwrap();

        let loaded = crate::models::loader::load_bundle(&output).unwrap();
        assert_eq!(loaded, bundle);
    }

    #[test]
    fn test_failures_report_stage_and_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("bundle.json");
        let pipeline = TrainingPipeline::new(&fast_config()).with_output(&output);

        let missing = pipeline.train(dir.path().join("missing.csv")).unwrap_err();
        assert_eq!(missing.stage, Stage::LoadRaw);

        let csv = dir.path().join("one_class.csv");
        std::fs::write(&csv, "Age,Gender,treatment\n30,Male,Yes\n31,Female,Yes\n40,M,Yes\n").unwrap();
        let degenerate = pipeline.train(&csv).unwrap_err();
        assert_eq!(degenerate.stage, Stage::Split);

        assert!(!output.exists());
    }
}
