//! Shared fixtures for unit tests

use crate::config::AppConfig;
use crate::dataset::Dataset;
use crate::models::bundle::ModelBundle;
use crate::models::gbdt::ModelParams;
use crate::synthetic::{write_csv, SurveyGenerator};
use crate::training::TrainingPipeline;
use std::fs::File;
use std::path::Path;

/// Defaults with a smaller ensemble so tests stay quick
pub fn fast_config() -> AppConfig {
    AppConfig {
        model: ModelParams {
            n_estimators: 30,
            max_depth: 3,
            ..ModelParams::default()
        },
        ..AppConfig::default()
    }
}

pub fn synthetic_dataset(rows: usize, seed: u64) -> Dataset {
    let (records, labels) = SurveyGenerator::new(seed)
        .generate(rows)
        .into_iter()
        .map(|row| (row.record, row.treatment))
        .unzip();
    Dataset { records, labels }
}

pub fn write_survey_csv(path: &Path, rows: usize, seed: u64) {
    let file = File::create(path).unwrap();
    write_csv(file, &SurveyGenerator::new(seed).generate(rows)).unwrap();
}

pub fn small_bundle() -> ModelBundle {
    TrainingPipeline::new(&fast_config())
        .fit(&synthetic_dataset(300, 1))
        .unwrap()
}
