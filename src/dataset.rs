//! Raw survey dataset loading

use crate::error::TrainingDataError;
use crate::preprocess::{CleanRecord, Preprocessor};
use crate::schema::{AGE, COUNTRY};
use crate::types::SurveyRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Labelled survey responses
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<SurveyRecord>,
    /// `true` when the respondent sought treatment
    pub labels: Vec<bool>,
}

impl Dataset {
    /// Read a survey CSV. Rows whose target is missing or not Yes/No are dropped.
    pub fn from_csv<P: AsRef<Path>>(path: P, target_column: &str) -> Result<Self, TrainingDataError> {
        let path = path.as_ref();
        let reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let dataset = Self::from_csv_reader(reader, target_column)?;

        info!(
            path = %path.display(),
            rows = dataset.len(),
            positives = dataset.positives(),
            "Survey dataset loaded"
        );
        Ok(dataset)
    }

    pub fn from_csv_reader<R: Read>(
        mut reader: csv::Reader<R>,
        target_column: &str,
    ) -> Result<Self, TrainingDataError> {
        let headers = reader.headers()?.clone();
        let target_index = headers
            .iter()
            .position(|h| h.trim() == target_column)
            .ok_or_else(|| TrainingDataError::MissingTarget(target_column.to_string()))?;

        let mut dataset = Self::default();
        let mut dropped = 0usize;

        for row in reader.records() {
            let row = row?;
            let label = match row.get(target_index).map(str::trim) {
                Some(v) if v.eq_ignore_ascii_case("yes") => true,
                Some(v) if v.eq_ignore_ascii_case("no") => false,
                _ => {
                    dropped += 1;
                    continue;
                }
            };

            let record: SurveyRecord = headers
                .iter()
                .zip(row.iter())
                .enumerate()
                .filter(|(i, _)| *i != target_index)
                .map(|(_, (header, value))| (header.trim().to_string(), Value::from(value)))
                .collect();

            dataset.records.push(record);
            dataset.labels.push(label);
        }

        if dropped > 0 {
            warn!(dropped, target = target_column, "Dropped rows without a Yes/No target");
        }
        if dataset.is_empty() {
            return Err(TrainingDataError::Empty);
        }
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&y| y).count()
    }
}

/// Descriptive statistics of the training data, kept in the bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_samples: usize,
    pub treatment_yes: usize,
    pub treatment_no: usize,
    pub treatment_rate: f64,
    pub countries: usize,
    pub mean_age: f64,
    pub tech_company_rate: f64,
}

impl DatasetSummary {
    pub fn compute(preprocessor: &Preprocessor, cleaned: &[CleanRecord], labels: &[bool]) -> Self {
        let schema = preprocessor.schema();
        let total = cleaned.len();
        let yes = labels.iter().filter(|&&y| y).count();
        let rate = |count: usize| if total == 0 { 0.0 } else { count as f64 / total as f64 };

        let countries: BTreeSet<&str> = cleaned
            .iter()
            .filter_map(|r| r.value(schema, COUNTRY).and_then(|v| v.as_category()))
            .collect();
        let age_sum: f64 = cleaned
            .iter()
            .filter_map(|r| r.value(schema, AGE).and_then(|v| v.as_number()))
            .sum();
        let tech = cleaned
            .iter()
            .filter(|r| {
                r.value(schema, "tech_company").and_then(|v| v.as_category()) == Some("Yes")
            })
            .count();

        Self {
            total_samples: total,
            treatment_yes: yes,
            treatment_no: total - yes,
            treatment_rate: rate(yes),
            countries: countries.len(),
            mean_age: if total == 0 { 0.0 } else { age_sum / total as f64 },
            tech_company_rate: rate(tech),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreprocessingConfig;

    const CSV: &str = "\
Timestamp,Age,Gender,Country,family_history,treatment,tech_company
2014-08-27 11:29:31,37,Female,United States,No,Yes,Yes
2014-08-27 11:29:37,44,M,United States,No,No,No
2014-08-27 11:29:44,32,Male,Canada,Yes,NA,Yes
2014-08-27 11:29:46,31,male,United Kingdom,Yes,yes,Yes
";

    fn reader(text: &str) -> csv::Reader<&[u8]> {
        csv::ReaderBuilder::new().flexible(true).from_reader(text.as_bytes())
    }

    #[test]
    fn test_load_drops_bad_targets() {
        let dataset = Dataset::from_csv_reader(reader(CSV), "treatment").unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.labels, vec![true, false, true]);
        assert!(dataset.records[0].get("treatment").is_none());
        assert_eq!(dataset.records[0].number("Age"), Some(37.0));
        assert_eq!(dataset.records[2].text("Country").as_deref(), Some("United Kingdom"));
    }

    #[test]
    fn test_missing_target_column() {
        let err = Dataset::from_csv_reader(reader(CSV), "seek_treatment").unwrap_err();
        assert!(matches!(err, TrainingDataError::MissingTarget(_)));
    }

    #[test]
    fn test_no_usable_rows() {
        let text = "Age,treatment\n30,NA\n";
        let err = Dataset::from_csv_reader(reader(text), "treatment").unwrap_err();
        assert!(matches!(err, TrainingDataError::Empty));
    }

    #[test]
    fn test_summary() {
        let dataset = Dataset::from_csv_reader(reader(CSV), "treatment").unwrap();
        let preprocessor = Preprocessor::fit(&dataset.records, &PreprocessingConfig::default()).unwrap();
        let cleaned: Vec<CleanRecord> = dataset.records.iter().map(|r| preprocessor.clean(r)).collect();

        let summary = DatasetSummary::compute(&preprocessor, &cleaned, &dataset.labels);
        assert_eq!(summary.total_samples, 3);
        assert_eq!(summary.treatment_yes, 2);
        assert_eq!(summary.countries, 2);
        assert!((summary.mean_age - 112.0 / 3.0).abs() < 1e-9);
        assert!((summary.tech_company_rate - 2.0 / 3.0).abs() < 1e-9);
    }
}
