//! Preprocessing shared by training and serving.
//!
//! A [`Preprocessor`] is fitted once on the raw training records. After that
//! the same `transform` runs for every record, whether it comes from the
//! training CSV or from a single prediction request.

pub mod cleaning;
pub mod encoder;

pub use cleaning::{CleanRecord, CleanValue, GenderRule, GenderTable};
pub use encoder::{ColumnEncoder, EncoderState, FeatureVector};

use crate::config::PreprocessingConfig;
use crate::schema::{FieldKind, FieldRole, Schema};
use crate::types::SurveyRecord;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Cleaning rules plus the fitted encoders, stored in the model bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    schema: Schema,
    gender: GenderTable,
    /// Fill value per schema field; `None` for derived fields
    imputation: Vec<Option<CleanValue>>,
    encoder: EncoderState,
}

impl Preprocessor {
    /// Fit imputation constants and encoders on raw training records
    pub fn fit(records: &[SurveyRecord], settings: &PreprocessingConfig) -> Result<Self> {
        if records.is_empty() {
            bail!("cannot fit preprocessor on an empty dataset");
        }

        let gender = settings.gender.clone();
        let schema = Schema::survey(&gender.canonical_values());

        for (field, count) in unrecognized_answers(&schema, &gender, records) {
            warn!(
                field = %field,
                count,
                "Answers outside the allowed values will be imputed"
            );
        }

        let imputation: Vec<Option<CleanValue>> = schema
            .fields()
            .iter()
            .map(|spec| {
                if spec.role == FieldRole::Derived {
                    return None;
                }
                let observed: Vec<CleanValue> = records
                    .iter()
                    .filter_map(|r| cleaning::read_field(spec, &gender, r))
                    .collect();
                if observed.is_empty() {
                    warn!(field = %spec.name, "No usable training values, using schema default");
                }
                Some(match &spec.kind {
                    FieldKind::Numeric { min, max } => {
                        let values: Vec<f64> =
                            observed.iter().filter_map(CleanValue::as_number).collect();
                        CleanValue::Number(median(&values).unwrap_or((min + max) / 2.0))
                    }
                    _ => {
                        let fallback = spec
                            .allowed_values()
                            .and_then(|v| v.first().cloned())
                            .unwrap_or_else(|| "Unknown".to_string());
                        CleanValue::Category(
                            mode(observed.iter().filter_map(CleanValue::as_category))
                                .unwrap_or(fallback),
                        )
                    }
                })
            })
            .collect();

        let cleaned: Vec<CleanRecord> = records
            .iter()
            .map(|r| clean_record(&schema, &gender, &imputation, r))
            .collect();
        let encoder = EncoderState::fit(&schema, &cleaned, settings.max_categories);

        let preprocessor = Self {
            schema,
            gender,
            imputation,
            encoder,
        };

        debug!(
            records = records.len(),
            features = preprocessor.encoder.feature_count(),
            "Preprocessor fitted"
        );

        Ok(preprocessor)
    }

    /// Clip, normalize, impute and derive. Never fails.
    pub fn clean(&self, record: &SurveyRecord) -> CleanRecord {
        clean_record(&self.schema, &self.gender, &self.imputation, record)
    }

    /// Encode an already cleaned record
    pub fn encode(&self, record: &CleanRecord) -> FeatureVector {
        self.encoder.encode(record)
    }

    /// Raw record to feature vector
    pub fn transform(&self, record: &SurveyRecord) -> FeatureVector {
        self.encode(&self.clean(record))
    }

    /// Training-time path: the same `transform`, applied row by row
    pub fn transform_batch(&self, records: &[SurveyRecord]) -> Vec<FeatureVector> {
        records.iter().map(|r| self.transform(r)).collect()
    }

    /// Record keys the schema does not know about
    pub fn unknown_fields<'a>(&self, record: &'a SurveyRecord) -> Vec<&'a str> {
        record
            .keys()
            .filter(|key| !self.schema.is_input(key))
            .collect()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn encoder(&self) -> &EncoderState {
        &self.encoder
    }

    /// Imputed value for a field
    pub fn fill_value(&self, name: &str) -> Option<&CleanValue> {
        self.schema
            .index_of(name)
            .and_then(|i| self.imputation.get(i))
            .and_then(Option::as_ref)
    }

    pub fn feature_names(&self) -> &[String] {
        self.encoder.feature_names()
    }

    pub fn feature_count(&self) -> usize {
        self.encoder.feature_count()
    }
}

fn clean_record(
    schema: &Schema,
    gender: &GenderTable,
    imputation: &[Option<CleanValue>],
    record: &SurveyRecord,
) -> CleanRecord {
    let mut values: Vec<CleanValue> = Vec::with_capacity(schema.len());

    for (spec, fill) in schema.fields().iter().zip(imputation) {
        let value = match spec.role {
            FieldRole::Input => cleaning::read_field(spec, gender, record)
                .or_else(|| fill.clone())
                .unwrap_or_else(|| CleanValue::Category(String::new())),
            // Placeholder until every input is known
            FieldRole::Derived => CleanValue::Category(String::new()),
        };
        values.push(value);
    }

    for (index, spec) in schema.fields().iter().enumerate() {
        if spec.role == FieldRole::Derived {
            values[index] = cleaning::derive(schema, &spec.name, &values);
        }
    }

    CleanRecord::new(values)
}

/// Per input field, how many records carry an answer that cleaning rejects
fn unrecognized_answers(
    schema: &Schema,
    gender: &GenderTable,
    records: &[SurveyRecord],
) -> Vec<(String, usize)> {
    schema
        .fields()
        .iter()
        .filter(|spec| spec.role == FieldRole::Input)
        .filter_map(|spec| {
            let count = records
                .iter()
                .filter(|r| {
                    r.text(&spec.name).is_some() && cleaning::read_field(spec, gender, r).is_none()
                })
                .count();
            (count > 0).then(|| (spec.name.clone(), count))
        })
        .collect()
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Most frequent value ignoring case, ties broken by first-seen order
fn mode<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| v.eq_ignore_ascii_case(value)) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AGE, AGE_GROUP, COMPANY_SIZE, COUNTRY, GENDER};
    use crate::synthetic::SurveyGenerator;

    fn fitted() -> (Preprocessor, Vec<SurveyRecord>) {
        let rows = SurveyGenerator::new(7).generate(200);
        let records: Vec<SurveyRecord> = rows.into_iter().map(|r| r.record).collect();
        let preprocessor = Preprocessor::fit(&records, &PreprocessingConfig::default()).unwrap();
        (preprocessor, records)
    }

    #[test]
    fn test_fit_rejects_empty_dataset() {
        assert!(Preprocessor::fit(&[], &PreprocessingConfig::default()).is_err());
    }

    #[test]
    fn test_train_and_serve_paths_are_bit_identical() {
        let (preprocessor, records) = fitted();
        let batch = preprocessor.transform_batch(&records);

        for (record, batch_row) in records.iter().zip(&batch) {
            let single = preprocessor.transform(record);
            let a: Vec<u64> = single.iter().map(|v| v.to_bits()).collect();
            let b: Vec<u64> = batch_row.iter().map(|v| v.to_bits()).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_range_clipping() {
        let (preprocessor, _) = fitted();
        let schema = preprocessor.schema().clone();

        let young = preprocessor.clean(&SurveyRecord::new().with(AGE, 5));
        let old = preprocessor.clean(&SurveyRecord::new().with(AGE, 999));

        assert_eq!(young.value(&schema, AGE), Some(&CleanValue::Number(18.0)));
        assert_eq!(old.value(&schema, AGE), Some(&CleanValue::Number(80.0)));
        assert_eq!(
            old.value(&schema, AGE_GROUP),
            Some(&CleanValue::Category("46+".to_string()))
        );
    }

    #[test]
    fn test_unknown_gender_maps_to_other() {
        let (preprocessor, _) = fitted();
        let clean = preprocessor.clean(&SurveyRecord::new().with(GENDER, "xyz123"));

        assert_eq!(
            clean.value(preprocessor.schema(), GENDER),
            Some(&CleanValue::Category("Other".to_string()))
        );
    }

    #[test]
    fn test_missing_fields_take_fitted_defaults() {
        let (preprocessor, _) = fitted();
        let clean = preprocessor.clean(&SurveyRecord::new());
        let schema = preprocessor.schema();

        for spec in schema.fields() {
            let value = clean.value(schema, &spec.name).unwrap();
            if schema.is_input(&spec.name) {
                assert_eq!(Some(value), preprocessor.fill_value(&spec.name));
            }
        }
        assert!(matches!(
            clean.value(schema, COMPANY_SIZE),
            Some(CleanValue::Category(c)) if !c.is_empty()
        ));
    }

    #[test]
    fn test_cleaning_is_idempotent() {
        let (preprocessor, records) = fitted();
        let schema = preprocessor.schema().clone();

        let malformed = SurveyRecord::new()
            .with(AGE, -40)
            .with(GENDER, "Cis Male")
            .with("work_interfere", "constantly")
            .with("benefits", "not sure")
            .with("no_employees", "26-100")
            .with("unknown_field", "ignored");

        let first = preprocessor.clean(&malformed);
        let second = preprocessor.clean(&malformed);
        assert_eq!(first, second);

        for record in records.iter().take(50).chain(std::iter::once(&malformed)) {
            let once = preprocessor.clean(record);
            let twice = preprocessor.clean(&once.to_record(&schema));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_country_matches_regardless_of_case() {
        let (preprocessor, _) = fitted();
        let base = SurveyRecord::new().with(AGE, 30);

        let canonical = preprocessor.transform(&base.clone().with(COUNTRY, "United States"));
        let lower = preprocessor.transform(&base.clone().with(COUNTRY, "united states"));
        let shouted = preprocessor.transform(&base.with(COUNTRY, "UNITED STATES"));
        assert_eq!(canonical, lower);
        assert_eq!(canonical, shouted);
        assert!(preprocessor
            .feature_names()
            .iter()
            .any(|name| name == "Country_United States"));
    }

    #[test]
    fn test_unknown_fields_are_reported() {
        let (preprocessor, _) = fitted();
        let record = SurveyRecord::new()
            .with(AGE, 30)
            .with("comments", "hello")
            .with(AGE_GROUP, "18-25");

        assert_eq!(preprocessor.unknown_fields(&record), vec!["age_group", "comments"]);
    }

    #[test]
    fn test_unrecognized_answers_are_counted() {
        let gender = GenderTable::default();
        let schema = Schema::survey(&gender.canonical_values());
        let records = vec![
            SurveyRecord::new()
                .with("supervisor", "Some of them")
                .with("mental_vs_physical", "Don't know"),
            SurveyRecord::new()
                .with("supervisor", "Yes")
                .with(AGE, "abc")
                .with(GENDER, "xyz123"),
            SurveyRecord::new()
                .with("supervisor", "some of them")
                .with("family_history", ""),
        ];

        assert_eq!(
            unrecognized_answers(&schema, &gender, &records),
            vec![
                (AGE.to_string(), 1),
                ("supervisor".to_string(), 2),
                ("mental_vs_physical".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_median_and_mode() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);

        assert_eq!(mode(["No", "Yes", "Yes", "No"].into_iter()), Some("No".to_string()));
        assert_eq!(mode(["No", "Yes", "Yes"].into_iter()), Some("Yes".to_string()));
        assert_eq!(mode(std::iter::empty()), None);
        assert_eq!(
            mode(["Canada", "india", "India", "INDIA"].into_iter()),
            Some("india".to_string())
        );
    }
}
