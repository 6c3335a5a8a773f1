//! Fitted encoders turning cleaned records into feature vectors.

use super::cleaning::{CleanRecord, CleanValue};
use crate::schema::{FieldKind, Schema};
use serde::{Deserialize, Serialize};

/// Name suffix of the reserved bucket for categories outside the vocabulary
pub const UNKNOWN_BUCKET: &str = "UNK";

/// Fully encoded numeric representation of a record
pub type FeatureVector = Vec<f64>;

/// Per-field encoding state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "snake_case")]
pub enum ColumnEncoder {
    /// `(x - mean) / std`
    Standardize { mean: f64, std: f64 },
    /// Position in the declared level order
    Ordinal { levels: Vec<String> },
    /// One column per vocabulary entry plus a trailing UNK column.
    /// Entries match case-insensitively.
    OneHot { vocabulary: Vec<String> },
}

impl ColumnEncoder {
    fn width(&self) -> usize {
        match self {
            ColumnEncoder::Standardize { .. } | ColumnEncoder::Ordinal { .. } => 1,
            ColumnEncoder::OneHot { vocabulary } => vocabulary.len() + 1,
        }
    }

    fn encode_into(&self, value: &CleanValue, out: &mut FeatureVector) {
        match self {
            ColumnEncoder::Standardize { mean, std } => {
                let x = value.as_number().unwrap_or(*mean);
                out.push((x - mean) / std);
            }
            ColumnEncoder::Ordinal { levels } => {
                let code = value
                    .as_category()
                    .and_then(|c| levels.iter().position(|l| l == c))
                    .unwrap_or(levels.len() / 2);
                out.push(code as f64);
            }
            ColumnEncoder::OneHot { vocabulary } => {
                let hot = value
                    .as_category()
                    .and_then(|c| vocabulary.iter().position(|v| v.eq_ignore_ascii_case(c)))
                    .unwrap_or(vocabulary.len());
                out.extend((0..=vocabulary.len()).map(|i| if i == hot { 1.0 } else { 0.0 }));
            }
        }
    }
}

/// Encoders for every schema field, fitted once and never mutated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderState {
    encoders: Vec<ColumnEncoder>,
    feature_names: Vec<String>,
    /// Schema field index each feature column came from
    feature_sources: Vec<usize>,
}

impl EncoderState {
    /// Fit encoders from cleaned training records.
    ///
    /// Nominal vocabularies keep the `max_categories` most frequent values,
    /// ties broken by first-seen order, and assign codes in first-seen order.
    /// Spellings differing only in case count as one value, kept as first seen.
    pub fn fit(schema: &Schema, records: &[CleanRecord], max_categories: usize) -> Self {
        let mut encoders = Vec::with_capacity(schema.len());
        let mut feature_names = Vec::new();
        let mut feature_sources = Vec::new();

        for (index, spec) in schema.fields().iter().enumerate() {
            let column = records.iter().filter_map(|r| r.get(index));

            let encoder = match &spec.kind {
                FieldKind::Numeric { .. } => {
                    let values: Vec<f64> = column.filter_map(CleanValue::as_number).collect();
                    let (mean, std) = mean_std(&values);
                    ColumnEncoder::Standardize { mean, std }
                }
                FieldKind::Ordinal { levels } => ColumnEncoder::Ordinal {
                    levels: levels.clone(),
                },
                FieldKind::Nominal { .. } => ColumnEncoder::OneHot {
                    vocabulary: vocabulary(column.filter_map(CleanValue::as_category), max_categories),
                },
            };

            match &encoder {
                ColumnEncoder::OneHot { vocabulary } => {
                    for value in vocabulary {
                        feature_names.push(format!("{}_{}", spec.name, value));
                    }
                    feature_names.push(format!("{}_{}", spec.name, UNKNOWN_BUCKET));
                }
                _ => feature_names.push(spec.name.clone()),
            }
            feature_sources.extend(std::iter::repeat(index).take(encoder.width()));
            encoders.push(encoder);
        }

        Self {
            encoders,
            feature_names,
            feature_sources,
        }
    }

    /// Encode a cleaned record. Never re-fits.
    pub fn encode(&self, record: &CleanRecord) -> FeatureVector {
        let mut out = Vec::with_capacity(self.feature_names.len());
        for (index, encoder) in self.encoders.iter().enumerate() {
            match record.get(index) {
                Some(value) => encoder.encode_into(value, &mut out),
                None => encoder.encode_into(&CleanValue::Category(String::new()), &mut out),
            }
        }
        out
    }

    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn feature_sources(&self) -> &[usize] {
        &self.feature_sources
    }

    pub fn encoders(&self) -> &[ColumnEncoder] {
        &self.encoders
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 1.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    (mean, if std > 0.0 { std } else { 1.0 })
}

fn vocabulary<'a>(values: impl Iterator<Item = &'a str>, max_categories: usize) -> Vec<String> {
    // (value, count) in first-seen order
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| v.eq_ignore_ascii_case(value)) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }

    let mut ranked: Vec<usize> = (0..counts.len()).collect();
    ranked.sort_by(|&a, &b| counts[b].1.cmp(&counts[a].1));
    ranked.truncate(max_categories);
    ranked.sort_unstable();

    ranked.into_iter().map(|i| counts[i].0.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;

    fn schema() -> Schema {
        Schema::new(vec![
            FieldSpec::numeric("x", 0.0, 10.0),
            FieldSpec::ordinal("level", &["Low", "High"]),
            FieldSpec::open_nominal("city"),
        ])
    }

    fn row(x: f64, level: &str, city: &str) -> CleanRecord {
        CleanRecord::new(vec![
            CleanValue::Number(x),
            CleanValue::Category(level.to_string()),
            CleanValue::Category(city.to_string()),
        ])
    }

    #[test]
    fn test_fit_and_encode() {
        let rows = vec![
            row(2.0, "Low", "Oslo"),
            row(4.0, "High", "Lima"),
            row(6.0, "Low", "Oslo"),
        ];
        let state = EncoderState::fit(&schema(), &rows, 10);

        assert_eq!(
            state.feature_names(),
            &["x", "level", "city_Oslo", "city_Lima", "city_UNK"]
        );
        assert_eq!(state.feature_sources(), &[0, 1, 2, 2, 2]);

        let encoded = state.encode(&row(4.0, "High", "Lima"));
        assert_eq!(encoded, vec![0.0, 1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_unseen_category_goes_to_unknown_bucket() {
        let rows = vec![row(1.0, "Low", "Oslo")];
        let state = EncoderState::fit(&schema(), &rows, 10);

        let encoded = state.encode(&row(1.0, "Low", "Quito"));
        assert_eq!(&encoded[2..], &[0.0, 1.0]);
    }

    #[test]
    fn test_vocabulary_keeps_most_frequent_in_first_seen_order() {
        let values = ["b", "a", "c", "a", "c", "d"];
        let vocab = vocabulary(values.iter().copied(), 2);
        // "a" and "c" tie on count; both beat "b" and "d", and keep first-seen order
        assert_eq!(vocab, vec!["a", "c"]);

        let vocab = vocabulary(values.iter().copied(), 3);
        assert_eq!(vocab, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_vocabulary_folds_case_to_first_spelling() {
        let rows = vec![
            row(1.0, "Low", "United States"),
            row(1.0, "Low", "united states"),
            row(1.0, "Low", "UNITED STATES"),
            row(1.0, "Low", "Canada"),
        ];
        let state = EncoderState::fit(&schema(), &rows, 10);

        assert_eq!(
            state.feature_names(),
            &["x", "level", "city_United States", "city_Canada", "city_UNK"]
        );
        let lower = state.encode(&row(1.0, "Low", "united states"));
        let upper = state.encode(&row(1.0, "Low", "UNITED STATES"));
        assert_eq!(&lower[2..], &[1.0, 0.0, 0.0]);
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_constant_numeric_column_has_unit_std() {
        let rows = vec![row(3.0, "Low", "Oslo"), row(3.0, "Low", "Oslo")];
        let state = EncoderState::fit(&schema(), &rows, 10);

        assert_eq!(
            state.encoders()[0],
            ColumnEncoder::Standardize { mean: 3.0, std: 1.0 }
        );
    }
}
