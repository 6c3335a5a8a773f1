//! Record cleaning: range clipping, category consolidation and derived fields.

use crate::schema::{
    FieldKind, FieldSpec, Normalizer, Schema, AGE, AGE_GROUP, AGE_GROUP_LEVELS, COMPANY_SIZE,
    NO_EMPLOYEES,
};
use crate::types::SurveyRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cleaned field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CleanValue {
    Number(f64),
    Category(String),
}

impl CleanValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CleanValue::Number(n) => Some(*n),
            CleanValue::Category(_) => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            CleanValue::Category(c) => Some(c),
            CleanValue::Number(_) => None,
        }
    }
}

/// A fully cleaned record: one value per schema field, in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct CleanRecord {
    values: Vec<CleanValue>,
}

impl CleanRecord {
    pub(crate) fn new(values: Vec<CleanValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[CleanValue] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&CleanValue> {
        self.values.get(index)
    }

    /// Value of a named field
    pub fn value(&self, schema: &Schema, name: &str) -> Option<&CleanValue> {
        schema.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Render the input fields back into record form
    pub fn to_record(&self, schema: &Schema) -> SurveyRecord {
        schema
            .fields()
            .iter()
            .zip(&self.values)
            .filter(|(spec, _)| schema.is_input(&spec.name))
            .map(|(spec, value)| {
                let json = match value {
                    CleanValue::Number(n) => serde_json::Number::from_f64(*n)
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                    CleanValue::Category(c) => Value::String(c.clone()),
                };
                (spec.name.clone(), json)
            })
            .collect()
    }
}

/// One consolidation rule for free-text gender answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenderRule {
    pub canonical: String,
    /// Lower-case answers that map to `canonical` exactly
    #[serde(default)]
    pub exact: Vec<String>,
    /// Lower-case fragments that map to `canonical` when contained in the answer
    #[serde(default)]
    pub contains: Vec<String>,
}

/// Many-to-one lookup table collapsing gender spellings into a few buckets.
///
/// Exact matches across all rules win over substring matches; anything left
/// over maps to `fallback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenderTable {
    pub rules: Vec<GenderRule>,
    pub fallback: String,
}

impl GenderTable {
    pub fn normalize(&self, raw: &str) -> String {
        let answer = raw.trim().to_lowercase();

        let exact = self
            .rules
            .iter()
            .find(|rule| rule.exact.iter().any(|v| *v == answer));
        let contains = || {
            self.rules
                .iter()
                .find(|rule| rule.contains.iter().any(|frag| answer.contains(frag.as_str())))
        };

        match exact.or_else(contains) {
            Some(rule) => rule.canonical.clone(),
            None => self.fallback.clone(),
        }
    }

    /// Every bucket the table can produce, in rule order, fallback last
    pub fn canonical_values(&self) -> Vec<String> {
        let mut values: Vec<String> = Vec::new();
        for rule in &self.rules {
            if !values.contains(&rule.canonical) {
                values.push(rule.canonical.clone());
            }
        }
        if !values.contains(&self.fallback) {
            values.push(self.fallback.clone());
        }
        values
    }
}

fn rule(canonical: &str, exact: &[&str], contains: &[&str]) -> GenderRule {
    GenderRule {
        canonical: canonical.to_string(),
        exact: exact.iter().map(|s| s.to_string()).collect(),
        contains: contains.iter().map(|s| s.to_string()).collect(),
    }
}

impl Default for GenderTable {
    fn default() -> Self {
        Self {
            rules: vec![
                rule(
                    "Male",
                    &[
                        "m",
                        "male",
                        "mail",
                        "maile",
                        "mal",
                        "make",
                        "man",
                        "msle",
                        "cis male",
                        "cis man",
                        "male-ish",
                        "malr",
                        "ostensibly male",
                        "something kinda male?",
                    ],
                    &[],
                ),
                rule(
                    "Female",
                    &[
                        "f",
                        "female",
                        "woman",
                        "femail",
                        "femake",
                        "cis female",
                        "cis-female/femme",
                        "female (cis)",
                        "female (trans)",
                    ],
                    &[],
                ),
                rule(
                    "Transgender",
                    &[],
                    &["trans-female", "trans woman", "trans male", "transgender"],
                ),
                rule(
                    "Non-binary",
                    &["non-binary", "genderqueer", "androgyne", "agender"],
                    &[],
                ),
            ],
            fallback: "Other".to_string(),
        }
    }
}

/// Read one input field from a raw record, clipping numbers and canonicalizing answers.
///
/// Returns `None` when the field is absent or unusable; the caller imputes.
pub fn read_field(spec: &FieldSpec, gender: &GenderTable, record: &SurveyRecord) -> Option<CleanValue> {
    match &spec.kind {
        FieldKind::Numeric { min, max } => record
            .number(&spec.name)
            .map(|n| CleanValue::Number(n.clamp(*min, *max))),
        FieldKind::Nominal { .. } | FieldKind::Ordinal { .. } => {
            let text = record.text(&spec.name)?;
            let value = match spec.normalizer {
                Normalizer::Gender => Some(gender.normalize(&text)),
                Normalizer::Standard => spec.canonicalize(&text),
            }?;
            Some(CleanValue::Category(value))
        }
    }
}

/// Age bracket for a clipped age
pub fn age_group(age: f64) -> &'static str {
    if age <= 25.0 {
        AGE_GROUP_LEVELS[0]
    } else if age <= 35.0 {
        AGE_GROUP_LEVELS[1]
    } else if age <= 45.0 {
        AGE_GROUP_LEVELS[2]
    } else {
        AGE_GROUP_LEVELS[3]
    }
}

/// Company size bucket for an employee-count answer
pub fn company_size(no_employees: &str) -> &'static str {
    match no_employees {
        "1-5" | "6-25" => "Small",
        "26-100" => "Medium",
        "100-500" | "500-1000" => "Large",
        _ => "Very Large",
    }
}

/// Compute a derived field from the already imputed input values
pub fn derive(schema: &Schema, name: &str, values: &[CleanValue]) -> CleanValue {
    let input = |field: &str| schema.index_of(field).and_then(|i| values.get(i));

    match name {
        AGE_GROUP => {
            let age = input(AGE).and_then(CleanValue::as_number).unwrap_or(18.0);
            CleanValue::Category(age_group(age).to_string())
        }
        COMPANY_SIZE => {
            let size = input(NO_EMPLOYEES)
                .and_then(CleanValue::as_category)
                .unwrap_or("1-5");
            CleanValue::Category(company_size(size).to_string())
        }
        _ => CleanValue::Category(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gender_variants() {
        let table = GenderTable::default();

        assert_eq!(table.normalize("M"), "Male");
        assert_eq!(table.normalize(" cis male "), "Male");
        assert_eq!(table.normalize("Woman"), "Female");
        assert_eq!(table.normalize("Female (trans)"), "Female");
        assert_eq!(table.normalize("Trans woman"), "Transgender");
        assert_eq!(table.normalize("genderqueer"), "Non-binary");
        assert_eq!(table.normalize("xyz123"), "Other");
    }

    #[test]
    fn test_gender_buckets_are_fixed_points() {
        let table = GenderTable::default();
        for bucket in table.canonical_values() {
            assert_eq!(table.normalize(&bucket), bucket);
        }
    }

    #[test]
    fn test_age_clipping() {
        let schema = Schema::survey(&GenderTable::default().canonical_values());
        let spec = schema.field(AGE).unwrap();
        let table = GenderTable::default();

        let young = SurveyRecord::new().with(AGE, 5);
        let old = SurveyRecord::new().with(AGE, 999);
        let text = SurveyRecord::new().with(AGE, "31");

        assert_eq!(read_field(spec, &table, &young), Some(CleanValue::Number(18.0)));
        assert_eq!(read_field(spec, &table, &old), Some(CleanValue::Number(80.0)));
        assert_eq!(read_field(spec, &table, &text), Some(CleanValue::Number(31.0)));
    }

    #[test]
    fn test_invalid_category_reads_as_missing() {
        let schema = Schema::survey(&GenderTable::default().canonical_values());
        let spec = schema.field("work_interfere").unwrap();
        let record = SurveyRecord::new().with("work_interfere", "Constantly");

        assert_eq!(read_field(spec, &GenderTable::default(), &record), None);
    }

    #[test]
    fn test_derived_buckets() {
        assert_eq!(age_group(18.0), "18-25");
        assert_eq!(age_group(25.0), "18-25");
        assert_eq!(age_group(25.5), "26-35");
        assert_eq!(age_group(45.0), "36-45");
        assert_eq!(age_group(80.0), "46+");

        assert_eq!(company_size("6-25"), "Small");
        assert_eq!(company_size("26-100"), "Medium");
        assert_eq!(company_size("500-1000"), "Large");
        assert_eq!(company_size("More than 1000"), "Very Large");
    }
}
