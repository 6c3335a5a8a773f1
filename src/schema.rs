//! Canonical survey schema.
//!
//! Every field the pipeline understands is listed here, in feature order.
//! Record keys that are not in the schema are ignored.

use serde::{Deserialize, Serialize};

pub const AGE: &str = "Age";
pub const GENDER: &str = "Gender";
pub const COUNTRY: &str = "Country";
pub const NO_EMPLOYEES: &str = "no_employees";
pub const AGE_GROUP: &str = "age_group";
pub const COMPANY_SIZE: &str = "company_size_category";

const YES_NO: &[&str] = &["No", "Yes"];
const YES_NO_DONT_KNOW: &[&str] = &["Yes", "No", "Don't know"];
const YES_NO_MAYBE: &[&str] = &["Yes", "No", "Maybe"];

/// Company size levels, smallest first
pub const EMPLOYEE_LEVELS: &[&str] = &[
    "1-5",
    "6-25",
    "26-100",
    "100-500",
    "500-1000",
    "More than 1000",
];

/// Age bracket levels; upper bounds are 25, 35, 45 and open
pub const AGE_GROUP_LEVELS: &[&str] = &["18-25", "26-35", "36-45", "46+"];

/// How a field's values are interpreted and encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Continuous value clipped to `[min, max]`, standardized
    Numeric { min: f64, max: f64 },
    /// Unordered category, one-hot encoded. `values: None` accepts any text.
    Nominal { values: Option<Vec<String>> },
    /// Ordered category encoded by its position in `levels`
    Ordinal { levels: Vec<String> },
}

/// Whether a field is read from the record or computed from other fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    Input,
    Derived,
}

/// How raw text is mapped onto the allowed values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalizer {
    /// Case-insensitive match against allowed values and aliases
    Standard,
    /// Many-to-one free-text consolidation table
    Gender,
}

/// Definition of one survey attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub role: FieldRole,
    pub normalizer: Normalizer,
    /// Alternative spellings, `(alias, canonical)`
    #[serde(default)]
    pub aliases: Vec<(String, String)>,
}

impl FieldSpec {
    fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            role: FieldRole::Input,
            normalizer: Normalizer::Standard,
            aliases: Vec::new(),
        }
    }

    pub fn numeric(name: &str, min: f64, max: f64) -> Self {
        Self::new(name, FieldKind::Numeric { min, max })
    }

    pub fn nominal(name: &str, values: &[&str]) -> Self {
        Self::new(
            name,
            FieldKind::Nominal {
                values: Some(values.iter().map(|v| v.to_string()).collect()),
            },
        )
    }

    pub fn open_nominal(name: &str) -> Self {
        Self::new(name, FieldKind::Nominal { values: None })
    }

    pub fn ordinal(name: &str, levels: &[&str]) -> Self {
        Self::new(
            name,
            FieldKind::Ordinal {
                levels: levels.iter().map(|v| v.to_string()).collect(),
            },
        )
    }

    pub fn derived(mut self) -> Self {
        self.role = FieldRole::Derived;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_alias(mut self, alias: &str, canonical: &str) -> Self {
        self.aliases.push((alias.to_string(), canonical.to_string()));
        self
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, FieldKind::Numeric { .. })
    }

    /// Allowed category values; `None` for numeric and open nominal fields
    pub fn allowed_values(&self) -> Option<&[String]> {
        match &self.kind {
            FieldKind::Nominal { values } => values.as_deref(),
            FieldKind::Ordinal { levels } => Some(levels),
            FieldKind::Numeric { .. } => None,
        }
    }

    /// Map raw text onto the canonical spelling of an allowed value.
    ///
    /// Returns `None` when the text is not a recognised value. Open nominal
    /// fields accept any non-empty text verbatim.
    pub fn canonicalize(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let resolved = self
            .aliases
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(raw))
            .map(|(_, canonical)| canonical.as_str())
            .unwrap_or(raw);

        match self.allowed_values() {
            Some(allowed) => allowed
                .iter()
                .find(|v| v.eq_ignore_ascii_case(resolved))
                .cloned(),
            None if self.is_numeric() => None,
            None => Some(resolved.to_string()),
        }
    }
}

/// Ordered collection of field definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// The OSMI Mental Health in Tech survey schema
    pub fn survey(gender_values: &[String]) -> Self {
        let genders: Vec<&str> = gender_values.iter().map(String::as_str).collect();

        Self::new(vec![
            FieldSpec::numeric(AGE, 18.0, 80.0),
            FieldSpec::nominal(GENDER, &genders).with_normalizer(Normalizer::Gender),
            FieldSpec::open_nominal(COUNTRY),
            FieldSpec::ordinal("self_employed", YES_NO),
            FieldSpec::ordinal("family_history", YES_NO),
            FieldSpec::ordinal("work_interfere", &["Never", "Rarely", "Sometimes", "Often"]),
            FieldSpec::ordinal(NO_EMPLOYEES, EMPLOYEE_LEVELS),
            FieldSpec::ordinal("remote_work", YES_NO),
            FieldSpec::ordinal("tech_company", YES_NO),
            FieldSpec::nominal("benefits", YES_NO_DONT_KNOW).with_alias("Not sure", "Don't know"),
            FieldSpec::nominal("care_options", YES_NO_DONT_KNOW)
                .with_alias("Not sure", "Don't know"),
            FieldSpec::nominal("wellness_program", YES_NO_DONT_KNOW)
                .with_alias("Not sure", "Don't know"),
            FieldSpec::ordinal("seek_help", YES_NO),
            FieldSpec::ordinal("anonymity", YES_NO),
            FieldSpec::ordinal(
                "leave",
                &[
                    "Very easy",
                    "Somewhat easy",
                    "Don't know",
                    "Somewhat difficult",
                    "Very difficult",
                ],
            ),
            FieldSpec::ordinal("mental_health_consequence", YES_NO),
            FieldSpec::ordinal("phys_health_consequence", YES_NO),
            FieldSpec::nominal("coworkers", &["Yes", "Some of them", "No"]),
            // Survey answers "Some of them" and "Don't know" fall outside No/Yes
            // and are imputed; fitting logs how many were seen.
            FieldSpec::ordinal("supervisor", YES_NO),
            FieldSpec::nominal("mental_health_interview", YES_NO_MAYBE),
            FieldSpec::nominal("phys_health_interview", YES_NO_MAYBE),
            // "Don't know" is imputed, as for supervisor
            FieldSpec::ordinal("mental_vs_physical", YES_NO),
            FieldSpec::ordinal("obs_consequence", YES_NO),
            FieldSpec::ordinal(AGE_GROUP, AGE_GROUP_LEVELS).derived(),
            FieldSpec::nominal(COMPANY_SIZE, &["Small", "Medium", "Large", "Very Large"]).derived(),
        ])
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether `name` is a field read from records
    pub fn is_input(&self, name: &str) -> bool {
        self.field(name)
            .is_some_and(|f| f.role == FieldRole::Input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::survey(&["Male".to_string(), "Female".to_string(), "Other".to_string()])
    }

    #[test]
    fn test_survey_schema_layout() {
        let schema = schema();
        assert_eq!(schema.len(), 25);
        assert_eq!(schema.index_of(AGE), Some(0));
        assert!(schema.is_input("family_history"));
        assert!(!schema.is_input(AGE_GROUP));
        assert!(!schema.is_input("comments"));
    }

    #[test]
    fn test_canonicalize_is_case_insensitive() {
        let schema = schema();
        let field = schema.field("family_history").unwrap();

        assert_eq!(field.canonicalize("yes").as_deref(), Some("Yes"));
        assert_eq!(field.canonicalize(" NO ").as_deref(), Some("No"));
        assert_eq!(field.canonicalize("Maybe"), None);
    }

    #[test]
    fn test_canonicalize_resolves_aliases() {
        let schema = schema();
        let field = schema.field("benefits").unwrap();

        assert_eq!(field.canonicalize("not sure").as_deref(), Some("Don't know"));
        assert_eq!(field.canonicalize("Don't know").as_deref(), Some("Don't know"));
    }

    #[test]
    fn test_open_nominal_accepts_any_text() {
        let schema = schema();
        let field = schema.field(COUNTRY).unwrap();

        assert_eq!(field.canonicalize(" Portugal ").as_deref(), Some("Portugal"));
        assert_eq!(field.canonicalize("   "), None);
    }
}
