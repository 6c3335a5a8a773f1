//! Prediction outcome data structures

use serde::{Deserialize, Serialize};

/// Probability at or above which the positive class is predicted.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Predicted answer to "will this person seek treatment"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictedClass {
    Yes,
    No,
}

impl PredictedClass {
    /// Fixed-threshold decision on the positive-class probability
    pub fn from_probability(p_yes: f64) -> Self {
        if p_yes >= DECISION_THRESHOLD {
            PredictedClass::Yes
        } else {
            PredictedClass::No
        }
    }
}

/// Class probabilities; `yes + no == 1`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    #[serde(rename = "Yes")]
    pub yes: f64,
    #[serde(rename = "No")]
    pub no: f64,
}

impl ClassProbabilities {
    pub fn from_positive(p_yes: f64) -> Self {
        let yes = p_yes.clamp(0.0, 1.0);
        Self { yes, no: 1.0 - yes }
    }

    pub fn max(&self) -> f64 {
        self.yes.max(self.no)
    }
}

/// Confidence level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Bucket the larger of the two class probabilities
    pub fn from_probability(max_probability: f64, thresholds: &ConfidenceThresholds) -> Self {
        if max_probability >= thresholds.high {
            Confidence::High
        } else if max_probability >= thresholds.medium {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Configurable confidence thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: 0.75,
            medium: 0.6,
        }
    }
}

/// Whether a factor pushes the prediction towards or away from treatment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn of(impact: f64) -> Self {
        if impact > 0.0 {
            Direction::Positive
        } else {
            Direction::Negative
        }
    }
}

/// A single contributing factor, in log-odds units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub feature: String,
    pub impact: f64,
    pub direction: Direction,
}

impl Factor {
    pub fn new(feature: impl Into<String>, impact: f64) -> Self {
        Self {
            feature: feature.into(),
            impact,
            direction: Direction::of(impact),
        }
    }
}

/// Result of scoring one survey record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub predicted_class: PredictedClass,
    pub probability: ClassProbabilities,
    pub confidence: Confidence,
    /// Ordered by descending |impact|
    pub top_factors: Vec<Factor>,
    /// Identifier of the bundle that produced this outcome
    pub model_version: String,
}

impl Outcome {
    pub fn new(
        p_yes: f64,
        thresholds: &ConfidenceThresholds,
        top_factors: Vec<Factor>,
        model_version: String,
    ) -> Self {
        let probability = ClassProbabilities::from_positive(p_yes);
        Self {
            predicted_class: PredictedClass::from_probability(probability.yes),
            confidence: Confidence::from_probability(probability.max(), thresholds),
            probability,
            top_factors,
            model_version,
        }
    }
}
