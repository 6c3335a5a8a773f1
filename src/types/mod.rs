//! Type definitions for the treatment prediction pipeline

pub mod outcome;
pub mod record;

pub use outcome::{ClassProbabilities, Confidence, Direction, Factor, Outcome, PredictedClass};
pub use record::SurveyRecord;
