//! Stratified splitting and classification metrics

use crate::error::TrainingDataError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Train and test row indices
pub type Split = (Vec<usize>, Vec<usize>);

/// Held-out and cross-validated scores stored with a model bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub roc_auc: f64,
    pub f1_weighted: f64,
    pub cv_auc_mean: f64,
    pub cv_auc_std: f64,
    pub cv_auc_folds: Vec<f64>,
    pub confusion_matrix: ConfusionMatrix,
    pub train_samples: usize,
    pub test_samples: usize,
}

/// Binary confusion matrix, positive class = Yes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: u64,
    pub false_positive: u64,
    pub false_negative: u64,
    pub true_positive: u64,
}

impl ConfusionMatrix {
    pub fn from_predictions(labels: &[bool], predictions: &[bool]) -> Self {
        let mut matrix = Self::default();
        for (&actual, &predicted) in labels.iter().zip(predictions) {
            match (actual, predicted) {
                (false, false) => matrix.true_negative += 1,
                (false, true) => matrix.false_positive += 1,
                (true, false) => matrix.false_negative += 1,
                (true, true) => matrix.true_positive += 1,
            }
        }
        matrix
    }

    /// `[[tn, fp], [fn, tp]]`
    pub fn rows(&self) -> [[u64; 2]; 2] {
        [
            [self.true_negative, self.false_positive],
            [self.false_negative, self.true_positive],
        ]
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.true_negative + self.false_positive + self.false_negative + self.true_positive;
        if total == 0 {
            return 0.0;
        }
        (self.true_negative + self.true_positive) as f64 / total as f64
    }
}

fn class_indices(labels: &[bool], class: bool) -> Vec<usize> {
    labels
        .iter()
        .enumerate()
        .filter(|(_, y)| **y == class)
        .map(|(i, _)| i)
        .collect()
}

fn class_name(class: bool) -> &'static str {
    if class {
        "Yes"
    } else {
        "No"
    }
}

/// Seeded stratified hold-out split keeping the class ratio in both parts
pub fn stratified_split(labels: &[bool], test_size: f64, seed: u64) -> Result<Split, TrainingDataError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in [false, true] {
        let mut indices = class_indices(labels, class);
        if indices.len() < 2 {
            return Err(TrainingDataError::ClassTooSmall {
                class: class_name(class),
                count: indices.len(),
                required: 2,
            });
        }
        indices.shuffle(&mut rng);

        let n_test = ((indices.len() as f64 * test_size).round() as usize).clamp(1, indices.len() - 1);
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

/// Seeded stratified k-fold assignment over `labels`
pub fn stratified_kfold(labels: &[bool], folds: usize, seed: u64) -> Result<Vec<Split>, TrainingDataError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut fold_of = vec![0usize; labels.len()];

    for class in [false, true] {
        let mut indices = class_indices(labels, class);
        if indices.len() < folds {
            return Err(TrainingDataError::ClassTooSmall {
                class: class_name(class),
                count: indices.len(),
                required: folds,
            });
        }
        indices.shuffle(&mut rng);
        for (position, index) in indices.into_iter().enumerate() {
            fold_of[index] = position % folds;
        }
    }

    Ok((0..folds)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| fold_of[i] == fold);
            (train, test)
        })
        .collect())
}

/// ROC AUC via the Mann-Whitney U statistic, ties given average ranks.
///
/// `None` when one of the classes is absent.
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Option<f64> {
    let positives = labels.iter().filter(|&&y| y).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // 1-based ranks start+1..=end share their mean
        let rank = (start + end + 1) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }

    let positive_rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(y, _)| **y)
        .map(|(_, r)| r)
        .sum();
    let u = positive_rank_sum - (positives * (positives + 1)) as f64 / 2.0;
    Some(u / (positives * negatives) as f64)
}

/// F1 of each class weighted by its support
pub fn weighted_f1(labels: &[bool], predictions: &[bool]) -> f64 {
    let matrix = ConfusionMatrix::from_predictions(labels, predictions);
    let f1 = |tp: u64, fp: u64, fn_: u64| {
        let denominator = 2 * tp + fp + fn_;
        if denominator == 0 {
            0.0
        } else {
            2.0 * tp as f64 / denominator as f64
        }
    };

    let positive_f1 = f1(matrix.true_positive, matrix.false_positive, matrix.false_negative);
    let negative_f1 = f1(matrix.true_negative, matrix.false_negative, matrix.false_positive);
    let positive_support = (matrix.true_positive + matrix.false_negative) as f64;
    let negative_support = (matrix.true_negative + matrix.false_positive) as f64;
    let total = positive_support + negative_support;
    if total == 0.0 {
        return 0.0;
    }
    (positive_f1 * positive_support + negative_f1 * negative_support) / total
}

/// Mean and population standard deviation
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(positives: usize, negatives: usize) -> Vec<bool> {
        let mut labels = vec![true; positives];
        labels.extend(vec![false; negatives]);
        labels
    }

    #[test]
    fn test_stratified_split_keeps_ratio() {
        let labels = labels(40, 60);
        let (train, test) = stratified_split(&labels, 0.2, 42).unwrap();

        assert_eq!(train.len() + test.len(), 100);
        assert_eq!(test.iter().filter(|&&i| labels[i]).count(), 8);
        assert_eq!(test.iter().filter(|&&i| !labels[i]).count(), 12);
        assert!(train.iter().all(|i| !test.contains(i)));

        assert_eq!(stratified_split(&labels, 0.2, 42).unwrap(), (train, test));
    }

    #[test]
    fn test_split_rejects_degenerate_classes() {
        let err = stratified_split(&labels(1, 50), 0.2, 42).unwrap_err();
        assert!(matches!(err, TrainingDataError::ClassTooSmall { class: "Yes", .. }));
    }

    #[test]
    fn test_kfold_covers_every_row_once() {
        let y = labels(23, 31);
        let folds = stratified_kfold(&y, 5, 42).unwrap();
        assert_eq!(folds.len(), 5);

        let mut seen = vec![0; y.len()];
        for (train, test) in &folds {
            assert_eq!(train.len() + test.len(), y.len());
            let positives = test.iter().filter(|&&i| y[i]).count();
            assert!((4..=5).contains(&positives));
            for &i in test {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));

        assert!(stratified_kfold(&labels(3, 30), 5, 42).is_err());
    }

    #[test]
    fn test_roc_auc() {
        let labels = [false, false, true, true];
        assert_eq!(roc_auc(&labels, &[0.1, 0.4, 0.35, 0.8]), Some(0.75));
        assert_eq!(roc_auc(&labels, &[0.1, 0.2, 0.3, 0.4]), Some(1.0));
        assert_eq!(roc_auc(&labels, &[0.5, 0.5, 0.5, 0.5]), Some(0.5));
        assert_eq!(roc_auc(&[true, true], &[0.1, 0.2]), None);
    }

    #[test]
    fn test_weighted_f1_and_confusion() {
        let labels = [true, true, false, false];
        let predictions = [true, false, false, false];

        let matrix = ConfusionMatrix::from_predictions(&labels, &predictions);
        assert_eq!(matrix.rows(), [[2, 0], [1, 1]]);
        assert_eq!(matrix.accuracy(), 0.75);

        // Yes: 2/3, No: 0.8, equal support
        let f1 = weighted_f1(&labels, &predictions);
        assert!((f1 - (2.0 / 3.0 + 0.8) / 2.0).abs() < 1e-12);
        assert_eq!(weighted_f1(&labels, &labels), 1.0);
    }
}
