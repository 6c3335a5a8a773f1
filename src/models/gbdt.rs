//! Gradient-boosted decision trees for binary classification.
//!
//! Logistic loss with second-order leaf weights, L1/L2 regularization,
//! row and column subsampling and histogram split search over fixed cut
//! points. Everything random is drawn from one seeded generator, so the
//! same data and parameters always produce the same ensemble.

use super::tree::{Node, Tree};
use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Fraction of rows sampled (without replacement) per tree
    pub subsample: f64,
    /// Fraction of feature columns sampled per tree
    pub colsample_bytree: f64,
    /// Minimum hessian sum in each child of a split
    pub min_child_weight: f64,
    /// Minimum gain required to keep a split
    pub gamma: f64,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    /// Instance weight of positive rows
    pub scale_pos_weight: f64,
    /// Maximum histogram bins per feature
    pub max_bins: usize,
    pub seed: u64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 6,
            learning_rate: 0.1,
            subsample: 0.8,
            colsample_bytree: 0.8,
            min_child_weight: 1.0,
            gamma: 0.0,
            reg_alpha: 0.1,
            reg_lambda: 1.0,
            scale_pos_weight: 1.2,
            max_bins: 256,
            seed: 42,
        }
    }
}

impl ModelParams {
    fn check(&self) -> Result<()> {
        if self.n_estimators == 0 {
            bail!("n_estimators must be positive");
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            bail!("subsample must be in (0, 1], got {}", self.subsample);
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            bail!("colsample_bytree must be in (0, 1], got {}", self.colsample_bytree);
        }
        if self.max_bins < 2 {
            bail!("max_bins must be at least 2");
        }
        if self.learning_rate <= 0.0 || self.reg_lambda < 0.0 || self.reg_alpha < 0.0 {
            bail!("learning_rate must be positive and regularization non-negative");
        }
        if self.scale_pos_weight <= 0.0 {
            bail!("scale_pos_weight must be positive");
        }
        Ok(())
    }
}

/// Feature name with its normalized total split gain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Fitted boosted ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    params: ModelParams,
    feature_count: usize,
    /// Initial margin: log-odds of the weighted positive rate
    base_margin: f64,
    trees: Vec<Tree>,
    /// Total split gain per feature column
    gains: Vec<f64>,
}

impl GradientBoostedClassifier {
    /// Fit on a dense feature matrix, `labels[i]` true for the positive class
    pub fn fit(features: &[Vec<f64>], labels: &[bool], params: &ModelParams) -> Result<Self> {
        params.check()?;
        if features.is_empty() {
            bail!("cannot fit on an empty feature matrix");
        }
        if features.len() != labels.len() {
            bail!(
                "feature matrix has {} rows but {} labels were given",
                features.len(),
                labels.len()
            );
        }
        let feature_count = features[0].len();
        if feature_count == 0 || features.iter().any(|row| row.len() != feature_count) {
            bail!("feature rows must be non-empty and of equal width");
        }
        if features.iter().flatten().any(|v| !v.is_finite()) {
            bail!("feature matrix contains non-finite values");
        }

        let weights: Vec<f64> = labels
            .iter()
            .map(|&y| if y { params.scale_pos_weight } else { 1.0 })
            .collect();
        let (mut positive, mut negative) = (0.0f64, 0.0f64);
        for (w, &y) in weights.iter().zip(labels) {
            if y {
                positive += *w;
            } else {
                negative += *w;
            }
        }
        if positive == 0.0 || negative == 0.0 {
            bail!("training labels contain a single class");
        }
        let base_margin = (positive / negative).ln();

        let n_rows = features.len();
        let cuts: Vec<Vec<f64>> = (0..feature_count)
            .map(|f| cut_points(features.iter().map(|row| row[f]), params.max_bins))
            .collect();
        let bins: Vec<Vec<u32>> = cuts
            .iter()
            .enumerate()
            .map(|(f, feature_cuts)| {
                features
                    .iter()
                    .map(|row| bin_of(feature_cuts, row[f]))
                    .collect()
            })
            .collect();

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut margins = vec![base_margin; n_rows];
        let mut gradients = vec![0.0; n_rows];
        let mut hessians = vec![0.0; n_rows];
        let mut gains = vec![0.0; feature_count];
        let mut trees = Vec::with_capacity(params.n_estimators);

        let row_sample = ((n_rows as f64 * params.subsample).round() as usize).clamp(1, n_rows);
        let col_sample =
            ((feature_count as f64 * params.colsample_bytree).round() as usize).clamp(1, feature_count);

        for round in 0..params.n_estimators {
            for i in 0..n_rows {
                let p = sigmoid(margins[i]);
                let y = if labels[i] { 1.0 } else { 0.0 };
                gradients[i] = weights[i] * (p - y);
                hessians[i] = (weights[i] * p * (1.0 - p)).max(1e-16);
            }

            let mut rows: Vec<usize> = sample(&mut rng, n_rows, row_sample).into_vec();
            rows.sort_unstable();
            let mut columns: Vec<usize> = sample(&mut rng, feature_count, col_sample).into_vec();
            columns.sort_unstable();

            let mut builder = TreeBuilder {
                params,
                cuts: &cuts,
                bins: &bins,
                gradients: &gradients,
                hessians: &hessians,
                columns: &columns,
                nodes: Vec::new(),
                gains: &mut gains,
            };
            builder.grow(rows, 0);
            let tree = Tree::new(builder.nodes);

            for (margin, row) in margins.iter_mut().zip(features) {
                *margin += tree.predict(row);
            }

            if (round + 1) % 50 == 0 {
                debug!(round = round + 1, nodes = tree.nodes().len(), "Boosting progress");
            }
            trees.push(tree);
        }

        info!(
            trees = trees.len(),
            features = feature_count,
            rows = n_rows,
            base_margin,
            "Gradient boosted classifier fitted"
        );

        Ok(Self {
            params: params.clone(),
            feature_count,
            base_margin,
            trees,
            gains,
        })
    }

    /// Raw log-odds output
    pub fn margin(&self, x: &[f64]) -> f64 {
        self.base_margin + self.trees.iter().map(|t| t.predict(x)).sum::<f64>()
    }

    /// Probability of the positive class
    pub fn predict_proba(&self, x: &[f64]) -> f64 {
        sigmoid(self.margin(x))
    }

    pub fn predict_proba_batch(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|x| self.predict_proba(x)).collect()
    }

    pub fn base_margin(&self) -> f64 {
        self.base_margin
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Total split gain per feature, normalized to sum to one
    pub fn feature_importances(&self) -> Vec<f64> {
        let total: f64 = self.gains.iter().sum();
        if total <= 0.0 {
            return vec![0.0; self.gains.len()];
        }
        self.gains.iter().map(|g| g / total).collect()
    }

    /// Importances paired with names, highest first
    pub fn ranked_importances(&self, names: &[String]) -> Vec<FeatureImportance> {
        let mut ranked: Vec<FeatureImportance> = names
            .iter()
            .zip(self.feature_importances())
            .map(|(name, importance)| FeatureImportance {
                feature: name.clone(),
                importance,
            })
            .collect();
        ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        ranked
    }

    /// Structural checks used when a model is loaded from disk
    pub fn validate(&self) -> Result<(), String> {
        if self.gains.len() != self.feature_count {
            return Err("gain vector does not match feature count".to_string());
        }
        if !self.base_margin.is_finite() {
            return Err("base margin is not finite".to_string());
        }
        for (index, tree) in self.trees.iter().enumerate() {
            tree.validate(self.feature_count)
                .map_err(|e| format!("tree {index}: {e}"))?;
        }
        Ok(())
    }
}

pub fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// L1 soft-thresholding of a gradient sum
fn soft_threshold(g: f64, alpha: f64) -> f64 {
    if g > alpha {
        g - alpha
    } else if g < -alpha {
        g + alpha
    } else {
        0.0
    }
}

/// Candidate thresholds: midpoints between consecutive distinct values,
/// thinned evenly when there are more than `max_bins - 1` of them
fn cut_points(values: impl Iterator<Item = f64>, max_bins: usize) -> Vec<f64> {
    let mut distinct: Vec<f64> = values.collect();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();

    let midpoints: Vec<f64> = distinct.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    let limit = max_bins - 1;
    if midpoints.len() <= limit {
        return midpoints;
    }

    let mut thinned: Vec<f64> = (0..limit)
        .map(|k| midpoints[k * midpoints.len() / limit])
        .collect();
    thinned.dedup();
    thinned
}

/// Number of cut points `<= x`; bins `<= k` fall left of cut `k`
fn bin_of(cuts: &[f64], x: f64) -> u32 {
    cuts.partition_point(|&c| c <= x) as u32
}

struct SplitCandidate {
    feature: usize,
    cut: usize,
    gain: f64,
}

struct TreeBuilder<'a> {
    params: &'a ModelParams,
    cuts: &'a [Vec<f64>],
    /// Feature-major bin indices
    bins: &'a [Vec<u32>],
    gradients: &'a [f64],
    hessians: &'a [f64],
    columns: &'a [usize],
    nodes: Vec<Node>,
    gains: &'a mut [f64],
}

impl TreeBuilder<'_> {
    fn score(&self, g: f64, h: f64) -> f64 {
        let t = soft_threshold(g, self.params.reg_alpha);
        t * t / (h + self.params.reg_lambda)
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        -soft_threshold(g, self.params.reg_alpha) / (h + self.params.reg_lambda)
            * self.params.learning_rate
    }

    /// Grow the subtree for `rows` and return its node index
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&r| self.gradients[r]).sum();
        let h: f64 = rows.iter().map(|&r| self.hessians[r]).sum();

        let index = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(g, h),
        });

        if depth >= self.params.max_depth || rows.len() < 2 {
            return index;
        }
        let Some(split) = self.best_split(&rows, g, h) else {
            return index;
        };

        let feature_bins = &self.bins[split.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| feature_bins[r] as usize <= split.cut);

        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);

        self.gains[split.feature] += split.gain;
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: self.cuts[split.feature][split.cut],
            left,
            right,
            gain: split.gain,
        };
        index
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let parent = self.score(g, h);
        let mut best: Option<SplitCandidate> = None;

        for &feature in self.columns {
            let cuts = &self.cuts[feature];
            if cuts.is_empty() {
                continue;
            }

            let mut hist_g = vec![0.0; cuts.len() + 1];
            let mut hist_h = vec![0.0; cuts.len() + 1];
            let mut hist_n = vec![0usize; cuts.len() + 1];
            for &r in rows {
                let b = self.bins[feature][r] as usize;
                hist_g[b] += self.gradients[r];
                hist_h[b] += self.hessians[r];
                hist_n[b] += 1;
            }

            let (mut gl, mut hl, mut nl) = (0.0, 0.0, 0usize);
            for cut in 0..cuts.len() {
                gl += hist_g[cut];
                hl += hist_h[cut];
                nl += hist_n[cut];
                let (gr, hr) = (g - gl, h - hl);
                if nl == 0 || nl == rows.len() {
                    continue;
                }
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }

                let gain =
                    0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent) - self.params.gamma;
                if gain > best.as_ref().map_or(0.0, |b| b.gain) {
                    best = Some(SplitCandidate { feature, cut, gain });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> ModelParams {
        ModelParams {
            n_estimators: 40,
            max_depth: 3,
            ..ModelParams::default()
        }
    }

    /// Label is `x0 > 0.5`, with a noise column
    fn toy_data() -> (Vec<Vec<f64>>, Vec<bool>) {
        let mut rng = StdRng::seed_from_u64(1);
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..200 {
            let x0 = (i % 100) as f64 / 100.0;
            let noise: f64 = rand::Rng::gen(&mut rng);
            rows.push(vec![x0, noise]);
            labels.push(x0 > 0.5);
        }
        (rows, labels)
    }

    #[test]
    fn test_learns_threshold_rule() {
        let (rows, labels) = toy_data();
        let model = GradientBoostedClassifier::fit(&rows, &labels, &small_params()).unwrap();

        assert!(model.predict_proba(&[0.9, 0.5]) > 0.8);
        assert!(model.predict_proba(&[0.1, 0.5]) < 0.2);

        let importances = model.feature_importances();
        assert!(importances[0] > importances[1]);
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (rows, labels) = toy_data();
        let a = GradientBoostedClassifier::fit(&rows, &labels, &small_params()).unwrap();
        let b = GradientBoostedClassifier::fit(&rows, &labels, &small_params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_base_margin_uses_weighted_rate() {
        let rows = vec![vec![0.0], vec![1.0], vec![2.0]];
        let labels = vec![true, false, false];
        let params = ModelParams {
            n_estimators: 1,
            ..ModelParams::default()
        };
        let model = GradientBoostedClassifier::fit(&rows, &labels, &params).unwrap();
        assert!((model.base_margin() - (1.2f64 / 2.0).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_input() {
        let params = small_params();
        assert!(GradientBoostedClassifier::fit(&[], &[], &params).is_err());
        assert!(GradientBoostedClassifier::fit(&[vec![1.0], vec![2.0]], &[true, true], &params).is_err());
        assert!(GradientBoostedClassifier::fit(&[vec![1.0], vec![2.0, 3.0]], &[true, false], &params).is_err());
    }

    #[test]
    fn test_cut_points_and_bins() {
        let cuts = cut_points([3.0, 1.0, 2.0, 2.0].into_iter(), 256);
        assert_eq!(cuts, vec![1.5, 2.5]);
        assert_eq!(bin_of(&cuts, 1.0), 0);
        assert_eq!(bin_of(&cuts, 1.5), 1);
        assert_eq!(bin_of(&cuts, 3.0), 2);

        let many = cut_points((0..1000).map(f64::from), 16);
        assert!(many.len() <= 15);
    }

    #[test]
    fn test_soft_threshold() {
        assert_eq!(soft_threshold(1.0, 0.1), 0.9);
        assert_eq!(soft_threshold(-1.0, 0.1), -0.9);
        assert_eq!(soft_threshold(0.05, 0.1), 0.0);
    }
}
