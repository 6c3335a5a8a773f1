//! Additive per-feature attributions for the boosted ensemble.
//!
//! Path-dependent TreeSHAP: node covers are counted by routing the training
//! split through every tree, and the attributions for one input satisfy
//! `baseline + sum(attributions) == margin(x)` exactly up to rounding.

use crate::models::gbdt::GradientBoostedClassifier;
use crate::models::tree::{Node, Tree};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Added to every leaf count so unvisited branches keep a non-zero cover
const COVER_EPSILON: f64 = 1e-9;

/// Background statistics captured at training time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeExplainer {
    /// Per tree, per node: background rows passing through the node
    covers: Vec<Vec<f64>>,
    /// Per tree: expected leaf value under the covers
    expectations: Vec<f64>,
    /// Expected margin: base margin plus every tree's expectation
    baseline: f64,
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

impl TreeExplainer {
    pub fn fit(model: &GradientBoostedClassifier, background: &[Vec<f64>]) -> Result<Self> {
        if background.is_empty() {
            bail!("explainer needs at least one background row");
        }

        let mut covers = Vec::with_capacity(model.trees().len());
        let mut expectations = Vec::with_capacity(model.trees().len());
        for tree in model.trees() {
            let tree_covers = node_covers(tree, background);
            expectations.push(expected_value(tree, &tree_covers, 0));
            covers.push(tree_covers);
        }
        let baseline = model.base_margin() + expectations.iter().sum::<f64>();

        debug!(
            trees = covers.len(),
            background_rows = background.len(),
            baseline,
            "Explainer fitted"
        );

        Ok(Self {
            covers,
            expectations,
            baseline,
        })
    }

    /// Expected model margin over the background distribution
    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    /// One signed attribution per feature column, in margin units
    pub fn explain(&self, model: &GradientBoostedClassifier, x: &[f64]) -> Vec<f64> {
        let mut phi = vec![0.0; model.feature_count()];
        for (tree, covers) in model.trees().iter().zip(&self.covers) {
            let mut walk = ShapWalk {
                tree,
                covers,
                x,
                phi: &mut phi,
            };
            walk.recurse(0, &[], 1.0, 1.0, None);
        }
        phi
    }

    /// Check the explainer was fitted for this model
    pub fn validate(&self, model: &GradientBoostedClassifier) -> Result<(), String> {
        if self.covers.len() != model.trees().len() || self.expectations.len() != model.trees().len() {
            return Err("explainer and model disagree on the number of trees".to_string());
        }
        for (index, (tree, covers)) in model.trees().iter().zip(&self.covers).enumerate() {
            if covers.len() != tree.nodes().len() {
                return Err(format!("explainer covers do not match tree {index}"));
            }
            if covers.iter().any(|c| !(*c > 0.0)) {
                return Err(format!("tree {index} has a non-positive cover"));
            }
        }
        Ok(())
    }
}

/// Leaf covers are background counts; a split covers the sum of its children
fn node_covers(tree: &Tree, background: &[Vec<f64>]) -> Vec<f64> {
    let nodes = tree.nodes();
    let mut counts = vec![0.0; nodes.len()];
    for row in background {
        counts[tree.leaf_index(row)] += 1.0;
    }

    let mut covers = vec![0.0; nodes.len()];
    // Children always follow their parent, so a reverse sweep sees them first
    for index in (0..nodes.len()).rev() {
        covers[index] = match &nodes[index] {
            Node::Leaf { .. } => counts[index] + COVER_EPSILON,
            Node::Split { left, right, .. } => covers[*left] + covers[*right],
        };
    }
    covers
}

fn expected_value(tree: &Tree, covers: &[f64], node: usize) -> f64 {
    match &tree.nodes()[node] {
        Node::Leaf { value } => *value,
        Node::Split { left, right, .. } => {
            (covers[*left] * expected_value(tree, covers, *left)
                + covers[*right] * expected_value(tree, covers, *right))
                / covers[node]
        }
    }
}

struct ShapWalk<'a> {
    tree: &'a Tree,
    covers: &'a [f64],
    x: &'a [f64],
    phi: &'a mut [f64],
}

impl ShapWalk<'_> {
    fn recurse(
        &mut self,
        node: usize,
        parent_path: &[PathElement],
        zero_fraction: f64,
        one_fraction: f64,
        feature: Option<usize>,
    ) {
        let mut path = parent_path.to_vec();
        extend_path(&mut path, zero_fraction, one_fraction, feature);

        match &self.tree.nodes()[node] {
            Node::Leaf { value } => {
                let depth = path.len() - 1;
                for i in 1..=depth {
                    let element = path[i];
                    if let Some(f) = element.feature {
                        let weight = unwound_path_sum(&path, i);
                        self.phi[f] += weight * (element.one_fraction - element.zero_fraction) * value;
                    }
                }
            }
            Node::Split {
                feature: split,
                threshold,
                left,
                right,
                ..
            } => {
                let (hot, cold) = if self.x[*split] < *threshold {
                    (*left, *right)
                } else {
                    (*right, *left)
                };
                let cover = self.covers[node];
                let hot_fraction = self.covers[hot] / cover;
                let cold_fraction = self.covers[cold] / cover;

                let mut incoming_zero = 1.0;
                let mut incoming_one = 1.0;
                if let Some(previous) = path.iter().position(|e| e.feature == Some(*split)) {
                    incoming_zero = path[previous].zero_fraction;
                    incoming_one = path[previous].one_fraction;
                    unwind_path(&mut path, previous);
                }

                self.recurse(hot, &path, hot_fraction * incoming_zero, incoming_one, Some(*split));
                self.recurse(cold, &path, cold_fraction * incoming_zero, 0.0, Some(*split));
            }
        }
    }
}

fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    });

    let scale = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].weight += one_fraction * path[i].weight * (i + 1) as f64 / scale;
        path[i].weight = zero_fraction * path[i].weight * (depth - i) as f64 / scale;
    }
}

/// Undo the extension for `path[index]` and drop it from the path
fn unwind_path(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let scale = (depth + 1) as f64;
    let mut next_one_portion = path[depth].weight;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let previous = path[i].weight;
            path[i].weight = next_one_portion * scale / ((i + 1) as f64 * one_fraction);
            next_one_portion = previous - path[i].weight * zero_fraction * (depth - i) as f64 / scale;
        } else {
            path[i].weight = path[i].weight * scale / (zero_fraction * (depth - i) as f64);
        }
    }

    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

/// Total permutation weight of the path with `path[index]` unwound
fn unwound_path_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let scale = (depth + 1) as f64;
    let mut next_one_portion = path[depth].weight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let portion = next_one_portion * scale / ((i + 1) as f64 * one_fraction);
            total += portion;
            next_one_portion = path[i].weight - portion * zero_fraction * (depth - i) as f64 / scale;
        } else if zero_fraction != 0.0 {
            total += path[i].weight / zero_fraction / ((depth - i) as f64 / scale);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::gbdt::ModelParams;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn fitted() -> (GradientBoostedClassifier, TreeExplainer, Vec<Vec<f64>>) {
        let mut rng = StdRng::seed_from_u64(5);
        let rows: Vec<Vec<f64>> = (0..300)
            .map(|_| (0..4).map(|_| rng.gen_range(0.0..1.0)).collect())
            .collect();
        // Interaction between the first two features, fourth is noise
        let labels: Vec<bool> = rows
            .iter()
            .map(|r| (r[0] > 0.5 && r[1] > 0.3) || r[2] > 0.8)
            .collect();

        let params = ModelParams {
            n_estimators: 30,
            max_depth: 4,
            ..ModelParams::default()
        };
        let model = GradientBoostedClassifier::fit(&rows, &labels, &params).unwrap();
        let explainer = TreeExplainer::fit(&model, &rows).unwrap();
        (model, explainer, rows)
    }

    #[test]
    fn test_attributions_are_additive() {
        let (model, explainer, rows) = fitted();

        for x in rows.iter().take(40) {
            let phi = explainer.explain(&model, x);
            let total = explainer.baseline() + phi.iter().sum::<f64>();
            assert!(
                (total - model.margin(x)).abs() < 1e-6,
                "baseline + attributions = {total}, margin = {}",
                model.margin(x)
            );
        }
    }

    #[test]
    fn test_baseline_is_background_mean_margin() {
        let (model, explainer, rows) = fitted();
        let mean = rows.iter().map(|x| model.margin(x)).sum::<f64>() / rows.len() as f64;
        assert!((explainer.baseline() - mean).abs() < 1e-6);
    }

    #[test]
    fn test_single_split_attribution() {
        let tree = Tree::new(vec![
            Node::Split {
                feature: 0,
                threshold: 0.5,
                left: 1,
                right: 2,
                gain: 1.0,
            },
            Node::Leaf { value: -1.0 },
            Node::Leaf { value: 1.0 },
        ]);
        let background = vec![vec![0.0], vec![0.0], vec![0.0], vec![1.0]];
        let covers = node_covers(&tree, &background);
        assert!((expected_value(&tree, &covers, 0) - (-0.5)).abs() < 1e-6);

        let mut phi = vec![0.0];
        ShapWalk {
            tree: &tree,
            covers: &covers,
            x: &[1.0],
            phi: &mut phi,
        }
        .recurse(0, &[], 1.0, 1.0, None);
        // f(x) = 1.0, E[f] = -0.5
        assert!((phi[0] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_validate_detects_mismatch() {
        let (model, explainer, _) = fitted();
        assert!(explainer.validate(&model).is_ok());

        let mut truncated = explainer.clone();
        truncated.covers.pop();
        assert!(truncated.validate(&model).is_err());
    }
}
