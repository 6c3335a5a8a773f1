//! Binary regression trees stored as flat node arrays.

use serde::{Deserialize, Serialize};

/// One tree node. The root is always index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Rows with `x[feature] < threshold` go to `left`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        /// Regularized loss reduction of this split
        gain: f64,
    },
    /// Leaf output in margin units, shrinkage already applied
    Leaf { value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Child a feature vector is routed to at a split node
    pub fn route(&self, node: usize, x: &[f64]) -> Option<usize> {
        match &self.nodes[node] {
            Node::Split {
                feature,
                threshold,
                left,
                right,
                ..
            } => Some(if x[*feature] < *threshold { *left } else { *right }),
            Node::Leaf { .. } => None,
        }
    }

    /// Index of the leaf `x` lands in
    pub fn leaf_index(&self, x: &[f64]) -> usize {
        let mut node = 0;
        while let Some(next) = self.route(node, x) {
            node = next;
        }
        node
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        match &self.nodes[self.leaf_index(x)] {
            Node::Leaf { value } => *value,
            Node::Split { .. } => 0.0,
        }
    }

    /// Check child indices and feature indices against the node array
    pub fn validate(&self, feature_count: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                threshold,
                ..
            } = node
            {
                if *feature >= feature_count {
                    return Err(format!("node {index} splits on unknown feature {feature}"));
                }
                // Children are always appended after their parent
                if *left <= index || *right <= index || *left >= self.nodes.len() || *right >= self.nodes.len() {
                    return Err(format!("node {index} has out-of-range children"));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {index} has a non-finite threshold"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        Tree::new(vec![
            Node::Split {
                feature: 1,
                threshold: 0.5,
                left: 1,
                right: 2,
                gain: 3.0,
            },
            Node::Leaf { value: -0.2 },
            Node::Leaf { value: 0.4 },
        ])
    }

    #[test]
    fn test_routing() {
        let tree = stump();
        assert_eq!(tree.leaf_index(&[9.0, 0.0]), 1);
        assert_eq!(tree.leaf_index(&[9.0, 0.5]), 2);
        assert_eq!(tree.predict(&[0.0, 1.0]), 0.4);
    }

    #[test]
    fn test_validate() {
        assert!(stump().validate(2).is_ok());
        assert!(stump().validate(1).is_err());

        let cyclic = Tree::new(vec![Node::Split {
            feature: 0,
            threshold: 1.0,
            left: 0,
            right: 0,
            gain: 1.0,
        }]);
        assert!(cyclic.validate(1).is_err());
    }
}
