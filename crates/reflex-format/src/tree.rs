//! Arena decision tree.
//!
//! Nodes live in one `Vec`; children are indices into it. Validation
//! guarantees every child index is greater than its parent's, so a walk
//! from the root strictly advances and always reaches a leaf.

use reflex_core::FEATURE_COUNT;

use crate::error::{FormatError, FormatResult};

/// Feature index stored in leaf nodes.
pub const LEAF_MARKER: u8 = 0xFF;

/// Upper bound on arena size; keeps artifacts kilobyte-scale.
pub const MAX_NODES: usize = 4096;

/// Encoded size of one node: feature u8, threshold f32, left u16, right u16.
pub const NODE_BYTES: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeNode {
    /// Feature to split on, or `LEAF_MARKER`.
    pub feature: u8,
    /// Split threshold in normalized units, or the leaf's output value.
    pub threshold: f32,
    pub left: u16,
    pub right: u16,
}

impl TreeNode {
    pub fn leaf(value: f32) -> Self {
        Self {
            feature: LEAF_MARKER,
            threshold: value,
            left: 0,
            right: 0,
        }
    }

    pub fn split(feature: u8, threshold: f32, left: u16, right: u16) -> Self {
        Self {
            feature,
            threshold,
            left,
            right,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature == LEAF_MARKER
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.feature);
        out.extend_from_slice(&self.threshold.to_le_bytes());
        out.extend_from_slice(&self.left.to_le_bytes());
        out.extend_from_slice(&self.right.to_le_bytes());
    }

    pub(crate) fn decode(bytes: &[u8; NODE_BYTES]) -> Self {
        Self {
            feature: bytes[0],
            threshold: f32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
            left: u16::from_le_bytes([bytes[5], bytes[6]]),
            right: u16::from_le_bytes([bytes[7], bytes[8]]),
        }
    }
}

/// A validated, immutable decision tree.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Validate an arena and wrap it.
    pub fn from_nodes(nodes: Vec<TreeNode>) -> FormatResult<Self> {
        if nodes.is_empty() {
            return Err(FormatError::EmptyTree);
        }
        if nodes.len() > MAX_NODES {
            return Err(FormatError::TooManyNodes(nodes.len()));
        }

        let mut parents = vec![0u32; nodes.len()];
        for (index, node) in nodes.iter().enumerate() {
            if !node.threshold.is_finite() {
                return Err(invalid(index, "threshold or leaf value is not finite"));
            }
            if node.is_leaf() {
                if node.left != 0 || node.right != 0 {
                    return Err(invalid(index, "leaf carries child indices"));
                }
                continue;
            }
            if node.feature as usize >= FEATURE_COUNT {
                return Err(invalid(
                    index,
                    &format!("feature index {} outside schema", node.feature),
                ));
            }
            for child in [node.left as usize, node.right as usize] {
                if child <= index || child >= nodes.len() {
                    return Err(invalid(
                        index,
                        &format!("child {child} must lie in ({index}, {})", nodes.len()),
                    ));
                }
                parents[child] += 1;
            }
        }

        for (index, &count) in parents.iter().enumerate().skip(1) {
            if count != 1 {
                return Err(invalid(
                    index,
                    &format!("referenced by {count} parents, expected exactly 1"),
                ));
            }
        }

        Ok(Self { nodes })
    }

    /// Single-leaf tree that always returns `value`.
    pub fn constant(value: f32) -> FormatResult<Self> {
        Self::from_nodes(vec![TreeNode::leaf(value)])
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Walk from the root: `x <= threshold` goes left.
    pub fn eval(&self, normalized: &[f64; FEATURE_COUNT]) -> f32 {
        let mut index = 0usize;
        loop {
            let node = &self.nodes[index];
            if node.is_leaf() {
                return node.threshold;
            }
            index = if normalized[node.feature as usize] <= f64::from(node.threshold) {
                node.left as usize
            } else {
                node.right as usize
            };
        }
    }

    /// Longest root-to-leaf path, counted in edges.
    pub fn depth(&self) -> usize {
        let mut depth = vec![0usize; self.nodes.len()];
        let mut max = 0;
        for (index, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                max = max.max(depth[index]);
                continue;
            }
            depth[node.left as usize] = depth[index] + 1;
            depth[node.right as usize] = depth[index] + 1;
        }
        max
    }

    /// Smallest and largest leaf values.
    pub fn leaf_range(&self) -> (f32, f32) {
        self.nodes
            .iter()
            .filter(|n| n.is_leaf())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), n| {
                (lo.min(n.threshold), hi.max(n.threshold))
            })
    }
}

fn invalid(index: usize, reason: &str) -> FormatError {
    FormatError::InvalidNode {
        index,
        reason: reason.to_string(),
    }
}
