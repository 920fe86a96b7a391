//! Node heights and ages of rooted, ultrametric trees.
//!
//! The height of a node is its distance above the leaves below it:
//! `0` for leaves and `max(child height + child edge length)` for internal nodes.
//! The age of a node is the root height minus the node's depth below the root. On an
//! ultrametric tree both views agree (up to the tolerance), and ages are what get
//! aggregated per split.

use crate::error::{ConsensusError, Result};
use crate::tree::TreeGraph;

/// Default absolute tolerance on leaf-to-root path lengths.
pub const DEFAULT_ULTRAMETRIC_TOLERANCE: f64 = 1e-5;

/// Post-order node heights, indexed by node id.
///
/// # Errors
/// [`ConsensusError::InvalidTree`] if a non-root node has no edge length.
pub fn node_heights(tree: &TreeGraph) -> Result<Vec<f64>> {
    let mut heights = vec![0.0; tree.len()];
    for id in tree.postorder() {
        let node = &tree[id];
        if node.is_leaf() {
            continue;
        }
        let mut height = f64::NEG_INFINITY;
        for &child in node.children() {
            height = height.max(heights[child] + required_length(tree, child)?);
        }
        heights[id] = height;
    }
    Ok(heights)
}

/// Pre-order distances from the root, indexed by node id.
pub fn node_depths(tree: &TreeGraph) -> Result<Vec<f64>> {
    let mut depths = vec![0.0; tree.len()];
    for id in tree.preorder() {
        if let Some(parent) = tree[id].parent() {
            depths[id] = depths[parent] + required_length(tree, id)?;
        }
    }
    Ok(depths)
}

/// Node ages of an ultrametric tree, indexed by node id.
///
/// The stored root is taken as the root whatever the tree's rooting flag says; the
/// split table only asks for ages once the session has been established as rooted.
///
/// # Errors
/// - [`ConsensusError::NonUltrametricTree`] if leaf depths differ by more than `tolerance`
/// - [`ConsensusError::InvalidTree`] if edge lengths are missing
pub fn node_ages(tree: &TreeGraph, tolerance: f64) -> Result<Vec<f64>> {
    let heights = node_heights(tree)?;
    let depths = node_depths(tree)?;

    let (min, max) = tree
        .leaves()
        .map(|leaf| depths[leaf.id()])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| (lo.min(d), hi.max(d)));
    if max - min > tolerance {
        return Err(ConsensusError::NonUltrametricTree { min, max, tolerance });
    }

    let root_height = heights[tree.root()];
    Ok(depths.iter().map(|depth| (root_height - depth).max(0.0)).collect())
}

fn required_length(tree: &TreeGraph, id: usize) -> Result<f64> {
    tree[id].edge_length().ok_or_else(|| {
        ConsensusError::InvalidTree(format!("node {id} has no edge length, cannot compute ages"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ```text
    ///            root (age 10)
    ///           /     \
    ///         6/       \10
    ///        n1 (4)     C
    ///        / \
    ///      4/   \4
    ///      A     B
    /// ```
    fn ultrametric() -> TreeGraph {
        let mut tree = TreeGraph::new(true);
        let n1 = tree.add_child(TreeGraph::ROOT, Some(6.0)).unwrap();
        tree.add_leaf(TreeGraph::ROOT, 2, Some(10.0)).unwrap();
        tree.add_leaf(n1, 0, Some(4.0)).unwrap();
        tree.add_leaf(n1, 1, Some(4.0)).unwrap();
        tree
    }

    #[test]
    fn test_ages_of_ultrametric_tree() {
        let tree = ultrametric();
        let ages = node_ages(&tree, DEFAULT_ULTRAMETRIC_TOLERANCE).unwrap();
        assert_eq!(ages, vec![10.0, 4.0, 0.0, 0.0, 0.0]);
        assert_eq!(node_heights(&tree).unwrap()[TreeGraph::ROOT], 10.0);
    }

    #[test]
    fn test_non_ultrametric_is_rejected() {
        let mut tree = ultrametric();
        tree[2].set_edge_length(Some(9.0));
        let err = node_ages(&tree, DEFAULT_ULTRAMETRIC_TOLERANCE).unwrap_err();
        assert!(matches!(err, ConsensusError::NonUltrametricTree { .. }));
        // ... unless the tolerance is generous enough
        assert!(node_ages(&tree, 1.5).is_ok());
    }

    #[test]
    fn test_missing_length_is_invalid() {
        let mut tree = ultrametric();
        tree[3].set_edge_length(None);
        assert!(matches!(
            node_ages(&tree, DEFAULT_ULTRAMETRIC_TOLERANCE),
            Err(ConsensusError::InvalidTree(_))
        ));
    }
}
