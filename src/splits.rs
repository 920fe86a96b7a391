//! Encode the edges of a tree as splits (bipartitions) over the shared taxon registry.
//!
//! # What is a split?
//! Removing an edge divides the leaves into two groups:
//! ```text
//!      root
//!     /    \
//!   {A,B}  {C,D}  ← this edge induces the split AB|CD
//! ```
//!
//! Only one side is stored, as a [`Bitset`] over registry indices. Because every tree in a
//! session uses the same registry, bit `i` means the same taxon in every tree and splits of
//! different trees can be compared directly.
//!
//! # Rooted vs unrooted
//! - **Unrooted**: AB|CD and CD|AB are the same split. We always store the side that does
//!   NOT contain the tree's lowest taxon (taxon 0 when every taxon is present), so both
//!   directions give one canonical bitset. The other side is taken within the tree's own
//!   leaf set, which may be smaller than the registry.
//! - **Rooted**: the edge points away from the root and the side below it (the clade) is
//!   stored unmodified.

use crate::bitset::Bitset;
use crate::error::{ConsensusError, Result};
use crate::tree::{NodeId, TreeGraph};
use serde::{Deserialize, Serialize};

/// How splits are compared: as clades of a rooted tree, or as unrooted bipartitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SplitMode {
    Rooted,
    Unrooted,
}

impl SplitMode {
    /// The mode matching a tree's own rooting flag.
    pub fn of(tree: &TreeGraph) -> Self {
        if tree.is_rooted() {
            SplitMode::Rooted
        } else {
            SplitMode::Unrooted
        }
    }

    pub fn is_rooted(self) -> bool {
        self == SplitMode::Rooted
    }
}

/// Brings a raw leaf set into canonical form for `mode`, within the tree's `leaves`.
///
/// # Example
/// Leaves: A=0, B=1, C=2, D=3
/// - unrooted {A,B} `0b0011` (taxon 0 set) → flipped to {C,D} `0b1100`
/// - unrooted {C,D} `0b1100` (taxon 0 not set) → kept as `0b1100`
/// - rooted {A,B} `0b0011` → kept as `0b0011`
///
/// A tree over {B,C,D,E} anchors on B instead: {B,C} is flipped to {D,E}, not to the
/// registry complement {A,D,E}.
pub fn canonicalize(bits: Bitset, leaves: &Bitset, mode: SplitMode) -> Bitset {
    match (mode, leaves.ones().next()) {
        (SplitMode::Unrooted, Some(anchor)) if bits.contains(anchor) => leaves.difference(&bits),
        _ => bits,
    }
}

/// Whether a canonical split carries no topological information in a tree with
/// `num_leaves` leaves: a single leaf against the rest (size 1 or `n-1`), or nothing
/// against everything.
pub fn is_trivial(bits: &Bitset, num_leaves: usize) -> bool {
    let size = bits.count_ones();
    size <= 1 || size + 1 >= num_leaves
}

/// Standard split compatibility test.
///
/// Two splits `A|A'` and `B|B'` are compatible iff one of `A∩B`, `A∩B'`, `A'∩B`, `A'∩B'` is
/// empty, with complements taken within `leaves`. For rooted clades the complement sides
/// are not available, so clades are compatible iff they are nested or disjoint.
pub fn compatible(a: &Bitset, b: &Bitset, leaves: &Bitset, mode: SplitMode) -> bool {
    if a.is_disjoint(b) || a.is_subset(b) || b.is_subset(a) {
        return true;
    }
    match mode {
        SplitMode::Rooted => false,
        // A'∩B' = ∅  ⇔  A ∪ B covers all leaves
        SplitMode::Unrooted => leaves.difference(a).is_subset(b),
    }
}

/// One edge of an encoded tree.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedEdge {
    /// Head (child) node of the edge.
    pub head: NodeId,
    /// Canonical split induced by the edge.
    pub split: Bitset,
    /// Length of the edge, if the tree has one.
    pub length: Option<f64>,
    /// Whether the split is trivial (single leaf against the rest).
    pub trivial: bool,
}

/// All splits of one tree plus the raw leaf set below every node.
#[derive(Clone, Debug)]
pub struct EncodedTree {
    pub mode: SplitMode,
    pub num_taxa: usize,
    /// Taxa present in the tree (the root's leaf set).
    pub leaves: Bitset,
    /// Uncanonicalized leaf set below each node, indexed by [`NodeId`].
    pub clades: Vec<Bitset>,
    /// One entry per edge (i.e. per non-root node), in post-order.
    pub edges: Vec<EncodedEdge>,
}

impl EncodedTree {
    /// Non-trivial edges only.
    pub fn informative_edges(&self) -> impl Iterator<Item = &EncodedEdge> {
        self.edges.iter().filter(|e| !e.trivial)
    }

    /// Canonical split of the edge above `head`.
    pub fn split_of(&self, head: NodeId) -> Bitset {
        canonicalize(self.clades[head].clone(), &self.leaves, self.mode)
    }
}

/// Computes splits for trees over a registry of fixed size.
#[derive(Clone, Copy, Debug)]
pub struct SplitEncoder {
    num_taxa: usize,
    mode: SplitMode,
}

impl SplitEncoder {
    pub fn new(num_taxa: usize, mode: SplitMode) -> Self {
        SplitEncoder { num_taxa, mode }
    }

    pub fn num_taxa(&self) -> usize {
        self.num_taxa
    }

    pub fn mode(&self) -> SplitMode {
        self.mode
    }

    /// Encode every edge of `tree`.
    ///
    /// # Algorithm
    /// 1. Post-order traversal building leaf sets bottom-up:
    ///    - **Leaf**: singleton bitset of its taxon index
    ///    - **Internal node**: OR of all child bitsets
    /// 2. For each non-root node, canonicalize its leaf set into the split of the edge above it,
    ///    taking complements and triviality relative to the root's leaf set
    ///
    /// # Errors
    /// - [`ConsensusError::RegistryMismatch`] if a leaf's taxon index lies outside the registry.
    ///   This is fatal for the whole run: a wrong registry would corrupt every frequency.
    /// - [`ConsensusError::InvalidTree`] if a leaf has no taxon, a taxon occurs twice, or the
    ///   tree has no leaves at all.
    pub fn encode(&self, tree: &TreeGraph) -> Result<EncodedTree> {
        let words = Bitset::words_for(self.num_taxa);
        let mut clades = vec![Bitset::zeros(words); tree.len()];
        let mut seen = Bitset::zeros(words);
        let order = tree.postorder();

        for &id in &order {
            let node = &tree[id];
            if node.is_leaf() {
                if node.is_root() {
                    return Err(ConsensusError::InvalidTree("tree has no leaves".to_string()));
                }
                let taxon = node.taxon().ok_or_else(|| {
                    ConsensusError::InvalidTree(format!("leaf node {id} has no taxon"))
                })?;
                if taxon >= self.num_taxa {
                    return Err(ConsensusError::RegistryMismatch(format!(
                        "leaf node {id} refers to taxon {taxon}, registry holds {} taxa",
                        self.num_taxa
                    )));
                }
                if seen.contains(taxon) {
                    return Err(ConsensusError::InvalidTree(format!(
                        "taxon {taxon} appears on more than one leaf"
                    )));
                }
                seen.set(taxon);
                clades[id].set(taxon);
            } else {
                let mut bits = Bitset::zeros(words);
                for &child in node.children() {
                    bits.or_assign(&clades[child]);
                }
                clades[id] = bits;
            }
        }

        let leaves = clades[tree.root()].clone();
        let num_leaves = leaves.count_ones();
        let edges = order
            .iter()
            .filter(|&&id| id != tree.root())
            .map(|&id| {
                let split = canonicalize(clades[id].clone(), &leaves, self.mode);
                EncodedEdge {
                    head: id,
                    trivial: is_trivial(&split, num_leaves),
                    split,
                    length: tree[id].edge_length(),
                }
            })
            .collect();

        Ok(EncodedTree {
            mode: self.mode,
            num_taxa: self.num_taxa,
            leaves,
            clades,
            edges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(idx: &[usize]) -> Bitset {
        let mut bs = Bitset::zeros(1);
        idx.iter().for_each(|&i| bs.set(i));
        bs
    }

    /// Asymmetric tree with distinct partitions
    ///
    /// ```text
    ///              root
    ///             /    \
    ///         node1     E
    ///         /   \
    ///     node2    D
    ///     /   \
    ///    A    node3
    ///         /   \
    ///        B     C
    /// ```
    ///
    /// | Node  | Leaves Below | Raw       | Unrooted canonical | Trivial? |
    /// |-------|--------------|-----------|--------------------|----------|
    /// | node3 | {B, C}       | 0b00110   | 0b00110 {B,C}      | no       |
    /// | node2 | {A, B, C}    | 0b00111   | 0b11000 {D,E}      | no       |
    /// | node1 | {A,B,C,D}    | 0b01111   | 0b10000 {E}        | yes      |
    fn asymmetric(rooted: bool) -> TreeGraph {
        let mut tree = TreeGraph::new(rooted);
        let node1 = tree.add_child(TreeGraph::ROOT, Some(1.0)).unwrap();
        tree.add_leaf(TreeGraph::ROOT, 4, Some(4.0)).unwrap();
        let node2 = tree.add_child(node1, Some(1.0)).unwrap();
        tree.add_leaf(node1, 3, Some(3.0)).unwrap();
        tree.add_leaf(node2, 0, Some(2.0)).unwrap();
        let node3 = tree.add_child(node2, Some(0.5)).unwrap();
        tree.add_leaf(node3, 1, Some(1.5)).unwrap();
        tree.add_leaf(node3, 2, Some(1.5)).unwrap();
        tree
    }

    #[test]
    fn test_unrooted_canonical_splits() {
        let tree = asymmetric(false);
        let encoded = SplitEncoder::new(5, SplitMode::Unrooted).encode(&tree).unwrap();
        let mut informative: Vec<_> = encoded.informative_edges().map(|e| e.split.clone()).collect();
        informative.sort();
        assert_eq!(informative, vec![bits(&[1, 2]), bits(&[3, 4])]);
        // node1's edge folds to {E}: trivial
        assert!(encoded.edges.iter().any(|e| e.head == 1 && e.trivial && e.split == bits(&[4])));
    }

    #[test]
    fn test_rooted_keeps_child_side() {
        let tree = asymmetric(true);
        let encoded = SplitEncoder::new(5, SplitMode::Rooted).encode(&tree).unwrap();
        let mut informative: Vec<_> = encoded.informative_edges().map(|e| e.split.clone()).collect();
        informative.sort();
        // {A,B,C,D} has size n-1 and is excluded
        assert_eq!(informative, vec![bits(&[1, 2]), bits(&[0, 1, 2])]);
        let node3 = encoded.informative_edges().find(|e| e.split == bits(&[1, 2])).unwrap();
        assert_eq!(node3.length, Some(0.5));
    }

    /// Without canonicalization, these two drawings of one unrooted split differ:
    /// ```text
    /// Tree 1:  ((A,B),(C,D))  stores {A,B} = 0b0011
    /// Tree 2:  ((C,D),(A,B))  stores {C,D} = 0b1100
    /// ```
    /// With canonicalization (side WITHOUT taxon 0 = A) both become 0b1100.
    #[test]
    fn test_canonicalization_folds_complements() {
        let all = bits(&[0, 1, 2, 3]);
        assert_eq!(canonicalize(bits(&[0, 1]), &all, SplitMode::Unrooted), bits(&[2, 3]));
        assert_eq!(canonicalize(bits(&[2, 3]), &all, SplitMode::Unrooted), bits(&[2, 3]));
        assert_eq!(canonicalize(bits(&[0, 1]), &all, SplitMode::Rooted), bits(&[0, 1]));
    }

    #[test]
    fn test_canonicalization_within_partial_leaf_set() {
        // registry of 5, tree over {B,C,D,E}: anchor on B, complement within the tree
        let leaves = bits(&[1, 2, 3, 4]);
        assert_eq!(canonicalize(bits(&[1, 2]), &leaves, SplitMode::Unrooted), bits(&[3, 4]));
        assert_eq!(canonicalize(bits(&[3, 4]), &leaves, SplitMode::Unrooted), bits(&[3, 4]));
    }

    #[test]
    fn test_partial_tree_splits_do_not_depend_on_root_placement() {
        // (A,B,(C,D)) and (C,D,(A,B)) over a 5-taxon registry without E
        let drawing = |outer: [usize; 2], inner: [usize; 2]| {
            let mut tree = TreeGraph::new(false);
            tree.add_leaf(TreeGraph::ROOT, outer[0], Some(1.0)).unwrap();
            tree.add_leaf(TreeGraph::ROOT, outer[1], Some(1.0)).unwrap();
            let cherry = tree.add_child(TreeGraph::ROOT, Some(0.5)).unwrap();
            tree.add_leaf(cherry, inner[0], Some(1.0)).unwrap();
            tree.add_leaf(cherry, inner[1], Some(1.0)).unwrap();
            tree
        };
        let encoder = SplitEncoder::new(5, SplitMode::Unrooted);
        for tree in [drawing([0, 1], [2, 3]), drawing([2, 3], [0, 1])] {
            let encoded = encoder.encode(&tree).unwrap();
            assert_eq!(encoded.leaves, bits(&[0, 1, 2, 3]));
            let informative: Vec<_> = encoded.informative_edges().map(|e| e.split.clone()).collect();
            assert_eq!(informative, vec![bits(&[2, 3])]);
        }

        // a 4-leaf tree has no informative split of size 3 even though the registry has 5
        let encoded = encoder.encode(&drawing([0, 1], [2, 3])).unwrap();
        assert!(encoded.edges.iter().filter(|e| e.split.count_ones() == 1).all(|e| e.trivial));
    }

    #[test]
    fn test_basal_bifurcation_yields_duplicate_split() {
        let mut tree = TreeGraph::new(false);
        let ab = tree.add_child(TreeGraph::ROOT, Some(0.25)).unwrap();
        let cd = tree.add_child(TreeGraph::ROOT, Some(0.75)).unwrap();
        tree.add_leaf(ab, 0, None).unwrap();
        tree.add_leaf(ab, 1, None).unwrap();
        tree.add_leaf(cd, 2, None).unwrap();
        tree.add_leaf(cd, 3, None).unwrap();

        let encoded = SplitEncoder::new(4, SplitMode::Unrooted).encode(&tree).unwrap();
        let informative: Vec<_> = encoded.informative_edges().collect();
        assert_eq!(informative.len(), 2);
        assert_eq!(informative[0].split, informative[1].split);
    }

    #[test]
    fn test_compatibility() {
        // 6 taxa, unrooted
        let bc = bits(&[1, 2]);
        let bcd = bits(&[1, 2, 3]);
        let cd = bits(&[2, 3]);
        let ef = bits(&[4, 5]);
        let all = bits(&[0, 1, 2, 3, 4, 5]);
        assert!(compatible(&bc, &bcd, &all, SplitMode::Unrooted));
        assert!(compatible(&bc, &ef, &all, SplitMode::Unrooted));
        assert!(!compatible(&bc, &cd, &all, SplitMode::Unrooted));
        assert!(!compatible(&bc, &cd, &all, SplitMode::Rooted));

        // Rooted clades {A,B,C} and {C,D,E,F} overlap; as unrooted splits they are compatible
        // because together they cover every taxon
        let abc = bits(&[0, 1, 2]);
        let cdef = bits(&[2, 3, 4, 5]);
        assert!(!compatible(&abc, &cdef, &all, SplitMode::Rooted));
        assert!(compatible(&abc, &cdef, &all, SplitMode::Unrooted));
    }

    #[test]
    fn test_registry_mismatch_is_fatal() {
        let tree = asymmetric(false);
        let err = SplitEncoder::new(4, SplitMode::Unrooted).encode(&tree).unwrap_err();
        assert!(matches!(err, ConsensusError::RegistryMismatch(_)));
    }

    #[test]
    fn test_invalid_leaves() {
        let mut tree = TreeGraph::new(false);
        tree.add_leaf(TreeGraph::ROOT, 0, None).unwrap();
        tree.add_child(TreeGraph::ROOT, None).unwrap(); // childless, taxon-less "leaf"
        let err = SplitEncoder::new(3, SplitMode::Unrooted).encode(&tree).unwrap_err();
        assert!(matches!(err, ConsensusError::InvalidTree(_)));

        let mut dup = TreeGraph::new(false);
        dup.add_leaf(TreeGraph::ROOT, 1, None).unwrap();
        dup.add_leaf(TreeGraph::ROOT, 1, None).unwrap();
        let err = SplitEncoder::new(3, SplitMode::Unrooted).encode(&dup).unwrap_err();
        assert!(matches!(err, ConsensusError::InvalidTree(_)));

        let empty = TreeGraph::new(true);
        assert!(SplitEncoder::new(3, SplitMode::Rooted).encode(&empty).is_err());
    }
}
