//! In-memory tree graph consumed by the split encoder and produced by the
//! consensus builder.
//!
//! # Structure
//! Nodes live in a contiguous arena and are referenced by [`NodeId`]. The root is
//! created together with the tree and always has id `0`.
//!
//! Each node stores exactly one upward link (its parent) plus its ordered children.
//! An edge is identified by its head (child) node; the edge's tail is read from the
//! head's parent pointer on demand and is never stored a second time:
//!
//! ```text
//!        tail (= parent of head)
//!          |
//!          |  <- Edge { head }, length stored on the head node
//!          |
//!        head
//! ```

use crate::error::{ConsensusError, Result};
use crate::taxa::TaxonIndex;
use std::collections::{BTreeMap, VecDeque};

/// Index of a node in a tree (arena).
pub type NodeId = usize;

/// Value attached to a node for output (support, summaries, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    /// For floating point values
    Float(f64),
    /// For closed intervals such as ranges and HPD intervals
    Interval(f64, f64),
}

impl From<f64> for AnnotationValue {
    fn from(v: f64) -> Self {
        AnnotationValue::Float(v)
    }
}

impl From<(f64, f64)> for AnnotationValue {
    fn from((lo, hi): (f64, f64)) -> Self {
        AnnotationValue::Interval(lo, hi)
    }
}

/// A node of a [`TreeGraph`].
#[derive(Debug, Clone, Default)]
pub struct Node {
    id: NodeId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    edge_length: Option<f64>,
    taxon: Option<TaxonIndex>,
    label: Option<String>,
    annotations: BTreeMap<String, AnnotationValue>,
}

impl Node {
    fn new(id: NodeId, parent: Option<NodeId>) -> Self {
        Node {
            id,
            parent,
            ..Node::default()
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Length of the edge above this node.
    pub fn edge_length(&self) -> Option<f64> {
        self.edge_length
    }

    pub fn set_edge_length(&mut self, length: Option<f64>) {
        self.edge_length = length;
    }

    /// Taxon of a leaf; `None` for internal nodes.
    pub fn taxon(&self) -> Option<TaxonIndex> {
        self.taxon
    }

    /// Free-text label, e.g. an internal support value carried over from input.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    pub fn annotations(&self) -> &BTreeMap<String, AnnotationValue> {
        &self.annotations
    }

    pub fn annotation(&self, key: &str) -> Option<&AnnotationValue> {
        self.annotations.get(key)
    }

    pub fn annotate(&mut self, key: impl Into<String>, value: impl Into<AnnotationValue>) {
        self.annotations.insert(key.into(), value.into());
    }
}

/// An edge, named by its head node. The tail is derived from the head's parent.
#[derive(Debug, Clone, Copy)]
pub struct Edge<'a> {
    tree: &'a TreeGraph,
    head: NodeId,
}

impl Edge<'_> {
    pub fn head(&self) -> NodeId {
        self.head
    }

    /// Parent end of the edge; `None` for the (virtual) edge above the root.
    pub fn tail(&self) -> Option<NodeId> {
        self.tree.nodes[self.head].parent
    }

    pub fn length(&self) -> Option<f64> {
        self.tree.nodes[self.head].edge_length
    }
}

/// A rooted or unrooted tree stored in an arena of [`Node`]s.
///
/// Whether the tree is *interpreted* as rooted is a flag, independent of the degree of
/// the root: an unrooted tree is still stored with a designated root node, which is
/// where traversals start.
#[derive(Debug, Clone)]
pub struct TreeGraph {
    nodes: Vec<Node>,
    rooted: bool,
    name: Option<String>,
}

impl TreeGraph {
    /// Root node id of every tree.
    pub const ROOT: NodeId = 0;

    /// Creates a tree consisting of a single root node.
    pub fn new(rooted: bool) -> Self {
        TreeGraph {
            nodes: vec![Node::new(Self::ROOT, None)],
            rooted,
            name: None,
        }
    }

    /// Attaches a name to this tree.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_rooted(&self) -> bool {
        self.rooted
    }

    /// Changes how the tree is interpreted (explicit rooting normalization).
    pub fn set_rooted(&mut self, rooted: bool) {
        self.rooted = rooted;
    }

    pub fn root(&self) -> NodeId {
        Self::ROOT
    }

    /// Adds an internal (for now childless) node below `parent`.
    ///
    /// # Errors
    /// [`ConsensusError::InvalidTree`] if `parent` does not exist or is a leaf with a taxon.
    pub fn add_child(&mut self, parent: NodeId, edge_length: Option<f64>) -> Result<NodeId> {
        self.check_parent(parent)?;
        let id = self.nodes.len();
        let mut node = Node::new(id, Some(parent));
        node.edge_length = edge_length;
        self.nodes.push(node);
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    /// Adds a leaf for `taxon` below `parent`.
    pub fn add_leaf(
        &mut self,
        parent: NodeId,
        taxon: TaxonIndex,
        edge_length: Option<f64>,
    ) -> Result<NodeId> {
        let id = self.add_child(parent, edge_length)?;
        self.nodes[id].taxon = Some(taxon);
        Ok(id)
    }

    /// Groups some children of `parent` under a new internal node, which is returned.
    ///
    /// The new node takes the position of the first regrouped child among `parent`'s
    /// children; the regrouped children keep their relative order.
    ///
    /// # Errors
    /// [`ConsensusError::InvalidTree`] if `children` is empty or contains a node that is
    /// not a child of `parent`.
    pub fn insert_parent(
        &mut self,
        parent: NodeId,
        children: &[NodeId],
        edge_length: Option<f64>,
    ) -> Result<NodeId> {
        self.check_parent(parent)?;
        if children.is_empty() {
            return Err(ConsensusError::InvalidTree(
                "cannot group an empty set of children".to_string(),
            ));
        }
        if let Some(stray) = children
            .iter()
            .find(|&&c| c >= self.nodes.len() || self.nodes[c].parent != Some(parent))
        {
            return Err(ConsensusError::InvalidTree(format!(
                "node {stray} is not a child of node {parent}"
            )));
        }

        let id = self.nodes.len();
        let mut node = Node::new(id, Some(parent));
        node.edge_length = edge_length;

        let siblings = std::mem::take(&mut self.nodes[parent].children);
        let mut kept = Vec::with_capacity((siblings.len() + 1).saturating_sub(children.len()));
        for sibling in siblings {
            if children.contains(&sibling) {
                if node.children.is_empty() {
                    kept.push(id);
                }
                node.children.push(sibling);
            } else {
                kept.push(sibling);
            }
        }
        self.nodes[parent].children = kept;
        for &child in &node.children {
            self.nodes[child].parent = Some(id);
        }
        self.nodes.push(node);
        Ok(id)
    }

    fn check_parent(&self, parent: NodeId) -> Result<()> {
        match self.nodes.get(parent) {
            None => Err(ConsensusError::InvalidTree(format!("no node {parent} in tree"))),
            Some(node) if node.taxon.is_some() => Err(ConsensusError::InvalidTree(format!(
                "node {parent} is a leaf and cannot have children"
            ))),
            Some(_) => Ok(()),
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A tree always has its root, so it is never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn leaves(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_leaf() && !n.is_root())
    }

    pub fn num_leaves(&self) -> usize {
        self.leaves().count()
    }

    /// The edge whose head is `head`.
    pub fn edge(&self, head: NodeId) -> Edge<'_> {
        Edge { tree: self, head }
    }

    /// All edges of the tree, i.e. one per non-root node, in arena order.
    pub fn edges(&self) -> impl Iterator<Item = Edge<'_>> {
        (1..self.nodes.len()).map(move |head| self.edge(head))
    }

    /// Node ids with parents before children.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![Self::ROOT];
        while let Some(id) = stack.pop() {
            order.push(id);
            // Push children in reverse so the first child is visited first
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    /// Node ids with children before parents.
    pub fn postorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(Self::ROOT, false)]; // (id, children_visited)
        while let Some((id, children_visited)) = stack.pop() {
            let node = &self.nodes[id];
            if children_visited || node.is_leaf() {
                order.push(id);
            } else {
                stack.push((id, true));
                stack.extend(node.children.iter().rev().map(|&c| (c, false)));
            }
        }
        order
    }

    /// Node ids level by level, starting at the root.
    pub fn levelorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([Self::ROOT]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.nodes[id].children.iter().copied());
        }
        order
    }
}

impl std::ops::Index<NodeId> for TreeGraph {
    type Output = Node;

    fn index(&self, index: NodeId) -> &Self::Output {
        &self.nodes[index]
    }
}

impl std::ops::IndexMut<NodeId> for TreeGraph {
    fn index_mut(&mut self, index: NodeId) -> &mut Self::Output {
        &mut self.nodes[index]
    }
}
