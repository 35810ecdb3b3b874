//! Arena-backed CART tree.
//!
//! Nodes live in a flat `Vec` owned by the tree and refer to each other by
//! [`NodeId`]. A node is either a branch (question plus two children) or a
//! leaf (unit set); see [`NodeKind`]. Every branch has exactly two children,
//! so a well-formed tree is a full binary tree.
//!
//! For the on-disk formats see [`crate::io::text`] and [`crate::io::binary`].

use std::sync::Arc;

use fixedbitset::FixedBitSet;

use crate::meta::{MetaCart, UnitFeature};

use super::question::Question;

/// Index of a node in the tree's arena.
pub type NodeId = u32;

// ============================================================================
// Errors
// ============================================================================

/// Structural validation errors for [`CartTree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeValidationError {
    #[error("tree has no nodes")]
    EmptyTree,
    #[error("tree has nodes but no root")]
    NoRoot,
    #[error("node {node}: {side} child {child} out of bounds ({n_nodes} nodes)")]
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: NodeId,
        n_nodes: usize,
    },
    #[error("node {node} references itself as a child")]
    SelfLoop { node: NodeId },
    #[error("node {node} reached more than once")]
    DuplicateVisit { node: NodeId },
    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: NodeId },
    #[error("node {node} has parent {actual:?}, expected {expected:?}")]
    ParentMismatch {
        node: NodeId,
        expected: Option<NodeId>,
        actual: Option<NodeId>,
    },
}

/// Errors raised by tree construction and traversal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("tree has no root")]
    NoRoot,
    #[error("node {0} does not exist")]
    NodeOutOfBounds(NodeId),
    #[error("node {0} is a branch, expected a leaf")]
    NotALeaf(NodeId),
    #[error("node {node}: feature id {feature} is not defined in the MetaCart")]
    UnknownFeature { node: NodeId, feature: u32 },
    #[error("invalid tree: {0}")]
    Invalid(#[from] TreeValidationError),
}

// ============================================================================
// Nodes
// ============================================================================

/// Content of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Branch {
        question: Question,
        left: NodeId,
        right: NodeId,
    },
    Leaf {
        unit_set: FixedBitSet,
    },
}

/// Arena entry: content plus a non-owning link to the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartNode {
    parent: Option<NodeId>,
    kind: NodeKind,
}

impl CartNode {
    pub(crate) fn new(parent: Option<NodeId>, kind: NodeKind) -> Self {
        Self { parent, kind }
    }

    /// Point a branch at its children. No-op on leaves.
    pub(crate) fn link_children(&mut self, left_child: NodeId, right_child: NodeId) {
        if let NodeKind::Branch { left, right, .. } = &mut self.kind {
            *left = left_child;
            *right = right_child;
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    pub fn question(&self) -> Option<&Question> {
        match &self.kind {
            NodeKind::Branch { question, .. } => Some(question),
            NodeKind::Leaf { .. } => None,
        }
    }

    pub fn unit_set(&self) -> Option<&FixedBitSet> {
        match &self.kind {
            NodeKind::Leaf { unit_set } => Some(unit_set),
            NodeKind::Branch { .. } => None,
        }
    }

    /// `(left, right)` for branches.
    pub fn children(&self) -> Option<(NodeId, NodeId)> {
        match self.kind {
            NodeKind::Branch { left, right, .. } => Some((left, right)),
            NodeKind::Leaf { .. } => None,
        }
    }
}

/// Which child a passing question descends into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YesBranch {
    #[default]
    Left,
    Right,
}

// ============================================================================
// CartTree
// ============================================================================

/// Binary decision tree over unit features.
#[derive(Debug, Clone)]
pub struct CartTree {
    meta: Arc<MetaCart>,
    nodes: Vec<CartNode>,
    root: Option<NodeId>,
    yes_branch: YesBranch,
}

impl CartTree {
    /// Create an empty tree bound to `meta`.
    pub fn new(meta: Arc<MetaCart>) -> Self {
        Self {
            meta,
            nodes: Vec::new(),
            root: None,
            yes_branch: YesBranch::default(),
        }
    }

    /// Assemble a tree from an already linked arena and validate it.
    pub(crate) fn from_parts(
        meta: Arc<MetaCart>,
        nodes: Vec<CartNode>,
        root: NodeId,
    ) -> Result<Self, TreeValidationError> {
        let tree = Self {
            meta,
            nodes,
            root: Some(root),
            yes_branch: YesBranch::default(),
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Set the branch convention (builder pattern).
    pub fn with_yes_branch(mut self, yes_branch: YesBranch) -> Self {
        self.yes_branch = yes_branch;
        self
    }

    pub fn yes_branch(&self) -> YesBranch {
        self.yes_branch
    }

    pub fn meta(&self) -> &Arc<MetaCart> {
        &self.meta
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    pub fn node(&self, id: NodeId) -> Option<&CartNode> {
        self.nodes.get(id as usize)
    }

    /// Leaves with their unit sets, in arena order.
    pub fn leaves(&self) -> impl Iterator<Item = (NodeId, &FixedBitSet)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.unit_set().map(|set| (i as NodeId, set)))
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Reset the tree to a single leaf root with an empty unit set.
    pub fn init_root(&mut self) -> NodeId {
        self.nodes.clear();
        self.nodes.push(CartNode::new(
            None,
            NodeKind::Leaf {
                unit_set: FixedBitSet::new(),
            },
        ));
        self.root = Some(0);
        0
    }

    /// Turn leaf `node` into a branch on `question` with two empty leaves.
    ///
    /// Every feature id in `question` must be defined by the tree's
    /// [`MetaCart`]. Returns `(left, right)`.
    pub fn apply_split(
        &mut self,
        node: NodeId,
        question: Question,
    ) -> Result<(NodeId, NodeId), TreeError> {
        self.expect_leaf(node)?;
        if let Some(feature) = question.feature_ids().find(|&id| !self.meta.contains(id)) {
            return Err(TreeError::UnknownFeature { node, feature });
        }

        let left = self.nodes.len() as NodeId;
        let right = left + 1;
        for _ in 0..2 {
            self.nodes.push(CartNode::new(
                Some(node),
                NodeKind::Leaf {
                    unit_set: FixedBitSet::new(),
                },
            ));
        }
        self.nodes[node as usize].kind = NodeKind::Branch {
            question,
            left,
            right,
        };
        Ok((left, right))
    }

    /// Replace the unit set of leaf `node`.
    pub fn make_leaf(&mut self, node: NodeId, unit_set: FixedBitSet) -> Result<(), TreeError> {
        self.expect_leaf(node)?;
        self.nodes[node as usize].kind = NodeKind::Leaf { unit_set };
        Ok(())
    }

    fn expect_leaf(&self, node: NodeId) -> Result<(), TreeError> {
        match self.nodes.get(node as usize) {
            None => Err(TreeError::NodeOutOfBounds(node)),
            Some(n) if !n.is_leaf() => Err(TreeError::NotALeaf(node)),
            Some(_) => Ok(()),
        }
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Descend from the root to the leaf selected by `feature`.
    pub fn test<F: UnitFeature + ?Sized>(&self, feature: &F) -> Result<NodeId, TreeError> {
        let mut node = self.root.ok_or(TreeError::NoRoot)?;

        loop {
            match &self.nodes[node as usize].kind {
                NodeKind::Leaf { .. } => return Ok(node),
                NodeKind::Branch {
                    question,
                    left,
                    right,
                } => {
                    let pass = question.test(&self.meta, feature);
                    node = match (pass, self.yes_branch) {
                        (true, YesBranch::Left) | (false, YesBranch::Right) => *left,
                        (true, YesBranch::Right) | (false, YesBranch::Left) => *right,
                    };
                }
            }
        }
    }

    /// Unit set of the leaf selected by `feature`.
    pub fn lookup<F: UnitFeature + ?Sized>(&self, feature: &F) -> Result<&FixedBitSet, TreeError> {
        let leaf = self.test(feature)?;
        match &self.nodes[leaf as usize].kind {
            NodeKind::Leaf { unit_set } => Ok(unit_set),
            NodeKind::Branch { .. } => Err(TreeError::NotALeaf(leaf)),
        }
    }

    /// Node ids in parent, left, right order. Empty without a root.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();

        while let Some(node) = stack.pop() {
            order.push(node);
            if let Some((left, right)) = self.nodes[node as usize].children() {
                stack.push(right);
                stack.push(left);
            }
        }

        order
    }

    /// Number of levels; a lone root leaf has depth 1.
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack: Vec<(NodeId, usize)> = self.root.map(|r| (r, 1)).into_iter().collect();

        while let Some((node, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Some((left, right)) = self.nodes[node as usize].children() {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }

        max_depth
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check structural invariants: a root, in-bounds children, every node
    /// reached exactly once, parent links matching the child links.
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        let n_nodes = self.nodes.len();
        if n_nodes == 0 {
            return Err(TreeValidationError::EmptyTree);
        }
        let root = self.root.ok_or(TreeValidationError::NoRoot)?;
        if root as usize >= n_nodes {
            return Err(TreeValidationError::ChildOutOfBounds {
                node: root,
                side: "root",
                child: root,
                n_nodes,
            });
        }
        if let Some(parent) = self.nodes[root as usize].parent {
            return Err(TreeValidationError::ParentMismatch {
                node: root,
                expected: None,
                actual: Some(parent),
            });
        }

        let mut visited = vec![false; n_nodes];
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            let node_usize = node as usize;
            if visited[node_usize] {
                return Err(TreeValidationError::DuplicateVisit { node });
            }
            visited[node_usize] = true;

            let Some((left, right)) = self.nodes[node_usize].children() else {
                continue;
            };
            if left == node || right == node {
                return Err(TreeValidationError::SelfLoop { node });
            }

            for (side, child) in [("left", left), ("right", right)] {
                let Some(child_node) = self.nodes.get(child as usize) else {
                    return Err(TreeValidationError::ChildOutOfBounds {
                        node,
                        side,
                        child,
                        n_nodes,
                    });
                };
                if child_node.parent != Some(node) {
                    return Err(TreeValidationError::ParentMismatch {
                        node: child,
                        expected: Some(node),
                        actual: child_node.parent,
                    });
                }
            }

            stack.push(right);
            stack.push(left);
        }

        if let Some(i) = visited.iter().position(|&v| !v) {
            return Err(TreeValidationError::UnreachableNode { node: i as NodeId });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{FeatureKind, TtsUnitFeature};
    use crate::repr::question::{AndOperator, NotOperator};
    use crate::testing::{sample_meta, unit_set};

    /// Root asks feature 0 (left phone in {1, 2}); left leaf {0, 2}, right leaf {1}.
    fn three_node_tree() -> CartTree {
        let mut tree = CartTree::new(sample_meta());
        let root = tree.init_root();
        let (left, right) = tree.apply_split(root, Question::single(0)).unwrap();
        tree.make_leaf(left, unit_set(4, &[0, 2])).unwrap();
        tree.make_leaf(right, unit_set(4, &[1])).unwrap();
        tree
    }

    #[test]
    fn question_pass_goes_left() {
        let tree = three_node_tree();
        let yes = TtsUnitFeature::default().with(FeatureKind::LeftPhone, 1);
        let no = TtsUnitFeature::default().with(FeatureKind::LeftPhone, 7);

        assert_eq!(tree.test(&yes).unwrap(), 1);
        assert_eq!(tree.test(&no).unwrap(), 2);
        assert_eq!(tree.lookup(&yes).unwrap(), &unit_set(4, &[0, 2]));
        assert_eq!(tree.lookup(&no).unwrap(), &unit_set(4, &[1]));
    }

    #[test]
    fn yes_branch_right_flips_descent() {
        let tree = three_node_tree().with_yes_branch(YesBranch::Right);
        let yes = TtsUnitFeature::default().with(FeatureKind::LeftPhone, 1);
        assert_eq!(tree.test(&yes).unwrap(), 2);
    }

    #[test]
    fn empty_tree_has_no_root() {
        let tree = CartTree::new(sample_meta());
        assert_eq!(
            tree.test(&TtsUnitFeature::default()),
            Err(TreeError::NoRoot)
        );
        assert_eq!(tree.validate(), Err(TreeValidationError::EmptyTree));
        assert!(tree.preorder().is_empty());
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn split_requires_leaf() {
        let mut tree = three_node_tree();
        assert_eq!(
            tree.apply_split(0, Question::single(1)),
            Err(TreeError::NotALeaf(0))
        );
        assert_eq!(
            tree.make_leaf(9, FixedBitSet::new()),
            Err(TreeError::NodeOutOfBounds(9))
        );
    }

    #[test]
    fn split_rejects_feature_missing_from_meta() {
        let mut tree = CartTree::new(sample_meta());
        let root = tree.init_root();
        assert_eq!(
            tree.apply_split(root, Question::single(99)),
            Err(TreeError::UnknownFeature { node: root, feature: 99 })
        );

        let mixed = Question::from_terms(vec![
            AndOperator::new(vec![NotOperator::new(0)]),
            AndOperator::new(vec![NotOperator::new(2), NotOperator::negated(42)]),
        ])
        .unwrap();
        assert_eq!(
            tree.apply_split(root, mixed),
            Err(TreeError::UnknownFeature { node: root, feature: 42 })
        );

        // The rejected splits leave the root a leaf.
        assert_eq!(tree.n_nodes(), 1);
        assert!(tree.node(root).unwrap().is_leaf());
        assert!(tree.lookup(&TtsUnitFeature::default()).is_ok());
    }

    #[test]
    fn preorder_and_counters() {
        let mut tree = three_node_tree();
        let (ll, lr) = tree.apply_split(1, Question::single(1)).unwrap();
        tree.make_leaf(ll, unit_set(4, &[0])).unwrap();
        tree.make_leaf(lr, unit_set(4, &[2])).unwrap();

        assert_eq!(tree.preorder(), vec![0, 1, ll, lr, 2]);
        assert_eq!(tree.n_nodes(), 5);
        assert_eq!(tree.n_leaves(), 3);
        assert_eq!(tree.depth(), 3);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn validate_detects_bad_parent_link() {
        let mut nodes = vec![
            CartNode::new(
                None,
                NodeKind::Branch {
                    question: Question::single(0),
                    left: 1,
                    right: 2,
                },
            ),
            CartNode::new(Some(0), NodeKind::Leaf { unit_set: unit_set(2, &[0]) }),
            CartNode::new(Some(1), NodeKind::Leaf { unit_set: unit_set(2, &[1]) }),
        ];
        let err = CartTree::from_parts(sample_meta(), nodes.clone(), 0).unwrap_err();
        assert_eq!(
            err,
            TreeValidationError::ParentMismatch {
                node: 2,
                expected: Some(0),
                actual: Some(1)
            }
        );

        nodes.push(CartNode::new(None, NodeKind::Leaf { unit_set: FixedBitSet::new() }));
        nodes[2].parent = Some(0);
        let err = CartTree::from_parts(sample_meta(), nodes, 0).unwrap_err();
        assert_eq!(err, TreeValidationError::UnreachableNode { node: 3 });
    }
}
