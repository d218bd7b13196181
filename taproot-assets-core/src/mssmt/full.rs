use alloc::boxed::Box;

use taproot_assets_types::mssmt::{EmptyTree, LeafNode, MssmtNode, MssmtProof, MAX_TREE_LEVELS};

use super::{bit_index, branch, checked_root_sum, Error, Tree};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Empty,
    Leaf(LeafNode, MssmtNode),
    Branch {
        left: Box<Node>,
        right: Box<Node>,
        node: MssmtNode,
    },
}

impl Node {
    fn hash_at(&self, depth: usize, empty: &EmptyTree) -> MssmtNode {
        match self {
            Node::Empty => empty.at_depth(depth),
            Node::Leaf(_, node) => *node,
            Node::Branch { node, .. } => *node,
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }
}

/// An in-memory MS-SMT that stores every branch on the path to each leaf.
#[derive(Debug, Clone)]
pub struct FullTree {
    root: Node,
    empty: EmptyTree,
}

impl FullTree {
    pub fn new() -> Self {
        FullTree {
            root: Node::Empty,
            empty: EmptyTree::new(),
        }
    }
}

impl Default for FullTree {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_at(
    node: &mut Node,
    depth: usize,
    key: &[u8; 32],
    leaf: &LeafNode,
    empty: &EmptyTree,
) -> Result<(), Error> {
    if depth == MAX_TREE_LEVELS {
        *node = if leaf.is_empty() {
            Node::Empty
        } else {
            Node::Leaf(leaf.clone(), leaf.node())
        };
        return Ok(());
    }

    if !matches!(node, Node::Branch { .. }) {
        if leaf.is_empty() {
            return Ok(());
        }
        *node = Node::Branch {
            left: Box::new(Node::Empty),
            right: Box::new(Node::Empty),
            node: empty.at_depth(depth),
        };
    }

    let Node::Branch {
        left,
        right,
        node: cached,
    } = node
    else {
        return Ok(());
    };
    let child = if bit_index(depth, key) {
        right.as_mut()
    } else {
        left.as_mut()
    };
    insert_at(child, depth + 1, key, leaf, empty)?;

    if left.is_empty() && right.is_empty() {
        *node = Node::Empty;
    } else {
        *cached = branch(&left.hash_at(depth + 1, empty), &right.hash_at(depth + 1, empty))?;
    }
    Ok(())
}

impl Tree for FullTree {
    fn root(&self) -> MssmtNode {
        self.root.hash_at(0, &self.empty)
    }

    fn insert(&mut self, key: [u8; 32], leaf: LeafNode) -> Result<(), Error> {
        checked_root_sum(&self.root(), &self.get(&key), &leaf)?;
        insert_at(&mut self.root, 0, &key, &leaf, &self.empty)
    }

    fn get(&self, key: &[u8; 32]) -> LeafNode {
        let mut node = &self.root;
        for depth in 0..MAX_TREE_LEVELS {
            match node {
                Node::Branch { left, right, .. } => {
                    node = if bit_index(depth, key) { right } else { left };
                }
                _ => return LeafNode::empty(),
            }
        }
        match node {
            Node::Leaf(leaf, _) => leaf.clone(),
            _ => LeafNode::empty(),
        }
    }

    fn merkle_proof(&self, key: &[u8; 32]) -> MssmtProof {
        let mut siblings = [self.empty.at_depth(MAX_TREE_LEVELS); MAX_TREE_LEVELS];
        let mut node = &self.root;
        for depth in 0..MAX_TREE_LEVELS {
            let Node::Branch { left, right, .. } = node else {
                siblings[..MAX_TREE_LEVELS - depth]
                    .iter_mut()
                    .enumerate()
                    .for_each(|(idx, sibling)| *sibling = self.empty.at_depth(MAX_TREE_LEVELS - idx));
                break;
            };
            let (next, sibling) = if bit_index(depth, key) {
                (right, left)
            } else {
                (left, right)
            };
            siblings[MAX_TREE_LEVELS - 1 - depth] = sibling.hash_at(depth + 1, &self.empty);
            node = next;
        }
        MssmtProof::from_siblings(siblings)
    }

    fn root_children(&self) -> (MssmtNode, MssmtNode) {
        match &self.root {
            Node::Branch { left, right, .. } => {
                (left.hash_at(1, &self.empty), right.hash_at(1, &self.empty))
            }
            _ => (self.empty.at_depth(1), self.empty.at_depth(1)),
        }
    }
}
