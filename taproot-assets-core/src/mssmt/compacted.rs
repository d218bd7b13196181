use alloc::boxed::Box;

use taproot_assets_types::mssmt::{EmptyTree, LeafNode, MssmtNode, MssmtProof, MAX_TREE_LEVELS};

use super::{bit_index, branch, checked_root_sum, Error, Tree};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Empty,
    /// A leaf that is alone in the subtree rooted at the depth it is stored
    /// at. `node` is the leaf hashed up to that depth through empty siblings.
    Leaf {
        key: [u8; 32],
        leaf: LeafNode,
        node: MssmtNode,
    },
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
            Node::Leaf { node, .. } | Node::Branch { node, .. } => *node,
        }
    }

    fn compacted_leaf(
        key: [u8; 32],
        leaf: LeafNode,
        depth: usize,
        empty: &EmptyTree,
    ) -> Result<Node, Error> {
        let node = lift_leaf(&key, &leaf, depth, empty)?;
        Ok(Node::Leaf { key, leaf, node })
    }
}

/// Hashes `leaf` from the bottom of the tree up to `depth`, assuming every
/// sibling on the way is empty.
fn lift_leaf(
    key: &[u8; 32],
    leaf: &LeafNode,
    depth: usize,
    empty: &EmptyTree,
) -> Result<MssmtNode, Error> {
    let mut current = leaf.node();
    for level in (depth..MAX_TREE_LEVELS).rev() {
        let sibling = empty.at_depth(level + 1);
        current = if bit_index(level, key) {
            branch(&sibling, &current)?
        } else {
            branch(&current, &sibling)?
        };
    }
    Ok(current)
}

/// An in-memory MS-SMT that keeps each leaf as close to the root as possible.
///
/// Roots, sums and proofs are identical to [`super::FullTree`] for the same
/// set of leaves.
#[derive(Debug, Clone)]
pub struct CompactedTree {
    root: Node,
    empty: EmptyTree,
}

impl CompactedTree {
    pub fn new() -> Self {
        CompactedTree {
            root: Node::Empty,
            empty: EmptyTree::new(),
        }
    }
}

impl Default for CompactedTree {
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
    match node {
        Node::Empty => {
            if !leaf.is_empty() {
                *node = Node::compacted_leaf(*key, leaf.clone(), depth, empty)?;
            }
            return Ok(());
        }
        Node::Leaf {
            key: existing_key, ..
        } if existing_key == key => {
            *node = if leaf.is_empty() {
                Node::Empty
            } else {
                Node::compacted_leaf(*key, leaf.clone(), depth, empty)?
            };
            return Ok(());
        }
        Node::Leaf { .. } if leaf.is_empty() => return Ok(()),
        Node::Leaf { .. } => {
            // Push the existing leaf one level down, then insert next to it.
            let Node::Leaf {
                key: existing_key,
                leaf: existing_leaf,
                ..
            } = core::mem::replace(node, Node::Empty)
            else {
                return Ok(());
            };
            let mut child = Node::Empty;
            insert_at(&mut child, depth + 1, &existing_key, &existing_leaf, empty)?;
            let (left, right) = if bit_index(depth, &existing_key) {
                (Node::Empty, child)
            } else {
                (child, Node::Empty)
            };
            *node = Node::Branch {
                node: branch(&left.hash_at(depth + 1, empty), &right.hash_at(depth + 1, empty))?,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Node::Branch { .. } => {}
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

    // Collapse branches that are left holding a single leaf.
    let collapsed = match (left.as_ref(), right.as_ref()) {
        (Node::Empty, Node::Empty) => Some(Node::Empty),
        (Node::Empty, Node::Leaf { key, leaf, .. }) | (Node::Leaf { key, leaf, .. }, Node::Empty) => {
            Some(Node::compacted_leaf(*key, leaf.clone(), depth, empty)?)
        }
        _ => None,
    };
    match collapsed {
        Some(collapsed) => *node = collapsed,
        None => {
            *cached = branch(&left.hash_at(depth + 1, empty), &right.hash_at(depth + 1, empty))?;
        }
    }
    Ok(())
}

impl Tree for CompactedTree {
    fn root(&self) -> MssmtNode {
        self.root.hash_at(0, &self.empty)
    }

    fn insert(&mut self, key: [u8; 32], leaf: LeafNode) -> Result<(), Error> {
        checked_root_sum(&self.root(), &self.get(&key), &leaf)?;
        insert_at(&mut self.root, 0, &key, &leaf, &self.empty)
    }

    fn get(&self, key: &[u8; 32]) -> LeafNode {
        let mut node = &self.root;
        let mut depth = 0;
        loop {
            match node {
                Node::Branch { left, right, .. } => {
                    node = if bit_index(depth, key) { right } else { left };
                    depth += 1;
                }
                Node::Leaf {
                    key: leaf_key,
                    leaf,
                    ..
                } if leaf_key == key => return leaf.clone(),
                _ => return LeafNode::empty(),
            }
        }
    }

    fn merkle_proof(&self, key: &[u8; 32]) -> MssmtProof {
        let empty = &self.empty;
        let mut siblings = [empty.at_depth(MAX_TREE_LEVELS); MAX_TREE_LEVELS];
        // Sibling of the child at `depth + 1` lives at this index.
        let slot = |depth: usize| MAX_TREE_LEVELS - 1 - depth;

        let mut node = &self.root;
        let mut depth = 0;
        while depth < MAX_TREE_LEVELS {
            match node {
                Node::Branch { left, right, .. } => {
                    let (next, sibling) = if bit_index(depth, key) {
                        (right, left)
                    } else {
                        (left, right)
                    };
                    siblings[slot(depth)] = sibling.hash_at(depth + 1, empty);
                    node = next;
                    depth += 1;
                }
                Node::Leaf {
                    key: leaf_key,
                    leaf,
                    ..
                } => {
                    // Below a compacted leaf the path is empty except where a
                    // foreign leaf's path splits off from ours.
                    let mut diverged = leaf_key == key;
                    for level in depth..MAX_TREE_LEVELS {
                        siblings[slot(level)] = if !diverged
                            && bit_index(level, key) != bit_index(level, leaf_key)
                        {
                            diverged = true;
                            lift_leaf(leaf_key, leaf, level + 1, empty)
                                .unwrap_or_else(|_| empty.at_depth(level + 1))
                        } else {
                            empty.at_depth(level + 1)
                        };
                    }
                    break;
                }
                Node::Empty => {
                    for level in depth..MAX_TREE_LEVELS {
                        siblings[slot(level)] = empty.at_depth(level + 1);
                    }
                    break;
                }
            }
        }
        MssmtProof::from_siblings(siblings)
    }

    fn root_children(&self) -> (MssmtNode, MssmtNode) {
        let empty = &self.empty;
        match &self.root {
            Node::Branch { left, right, .. } => (left.hash_at(1, empty), right.hash_at(1, empty)),
            Node::Leaf { key, leaf, .. } => {
                let lifted = lift_leaf(key, leaf, 1, empty).unwrap_or_else(|_| empty.at_depth(1));
                if bit_index(0, key) {
                    (empty.at_depth(1), lifted)
                } else {
                    (lifted, empty.at_depth(1))
                }
            }
            Node::Empty => (empty.at_depth(1), empty.at_depth(1)),
        }
    }
}
