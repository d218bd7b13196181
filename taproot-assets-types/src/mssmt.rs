use crate::error::Error;
use crate::tlv::{read_array, read_u16_be, read_u64_be};
use alloc::vec::Vec;
use bitcoin::hashes::{sha256::Hash as Sha256Hash, Hash, HashEngine};
use bitcoin::io::Read;
use serde::{Deserialize, Serialize};

/// Number of levels below the root of an MS-SMT.
pub const MAX_TREE_LEVELS: usize = 256;

/// Represents a node in an MS-SMT (Merkle Sum Sparse Merkle Tree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MssmtNode {
    /// The hash of the node.
    pub hash: Sha256Hash,
    /// The sum of the node.
    pub sum: u64,
}

impl MssmtNode {
    /// Hashes a branch from its two children, failing if the sums overflow.
    pub fn branch(left: &MssmtNode, right: &MssmtNode) -> Result<Self, Error> {
        let sum = left.sum.checked_add(right.sum).ok_or(Error::SumOverflow)?;
        Ok(Self::branch_with_sum(left, right, sum))
    }

    fn branch_with_sum(left: &MssmtNode, right: &MssmtNode, sum: u64) -> Self {
        let mut engine = Sha256Hash::engine();
        engine.input(left.hash.as_byte_array());
        engine.input(right.hash.as_byte_array());
        engine.input(&sum.to_be_bytes());
        MssmtNode {
            hash: Sha256Hash::from_engine(engine),
            sum,
        }
    }
}

/// A leaf value together with the sum it contributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeafNode {
    pub value: Vec<u8>,
    pub sum: u64,
}

impl LeafNode {
    pub fn new(value: Vec<u8>, sum: u64) -> Self {
        LeafNode { value, sum }
    }

    /// The empty leaf marks an absent key.
    pub fn empty() -> Self {
        LeafNode::default()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty() && self.sum == 0
    }

    /// sha256(value || sum_be)
    pub fn node(&self) -> MssmtNode {
        let mut engine = Sha256Hash::engine();
        engine.input(&self.value);
        engine.input(&self.sum.to_be_bytes());
        MssmtNode {
            hash: Sha256Hash::from_engine(engine),
            sum: self.sum,
        }
    }
}

/// Roots of empty subtrees, indexed by depth: `at_depth(0)` is the empty
/// root and `at_depth(256)` the empty leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyTree {
    nodes: Vec<MssmtNode>,
}

impl EmptyTree {
    pub fn new() -> Self {
        let mut nodes = alloc::vec![LeafNode::empty().node(); MAX_TREE_LEVELS + 1];
        for depth in (0..MAX_TREE_LEVELS).rev() {
            let child = nodes[depth + 1];
            nodes[depth] = MssmtNode::branch_with_sum(&child, &child, 0);
        }
        EmptyTree { nodes }
    }

    pub fn at_depth(&self, depth: usize) -> MssmtNode {
        self.nodes[depth.min(MAX_TREE_LEVELS)]
    }

    pub fn root(&self) -> MssmtNode {
        self.nodes[0]
    }
}

impl Default for EmptyTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Represents a merkle proof for a MS-SMT.
///
/// Siblings are ordered from the leaf level up to the root, so `nodes[0]`
/// sits at depth 256 and `nodes[255]` is a child of the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MssmtProof {
    nodes: Vec<MssmtNode>,
}

impl MssmtProof {
    pub fn new(nodes: Vec<MssmtNode>) -> Result<Self, Error> {
        if nodes.len() != MAX_TREE_LEVELS {
            return Err(Error::InvalidProofLength {
                expected: MAX_TREE_LEVELS,
                actual: nodes.len(),
            });
        }
        Ok(MssmtProof { nodes })
    }

    /// Builds a proof from a full set of siblings, leaf level first.
    pub fn from_siblings(nodes: [MssmtNode; MAX_TREE_LEVELS]) -> Self {
        MssmtProof {
            nodes: nodes.to_vec(),
        }
    }

    /// Siblings that should be hashed with the leaf and its parents to arrive at the root.
    pub fn nodes(&self) -> &[MssmtNode] {
        &self.nodes
    }

    /// Replaces every empty-subtree sibling with a bit.
    pub fn compress(&self) -> CompressedProof {
        let empty = EmptyTree::new();
        let mut nodes = Vec::new();
        let mut bits = [false; MAX_TREE_LEVELS];
        for (idx, node) in self.nodes.iter().enumerate() {
            if *node == empty.at_depth(MAX_TREE_LEVELS - idx) {
                bits[idx] = true;
            } else {
                nodes.push(*node);
            }
        }
        CompressedProof { nodes, bits }
    }

    /// Writes the compressed wire form of this proof.
    pub fn encode(&self, out: &mut Vec<u8>) {
        self.compress().encode(out)
    }

    pub fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        CompressedProof::decode(r)?.decompress()
    }
}

/// Wire form of an [`MssmtProof`]: explicit non-empty siblings plus one bit
/// per level that is set when the sibling is an empty subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedProof {
    pub nodes: Vec<MssmtNode>,
    pub bits: [bool; MAX_TREE_LEVELS],
}

impl CompressedProof {
    pub fn decompress(&self) -> Result<MssmtProof, Error> {
        let explicit = self.bits.iter().filter(|bit| !**bit).count();
        if explicit != self.nodes.len() {
            return Err(Error::InvalidTlvValue(
                0,
                alloc::format!(
                    "compressed proof has {} explicit nodes, bits require {}",
                    self.nodes.len(),
                    explicit
                ),
            ));
        }

        let empty = EmptyTree::new();
        let mut explicit_nodes = self.nodes.iter();
        let mut nodes = Vec::with_capacity(MAX_TREE_LEVELS);
        for (idx, bit) in self.bits.iter().enumerate() {
            if *bit {
                nodes.push(empty.at_depth(MAX_TREE_LEVELS - idx));
                continue;
            }
            let node = explicit_nodes.next().ok_or_else(|| {
                Error::InvalidTlvValue(0, "compressed proof ran out of nodes".into())
            })?;
            nodes.push(*node);
        }
        MssmtProof::new(nodes)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.nodes.len() as u16).to_be_bytes());
        for node in &self.nodes {
            out.extend_from_slice(node.hash.as_byte_array());
            out.extend_from_slice(&node.sum.to_be_bytes());
        }
        let mut packed = [0u8; MAX_TREE_LEVELS / 8];
        for (idx, bit) in self.bits.iter().enumerate() {
            if *bit {
                packed[idx / 8] |= 1 << (idx % 8);
            }
        }
        out.extend_from_slice(&packed);
    }

    pub fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        let num_nodes = read_u16_be(r)? as usize;
        if num_nodes > MAX_TREE_LEVELS {
            return Err(Error::InvalidTlvValue(
                0,
                alloc::format!("compressed proof claims {} nodes", num_nodes),
            ));
        }

        let mut nodes = Vec::with_capacity(num_nodes);
        for _ in 0..num_nodes {
            let hash = Sha256Hash::from_byte_array(read_array(r)?);
            let sum = read_u64_be(r)?;
            nodes.push(MssmtNode { hash, sum });
        }

        let packed: [u8; MAX_TREE_LEVELS / 8] = read_array(r)?;
        let mut bits = [false; MAX_TREE_LEVELS];
        for (idx, bit) in bits.iter_mut().enumerate() {
            *bit = (packed[idx / 8] >> (idx % 8)) & 1 == 1;
        }

        Ok(CompressedProof { nodes, bits })
    }
}
