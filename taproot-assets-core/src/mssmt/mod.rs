//! Merkle sum sparse Merkle trees.
//!
//! Two interchangeable implementations of [`Tree`] are provided. [`FullTree`]
//! materialises every branch along a leaf's 256 level path, while
//! [`CompactedTree`] keeps each leaf at the highest depth where it is the only
//! leaf in its subtree. Both always agree on roots and proofs.

use taproot_assets_types::mssmt::{EmptyTree, LeafNode, MssmtNode, MssmtProof, MAX_TREE_LEVELS};
use thiserror::Error;

mod compacted;
mod full;

pub use compacted::CompactedTree;
pub use full::FullTree;

/// Errors returned by tree operations and proof verification.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A branch sum would exceed `u64::MAX`.
    #[error("mssmt sum overflow")]
    SumOverflow,
    /// A merkle proof resolved to a different root.
    #[error("mssmt proof does not resolve to the expected root")]
    RootMismatch,
}

/// An authenticated map from 256-bit keys to leaves.
pub trait Tree {
    /// Root node of the tree; the empty root when no leaves are present.
    fn root(&self) -> MssmtNode;

    /// Inserts or replaces the leaf at `key`. Inserting an empty leaf deletes.
    ///
    /// Fails with [`Error::SumOverflow`] before mutating anything when the
    /// resulting root sum would not fit in a `u64`.
    fn insert(&mut self, key: [u8; 32], leaf: LeafNode) -> Result<(), Error>;

    /// Removes the leaf at `key`, if present.
    fn delete(&mut self, key: &[u8; 32]) -> Result<(), Error> {
        self.insert(*key, LeafNode::empty())
    }

    /// The leaf at `key`, or the empty leaf.
    fn get(&self, key: &[u8; 32]) -> LeafNode;

    /// Inclusion proof for `key`, or a non-inclusion proof if absent.
    fn merkle_proof(&self, key: &[u8; 32]) -> MssmtProof;

    /// The two children of the root.
    fn root_children(&self) -> (MssmtNode, MssmtNode);

    fn is_empty(&self) -> bool {
        self.root() == EmptyTree::new().root()
    }
}

/// Returns the bit of `key` selecting the child at `index`: `true` is the
/// right child.
pub fn bit_index(index: usize, key: &[u8; 32]) -> bool {
    (key[index / 8] >> (index % 8)) & 1 == 1
}

/// A root recomputed from a proof, along with the two children it hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofRoot {
    pub node: MssmtNode,
    pub left: MssmtNode,
    pub right: MssmtNode,
}

/// Walks `proof` from `leaf` at `key` up to the root.
pub fn root_from_proof(
    key: &[u8; 32],
    leaf: &LeafNode,
    proof: &MssmtProof,
) -> Result<ProofRoot, Error> {
    let mut current = leaf.node();
    let mut children = (current, current);
    for (idx, sibling) in proof.nodes().iter().enumerate() {
        let (left, right) = if bit_index(MAX_TREE_LEVELS - 1 - idx, key) {
            (*sibling, current)
        } else {
            (current, *sibling)
        };
        current = branch(&left, &right)?;
        children = (left, right);
    }

    Ok(ProofRoot {
        node: current,
        left: children.0,
        right: children.1,
    })
}

/// Checks that `proof` places `leaf` at `key` in a tree with root `root`.
pub fn verify_merkle_proof(
    key: &[u8; 32],
    leaf: &LeafNode,
    proof: &MssmtProof,
    root: &MssmtNode,
) -> Result<(), Error> {
    let derived = root_from_proof(key, leaf, proof)?;
    if derived.node == *root {
        Ok(())
    } else {
        Err(Error::RootMismatch)
    }
}

pub(crate) fn branch(left: &MssmtNode, right: &MssmtNode) -> Result<MssmtNode, Error> {
    MssmtNode::branch(left, right).map_err(|_| Error::SumOverflow)
}

/// The root sum after replacing `old` with `new`.
pub(crate) fn checked_root_sum(root: &MssmtNode, old: &LeafNode, new: &LeafNode) -> Result<u64, Error> {
    root.sum
        .checked_sub(old.sum)
        .and_then(|sum| sum.checked_add(new.sum))
        .ok_or(Error::SumOverflow)
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use alloc::collections::BTreeMap;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    fn key(byte: u8) -> [u8; 32] {
        let mut key = [0u8; 32];
        key[0] = byte;
        key[31] = byte.wrapping_mul(7);
        key
    }

    fn leaf(sum: u64) -> LeafNode {
        LeafNode::new(sum.to_be_bytes().to_vec(), sum)
    }

    #[test]
    fn bit_order_is_lsb_first_within_a_byte() {
        let mut key = [0u8; 32];
        key[0] = 0b0000_0010;
        key[1] = 0b1000_0000;
        assert!(!bit_index(0, &key));
        assert!(bit_index(1, &key));
        assert!(bit_index(15, &key));
        assert!(!bit_index(8, &key));
    }

    #[test]
    fn empty_trees_agree() {
        let full = FullTree::new();
        let compacted = CompactedTree::new();
        assert_eq!(full.root(), EmptyTree::new().root());
        assert_eq!(compacted.root(), full.root());
        assert!(full.is_empty() && compacted.is_empty());

        let proof = compacted.merkle_proof(&key(1));
        assert_eq!(proof, full.merkle_proof(&key(1)));
        verify_merkle_proof(&key(1), &LeafNode::empty(), &proof, &full.root()).unwrap();
    }

    #[test]
    fn single_leaf_proof_exposes_root_children() {
        let mut tree = CompactedTree::new();
        tree.insert(key(3), leaf(42)).unwrap();
        let proof = tree.merkle_proof(&key(3));
        let derived = root_from_proof(&key(3), &leaf(42), &proof).unwrap();

        assert_eq!(derived.node, tree.root());
        assert_eq!((derived.left, derived.right), tree.root_children());
        assert_eq!(tree.root().sum, 42);
    }

    #[test]
    fn proof_for_wrong_leaf_is_rejected() {
        let mut tree = FullTree::new();
        tree.insert(key(1), leaf(10)).unwrap();
        tree.insert(key(2), leaf(20)).unwrap();
        let proof = tree.merkle_proof(&key(1));

        assert_eq!(
            verify_merkle_proof(&key(1), &leaf(11), &proof, &tree.root()),
            Err(Error::RootMismatch)
        );
        assert_eq!(
            verify_merkle_proof(&key(1), &LeafNode::empty(), &proof, &tree.root()),
            Err(Error::RootMismatch)
        );
    }

    #[test]
    fn overflowing_insert_leaves_tree_untouched() {
        let mut full = FullTree::new();
        let mut compacted = CompactedTree::new();
        for tree in [&mut full as &mut dyn Tree, &mut compacted as &mut dyn Tree] {
            tree.insert(key(1), leaf(u64::MAX - 1)).unwrap();
            let before = tree.root();
            assert_eq!(tree.insert(key(2), leaf(2)), Err(Error::SumOverflow));
            assert_eq!(tree.root(), before);
            assert!(tree.get(&key(2)).is_empty());

            // Replacing the existing leaf only counts the difference.
            tree.insert(key(1), leaf(u64::MAX)).unwrap();
            assert_eq!(tree.root().sum, u64::MAX);
        }
    }

    #[test]
    fn deleting_last_leaf_restores_empty_root() {
        let mut tree = CompactedTree::new();
        tree.insert(key(9), leaf(5)).unwrap();
        tree.insert(key(10), leaf(6)).unwrap();
        tree.delete(&key(9)).unwrap();
        tree.delete(&key(10)).unwrap();
        assert!(tree.is_empty());
        // Deleting an absent key is a no-op.
        tree.delete(&key(11)).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn compressed_proofs_decompress_to_the_same_siblings() {
        let mut tree = CompactedTree::new();
        for byte in 1..6u8 {
            tree.insert(key(byte), leaf(byte as u64)).unwrap();
        }
        let proof = tree.merkle_proof(&key(4));
        let compressed = proof.compress();
        assert_eq!(compressed.decompress().unwrap(), proof);
    }

    fn arb_ops() -> impl Strategy<Value = Vec<(u8, u8, Option<u32>)>> {
        prop::collection::vec((any::<u8>(), any::<u8>(), prop::option::of(any::<u32>())), 1..24)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn full_and_compacted_trees_are_indistinguishable(ops in arb_ops()) {
            let mut full = FullTree::new();
            let mut compacted = CompactedTree::new();
            let mut model: BTreeMap<[u8; 32], u64> = BTreeMap::new();

            for (first, last, value) in ops {
                let mut k = [0u8; 32];
                k[0] = first;
                k[31] = last;
                match value {
                    Some(sum) => {
                        let sum = sum as u64;
                        full.insert(k, leaf(sum)).unwrap();
                        compacted.insert(k, leaf(sum)).unwrap();
                        model.insert(k, sum);
                    }
                    None => {
                        full.delete(&k).unwrap();
                        compacted.delete(&k).unwrap();
                        model.remove(&k);
                    }
                }
                prop_assert_eq!(full.root(), compacted.root());
                prop_assert_eq!(full.root_children(), compacted.root_children());
            }

            let root = full.root();
            prop_assert_eq!(root.sum, model.values().sum::<u64>());
            for (k, sum) in &model {
                let proof = compacted.merkle_proof(k);
                prop_assert_eq!(&proof, &full.merkle_proof(k));
                prop_assert!(verify_merkle_proof(k, &leaf(*sum), &proof, &root).is_ok());
            }

            let mut absent = [0xffu8; 32];
            absent[1] = 0x5a;
            let proof = compacted.merkle_proof(&absent);
            prop_assert_eq!(&proof, &full.merkle_proof(&absent));
            prop_assert!(verify_merkle_proof(&absent, &LeafNode::empty(), &proof, &root).is_ok());
        }
    }
}
