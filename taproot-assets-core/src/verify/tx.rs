//! Anchor transaction verification helpers.

use alloc::vec::Vec;

use bitcoin::hashes::{Hash, sha256d::Hash as Sha256dHash};
use bitcoin::secp256k1::XOnlyPublicKey;
use bitcoin::{OutPoint, Script, Transaction, TxMerkleNode};
use taproot_assets_types::proof::{Proof, TxMerkleProof};
use thiserror::Error;

/// Errors returned by anchor transaction verification helpers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The anchor transaction does not spend the claimed previous outpoint.
    #[error("anchor tx missing prev out")]
    AnchorTxMissingPrevOut,
    /// The claimed output index is invalid for the transaction.
    #[error("output index {index} invalid for {output_count} outputs")]
    OutputIndexInvalid {
        /// Claimed output index.
        index: u32,
        /// Total number of outputs in the transaction.
        output_count: usize,
    },
    /// The output is not a taproot output.
    #[error("output {index} is not a taproot output")]
    NotTaprootOutput { index: u32 },
    /// The output carries a witness program that is not a valid x-only key.
    #[error("invalid taproot output key")]
    InvalidTaprootOutputKey,
    /// The merkle proof node and bit counts do not match.
    #[error("merkle proof shape mismatch: nodes={nodes}, bits={bits}")]
    InvalidMerkleProofShape {
        /// Number of merkle proof nodes.
        nodes: usize,
        /// Number of merkle proof bits.
        bits: usize,
    },
    /// The merkle proof does not match the expected root.
    #[error("invalid transaction merkle proof")]
    InvalidTxMerkleProof,
}

/// Trait for hashing Merkle node pairs.
pub trait MerkleHasher {
    /// Hashes a left/right node pair into its parent.
    fn hash_nodes(&self, left: [u8; 32], right: [u8; 32]) -> [u8; 32];
}

/// Bitcoin merkle hasher using double-SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitcoinMerkleHasher;

impl MerkleHasher for BitcoinMerkleHasher {
    fn hash_nodes(&self, left: [u8; 32], right: [u8; 32]) -> [u8; 32] {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&left);
        buf[32..].copy_from_slice(&right);
        Sha256dHash::hash(&buf).to_byte_array()
    }
}

/// Checks that a transaction is committed to by a block's merkle root.
pub trait MerkleVerifier {
    fn verify_tx_merkle_proof(
        &self,
        tx: &Transaction,
        proof: &TxMerkleProof,
        merkle_root: TxMerkleNode,
    ) -> Result<(), Error>;
}

/// Walks the proof with Bitcoin's double-SHA-256 node hashing.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitcoinMerkleVerifier;

impl MerkleVerifier for BitcoinMerkleVerifier {
    fn verify_tx_merkle_proof(
        &self,
        tx: &Transaction,
        proof: &TxMerkleProof,
        merkle_root: TxMerkleNode,
    ) -> Result<(), Error> {
        verify_tx_merkle_proof(tx, proof, merkle_root)
    }
}

/// Checks that the anchor transaction spends the proof's previous outpoint
/// and is part of the claimed block.
pub fn verify_anchor_tx(proof: &Proof, merkle: &dyn MerkleVerifier) -> Result<(), Error> {
    if !tx_spends_prev_out(&proof.anchor_tx, &proof.prev_out) {
        return Err(Error::AnchorTxMissingPrevOut);
    }

    merkle.verify_tx_merkle_proof(
        &proof.anchor_tx,
        &proof.tx_merkle_proof,
        proof.block_header.merkle_root,
    )
}

/// Verifies a merkle proof for the given transaction and merkle root.
pub fn verify_tx_merkle_proof(
    tx: &Transaction,
    proof: &TxMerkleProof,
    merkle_root: TxMerkleNode,
) -> Result<(), Error> {
    let nodes: Vec<[u8; 32]> = proof
        .nodes
        .iter()
        .map(|node| node.to_byte_array())
        .collect();
    verify_tx_merkle_proof_with_hasher(
        tx.compute_txid().to_byte_array(),
        &nodes,
        &proof.bits,
        merkle_root.to_byte_array(),
        &BitcoinMerkleHasher,
    )
}

/// Verifies a merkle proof using a caller-provided node hasher.
///
/// A set bit means the running hash is the left child at that level.
pub fn verify_tx_merkle_proof_with_hasher<H: MerkleHasher>(
    txid: [u8; 32],
    nodes: &[[u8; 32]],
    bits: &[bool],
    merkle_root: [u8; 32],
    hasher: &H,
) -> Result<(), Error> {
    if nodes.len() != bits.len() {
        return Err(Error::InvalidMerkleProofShape {
            nodes: nodes.len(),
            bits: bits.len(),
        });
    }

    let mut current = txid;
    for (node, is_left) in nodes.iter().zip(bits.iter()) {
        let (left, right) = if *is_left {
            (current, *node)
        } else {
            (*node, current)
        };
        current = hasher.hash_nodes(left, right);
    }

    if current == merkle_root {
        Ok(())
    } else {
        Err(Error::InvalidTxMerkleProof)
    }
}

/// Returns true if the transaction spends the specified outpoint.
pub fn tx_spends_prev_out(tx: &Transaction, prev_out: &OutPoint) -> bool {
    tx.input
        .iter()
        .any(|input| input.previous_output == *prev_out)
}

/// Indexes of every P2TR output of `tx`.
pub fn p2tr_output_indexes(tx: &Transaction) -> Vec<u32> {
    tx.output
        .iter()
        .enumerate()
        .filter(|(_, output)| output.script_pubkey.is_p2tr())
        .map(|(index, _)| index as u32)
        .collect()
}

/// Extracts the taproot output key of output `output_index`.
pub fn extract_taproot_key(
    tx: &Transaction,
    output_index: u32,
) -> Result<XOnlyPublicKey, Error> {
    let output = tx
        .output
        .get(output_index as usize)
        .ok_or(Error::OutputIndexInvalid {
            index: output_index,
            output_count: tx.output.len(),
        })?;

    extract_taproot_key_from_script(output.script_pubkey.as_script())
        .ok_or(Error::NotTaprootOutput {
            index: output_index,
        })?
}

/// The output key of a P2TR script, or `None` for any other script.
pub fn extract_taproot_key_from_script(
    script: &Script,
) -> Option<Result<XOnlyPublicKey, Error>> {
    if !script.is_p2tr() {
        return None;
    }

    Some(
        XOnlyPublicKey::from_slice(&script.as_bytes()[2..34])
            .map_err(|_| Error::InvalidTaprootOutputKey),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, ScriptBuf, Sequence, TxIn, TxOut, Txid, Witness};

    fn tx(seed: u8, outputs: Vec<ScriptBuf>) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_byte_array([seed; 32]),
                    vout: 1,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: outputs
                .into_iter()
                .map(|script_pubkey| TxOut {
                    value: Amount::from_sat(1_000),
                    script_pubkey,
                })
                .collect(),
        }
    }

    fn p2tr_script(x_only: [u8; 32]) -> ScriptBuf {
        let mut bytes = vec![0x51, 0x20];
        bytes.extend_from_slice(&x_only);
        ScriptBuf::from_bytes(bytes)
    }

    #[test]
    fn merkle_proofs_from_block_verify() {
        let txs: Vec<Transaction> = (0..5).map(|seed| tx(seed, vec![])).collect();
        let leaves: Vec<TxMerkleNode> = txs
            .iter()
            .map(|tx| TxMerkleNode::from_byte_array(tx.compute_txid().to_byte_array()))
            .collect();
        let root = bitcoin::merkle_tree::calculate_root(leaves.into_iter()).unwrap();

        for (index, tx) in txs.iter().enumerate() {
            let proof = TxMerkleProof::new(&txs, index).unwrap();
            verify_tx_merkle_proof(tx, &proof, root).unwrap();
            assert_eq!(
                verify_tx_merkle_proof(&txs[(index + 1) % txs.len()], &proof, root),
                Err(Error::InvalidTxMerkleProof)
            );
        }
    }

    #[test]
    fn proof_shape_must_match() {
        assert_eq!(
            verify_tx_merkle_proof_with_hasher(
                [0u8; 32],
                &[[1u8; 32]],
                &[],
                [0u8; 32],
                &BitcoinMerkleHasher
            ),
            Err(Error::InvalidMerkleProofShape { nodes: 1, bits: 0 })
        );
    }

    #[test]
    fn taproot_outputs_are_found() {
        let key = XOnlyPublicKey::from_slice(&taproot_assets_types::asset::NUMS_KEY.x_only())
            .unwrap();
        let anchor = tx(
            7,
            vec![
                p2tr_script(key.serialize()),
                ScriptBuf::from_bytes(vec![0x6a, 0x01, 0x01]),
                p2tr_script(key.serialize()),
            ],
        );

        assert_eq!(p2tr_output_indexes(&anchor), vec![0, 2]);
        assert_eq!(extract_taproot_key(&anchor, 2), Ok(key));
        assert_eq!(
            extract_taproot_key(&anchor, 1),
            Err(Error::NotTaprootOutput { index: 1 })
        );
        assert_eq!(
            extract_taproot_key(&anchor, 3),
            Err(Error::OutputIndexInvalid {
                index: 3,
                output_count: 3
            })
        );
        assert!(tx_spends_prev_out(
            &anchor,
            &OutPoint {
                txid: Txid::from_byte_array([7u8; 32]),
                vout: 1
            }
        ));
    }
}
