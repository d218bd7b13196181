use alloc::format;
use alloc::vec::Vec;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::io::Read;
use bitcoin::{Transaction, TxMerkleNode};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::tlv::{encode_bigsize, read_array, read_bigsize};

/// Upper bound on the number of siblings in a transaction merkle proof.
pub const MERKLE_PROOF_MAX_NODES: u64 = 512;

/// A Merkle proof that a transaction is included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxMerkleProof {
    /// The list of sibling hashes along the Merkle path from the transaction
    /// up to the root.
    pub nodes: Vec<TxMerkleNode>,

    /// Direction bits: `true` means the running hash is the left child and
    /// the sibling in `nodes` is on the right.
    pub bits: Vec<bool>,
}

impl TxMerkleProof {
    /// Builds the proof for `txs[tx_index]` against the block's merkle root.
    pub fn new(txs: &[Transaction], tx_index: usize) -> Result<Self, Error> {
        if tx_index >= txs.len() {
            return Err(Error::ProofIndexOutOfRange {
                index: tx_index,
                len: txs.len(),
            });
        }

        let mut level: Vec<TxMerkleNode> = txs
            .iter()
            .map(|tx| TxMerkleNode::from_byte_array(tx.compute_txid().to_byte_array()))
            .collect();
        let mut index = tx_index;
        let mut nodes = Vec::new();
        let mut bits = Vec::new();

        while level.len() > 1 {
            if level.len() % 2 != 0 {
                level.push(level[level.len() - 1]);
            }

            if index % 2 == 0 {
                nodes.push(level[index + 1]);
                bits.push(true);
            } else {
                nodes.push(level[index - 1]);
                bits.push(false);
            }

            level = level
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
            index /= 2;
        }

        Ok(TxMerkleProof { nodes, bits })
    }

    /// Writes the node count, the nodes, then the LSB-first packed bits.
    pub fn encode(&self, out: &mut Vec<u8>) {
        encode_bigsize(self.nodes.len() as u64, out);
        for node in &self.nodes {
            out.extend_from_slice(node.as_byte_array());
        }

        let mut packed = alloc::vec![0u8; self.bits.len().div_ceil(8)];
        for (i, bit) in self.bits.iter().enumerate() {
            if *bit {
                packed[i / 8] |= 1 << (i % 8);
            }
        }
        encode_bigsize(packed.len() as u64, out);
        out.extend_from_slice(&packed);
    }

    pub fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        let num_nodes = read_bigsize(r)?;
        if num_nodes > MERKLE_PROOF_MAX_NODES {
            return Err(Error::TlvStream(format!(
                "Merkle proof has too many nodes: {}",
                num_nodes
            )));
        }

        let mut nodes = Vec::with_capacity(num_nodes as usize);
        for _ in 0..num_nodes {
            nodes.push(TxMerkleNode::from_byte_array(read_array(r)?));
        }

        let packed_bits_len = read_bigsize(r)?;
        let max_packed_bits_len = num_nodes.div_ceil(8);
        if packed_bits_len > max_packed_bits_len {
            return Err(Error::TlvStream(format!(
                "Packed bits length too large: maximum {}, got {}",
                max_packed_bits_len, packed_bits_len
            )));
        }

        let mut packed_bits = alloc::vec![0u8; packed_bits_len as usize];
        r.read_exact(&mut packed_bits).map_err(Error::Io)?;

        let bits = (0..num_nodes as usize)
            .map(|i| {
                packed_bits
                    .get(i / 8)
                    .is_some_and(|byte| (byte >> (i % 8)) & 1 == 1)
            })
            .collect();

        Ok(TxMerkleProof { nodes, bits })
    }
}

fn hash_pair(left: &TxMerkleNode, right: &TxMerkleNode) -> TxMerkleNode {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(left.as_byte_array());
    preimage[32..].copy_from_slice(right.as_byte_array());
    TxMerkleNode::from_byte_array(sha256d::Hash::hash(&preimage).to_byte_array())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, ScriptBuf, TxOut};

    fn dummy_tx(value: u64) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: alloc::vec![],
            output: alloc::vec![TxOut {
                value: Amount::from_sat(value),
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    fn root_from(proof: &TxMerkleProof, tx: &Transaction) -> TxMerkleNode {
        let mut current = TxMerkleNode::from_byte_array(tx.compute_txid().to_byte_array());
        for (node, bit) in proof.nodes.iter().zip(&proof.bits) {
            current = if *bit {
                hash_pair(&current, node)
            } else {
                hash_pair(node, &current)
            };
        }
        current
    }

    #[test]
    fn proofs_reach_block_merkle_root() {
        let txs: Vec<Transaction> = (1..=5).map(dummy_tx).collect();
        let expected = bitcoin::merkle_tree::calculate_root(
            txs.iter().map(|tx| tx.compute_txid().to_raw_hash()),
        )
        .map(TxMerkleNode::from_raw_hash)
        .unwrap();

        for index in 0..txs.len() {
            let proof = TxMerkleProof::new(&txs, index).unwrap();
            assert_eq!(proof.nodes.len(), 3);
            assert_eq!(root_from(&proof, &txs[index]), expected);
        }
    }

    #[test]
    fn single_transaction_block_has_empty_proof() {
        let txs = [dummy_tx(1)];
        let proof = TxMerkleProof::new(&txs, 0).unwrap();
        assert!(proof.nodes.is_empty());

        let mut out = Vec::new();
        proof.encode(&mut out);
        assert_eq!(out, [0, 0]);
        assert_eq!(TxMerkleProof::decode(&mut out.as_slice()).unwrap(), proof);
    }

    #[test]
    fn packed_bits_are_lsb_first() {
        let txs: Vec<Transaction> = (1..=4).map(dummy_tx).collect();
        let proof = TxMerkleProof::new(&txs, 2).unwrap();
        assert_eq!(proof.bits, [true, false]);

        let mut out = Vec::new();
        proof.encode(&mut out);
        assert_eq!(&out[out.len() - 2..], &[1, 0b01]);
        assert_eq!(TxMerkleProof::decode(&mut out.as_slice()).unwrap(), proof);
    }

    #[test]
    fn too_many_nodes_rejected() {
        let mut out = Vec::new();
        encode_bigsize(MERKLE_PROOF_MAX_NODES + 1, &mut out);
        assert!(matches!(
            TxMerkleProof::decode(&mut out.as_slice()),
            Err(Error::TlvStream(_))
        ));
    }
}
