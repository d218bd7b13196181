use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::ToString;
use alloc::vec::Vec;
use bitcoin::block::Header;
use bitcoin::consensus::encode::{deserialize, serialize};
use bitcoin::hashes::{sha256::Hash as Sha256Hash, Hash};
use bitcoin::{OutPoint, Transaction, Witness};
use core::fmt;
use serde::{Deserialize, Serialize};

use crate::asset::encoding::{decode_out_point, decode_witness, encode_out_point, encode_witness};
use crate::asset::{Asset, GenesisInfo, SerializedKey};
use crate::error::Error;
use crate::tlv::{
    encode_bigsize, encode_stream, encode_var_bytes, handle_unknown, read_bigsize,
    read_var_bytes, EncodeRecord, Record, Stream, Type,
};

mod file;
mod merkle;
mod taproot;

pub use file::{File, FileVersion, HashedProof, MAX_FILE_PROOFS};
pub use merkle::{TxMerkleProof, MERKLE_PROOF_MAX_NODES};
pub use taproot::{CommitmentProof, TaprootProof, TapscriptProof};
pub use bitcoin::TxMerkleNode;

/// Magic prefix of a single encoded proof.
pub const PROOF_MAGIC: [u8; 4] = *b"TAPP";

/// Upper bound on a single proof, including any nested additional inputs.
pub const MAX_PROOF_SIZE: u64 = 128 * 1024 * 1024;

/// How deep additional input files may nest inside one another.
pub const MAX_ADDITIONAL_INPUTS_DEPTH: usize = 32;

/// Reports whether `bytes` starts with the single proof magic.
pub fn is_single_proof(bytes: &[u8]) -> bool {
    bytes.starts_with(&PROOF_MAGIC)
}

/// Reports whether `bytes` starts with the proof file magic.
pub fn is_proof_file(bytes: &[u8]) -> bool {
    bytes.starts_with(&file::FILE_MAGIC)
}

/// The version of a state transition proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitionVersion(pub u32);

impl TransitionVersion {
    pub const V0: TransitionVersion = TransitionVersion(0);

    pub fn is_known(self) -> bool {
        self == Self::V0
    }
}

impl fmt::Display for TransitionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encoding of the revealed asset metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaType {
    Opaque,
    Json,
    Other(u8),
}

impl MetaType {
    pub fn as_u8(self) -> u8 {
        match self {
            MetaType::Opaque => 0,
            MetaType::Json => 1,
            MetaType::Other(value) => value,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => MetaType::Opaque,
            1 => MetaType::Json,
            other => MetaType::Other(other),
        }
    }
}

/// Preimage of a genesis asset's meta hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaReveal {
    pub meta_type: MetaType,
    pub data: Vec<u8>,
    pub unknown_odd_types: BTreeMap<u64, Vec<u8>>,
}

const META_REVEAL_TYPE: Type = Type(0);
const META_REVEAL_DATA: Type = Type(2);

enum MetaRevealRecord<'a> {
    Type(MetaType),
    Data(&'a [u8]),
}

impl EncodeRecord for MetaRevealRecord<'_> {
    fn tlv_type(&self) -> Type {
        match self {
            MetaRevealRecord::Type(_) => META_REVEAL_TYPE,
            MetaRevealRecord::Data(_) => META_REVEAL_DATA,
        }
    }

    fn encode_value(&self, out: &mut Vec<u8>) {
        match self {
            MetaRevealRecord::Type(meta_type) => out.push(meta_type.as_u8()),
            MetaRevealRecord::Data(data) => out.extend_from_slice(data),
        }
    }
}

impl MetaReveal {
    pub fn new(meta_type: MetaType, data: Vec<u8>) -> Self {
        MetaReveal {
            meta_type,
            data,
            unknown_odd_types: BTreeMap::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let records = [
            MetaRevealRecord::Type(self.meta_type),
            MetaRevealRecord::Data(&self.data),
        ];
        encode_stream(&records, &self.unknown_odd_types)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut stream = Stream::new(bytes);
        let mut meta_type = None;
        let mut data = None;
        let mut unknown_odd_types = BTreeMap::new();
        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                META_REVEAL_TYPE => meta_type = Some(MetaType::from_u8(record.fixed::<1>()?[0])),
                META_REVEAL_DATA => data = Some(record.value().to_vec()),
                _ => handle_unknown(record, &mut unknown_odd_types)?,
            }
        }
        Ok(MetaReveal {
            meta_type: meta_type
                .ok_or_else(|| Error::MissingTlvField("MetaReveal.type".to_string()))?,
            data: data.ok_or_else(|| Error::MissingTlvField("MetaReveal.data".to_string()))?,
            unknown_odd_types,
        })
    }

    /// The hash a genesis asset commits to in its `meta_hash` field.
    pub fn meta_hash(&self) -> [u8; 32] {
        Sha256Hash::hash(&self.encode()).to_byte_array()
    }
}

/// Data needed to re-derive the tweaked group key of a genesis asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKeyReveal {
    /// The untweaked group key.
    pub raw_group_key: SerializedKey,
    /// Optional tapscript root committed to by the group key.
    pub tapscript_root: Option<[u8; 32]>,
}

impl GroupKeyReveal {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.raw_group_key.bytes);
        if let Some(root) = &self.tapscript_root {
            out.extend_from_slice(root);
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let (raw, root) = match bytes.len() {
            33 => (bytes, None),
            65 => {
                let mut root = [0u8; 32];
                root.copy_from_slice(&bytes[33..]);
                (&bytes[..33], Some(root))
            }
            len => {
                return Err(Error::InvalidTlvValue(
                    PROOF_GROUP_KEY_REVEAL.0,
                    format!("group key reveal must be 33 or 65 bytes, got {}", len),
                ))
            }
        };
        let raw_group_key = SerializedKey {
            bytes: raw.try_into().map_err(|_| {
                Error::InvalidTlvValue(PROOF_GROUP_KEY_REVEAL.0, "raw group key".to_string())
            })?,
        };
        Ok(GroupKeyReveal {
            raw_group_key,
            tapscript_root: root,
        })
    }
}

/// A single state transition of an asset, anchored in a Bitcoin block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Version of the state transition proof.
    pub version: TransitionVersion,

    /// The previous outpoint spent by the anchor transaction.
    pub prev_out: OutPoint,

    /// Header of the block containing the anchor transaction.
    pub block_header: Header,

    /// Height of the block containing the anchor transaction.
    pub block_height: u32,

    /// The transaction anchoring the asset's new Taproot Asset commitment.
    pub anchor_tx: Transaction,

    /// The merkle proof for AnchorTx used to prove its inclusion within
    /// BlockHeader.
    pub tx_merkle_proof: TxMerkleProof,

    /// The asset referenced in the proof. This is the resulting asset after its
    /// state transition.
    pub asset: Asset,

    /// The TaprootProof proving the new inclusion of the resulting asset
    /// within AnchorTx.
    pub inclusion_proof: TaprootProof,

    /// The set of TaprootProofs proving the exclusion of the resulting asset
    /// from all other Taproot outputs within AnchorTx.
    pub exclusion_proofs: Vec<TaprootProof>,

    /// An optional TaprootProof needed if this asset is the result of a split.
    /// SplitRootProof proves inclusion of the root asset of the split.
    pub split_root_proof: Option<TaprootProof>,

    /// The reveal meta data associated with the proof, if available.
    /// This field is optional and can only be specified if the asset
    /// above is a genesis asset.
    pub meta_reveal: Option<MetaReveal>,

    /// Full proof files of every other input spent by the state transition.
    pub additional_inputs: Vec<File>,

    /// ChallengeWitness is an optional virtual transaction witness that serves
    /// as an ownership proof for the asset. If this is non-nil, then it is a
    /// valid transfer witness for a 1-input, 1-output virtual transaction that
    /// spends the asset in this proof and sends it to the NUMS key, to prove
    /// that the creator of the proof is able to produce a valid signature to
    /// spend the asset.
    pub challenge_witness: Option<Witness>,

    /// GenesisReveal is an optional field that is the Genesis information for
    /// the asset. This is required for minting proofs and must be empty for
    /// non-minting proofs. This allows for derivation of the asset ID.
    pub genesis_reveal: Option<GenesisInfo>,

    /// GroupKeyReveal is an optional field that includes the information needed
    /// to derive the tweaked group key.
    pub group_key_reveal: Option<GroupKeyReveal>,

    /// Map of unknown odd types encountered during decoding.
    pub unknown_odd_types: BTreeMap<u64, Vec<u8>>,
}

const PROOF_VERSION: Type = Type(0);
const PROOF_PREV_OUT: Type = Type(2);
const PROOF_BLOCK_HEADER: Type = Type(4);
const PROOF_ANCHOR_TX: Type = Type(6);
const PROOF_TX_MERKLE_PROOF: Type = Type(8);
const PROOF_ASSET: Type = Type(10);
const PROOF_INCLUSION_PROOF: Type = Type(12);
const PROOF_EXCLUSION_PROOFS: Type = Type(13);
const PROOF_SPLIT_ROOT_PROOF: Type = Type(15);
const PROOF_META_REVEAL: Type = Type(17);
const PROOF_ADDITIONAL_INPUTS: Type = Type(19);
const PROOF_CHALLENGE_WITNESS: Type = Type(21);
const PROOF_BLOCK_HEIGHT: Type = Type(22);
const PROOF_GENESIS_REVEAL: Type = Type(23);
const PROOF_GROUP_KEY_REVEAL: Type = Type(25);

enum ProofRecord<'a> {
    Version(TransitionVersion),
    PrevOut(&'a OutPoint),
    BlockHeader(&'a Header),
    AnchorTx(&'a Transaction),
    TxMerkleProof(&'a TxMerkleProof),
    Asset(&'a Asset),
    InclusionProof(&'a TaprootProof),
    ExclusionProofs(&'a [TaprootProof]),
    SplitRootProof(&'a TaprootProof),
    MetaReveal(&'a MetaReveal),
    AdditionalInputs(&'a [File]),
    ChallengeWitness(&'a Witness),
    BlockHeight(u32),
    GenesisReveal(&'a GenesisInfo),
    GroupKeyReveal(&'a GroupKeyReveal),
}

impl EncodeRecord for ProofRecord<'_> {
    fn tlv_type(&self) -> Type {
        match self {
            ProofRecord::Version(_) => PROOF_VERSION,
            ProofRecord::PrevOut(_) => PROOF_PREV_OUT,
            ProofRecord::BlockHeader(_) => PROOF_BLOCK_HEADER,
            ProofRecord::AnchorTx(_) => PROOF_ANCHOR_TX,
            ProofRecord::TxMerkleProof(_) => PROOF_TX_MERKLE_PROOF,
            ProofRecord::Asset(_) => PROOF_ASSET,
            ProofRecord::InclusionProof(_) => PROOF_INCLUSION_PROOF,
            ProofRecord::ExclusionProofs(_) => PROOF_EXCLUSION_PROOFS,
            ProofRecord::SplitRootProof(_) => PROOF_SPLIT_ROOT_PROOF,
            ProofRecord::MetaReveal(_) => PROOF_META_REVEAL,
            ProofRecord::AdditionalInputs(_) => PROOF_ADDITIONAL_INPUTS,
            ProofRecord::ChallengeWitness(_) => PROOF_CHALLENGE_WITNESS,
            ProofRecord::BlockHeight(_) => PROOF_BLOCK_HEIGHT,
            ProofRecord::GenesisReveal(_) => PROOF_GENESIS_REVEAL,
            ProofRecord::GroupKeyReveal(_) => PROOF_GROUP_KEY_REVEAL,
        }
    }

    fn encode_value(&self, out: &mut Vec<u8>) {
        match self {
            ProofRecord::Version(version) => out.extend_from_slice(&version.0.to_be_bytes()),
            ProofRecord::PrevOut(out_point) => encode_out_point(out_point, out),
            ProofRecord::BlockHeader(header) => out.extend_from_slice(&serialize(*header)),
            ProofRecord::AnchorTx(tx) => out.extend_from_slice(&serialize(*tx)),
            ProofRecord::TxMerkleProof(proof) => proof.encode(out),
            ProofRecord::Asset(asset) => out.extend_from_slice(&asset.encode()),
            ProofRecord::InclusionProof(proof) | ProofRecord::SplitRootProof(proof) => {
                out.extend_from_slice(&proof.encode())
            }
            ProofRecord::ExclusionProofs(proofs) => {
                encode_bigsize(proofs.len() as u64, out);
                for proof in proofs.iter() {
                    encode_var_bytes(&proof.encode(), out);
                }
            }
            ProofRecord::MetaReveal(reveal) => out.extend_from_slice(&reveal.encode()),
            ProofRecord::AdditionalInputs(files) => {
                encode_bigsize(files.len() as u64, out);
                for file in files.iter() {
                    encode_var_bytes(&file.encode(), out);
                }
            }
            ProofRecord::ChallengeWitness(witness) => encode_witness(witness, out),
            ProofRecord::BlockHeight(height) => out.extend_from_slice(&height.to_be_bytes()),
            ProofRecord::GenesisReveal(genesis) => genesis.encode(out),
            ProofRecord::GroupKeyReveal(reveal) => reveal.encode(out),
        }
    }
}

fn consensus_decode<T: bitcoin::consensus::Decodable>(record: &Record) -> Result<T, Error> {
    deserialize(record.value()).map_err(|e| {
        Error::BitcoinSerialization(format!("type {}: {}", record.tlv_type().0, e))
    })
}

impl Proof {
    /// The outpoint of the output committing to this proof's asset.
    pub fn out_point(&self) -> OutPoint {
        OutPoint {
            txid: self.anchor_tx.compute_txid(),
            vout: self.inclusion_proof.output_index,
        }
    }

    /// Encodes the proof with its `TAPP` magic prefix.
    pub fn encode(&self) -> Vec<u8> {
        let mut records = Vec::with_capacity(15);
        records.push(ProofRecord::Version(self.version));
        records.push(ProofRecord::PrevOut(&self.prev_out));
        records.push(ProofRecord::BlockHeader(&self.block_header));
        records.push(ProofRecord::AnchorTx(&self.anchor_tx));
        records.push(ProofRecord::TxMerkleProof(&self.tx_merkle_proof));
        records.push(ProofRecord::Asset(&self.asset));
        records.push(ProofRecord::InclusionProof(&self.inclusion_proof));
        if !self.exclusion_proofs.is_empty() {
            records.push(ProofRecord::ExclusionProofs(&self.exclusion_proofs));
        }
        if let Some(proof) = &self.split_root_proof {
            records.push(ProofRecord::SplitRootProof(proof));
        }
        if let Some(reveal) = &self.meta_reveal {
            records.push(ProofRecord::MetaReveal(reveal));
        }
        if !self.additional_inputs.is_empty() {
            records.push(ProofRecord::AdditionalInputs(&self.additional_inputs));
        }
        if let Some(witness) = &self.challenge_witness {
            records.push(ProofRecord::ChallengeWitness(witness));
        }
        records.push(ProofRecord::BlockHeight(self.block_height));
        if let Some(genesis) = &self.genesis_reveal {
            records.push(ProofRecord::GenesisReveal(genesis));
        }
        if let Some(reveal) = &self.group_key_reveal {
            records.push(ProofRecord::GroupKeyReveal(reveal));
        }

        let mut out = PROOF_MAGIC.to_vec();
        out.extend_from_slice(&encode_stream(&records, &self.unknown_odd_types));
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        Self::decode_at_depth(bytes, 0)
    }

    /// Decodes a proof that sits `depth` additional-input files below the
    /// outermost proof.
    pub(crate) fn decode_at_depth(bytes: &[u8], depth: usize) -> Result<Self, Error> {
        let body = bytes
            .strip_prefix(&PROOF_MAGIC)
            .ok_or(Error::InvalidMagic { expected: "TAPP" })?;

        let mut stream = Stream::with_limit(body, MAX_PROOF_SIZE);
        let mut version = TransitionVersion::V0;
        let mut prev_out = None;
        let mut block_header = None;
        let mut block_height = 0;
        let mut anchor_tx = None;
        let mut tx_merkle_proof = None;
        let mut asset = None;
        let mut inclusion_proof = None;
        let mut exclusion_proofs = Vec::new();
        let mut split_root_proof = None;
        let mut meta_reveal = None;
        let mut additional_inputs = Vec::new();
        let mut challenge_witness = None;
        let mut genesis_reveal = None;
        let mut group_key_reveal = None;
        let mut unknown_odd_types = BTreeMap::new();

        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                PROOF_VERSION => {
                    version = TransitionVersion(u32::from_be_bytes(record.fixed::<4>()?));
                }
                PROOF_PREV_OUT => prev_out = Some(record.decode_with(|r| decode_out_point(r))?),
                PROOF_BLOCK_HEADER => block_header = Some(consensus_decode::<Header>(&record)?),
                PROOF_ANCHOR_TX => anchor_tx = Some(consensus_decode::<Transaction>(&record)?),
                PROOF_TX_MERKLE_PROOF => {
                    tx_merkle_proof = Some(record.decode_with(|r| TxMerkleProof::decode(r))?);
                }
                PROOF_ASSET => asset = Some(Asset::decode(record.value())?),
                PROOF_INCLUSION_PROOF => {
                    inclusion_proof = Some(TaprootProof::decode(record.value())?);
                }
                PROOF_EXCLUSION_PROOFS => {
                    exclusion_proofs = record.decode_with(|r| {
                        let count = read_bigsize(r)?;
                        let mut proofs = Vec::new();
                        for _ in 0..count {
                            let proof_bytes = read_var_bytes(r, MAX_PROOF_SIZE)?;
                            proofs.push(TaprootProof::decode(&proof_bytes)?);
                        }
                        Ok(proofs)
                    })?;
                }
                PROOF_SPLIT_ROOT_PROOF => {
                    split_root_proof = Some(TaprootProof::decode(record.value())?);
                }
                PROOF_META_REVEAL => meta_reveal = Some(MetaReveal::decode(record.value())?),
                PROOF_ADDITIONAL_INPUTS => {
                    if depth + 1 > MAX_ADDITIONAL_INPUTS_DEPTH {
                        return Err(Error::NestingDepthExceeded {
                            max: MAX_ADDITIONAL_INPUTS_DEPTH,
                        });
                    }
                    additional_inputs = record.decode_with(|r| {
                        let count = read_bigsize(r)?;
                        let mut files = Vec::new();
                        for _ in 0..count {
                            let file_bytes = read_var_bytes(r, MAX_PROOF_SIZE)?;
                            files.push(File::decode_nested(&file_bytes, depth + 1)?);
                        }
                        Ok(files)
                    })?;
                }
                PROOF_CHALLENGE_WITNESS => {
                    challenge_witness = Some(record.decode_with(|r| decode_witness(r))?);
                }
                PROOF_BLOCK_HEIGHT => {
                    block_height = u32::from_be_bytes(record.fixed::<4>()?);
                }
                PROOF_GENESIS_REVEAL => {
                    genesis_reveal = Some(record.decode_with(|r| GenesisInfo::decode(r))?);
                }
                PROOF_GROUP_KEY_REVEAL => {
                    group_key_reveal = Some(GroupKeyReveal::decode(record.value())?);
                }
                _ => handle_unknown(record, &mut unknown_odd_types)?,
            }
        }

        let missing = |field: &str| Error::MissingTlvField(format!("Proof.{}", field));
        Ok(Proof {
            version,
            prev_out: prev_out.ok_or_else(|| missing("prev_out"))?,
            block_header: block_header.ok_or_else(|| missing("block_header"))?,
            block_height,
            anchor_tx: anchor_tx.ok_or_else(|| missing("anchor_tx"))?,
            tx_merkle_proof: tx_merkle_proof.ok_or_else(|| missing("tx_merkle_proof"))?,
            asset: asset.ok_or_else(|| missing("asset"))?,
            inclusion_proof: inclusion_proof.ok_or_else(|| missing("inclusion_proof"))?,
            exclusion_proofs,
            split_root_proof,
            meta_reveal,
            additional_inputs,
            challenge_witness,
            genesis_reveal,
            group_key_reveal,
            unknown_odd_types,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetType, AssetVersion, PrevWitness};
    use bitcoin::absolute::LockTime;
    use bitcoin::block::Version as BlockVersion;
    use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, BlockHash, CompactTarget, ScriptBuf, TxIn, TxOut, Txid};

    fn key(seed: u8) -> SerializedKey {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[seed; 32]).unwrap();
        PublicKey::from_secret_key(&secp, &secret).into()
    }

    fn sample_proof(prev_out: OutPoint) -> Proof {
        let anchor_tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: alloc::vec![TxIn {
                previous_output: prev_out,
                ..Default::default()
            }],
            output: alloc::vec![TxOut {
                value: Amount::from_sat(1_000),
                script_pubkey: ScriptBuf::new(),
            }],
        };
        let block_header = Header {
            version: BlockVersion::ONE,
            prev_blockhash: BlockHash::all_zeros(),
            merkle_root: TxMerkleNode::from_byte_array(anchor_tx.compute_txid().to_byte_array()),
            time: 1_700_000_000,
            bits: CompactTarget::from_consensus(0x1d00ffff),
            nonce: 7,
        };
        let genesis = GenesisInfo {
            genesis_point: prev_out,
            name: "proof-file-asset".into(),
            meta_hash: [0u8; 32],
            output_index: 0,
            asset_type: AssetType::Normal,
        };
        Proof {
            version: TransitionVersion::V0,
            prev_out,
            block_header,
            block_height: 800_000,
            tx_merkle_proof: TxMerkleProof::new(core::slice::from_ref(&anchor_tx), 0).unwrap(),
            anchor_tx,
            asset: Asset {
                version: AssetVersion::V1,
                genesis: genesis.clone(),
                amount: 21,
                lock_time: 0,
                relative_lock_time: 0,
                prev_witnesses: alloc::vec![PrevWitness::genesis()],
                split_commitment_root: None,
                script_version: 0,
                script_key: key(1),
                group_key: None,
                unknown_odd_types: BTreeMap::new(),
            },
            inclusion_proof: TaprootProof {
                output_index: 0,
                internal_key: key(2),
                commitment_proof: None,
                tapscript_proof: Some(TapscriptProof {
                    tap_preimage1: None,
                    tap_preimage2: None,
                    bip86: true,
                    unknown_odd_types: BTreeMap::new(),
                }),
                unknown_odd_types: BTreeMap::new(),
            },
            exclusion_proofs: Vec::new(),
            split_root_proof: None,
            meta_reveal: Some(MetaReveal::new(MetaType::Json, b"{}".to_vec())),
            additional_inputs: Vec::new(),
            challenge_witness: None,
            genesis_reveal: Some(genesis),
            group_key_reveal: None,
            unknown_odd_types: BTreeMap::new(),
        }
    }

    fn genesis_out_point() -> OutPoint {
        OutPoint {
            txid: Txid::from_byte_array([0xab; 32]),
            vout: 1,
        }
    }

    fn chain_of(len: usize) -> Vec<Proof> {
        let mut proofs: Vec<Proof> = Vec::with_capacity(len);
        let mut prev_out = genesis_out_point();
        for _ in 0..len {
            let proof = sample_proof(prev_out);
            prev_out = proof.out_point();
            proofs.push(proof);
        }
        proofs
    }

    #[test]
    fn proof_preserves_unknown_odd_records() {
        let mut proof = sample_proof(genesis_out_point());
        proof.unknown_odd_types.insert(27, alloc::vec![0xde, 0xad]);
        proof.challenge_witness = Some(Witness::from_slice(&[[5u8; 64]]));

        let encoded = proof.encode();
        assert!(is_single_proof(&encoded));
        let decoded = Proof::decode(&encoded).unwrap();
        assert_eq!(decoded, proof);
        assert_eq!(decoded.encode(), encoded);
    }

    #[test]
    fn magic_prefixes_are_not_interchangeable() {
        let proof = sample_proof(genesis_out_point());
        let file = File::new(FileVersion::V0, core::slice::from_ref(&proof));

        assert!(matches!(
            Proof::decode(&file.encode()),
            Err(Error::InvalidMagic { expected: "TAPP" })
        ));
        assert!(matches!(
            File::decode(&proof.encode()),
            Err(Error::InvalidMagic { expected: "TAPF" })
        ));
    }

    #[test]
    fn meta_hash_covers_type_and_data() {
        let opaque = MetaReveal::new(MetaType::Opaque, b"nevermore".to_vec());
        let json = MetaReveal::new(MetaType::Json, b"nevermore".to_vec());
        assert_ne!(opaque.meta_hash(), json.meta_hash());
        assert_eq!(MetaReveal::decode(&opaque.encode()).unwrap(), opaque);
    }

    #[test]
    fn group_key_reveal_lengths() {
        let reveal = GroupKeyReveal {
            raw_group_key: key(9),
            tapscript_root: Some([4u8; 32]),
        };
        let mut out = Vec::new();
        reveal.encode(&mut out);
        assert_eq!(out.len(), 65);
        assert_eq!(GroupKeyReveal::decode(&out).unwrap(), reveal);
        assert!(GroupKeyReveal::decode(&out[..40]).is_err());
    }

    #[test]
    fn file_hash_chain_detects_tampering() {
        let proofs = chain_of(3);
        let file = File::new(FileVersion::V0, &proofs);
        let encoded = file.encode();
        assert!(is_proof_file(&encoded));

        let decoded = File::decode(&encoded).unwrap();
        assert_eq!(decoded, file);
        assert_eq!(decoded.num_proofs(), 3);
        assert_eq!(decoded.proof_at(2).unwrap(), proofs[2]);

        let mut tampered = encoded.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 1;
        assert!(matches!(
            File::decode(&tampered),
            Err(Error::ChecksumMismatch { index: 2 })
        ));
    }

    #[test]
    fn append_requires_spending_last_anchor() {
        let proofs = chain_of(2);
        let mut file = File::new(FileVersion::V0, &proofs[..1]);
        file.append_proof(&proofs[1]).unwrap();
        assert_eq!(file.num_proofs(), 2);

        let stray = sample_proof(genesis_out_point());
        assert!(matches!(
            file.append_proof(&stray),
            Err(Error::PrevOutMismatch)
        ));
        assert_eq!(file, File::new(FileVersion::V0, &proofs));
    }

    #[test]
    fn replacing_a_proof_rechains_later_hashes() {
        let proofs = chain_of(3);
        let mut file = File::new(FileVersion::V0, &proofs);
        let mut patched = proofs[1].clone();
        patched.block_height += 1;

        file.replace_proof_at(1, &patched).unwrap();
        let expected = File::new(
            FileVersion::V0,
            &[proofs[0].clone(), patched.clone(), proofs[2].clone()],
        );
        assert_eq!(file, expected);
        assert_eq!(File::decode(&file.encode()).unwrap(), expected);

        let (index, found) = file
            .locate_proof(|proof| proof.block_height == patched.block_height)
            .unwrap();
        assert_eq!((index, found), (1, patched));
        assert!(matches!(
            file.replace_proof_at(5, &proofs[0]),
            Err(Error::ProofIndexOutOfRange { index: 5, len: 3 })
        ));

        let mut future = proofs[2].clone();
        future.version = TransitionVersion(9);
        assert!(matches!(
            file.replace_last_proof(&future),
            Err(Error::UnknownVersion(9))
        ));
        assert_eq!(file, expected);
    }

    #[test]
    fn unknown_file_version_blocks_operations() {
        let proofs = chain_of(1);
        let mut file = File::new(FileVersion(2), &proofs);
        let decoded = File::decode(&file.encode()).unwrap();
        assert!(decoded.is_unknown_version());

        assert!(matches!(file.proof_at(0), Err(Error::UnknownVersion(2))));
        assert!(matches!(file.raw_last_proof(), Err(Error::UnknownVersion(2))));
        assert!(matches!(
            file.append_proof(&proofs[0]),
            Err(Error::UnknownVersion(2))
        ));
        assert!(matches!(
            file.replace_last_proof(&proofs[0]),
            Err(Error::UnknownVersion(2))
        ));
    }

    #[test]
    fn empty_file_has_no_last_proof() {
        let file = File::new(FileVersion::V0, &[]);
        assert!(file.is_empty());
        assert!(matches!(file.last_proof(), Err(Error::NoProofAvailable)));
    }

    fn nested(levels: usize) -> Proof {
        let mut proof = sample_proof(genesis_out_point());
        for _ in 0..levels {
            let mut outer = sample_proof(genesis_out_point());
            outer.additional_inputs = alloc::vec![File::new(FileVersion::V0, &[proof])];
            proof = outer;
        }
        proof
    }

    #[test]
    fn additional_inputs_nesting_is_bounded() {
        let allowed = nested(MAX_ADDITIONAL_INPUTS_DEPTH);
        assert_eq!(Proof::decode(&allowed.encode()).unwrap(), allowed);

        let too_deep = nested(MAX_ADDITIONAL_INPUTS_DEPTH + 1);
        assert!(matches!(
            Proof::decode(&too_deep.encode()),
            Err(Error::NestingDepthExceeded { max: MAX_ADDITIONAL_INPUTS_DEPTH })
        ));
    }
}
