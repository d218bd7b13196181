use super::{
    Asset, AssetID, AssetType, AssetVersion, GenesisInfo, GroupKey, PrevId, PrevWitness,
    SerializedKey, SplitCommitment, MAX_ASSET_NAME_LENGTH,
};
use crate::error::Error;
use crate::mssmt::{MssmtNode, MssmtProof};
use crate::tlv::{
    encode_bigsize, encode_stream, encode_var_bytes, handle_unknown, read_array, read_bigsize,
    read_u32_be, read_u64_be, read_u8, read_var_bytes, EncodeRecord, Stream, Type,
    MAX_TLV_RECORD_SIZE,
};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use bitcoin::hashes::{sha256::Hash as Sha256Hash, Hash};
use bitcoin::io::Read;
use bitcoin::{OutPoint, Txid, Witness};

/// How many split commitments may be nested inside one another when decoding.
pub const MAX_SPLIT_COMMITMENT_DEPTH: usize = 4;

// TLV Types for Asset (based on Go's asset/records.go)
const ASSET_LEAF_VERSION: Type = Type(0);
const ASSET_LEAF_GENESIS: Type = Type(2);
const ASSET_LEAF_TYPE: Type = Type(4);
const ASSET_LEAF_AMOUNT: Type = Type(6);
const ASSET_LEAF_LOCK_TIME: Type = Type(7);
const ASSET_LEAF_RELATIVE_LOCK_TIME: Type = Type(9);
const ASSET_LEAF_PREV_WITNESS: Type = Type(11);
const ASSET_LEAF_SPLIT_COMMITMENT_ROOT: Type = Type(13);
const ASSET_LEAF_SCRIPT_VERSION: Type = Type(14);
const ASSET_LEAF_SCRIPT_KEY: Type = Type(16);
const ASSET_LEAF_GROUP_KEY: Type = Type(17);

const WITNESS_PREV_ID: Type = Type(1);
const WITNESS_TX_WITNESS: Type = Type(3);
const WITNESS_SPLIT_COMMITMENT: Type = Type(5);

enum AssetRecord<'a> {
    Version(AssetVersion),
    Genesis(&'a GenesisInfo),
    Type(AssetType),
    Amount(u64),
    LockTime(u64),
    RelativeLockTime(u64),
    PrevWitnesses(&'a [PrevWitness], bool),
    SplitCommitmentRoot(&'a MssmtNode),
    ScriptVersion(u16),
    ScriptKey(&'a SerializedKey),
    GroupKey(&'a GroupKey),
}

impl EncodeRecord for AssetRecord<'_> {
    fn tlv_type(&self) -> Type {
        match self {
            AssetRecord::Version(_) => ASSET_LEAF_VERSION,
            AssetRecord::Genesis(_) => ASSET_LEAF_GENESIS,
            AssetRecord::Type(_) => ASSET_LEAF_TYPE,
            AssetRecord::Amount(_) => ASSET_LEAF_AMOUNT,
            AssetRecord::LockTime(_) => ASSET_LEAF_LOCK_TIME,
            AssetRecord::RelativeLockTime(_) => ASSET_LEAF_RELATIVE_LOCK_TIME,
            AssetRecord::PrevWitnesses(..) => ASSET_LEAF_PREV_WITNESS,
            AssetRecord::SplitCommitmentRoot(_) => ASSET_LEAF_SPLIT_COMMITMENT_ROOT,
            AssetRecord::ScriptVersion(_) => ASSET_LEAF_SCRIPT_VERSION,
            AssetRecord::ScriptKey(_) => ASSET_LEAF_SCRIPT_KEY,
            AssetRecord::GroupKey(_) => ASSET_LEAF_GROUP_KEY,
        }
    }

    fn encode_value(&self, out: &mut Vec<u8>) {
        match self {
            AssetRecord::Version(version) => out.push(version.as_u8()),
            AssetRecord::Genesis(genesis) => genesis.encode(out),
            AssetRecord::Type(asset_type) => out.push(*asset_type as u8),
            AssetRecord::Amount(value)
            | AssetRecord::LockTime(value)
            | AssetRecord::RelativeLockTime(value) => encode_bigsize(*value, out),
            AssetRecord::PrevWitnesses(witnesses, include_tx_witness) => {
                encode_bigsize(witnesses.len() as u64, out);
                for witness in witnesses.iter() {
                    encode_var_bytes(&witness.encode_with(*include_tx_witness), out);
                }
            }
            AssetRecord::SplitCommitmentRoot(root) => {
                out.extend_from_slice(root.hash.as_byte_array());
                out.extend_from_slice(&root.sum.to_be_bytes());
            }
            AssetRecord::ScriptVersion(version) => out.extend_from_slice(&version.to_be_bytes()),
            AssetRecord::ScriptKey(key) => out.extend_from_slice(&key.bytes),
            AssetRecord::GroupKey(group_key) => {
                out.extend_from_slice(&group_key.group_pub_key.bytes)
            }
        }
    }
}

enum WitnessRecord<'a> {
    PrevId(&'a PrevId),
    TxWitness(&'a Witness),
    SplitCommitment(&'a SplitCommitment),
}

impl EncodeRecord for WitnessRecord<'_> {
    fn tlv_type(&self) -> Type {
        match self {
            WitnessRecord::PrevId(_) => WITNESS_PREV_ID,
            WitnessRecord::TxWitness(_) => WITNESS_TX_WITNESS,
            WitnessRecord::SplitCommitment(_) => WITNESS_SPLIT_COMMITMENT,
        }
    }

    fn encode_value(&self, out: &mut Vec<u8>) {
        match self {
            WitnessRecord::PrevId(prev_id) => {
                encode_out_point(&prev_id.out_point, out);
                out.extend_from_slice(prev_id.asset_id.as_byte_array());
                out.extend_from_slice(&prev_id.script_key.bytes);
            }
            WitnessRecord::TxWitness(witness) => encode_witness(witness, out),
            WitnessRecord::SplitCommitment(split) => {
                let mut proof = Vec::new();
                split.proof.encode(&mut proof);
                encode_var_bytes(&proof, out);
                encode_var_bytes(&split.root_asset.encode(), out);
            }
        }
    }
}

impl Asset {
    /// Full TLV encoding, including every witness.
    pub fn encode(&self) -> Vec<u8> {
        self.encode_with(true)
    }

    pub(crate) fn encode_with(&self, include_tx_witness: bool) -> Vec<u8> {
        let mut records = Vec::with_capacity(11);
        records.push(AssetRecord::Version(self.version));
        records.push(AssetRecord::Genesis(&self.genesis));
        records.push(AssetRecord::Type(self.genesis.asset_type));
        records.push(AssetRecord::Amount(self.amount));
        if self.lock_time > 0 {
            records.push(AssetRecord::LockTime(self.lock_time));
        }
        if self.relative_lock_time > 0 {
            records.push(AssetRecord::RelativeLockTime(self.relative_lock_time));
        }
        if !self.prev_witnesses.is_empty() {
            records.push(AssetRecord::PrevWitnesses(
                &self.prev_witnesses,
                include_tx_witness,
            ));
        }
        if let Some(root) = &self.split_commitment_root {
            records.push(AssetRecord::SplitCommitmentRoot(root));
        }
        records.push(AssetRecord::ScriptVersion(self.script_version));
        records.push(AssetRecord::ScriptKey(&self.script_key));
        if let Some(group_key) = &self.group_key {
            records.push(AssetRecord::GroupKey(group_key));
        }
        encode_stream(&records, &self.unknown_odd_types)
    }

    /// Decodes an Asset from a TLV byte slice.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        decode_asset(bytes, 0)
    }
}

impl PrevWitness {
    fn encode_with(&self, include_tx_witness: bool) -> Vec<u8> {
        let mut records = Vec::with_capacity(3);
        if let Some(prev_id) = &self.prev_id {
            records.push(WitnessRecord::PrevId(prev_id));
        }
        if include_tx_witness && !self.tx_witness.is_empty() {
            records.push(WitnessRecord::TxWitness(&self.tx_witness));
        }
        if let Some(split) = &self.split_commitment {
            records.push(WitnessRecord::SplitCommitment(split));
        }
        encode_stream(&records, &BTreeMap::new())
    }
}

impl GenesisInfo {
    pub fn encode(&self, out: &mut Vec<u8>) {
        encode_out_point(&self.genesis_point, out);
        encode_var_bytes(self.name.as_bytes(), out);
        out.extend_from_slice(&self.meta_hash);
        out.extend_from_slice(&self.output_index.to_be_bytes());
        out.push(self.asset_type as u8);
    }

    pub fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        let genesis_point = decode_out_point(r)?;
        let name = read_var_bytes(r, MAX_ASSET_NAME_LENGTH as u64)?;
        let name = String::from_utf8(name).map_err(|e| {
            Error::InvalidTlvValue(ASSET_LEAF_GENESIS.0, format!("asset name: {}", e))
        })?;
        let meta_hash = read_array(r)?;
        let output_index = read_u32_be(r)?;
        let asset_type = AssetType::from_u8(read_u8(r)?)?;
        Ok(GenesisInfo {
            genesis_point,
            name,
            meta_hash,
            output_index,
            asset_type,
        })
    }
}

/// Writes `txid || vout` with the output index in big-endian order.
pub(crate) fn encode_out_point(out_point: &OutPoint, out: &mut Vec<u8>) {
    out.extend_from_slice(out_point.txid.as_byte_array());
    out.extend_from_slice(&out_point.vout.to_be_bytes());
}

pub(crate) fn decode_out_point<R: Read + ?Sized>(r: &mut R) -> Result<OutPoint, Error> {
    let txid = Txid::from_byte_array(read_array(r)?);
    let vout = read_u32_be(r)?;
    Ok(OutPoint { txid, vout })
}

/// Writes a witness stack as a count followed by length-prefixed items.
pub(crate) fn encode_witness(witness: &Witness, out: &mut Vec<u8>) {
    encode_bigsize(witness.len() as u64, out);
    for item in witness.iter() {
        encode_var_bytes(item, out);
    }
}

pub(crate) fn decode_witness<R: Read + ?Sized>(r: &mut R) -> Result<Witness, Error> {
    let count = read_bigsize(r)?;
    let mut items = Vec::new();
    for _ in 0..count {
        items.push(read_var_bytes(r, MAX_TLV_RECORD_SIZE)?);
    }
    Ok(Witness::from_slice(&items))
}

fn decode_asset(bytes: &[u8], depth: usize) -> Result<Asset, Error> {
    let mut stream = Stream::new(bytes);
    let mut version = AssetVersion::V0;
    let mut genesis: Option<GenesisInfo> = None;
    let mut asset_type: Option<AssetType> = None;
    let mut amount = 0;
    let mut lock_time = 0;
    let mut relative_lock_time = 0;
    let mut prev_witnesses = Vec::new();
    let mut split_commitment_root = None;
    let mut script_version = 0;
    let mut script_key: Option<SerializedKey> = None;
    let mut group_key = None;
    let mut unknown_odd_types = BTreeMap::new();

    while let Some(record) = stream.next_record()? {
        match record.tlv_type() {
            ASSET_LEAF_VERSION => {
                version = AssetVersion::from_u8(record.fixed::<1>()?[0]);
            }
            ASSET_LEAF_GENESIS => {
                genesis = Some(record.decode_with(|r| GenesisInfo::decode(r))?);
            }
            ASSET_LEAF_TYPE => {
                asset_type = Some(AssetType::from_u8(record.fixed::<1>()?[0])?);
            }
            ASSET_LEAF_AMOUNT => amount = record.decode_with(|r| read_bigsize(r))?,
            ASSET_LEAF_LOCK_TIME => lock_time = record.decode_with(|r| read_bigsize(r))?,
            ASSET_LEAF_RELATIVE_LOCK_TIME => {
                relative_lock_time = record.decode_with(|r| read_bigsize(r))?;
            }
            ASSET_LEAF_PREV_WITNESS => {
                prev_witnesses = record.decode_with(|r| {
                    let count = read_bigsize(r)?;
                    let mut witnesses = Vec::new();
                    for _ in 0..count {
                        let witness_bytes = read_var_bytes(r, MAX_TLV_RECORD_SIZE)?;
                        witnesses.push(decode_prev_witness(&witness_bytes, depth)?);
                    }
                    Ok(witnesses)
                })?;
            }
            ASSET_LEAF_SPLIT_COMMITMENT_ROOT => {
                split_commitment_root = Some(record.decode_with(|r| {
                    let hash = Sha256Hash::from_byte_array(read_array(r)?);
                    let sum = read_u64_be(r)?;
                    Ok(MssmtNode { hash, sum })
                })?);
            }
            ASSET_LEAF_SCRIPT_VERSION => {
                script_version = u16::from_be_bytes(record.fixed::<2>()?);
            }
            ASSET_LEAF_SCRIPT_KEY => {
                script_key = Some(
                    SerializedKey::from_slice(record.value())
                        .map_err(|e| Error::InvalidTlvValue(ASSET_LEAF_SCRIPT_KEY.0, e.to_string()))?,
                );
            }
            ASSET_LEAF_GROUP_KEY => {
                let group_pub_key = SerializedKey::from_slice(record.value())
                    .map_err(|e| Error::InvalidTlvValue(ASSET_LEAF_GROUP_KEY.0, e.to_string()))?;
                group_key = Some(GroupKey { group_pub_key });
            }
            _ => handle_unknown(record, &mut unknown_odd_types)?,
        }
    }

    let genesis = genesis.ok_or_else(|| Error::MissingTlvField("Asset.genesis".to_string()))?;
    if asset_type.is_some_and(|asset_type| asset_type != genesis.asset_type) {
        return Err(Error::InvalidTlvValue(
            ASSET_LEAF_TYPE.0,
            "asset type does not match genesis".to_string(),
        ));
    }

    Ok(Asset {
        version,
        genesis,
        amount,
        lock_time,
        relative_lock_time,
        prev_witnesses,
        split_commitment_root,
        script_version,
        script_key: script_key
            .ok_or_else(|| Error::MissingTlvField("Asset.script_key".to_string()))?,
        group_key,
        unknown_odd_types,
    })
}

fn decode_prev_witness(bytes: &[u8], depth: usize) -> Result<PrevWitness, Error> {
    let mut stream = Stream::new(bytes);
    let mut witness = PrevWitness {
        prev_id: None,
        tx_witness: Witness::new(),
        split_commitment: None,
    };
    let mut ignored = BTreeMap::new();

    while let Some(record) = stream.next_record()? {
        match record.tlv_type() {
            WITNESS_PREV_ID => {
                witness.prev_id = Some(record.decode_with(|r| {
                    let out_point = decode_out_point(r)?;
                    let asset_id = AssetID::from_byte_array(read_array(r)?);
                    let script_key = SerializedKey {
                        bytes: read_array(r)?,
                    };
                    Ok(PrevId {
                        out_point,
                        asset_id,
                        script_key,
                    })
                })?);
            }
            WITNESS_TX_WITNESS => {
                witness.tx_witness = record.decode_with(|r| decode_witness(r))?;
            }
            WITNESS_SPLIT_COMMITMENT => {
                if depth + 1 > MAX_SPLIT_COMMITMENT_DEPTH {
                    return Err(Error::NestingDepthExceeded {
                        max: MAX_SPLIT_COMMITMENT_DEPTH,
                    });
                }
                witness.split_commitment = Some(record.decode_with(|r| {
                    let proof_bytes = read_var_bytes(r, MAX_TLV_RECORD_SIZE)?;
                    let mut proof_reader = proof_bytes.as_slice();
                    let proof = MssmtProof::decode(&mut proof_reader)?;
                    if !proof_reader.is_empty() {
                        return Err(Error::InvalidTlvValue(
                            WITNESS_SPLIT_COMMITMENT.0,
                            "trailing bytes after split proof".to_string(),
                        ));
                    }
                    let root_bytes = read_var_bytes(r, MAX_TLV_RECORD_SIZE)?;
                    let root_asset = decode_asset(&root_bytes, depth + 1)?;
                    Ok(SplitCommitment {
                        proof,
                        root_asset: Box::new(root_asset),
                    })
                })?);
            }
            _ => handle_unknown(record, &mut ignored)?,
        }
    }

    Ok(witness)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{test_asset, test_key};
    use super::super::NUMS_KEY;
    use super::*;
    use crate::mssmt::{EmptyTree, MAX_TREE_LEVELS};

    #[test]
    fn genesis_encoding_layout() {
        let genesis = test_asset().genesis;
        let mut out = Vec::new();
        genesis.encode(&mut out);
        assert_eq!(out.len(), 32 + 4 + 1 + genesis.name.len() + 32 + 4 + 1);
        assert_eq!(&out[32..36], &genesis.genesis_point.vout.to_be_bytes());
        assert_eq!(GenesisInfo::decode(&mut out.as_slice()).unwrap(), genesis);
    }

    #[test]
    fn transfer_asset_survives_decoding() {
        let empty = EmptyTree::new();
        let proof_nodes = (0..MAX_TREE_LEVELS)
            .map(|idx| empty.at_depth(MAX_TREE_LEVELS - idx))
            .collect();

        let mut root_asset = test_asset();
        root_asset.amount = 0;
        root_asset.script_key = NUMS_KEY;
        root_asset.split_commitment_root = Some(empty.root());
        root_asset.prev_witnesses[0].tx_witness = Witness::from_slice(&[[3u8; 64]]);

        let mut asset = test_asset();
        asset.lock_time = 500_000;
        asset.group_key = Some(GroupKey {
            group_pub_key: test_key(4),
        });
        asset.prev_witnesses[0].prev_id = Some(PrevId {
            out_point: asset.genesis.genesis_point,
            asset_id: asset.id(),
            script_key: test_key(5),
        });
        asset.prev_witnesses[0].split_commitment = Some(SplitCommitment {
            proof: MssmtProof::new(proof_nodes).unwrap(),
            root_asset: Box::new(root_asset),
        });
        asset.unknown_odd_types.insert(101, alloc::vec![1, 2, 3]);

        let encoded = asset.encode();
        let decoded = Asset::decode(&encoded).unwrap();
        assert_eq!(decoded, asset);
        assert_eq!(decoded.encode(), encoded);
        assert!(decoded.has_split_commitment_witness());
    }

    #[test]
    fn unknown_asset_version_survives_decoding() {
        let mut asset = test_asset();
        asset.version = AssetVersion::Unknown(2);
        let encoded = asset.encode();
        assert_eq!(&encoded[..3], &[0x00, 0x01, 0x02]);

        let decoded = Asset::decode(&encoded).unwrap();
        assert_eq!(decoded.version, AssetVersion::Unknown(2));
        assert_eq!(decoded.encode(), encoded);
    }

    #[test]
    fn unknown_even_record_rejected() {
        let mut encoded = test_asset().encode();
        encoded.extend_from_slice(&[0x64, 0x01, 0x00]);
        assert!(matches!(
            Asset::decode(&encoded),
            Err(Error::UnknownTlvType(100))
        ));
    }

    #[test]
    fn missing_script_key_rejected() {
        let asset = test_asset();
        let records = [AssetRecord::Version(AssetVersion::V0), AssetRecord::Genesis(&asset.genesis)];
        let encoded = encode_stream(&records, &BTreeMap::new());
        assert!(matches!(
            Asset::decode(&encoded),
            Err(Error::MissingTlvField(_))
        ));
    }

    #[test]
    fn invalid_script_key_rejected() {
        let asset = test_asset();
        let bad_key = SerializedKey { bytes: [0u8; 33] };
        let records = [
            AssetRecord::Genesis(&asset.genesis),
            AssetRecord::ScriptKey(&bad_key),
        ];
        let encoded = encode_stream(&records, &BTreeMap::new());
        assert!(matches!(
            Asset::decode(&encoded),
            Err(Error::InvalidTlvValue(16, _))
        ));
    }
}
