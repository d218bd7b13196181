use crate::error::Error;
use crate::mssmt::{LeafNode, MssmtNode, MssmtProof};
use bitcoin::hashes::{sha256::Hash as Sha256Hash, Hash, HashEngine};
use bitcoin::secp256k1::PublicKey;
use bitcoin::{OutPoint, Txid, Witness};
use core::fmt;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub(crate) mod encoding;

pub use encoding::MAX_SPLIT_COMMITMENT_DEPTH;

pub type AssetID = Sha256Hash;

/// Maximum length of an asset name, in bytes.
pub const MAX_ASSET_NAME_LENGTH: usize = 64;

/// The only defined script version.
pub const SCRIPT_V0: u16 = 0;

/// The "nothing up my sleeve" key, used as the script key of zero value
/// split roots (tombstones).
pub const NUMS_KEY: SerializedKey = SerializedKey {
    bytes: [
        0x02, 0x7c, 0x79, 0xb9, 0xb2, 0x6e, 0x46, 0x38, 0x95, 0xee, 0xf5, 0x67, 0x9d, 0x85,
        0x58, 0x94, 0x2c, 0x86, 0xc4, 0xad, 0x22, 0x33, 0xad, 0xef, 0x01, 0xbc, 0x3e, 0x6d,
        0x54, 0x0b, 0x36, 0x53, 0xfe,
    ],
};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// The version of the Taproot Asset.
pub enum AssetVersion {
    /// V0 is the default asset version. This version will include
    /// the witness vector in the leaf for a tap commitment.
    V0,
    /// V1 is the asset version that leaves out the witness vector
    /// from the MS-SMT leaf encoding.
    V1,
    /// A version this library does not understand. It survives a decode and
    /// encode round trip but cannot be committed to.
    Unknown(u8),
}

impl AssetVersion {
    pub const fn as_u8(self) -> u8 {
        match self {
            AssetVersion::V0 => 0,
            AssetVersion::V1 => 1,
            AssetVersion::Unknown(value) => value,
        }
    }

    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => AssetVersion::V0,
            1 => AssetVersion::V1,
            other => AssetVersion::Unknown(other),
        }
    }

    pub const fn is_known(self) -> bool {
        !matches!(self, AssetVersion::Unknown(_))
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
/// The type of the asset.
pub enum AssetType {
    /// Indicates that an asset is capable of being split/merged, with each of the
    /// units being fungible, even across a key asset ID boundary (assuming the
    /// key group is the same).
    Normal = 0,
    /// Indicates that an asset is a collectible, meaning that each of the other
    /// items under the same key group are not fully fungible with each other.
    /// Collectibles also cannot be split or merged.
    Collectible = 1,
}

impl AssetType {
    pub(crate) fn from_u8(val: u8) -> Result<Self, Error> {
        match val {
            0 => Ok(AssetType::Normal),
            1 => Ok(AssetType::Collectible),
            _ => Err(Error::InvalidTlvValue(
                4,
                format!("Unknown asset type: {}", val),
            )),
        }
    }
}

/// A compressed secp256k1 public key as it appears on the wire.
///
/// Construction through [`SerializedKey::from_slice`] validates the point;
/// the public field allows placeholder values such as the all-zero key of a
/// genesis [`PrevId`].
#[derive(Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct SerializedKey {
    pub bytes: [u8; 33],
}

impl SerializedKey {
    /// Parses a compressed key, rejecting bytes that are not a curve point.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let key = PublicKey::from_slice(bytes)
            .map_err(|e| Error::InvalidTlvValue(0, format!("invalid public key: {}", e)))?;
        Ok(key.into())
    }

    pub fn to_public_key(&self) -> Result<PublicKey, Error> {
        PublicKey::from_slice(&self.bytes)
            .map_err(|e| Error::InvalidTlvValue(0, format!("invalid public key: {}", e)))
    }

    /// The BIP-340 x-only encoding of this key.
    pub fn x_only(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.bytes[1..]);
        out
    }
}

impl From<PublicKey> for SerializedKey {
    fn from(key: PublicKey) -> Self {
        SerializedKey {
            bytes: key.serialize(),
        }
    }
}

impl fmt::Display for SerializedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.bytes {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for SerializedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerializedKey({})", self)
    }
}

impl Serialize for SerializedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.bytes)
    }
}

impl<'de> Deserialize<'de> for SerializedKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = SerializedKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("33 bytes of compressed public key")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<SerializedKey, E> {
                let bytes: [u8; 33] = v
                    .try_into()
                    .map_err(|_| E::invalid_length(v.len(), &self))?;
                Ok(SerializedKey { bytes })
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<SerializedKey, A::Error> {
                let mut bytes = [0u8; 33];
                for (i, byte) in bytes.iter_mut().enumerate() {
                    *byte = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(SerializedKey { bytes })
            }
        }

        deserializer.deserialize_bytes(KeyVisitor)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
/// Base genesis information for an asset.
pub struct GenesisInfo {
    /// The first outpoint of the transaction that created the asset (txid:vout).
    pub genesis_point: OutPoint,
    /// The name of the asset.
    pub name: String,
    /// The hash of the meta data for this genesis asset.
    pub meta_hash: [u8; 32],
    /// The index of the output that carries the unique Taproot Asset commitment in
    /// the genesis transaction.
    pub output_index: u32,
    /// The type of the asset.
    pub asset_type: AssetType,
}

impl GenesisInfo {
    /// The asset ID that uniquely identifies the asset.
    pub fn id(&self) -> AssetID {
        let mut engine = Sha256Hash::engine();
        engine.input(&bitcoin::consensus::encode::serialize(&self.genesis_point));
        engine.input(Sha256Hash::hash(self.name.as_bytes()).as_byte_array());
        engine.input(&self.meta_hash);
        engine.input(&self.output_index.to_be_bytes());
        engine.input(&[self.asset_type as u8]);
        Sha256Hash::from_engine(engine)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
/// Information related to the key group of an asset.
pub struct GroupKey {
    /// The tweaked group key committed to in the asset leaf.
    pub group_pub_key: SerializedKey,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Identifies a previous input asset being spent.
pub struct PrevId {
    /// The anchor outpoint holding the spent asset.
    pub out_point: OutPoint,
    /// The ID of the asset that was spent.
    pub asset_id: AssetID,
    /// The script key of the asset that was spent.
    pub script_key: SerializedKey,
}

impl PrevId {
    /// The all-zero identifier used by genesis witnesses.
    pub fn zero() -> Self {
        PrevId {
            out_point: OutPoint {
                txid: Txid::all_zeros(),
                vout: 0,
            },
            asset_id: AssetID::all_zeros(),
            script_key: SerializedKey { bytes: [0u8; 33] },
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    /// The identifier for `asset` anchored at `out_point`.
    pub fn for_asset(out_point: OutPoint, asset: &Asset) -> Self {
        PrevId {
            out_point,
            asset_id: asset.id(),
            script_key: asset.script_key,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
/// Represents a commitment to a split of an asset.
pub struct SplitCommitment {
    /// Inclusion proof of the split asset in the root asset's split tree.
    pub proof: MssmtProof,
    /// The root asset of the split commitment.
    pub root_asset: Box<Asset>,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
/// Represents a previous witness.
pub struct PrevWitness {
    /// Previous input asset ID.
    pub prev_id: Option<PrevId>,
    /// Transaction witness.
    pub tx_witness: Witness,
    /// Split commitment.
    pub split_commitment: Option<SplitCommitment>,
}

impl PrevWitness {
    /// The witness carried by split outputs and genesis assets.
    pub fn genesis() -> Self {
        PrevWitness {
            prev_id: Some(PrevId::zero()),
            tx_witness: Witness::new(),
            split_commitment: None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
/// Represents a Taproot Asset leaf.
pub struct Asset {
    /// The version of the Taproot Asset.
    pub version: AssetVersion,
    /// The base genesis information of an asset. This information never changes.
    pub genesis: GenesisInfo,
    /// The total amount of the asset stored in this Taproot Asset UTXO.
    pub amount: u64,
    /// An optional locktime, as with Bitcoin transactions.
    pub lock_time: u64,
    /// An optional relative lock time, same as Bitcoin transactions.
    pub relative_lock_time: u64,
    /// Previous witnesses for the asset.
    pub prev_witnesses: Vec<PrevWitness>,
    /// Root of the split tree, set only on transfer roots that split.
    pub split_commitment_root: Option<MssmtNode>,
    /// The version of the script, only version 0 is defined at present.
    pub script_version: u16,
    /// The script key of the asset, which can be spent under Taproot semantics.
    pub script_key: SerializedKey,
    /// The key group of the asset, if any.
    pub group_key: Option<GroupKey>,
    /// Odd TLV records this implementation does not understand.
    pub unknown_odd_types: BTreeMap<u64, Vec<u8>>,
}

impl Asset {
    pub fn id(&self) -> AssetID {
        self.genesis.id()
    }

    pub fn asset_type(&self) -> AssetType {
        self.genesis.asset_type
    }

    /// Key of the asset commitment this asset belongs to inside a tap commitment.
    pub fn tap_commitment_key(&self) -> [u8; 32] {
        match &self.group_key {
            Some(group_key) => Sha256Hash::hash(&group_key.group_pub_key.x_only()).to_byte_array(),
            None => self.id().to_byte_array(),
        }
    }

    /// Key of this asset inside its asset commitment.
    pub fn asset_commitment_key(&self) -> [u8; 32] {
        let script_key = self.script_key.x_only();
        if self.group_key.is_none() {
            return Sha256Hash::hash(&script_key).to_byte_array();
        }
        let mut engine = Sha256Hash::engine();
        engine.input(self.id().as_byte_array());
        engine.input(&script_key);
        Sha256Hash::from_engine(engine).to_byte_array()
    }

    fn single_zero_prev_witness(&self) -> Option<&PrevWitness> {
        match self.prev_witnesses.as_slice() {
            [witness]
                if witness.split_commitment.is_none()
                    && witness.prev_id.is_some_and(|id| id.is_zero()) =>
            {
                Some(witness)
            }
            _ => None,
        }
    }

    /// True for an ungrouped genesis asset: one zero-PrevID witness without signature.
    pub fn has_genesis_witness(&self) -> bool {
        self.single_zero_prev_witness()
            .is_some_and(|witness| witness.tx_witness.is_empty())
    }

    /// True for a grouped genesis asset whose witness signs the group key.
    pub fn has_genesis_witness_for_group(&self) -> bool {
        self.group_key.is_some()
            && self
                .single_zero_prev_witness()
                .is_some_and(|witness| !witness.tx_witness.is_empty())
    }

    pub fn is_genesis_asset(&self) -> bool {
        self.has_genesis_witness() || self.has_genesis_witness_for_group()
    }

    /// True when this asset is a split output carrying a proof into its root's split tree.
    pub fn has_split_commitment_witness(&self) -> bool {
        match self.prev_witnesses.as_slice() {
            [witness] => {
                witness.prev_id.is_some()
                    && witness.tx_witness.is_empty()
                    && witness.split_commitment.is_some()
            }
            _ => false,
        }
    }

    /// True for a zero value asset locked to the NUMS key.
    pub fn is_unspendable(&self) -> bool {
        self.amount == 0 && self.script_key == NUMS_KEY
    }

    /// True for the root asset of a transfer.
    pub fn is_transfer_root(&self) -> bool {
        !self.prev_witnesses.is_empty()
            && !self.has_split_commitment_witness()
            && !self.is_genesis_asset()
    }

    /// Returns a copy with the split commitment of the first witness removed.
    pub fn without_split_commitment(&self) -> Asset {
        let mut asset = self.clone();
        if asset.has_split_commitment_witness() {
            asset.prev_witnesses[0].split_commitment = None;
        }
        asset
    }

    /// MS-SMT leaf committing to this asset.
    ///
    /// V1 assets leave the previous witnesses' signatures out of the leaf.
    pub fn leaf(&self) -> LeafNode {
        let include_witness = self.version == AssetVersion::V0;
        LeafNode::new(self.encode_with(include_witness), self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};
    use core::str::FromStr;

    pub(crate) fn test_key(seed: u8) -> SerializedKey {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[seed; 32]).unwrap();
        PublicKey::from_secret_key(&secp, &secret).into()
    }

    pub(crate) fn test_asset() -> Asset {
        Asset {
            version: AssetVersion::V0,
            genesis: GenesisInfo {
                genesis_point: OutPoint::from_str(
                    "3f8c2f2fe0c2b6a3c5eb1f0b9f9d5c3b1f0e7d6c5b4a39281706f5e4d3c2b1a0:1",
                )
                .unwrap(),
                name: "itestbuxx".into(),
                meta_hash: [7u8; 32],
                output_index: 0,
                asset_type: AssetType::Normal,
            },
            amount: 5000,
            lock_time: 0,
            relative_lock_time: 0,
            prev_witnesses: alloc::vec![PrevWitness::genesis()],
            split_commitment_root: None,
            script_version: SCRIPT_V0,
            script_key: test_key(1),
            group_key: None,
            unknown_odd_types: BTreeMap::new(),
        }
    }

    #[test]
    fn asset_id_commits_to_every_genesis_field() {
        let genesis = test_asset().genesis;
        let id = genesis.id();

        let mut renamed = genesis.clone();
        renamed.name.push('x');
        let mut moved = genesis.clone();
        moved.output_index = 1;
        let mut collectible = genesis.clone();
        collectible.asset_type = AssetType::Collectible;

        assert_ne!(renamed.id(), id);
        assert_ne!(moved.id(), id);
        assert_ne!(collectible.id(), id);
        assert_eq!(genesis.clone().id(), id);
    }

    #[test]
    fn commitment_keys_depend_on_grouping() {
        let mut asset = test_asset();
        assert_eq!(asset.tap_commitment_key(), asset.id().to_byte_array());
        assert_eq!(
            asset.asset_commitment_key(),
            Sha256Hash::hash(&asset.script_key.x_only()).to_byte_array()
        );

        let group_key = test_key(2);
        asset.group_key = Some(GroupKey {
            group_pub_key: group_key,
        });
        assert_eq!(
            asset.tap_commitment_key(),
            Sha256Hash::hash(&group_key.x_only()).to_byte_array()
        );
        let mut preimage = asset.id().to_byte_array().to_vec();
        preimage.extend_from_slice(&asset.script_key.x_only());
        assert_eq!(
            asset.asset_commitment_key(),
            Sha256Hash::hash(&preimage).to_byte_array()
        );
    }

    #[test]
    fn genesis_witness_predicates() {
        let mut asset = test_asset();
        assert!(asset.has_genesis_witness());
        assert!(!asset.has_genesis_witness_for_group());
        assert!(asset.is_genesis_asset());
        assert!(!asset.is_transfer_root());

        asset.prev_witnesses[0].tx_witness = Witness::from_slice(&[[1u8; 64]]);
        assert!(!asset.is_genesis_asset());

        asset.group_key = Some(GroupKey {
            group_pub_key: test_key(3),
        });
        assert!(asset.has_genesis_witness_for_group());

        asset.prev_witnesses.push(PrevWitness::genesis());
        assert!(!asset.is_genesis_asset());
        assert!(asset.is_transfer_root());
    }

    #[test]
    fn nums_key_is_a_valid_point() {
        assert_eq!(SerializedKey::from_slice(&NUMS_KEY.bytes).unwrap(), NUMS_KEY);
        assert!(SerializedKey::from_slice(&[0u8; 33]).is_err());
    }

    #[test]
    fn v1_leaf_ignores_witness_signatures() {
        let mut asset = test_asset();
        asset.version = AssetVersion::V1;
        asset.prev_witnesses[0].prev_id = Some(PrevId {
            out_point: asset.genesis.genesis_point,
            asset_id: asset.id(),
            script_key: asset.script_key,
        });
        let unsigned = asset.leaf();

        asset.prev_witnesses[0].tx_witness = Witness::from_slice(&[[9u8; 64]]);
        assert_eq!(asset.leaf(), unsigned);

        asset.version = AssetVersion::V0;
        assert_ne!(asset.leaf().value, unsigned.value);
        assert_eq!(asset.leaf().sum, 5000);
    }
}
