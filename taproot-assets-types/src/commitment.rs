use crate::asset::AssetVersion;
use crate::error::Error;
use crate::mssmt::MssmtProof;
use crate::tlv::{
    encode_stream, handle_unknown, read_array, read_u8, EncodeRecord, Stream, Type,
};
use alloc::collections::BTreeMap;
use alloc::string::ToString;
use alloc::vec::Vec;
use bitcoin::io::Read;
use core::fmt;

use serde::{Deserialize, Serialize};

/// Denotes the structure of the Taproot Asset commitment MS-SMT and the procedure
/// for building a TapLeaf from a Taproot Asset commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TapCommitmentVersion {
    /// Initial Taproot Asset Commitment version. Uses legacy TapLeaf format, ONLY commits to V0 assets.
    V0,
    /// Used by Taproot Asset Commitments that commit to V0 or V1 assets. Uses legacy TapLeaf format.
    V1,
    /// Used by Taproot Asset Commitments that commit to V0 or V1 assets. Uses V1 TapLeaf format.
    V2,
    /// Decoded but not understood; rejected when building or verifying
    /// commitments.
    Unknown(u8),
}

impl TapCommitmentVersion {
    pub const fn as_u8(self) -> u8 {
        match self {
            TapCommitmentVersion::V0 => 0,
            TapCommitmentVersion::V1 => 1,
            TapCommitmentVersion::V2 => 2,
            TapCommitmentVersion::Unknown(value) => value,
        }
    }

    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => TapCommitmentVersion::V0,
            1 => TapCommitmentVersion::V1,
            2 => TapCommitmentVersion::V2,
            other => TapCommitmentVersion::Unknown(other),
        }
    }

    pub const fn is_known(self) -> bool {
        !matches!(self, TapCommitmentVersion::Unknown(_))
    }
}

impl fmt::Display for TapCommitmentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Leaf preimage type byte.
const LEAF_PREIMAGE: u8 = 0;
/// Branch preimage type byte (64 bytes of two child hashes).
const BRANCH_PREIMAGE: u8 = 1;

/// Preimage of the tapscript sibling of a Taproot Asset commitment leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TapscriptPreimage {
    /// A single tap leaf.
    Leaf { leaf_version: u8, script: Vec<u8> },
    /// A tap branch, given by the hashes of its two children.
    Branch { left: [u8; 32], right: [u8; 32] },
}

impl TapscriptPreimage {
    /// Writes the type byte followed by the preimage itself.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            TapscriptPreimage::Leaf {
                leaf_version,
                script,
            } => {
                out.push(LEAF_PREIMAGE);
                out.push(*leaf_version);
                encode_compact_size(script.len() as u64, out);
                out.extend_from_slice(script);
            }
            TapscriptPreimage::Branch { left, right } => {
                out.push(BRANCH_PREIMAGE);
                out.extend_from_slice(left);
                out.extend_from_slice(right);
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let (&preimage_type, body) = bytes.split_first().ok_or_else(|| {
            Error::InvalidTlvValue(0, "empty tapscript preimage".to_string())
        })?;
        match preimage_type {
            LEAF_PREIMAGE => {
                let mut r = body;
                let leaf_version = read_u8(&mut r)?;
                let script_len = read_compact_size(&mut r)?;
                if script_len != r.len() as u64 {
                    return Err(Error::InvalidTlvValue(
                        0,
                        alloc::format!(
                            "tap leaf script length {} does not match {} remaining bytes",
                            script_len,
                            r.len()
                        ),
                    ));
                }
                Ok(TapscriptPreimage::Leaf {
                    leaf_version,
                    script: r.to_vec(),
                })
            }
            BRANCH_PREIMAGE => {
                if body.len() != 64 {
                    return Err(Error::InvalidTlvValue(
                        0,
                        "BranchPreimage must be 64 bytes".to_string(),
                    ));
                }
                let mut r = body;
                Ok(TapscriptPreimage::Branch {
                    left: read_array(&mut r)?,
                    right: read_array(&mut r)?,
                })
            }
            other => Err(Error::InvalidTlvValue(
                0,
                alloc::format!("Unknown TapscriptPreimageType: {}", other),
            )),
        }
    }
}

/// Bitcoin consensus CompactSize, little-endian.
fn encode_compact_size(value: u64, out: &mut Vec<u8>) {
    match value {
        0..=0xFC => out.push(value as u8),
        0xFD..=0xFFFF => {
            out.push(0xFD);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(0xFE);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xFF);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

fn read_compact_size<R: Read + ?Sized>(r: &mut R) -> Result<u64, Error> {
    let first = read_u8(r)?;
    let (value, min) = match first {
        0..=0xFC => return Ok(first as u64),
        0xFD => (u16::from_le_bytes(read_array(r)?) as u64, 0xFD),
        0xFE => (u32::from_le_bytes(read_array(r)?) as u64, 0x1_0000),
        0xFF => (u64::from_le_bytes(read_array(r)?), 0x1_0000_0000),
    };
    if value < min {
        return Err(Error::InvalidTlvValue(
            0,
            "non-canonical compact size".to_string(),
        ));
    }
    Ok(value)
}

/// Proof used along with an asset leaf to arrive at the root of the AssetCommitment MS-SMT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetProof {
    /// The underlying MS-SMT proof.
    pub proof: MssmtProof,
    /// Max version of the assets committed.
    pub version: AssetVersion,
    /// Common identifier for all assets found within the AssetCommitment.
    /// Can be an asset.ID or an asset.GroupKey hash.
    pub tap_key: [u8; 32],
    /// Map of unknown odd types encountered during decoding.
    pub unknown_odd_types: BTreeMap<u64, Vec<u8>>,
}

/// Proof used along with an asset commitment leaf to arrive at the root of the TapCommitment MS-SMT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaprootAssetProof {
    /// The underlying MS-SMT proof.
    pub proof: MssmtProof,
    /// Version of the TapCommitment used to create the proof.
    pub version: TapCommitmentVersion,
    /// Map of unknown odd types encountered during decoding.
    pub unknown_odd_types: BTreeMap<u64, Vec<u8>>,
}

/// Represents a full commitment proof for a particular `Asset`. It proves
/// that an asset does or does not exist within a Taproot Asset commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Proof used along with the asset to arrive at the root of the AssetCommitment MS-SMT.
    /// NOTE: This proof must be None if the asset commitment for this
    /// particular asset is not found within the Taproot Asset commitment.
    pub asset_proof: Option<AssetProof>,
    /// Proof used along with the asset commitment to arrive at the root of the TapCommitment
    /// MS-SMT.
    pub taproot_asset_proof: TaprootAssetProof,
}

// For commitment::AssetProof
const ASSET_PROOF_VERSION_TYPE: Type = Type(0);
const ASSET_PROOF_TAP_KEY_TYPE: Type = Type(2);
const ASSET_PROOF_MSSMT_PROOF_TYPE: Type = Type(4);

// For commitment::TaprootAssetProof
const TAPROOT_ASSET_PROOF_VERSION_TYPE: Type = Type(0);
const TAPROOT_ASSET_PROOF_MSSMT_PROOF_TYPE: Type = Type(2);

enum AssetProofRecord<'a> {
    Version(AssetVersion),
    TapKey(&'a [u8; 32]),
    Proof(&'a MssmtProof),
}

impl EncodeRecord for AssetProofRecord<'_> {
    fn tlv_type(&self) -> Type {
        match self {
            AssetProofRecord::Version(_) => ASSET_PROOF_VERSION_TYPE,
            AssetProofRecord::TapKey(_) => ASSET_PROOF_TAP_KEY_TYPE,
            AssetProofRecord::Proof(_) => ASSET_PROOF_MSSMT_PROOF_TYPE,
        }
    }

    fn encode_value(&self, out: &mut Vec<u8>) {
        match self {
            AssetProofRecord::Version(version) => out.push(version.as_u8()),
            AssetProofRecord::TapKey(key) => out.extend_from_slice(*key),
            AssetProofRecord::Proof(proof) => proof.encode(out),
        }
    }
}

enum TaprootAssetProofRecord<'a> {
    Version(TapCommitmentVersion),
    Proof(&'a MssmtProof),
}

impl EncodeRecord for TaprootAssetProofRecord<'_> {
    fn tlv_type(&self) -> Type {
        match self {
            TaprootAssetProofRecord::Version(_) => TAPROOT_ASSET_PROOF_VERSION_TYPE,
            TaprootAssetProofRecord::Proof(_) => TAPROOT_ASSET_PROOF_MSSMT_PROOF_TYPE,
        }
    }

    fn encode_value(&self, out: &mut Vec<u8>) {
        match self {
            TaprootAssetProofRecord::Version(version) => out.push(version.as_u8()),
            TaprootAssetProofRecord::Proof(proof) => proof.encode(out),
        }
    }
}

/// Decodes a compressed MS-SMT proof that must fill the whole record.
fn decode_record_proof(record: &crate::tlv::Record) -> Result<MssmtProof, Error> {
    record.decode_with(|r| MssmtProof::decode(r))
}

impl AssetProof {
    pub fn encode(&self) -> Vec<u8> {
        let records = [
            AssetProofRecord::Version(self.version),
            AssetProofRecord::TapKey(&self.tap_key),
            AssetProofRecord::Proof(&self.proof),
        ];
        encode_stream(&records, &self.unknown_odd_types)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut stream = Stream::new(bytes);
        let mut mssmt_proof: Option<MssmtProof> = None;
        let mut version: Option<AssetVersion> = None;
        let mut tap_key: Option<[u8; 32]> = None;
        let mut unknown_odd_types = BTreeMap::new();

        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                ASSET_PROOF_VERSION_TYPE => {
                    version = Some(AssetVersion::from_u8(record.fixed::<1>()?[0]));
                }
                ASSET_PROOF_TAP_KEY_TYPE => tap_key = Some(record.fixed::<32>()?),
                ASSET_PROOF_MSSMT_PROOF_TYPE => mssmt_proof = Some(decode_record_proof(&record)?),
                _ => handle_unknown(record, &mut unknown_odd_types)?,
            }
        }
        Ok(AssetProof {
            proof: mssmt_proof.ok_or(Error::MissingTlvField("AssetProof.proof".to_string()))?,
            version: version.ok_or(Error::MissingTlvField("AssetProof.version".to_string()))?,
            tap_key: tap_key.ok_or(Error::MissingTlvField("AssetProof.tap_key".to_string()))?,
            unknown_odd_types,
        })
    }
}

impl TaprootAssetProof {
    pub fn encode(&self) -> Vec<u8> {
        let records = [
            TaprootAssetProofRecord::Version(self.version),
            TaprootAssetProofRecord::Proof(&self.proof),
        ];
        encode_stream(&records, &self.unknown_odd_types)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut stream = Stream::new(bytes);
        let mut mssmt_proof: Option<MssmtProof> = None;
        let mut version: Option<TapCommitmentVersion> = None;
        let mut unknown_odd_types = BTreeMap::new();

        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                TAPROOT_ASSET_PROOF_VERSION_TYPE => {
                    version = Some(TapCommitmentVersion::from_u8(record.fixed::<1>()?[0]));
                }
                TAPROOT_ASSET_PROOF_MSSMT_PROOF_TYPE => {
                    mssmt_proof = Some(decode_record_proof(&record)?)
                }
                _ => handle_unknown(record, &mut unknown_odd_types)?,
            }
        }
        Ok(TaprootAssetProof {
            proof: mssmt_proof.ok_or(Error::MissingTlvField(
                "TaprootAssetProof.proof".to_string(),
            ))?,
            version: version.ok_or(Error::MissingTlvField(
                "TaprootAssetProof.version".to_string(),
            ))?,
            unknown_odd_types,
        })
    }
}
