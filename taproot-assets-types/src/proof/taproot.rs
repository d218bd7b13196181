use alloc::collections::BTreeMap;
use alloc::string::ToString;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::asset::SerializedKey;
use crate::commitment::{AssetProof, Proof as CommitmentMerkleProof, TaprootAssetProof, TapscriptPreimage};
use crate::error::Error;
use crate::tlv::{encode_stream, handle_unknown, EncodeRecord, Stream, Type};

/// Represents a full commitment proof for an asset. It can either prove inclusion or exclusion of
/// an asset within a Taproot Asset commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentProof {
    /// The asset and Taproot Asset layers of the MS-SMT proof.
    pub proof: CommitmentMerkleProof,

    /// TapSiblingPreimage is an optional preimage of a tap node used to
    /// hash together with the Taproot Asset commitment leaf node to arrive
    /// at the tapscript root of the expected output.
    pub tap_sibling_preimage: Option<TapscriptPreimage>,

    /// UnknownOddTypes is a map of unknown odd types that were encountered
    /// during decoding.
    pub unknown_odd_types: BTreeMap<u64, Vec<u8>>,
}

const COMMITMENT_PROOF_ASSET_PROOF_TYPE: Type = Type(0);
const COMMITMENT_PROOF_TAPROOT_ASSET_PROOF_TYPE: Type = Type(2);
const COMMITMENT_PROOF_TAP_SIBLING_PREIMAGE_TYPE: Type = Type(5);

enum CommitmentProofRecord<'a> {
    AssetProof(&'a AssetProof),
    TaprootAssetProof(&'a TaprootAssetProof),
    TapSiblingPreimage(&'a TapscriptPreimage),
}

impl EncodeRecord for CommitmentProofRecord<'_> {
    fn tlv_type(&self) -> Type {
        match self {
            CommitmentProofRecord::AssetProof(_) => COMMITMENT_PROOF_ASSET_PROOF_TYPE,
            CommitmentProofRecord::TaprootAssetProof(_) => {
                COMMITMENT_PROOF_TAPROOT_ASSET_PROOF_TYPE
            }
            CommitmentProofRecord::TapSiblingPreimage(_) => {
                COMMITMENT_PROOF_TAP_SIBLING_PREIMAGE_TYPE
            }
        }
    }

    fn encode_value(&self, out: &mut Vec<u8>) {
        match self {
            CommitmentProofRecord::AssetProof(proof) => out.extend_from_slice(&proof.encode()),
            CommitmentProofRecord::TaprootAssetProof(proof) => {
                out.extend_from_slice(&proof.encode())
            }
            CommitmentProofRecord::TapSiblingPreimage(preimage) => preimage.encode(out),
        }
    }
}

impl CommitmentProof {
    pub fn encode(&self) -> Vec<u8> {
        let mut records = Vec::with_capacity(3);
        if let Some(asset_proof) = &self.proof.asset_proof {
            records.push(CommitmentProofRecord::AssetProof(asset_proof));
        }
        records.push(CommitmentProofRecord::TaprootAssetProof(
            &self.proof.taproot_asset_proof,
        ));
        if let Some(preimage) = &self.tap_sibling_preimage {
            records.push(CommitmentProofRecord::TapSiblingPreimage(preimage));
        }
        encode_stream(&records, &self.unknown_odd_types)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut stream = Stream::new(bytes);
        let mut asset_proof: Option<AssetProof> = None;
        let mut taproot_asset_proof: Option<TaprootAssetProof> = None;
        let mut tap_sibling_preimage: Option<TapscriptPreimage> = None;
        let mut unknown_odd_types = BTreeMap::new();

        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                COMMITMENT_PROOF_ASSET_PROOF_TYPE => {
                    asset_proof = Some(AssetProof::decode(record.value())?);
                }
                COMMITMENT_PROOF_TAPROOT_ASSET_PROOF_TYPE => {
                    taproot_asset_proof = Some(TaprootAssetProof::decode(record.value())?);
                }
                COMMITMENT_PROOF_TAP_SIBLING_PREIMAGE_TYPE => {
                    tap_sibling_preimage = Some(TapscriptPreimage::decode(record.value())?);
                }
                _ => handle_unknown(record, &mut unknown_odd_types)?,
            }
        }

        Ok(CommitmentProof {
            proof: CommitmentMerkleProof {
                asset_proof,
                taproot_asset_proof: taproot_asset_proof.ok_or(Error::MissingTlvField(
                    "CommitmentProof.taproot_asset_proof".to_string(),
                ))?,
            },
            tap_sibling_preimage,
            unknown_odd_types,
        })
    }
}

/// TapscriptProof represents a proof of a Taproot output not including a
/// Taproot Asset commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapscriptProof {
    /// TapPreimage1 is the preimage for a TapNode at depth 0 or 1.
    pub tap_preimage1: Option<TapscriptPreimage>,

    /// TapPreimage2, if specified, is the pair preimage for TapPreimage1 at
    /// depth 1.
    pub tap_preimage2: Option<TapscriptPreimage>,

    /// Bip86 indicates this is a normal BIP-0086 wallet output.
    pub bip86: bool,

    /// UnknownOddTypes is a map of unknown odd types encountered during decoding.
    pub unknown_odd_types: BTreeMap<u64, Vec<u8>>,
}

const TAPSCRIPT_PROOF_TAP_PREIMAGE1_TYPE: Type = Type(1);
const TAPSCRIPT_PROOF_TAP_PREIMAGE2_TYPE: Type = Type(3);
const TAPSCRIPT_PROOF_BIP86_TYPE: Type = Type(4);

enum TapscriptProofRecord<'a> {
    Preimage1(&'a TapscriptPreimage),
    Preimage2(&'a TapscriptPreimage),
    Bip86(bool),
}

impl EncodeRecord for TapscriptProofRecord<'_> {
    fn tlv_type(&self) -> Type {
        match self {
            TapscriptProofRecord::Preimage1(_) => TAPSCRIPT_PROOF_TAP_PREIMAGE1_TYPE,
            TapscriptProofRecord::Preimage2(_) => TAPSCRIPT_PROOF_TAP_PREIMAGE2_TYPE,
            TapscriptProofRecord::Bip86(_) => TAPSCRIPT_PROOF_BIP86_TYPE,
        }
    }

    fn encode_value(&self, out: &mut Vec<u8>) {
        match self {
            TapscriptProofRecord::Preimage1(preimage)
            | TapscriptProofRecord::Preimage2(preimage) => preimage.encode(out),
            TapscriptProofRecord::Bip86(bip86) => out.push(*bip86 as u8),
        }
    }
}

impl TapscriptProof {
    pub fn encode(&self) -> Vec<u8> {
        let mut records = Vec::with_capacity(3);
        if let Some(preimage) = &self.tap_preimage1 {
            records.push(TapscriptProofRecord::Preimage1(preimage));
        }
        if let Some(preimage) = &self.tap_preimage2 {
            records.push(TapscriptProofRecord::Preimage2(preimage));
        }
        records.push(TapscriptProofRecord::Bip86(self.bip86));
        encode_stream(&records, &self.unknown_odd_types)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut stream = Stream::new(bytes);
        let mut tap_preimage1: Option<TapscriptPreimage> = None;
        let mut tap_preimage2: Option<TapscriptPreimage> = None;
        let mut bip86: Option<bool> = None;
        let mut unknown_odd_types = BTreeMap::new();

        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                TAPSCRIPT_PROOF_TAP_PREIMAGE1_TYPE if !record.value().is_empty() => {
                    tap_preimage1 = Some(TapscriptPreimage::decode(record.value())?);
                }
                TAPSCRIPT_PROOF_TAP_PREIMAGE2_TYPE if !record.value().is_empty() => {
                    tap_preimage2 = Some(TapscriptPreimage::decode(record.value())?);
                }
                TAPSCRIPT_PROOF_TAP_PREIMAGE1_TYPE | TAPSCRIPT_PROOF_TAP_PREIMAGE2_TYPE => {}
                TAPSCRIPT_PROOF_BIP86_TYPE => bip86 = Some(record.fixed::<1>()?[0] == 1),
                _ => handle_unknown(record, &mut unknown_odd_types)?,
            }
        }

        Ok(TapscriptProof {
            tap_preimage1,
            tap_preimage2,
            bip86: bip86.ok_or(Error::MissingTlvField("TapscriptProof.bip86".to_string()))?,
            unknown_odd_types,
        })
    }
}

/// TaprootProof represents a proof that reveals the partial contents to a
/// tapscript tree within a taproot output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaprootProof {
    /// OutputIndex is the index of the output for which the proof applies.
    pub output_index: u32,

    /// InternalKey is the internal key of the taproot output at OutputIndex.
    pub internal_key: SerializedKey,

    /// CommitmentProof represents a commitment proof for an asset.
    pub commitment_proof: Option<CommitmentProof>,

    /// TapscriptProof represents a proof that a taproot output is not committing
    /// to a Taproot Asset commitment.
    pub tapscript_proof: Option<TapscriptProof>,

    /// UnknownOddTypes is a map of unknown odd types encountered during decoding.
    pub unknown_odd_types: BTreeMap<u64, Vec<u8>>,
}

const TAPROOT_PROOF_OUTPUT_INDEX_TYPE: Type = Type(0);
const TAPROOT_PROOF_INTERNAL_KEY_TYPE: Type = Type(2);
const TAPROOT_PROOF_COMMITMENT_PROOF_TYPE: Type = Type(3);
const TAPROOT_PROOF_TAPSCRIPT_PROOF_TYPE: Type = Type(5);

enum TaprootProofRecord<'a> {
    OutputIndex(u32),
    InternalKey(&'a SerializedKey),
    CommitmentProof(&'a CommitmentProof),
    TapscriptProof(&'a TapscriptProof),
}

impl EncodeRecord for TaprootProofRecord<'_> {
    fn tlv_type(&self) -> Type {
        match self {
            TaprootProofRecord::OutputIndex(_) => TAPROOT_PROOF_OUTPUT_INDEX_TYPE,
            TaprootProofRecord::InternalKey(_) => TAPROOT_PROOF_INTERNAL_KEY_TYPE,
            TaprootProofRecord::CommitmentProof(_) => TAPROOT_PROOF_COMMITMENT_PROOF_TYPE,
            TaprootProofRecord::TapscriptProof(_) => TAPROOT_PROOF_TAPSCRIPT_PROOF_TYPE,
        }
    }

    fn encode_value(&self, out: &mut Vec<u8>) {
        match self {
            TaprootProofRecord::OutputIndex(index) => out.extend_from_slice(&index.to_be_bytes()),
            TaprootProofRecord::InternalKey(key) => out.extend_from_slice(&key.bytes),
            TaprootProofRecord::CommitmentProof(proof) => out.extend_from_slice(&proof.encode()),
            TaprootProofRecord::TapscriptProof(proof) => out.extend_from_slice(&proof.encode()),
        }
    }
}

impl TaprootProof {
    pub fn encode(&self) -> Vec<u8> {
        let mut records = Vec::with_capacity(4);
        records.push(TaprootProofRecord::OutputIndex(self.output_index));
        records.push(TaprootProofRecord::InternalKey(&self.internal_key));
        if let Some(proof) = &self.commitment_proof {
            records.push(TaprootProofRecord::CommitmentProof(proof));
        }
        if let Some(proof) = &self.tapscript_proof {
            records.push(TaprootProofRecord::TapscriptProof(proof));
        }
        encode_stream(&records, &self.unknown_odd_types)
    }

    /// Decodes a TaprootProof from a TLV byte slice.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut stream = Stream::new(bytes);
        let mut output_index: Option<u32> = None;
        let mut internal_key: Option<SerializedKey> = None;
        let mut commitment_proof: Option<CommitmentProof> = None;
        let mut tapscript_proof: Option<TapscriptProof> = None;
        let mut unknown_odd_types = BTreeMap::new();

        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                TAPROOT_PROOF_OUTPUT_INDEX_TYPE => {
                    output_index = Some(u32::from_be_bytes(record.fixed::<4>()?));
                }
                TAPROOT_PROOF_INTERNAL_KEY_TYPE => {
                    internal_key = Some(SerializedKey::from_slice(record.value()).map_err(
                        |e| {
                            Error::InvalidTlvValue(
                                TAPROOT_PROOF_INTERNAL_KEY_TYPE.0,
                                e.to_string(),
                            )
                        },
                    )?);
                }
                TAPROOT_PROOF_COMMITMENT_PROOF_TYPE => {
                    commitment_proof = Some(CommitmentProof::decode(record.value())?);
                }
                TAPROOT_PROOF_TAPSCRIPT_PROOF_TYPE => {
                    tapscript_proof = Some(TapscriptProof::decode(record.value())?);
                }
                _ => handle_unknown(record, &mut unknown_odd_types)?,
            }
        }

        Ok(TaprootProof {
            output_index: output_index.ok_or(Error::MissingTlvField(
                "TaprootProof.output_index".to_string(),
            ))?,
            internal_key: internal_key.ok_or(Error::MissingTlvField(
                "TaprootProof.internal_key".to_string(),
            ))?,
            commitment_proof,
            tapscript_proof,
            unknown_odd_types,
        })
    }
}
