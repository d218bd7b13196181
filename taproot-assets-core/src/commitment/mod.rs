//! Asset commitments, Taproot Asset commitments and split commitments.
//!
//! An [`AssetCommitment`] is an MS-SMT over every asset sharing one asset ID
//! (or group key) in an output. A [`TapCommitment`] is an MS-SMT over all
//! asset commitments of the output; its root ends up in a tapscript leaf of
//! the anchoring taproot output. [`SplitCommitment`] partitions one input's
//! value across several outputs.

use taproot_assets_types::asset::AssetVersion;
use taproot_assets_types::commitment::TapCommitmentVersion;
use thiserror::Error;

use crate::mssmt;

pub(crate) mod asset_commitment;
mod proof;
mod split;
mod tap_commitment;
mod tapscript;

pub use asset_commitment::{asset_commitment_leaf, asset_commitment_root, AssetCommitment};
pub use proof::{
    derive_by_asset_commitment_exclusion, derive_by_asset_exclusion, derive_by_asset_inclusion,
};
pub use split::{
    verify_split_asset, SplitAsset, SplitCommitment, SplitCommitmentInput, SplitLocator,
};
pub use tap_commitment::TapCommitment;
pub use tapscript::{
    is_taproot_asset_commitment_script, tapscript_preimage_hash, TapCommitmentRoot,
    MAX_TAPLEAF_SCRIPT_SIZE, TAPROOT_ASSETS_MARKER_TAG, TAPROOT_ASSETS_V2_TAG,
};

/// Errors returned while building or mutating commitments.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("no assets provided")]
    NoAssets,
    #[error("asset genesis mismatch")]
    AssetGenesisMismatch,
    #[error("asset group key mismatch")]
    AssetGroupKeyMismatch,
    #[error("asset type mismatch")]
    AssetTypeMismatch,
    #[error("asset commitment: duplicate script key")]
    AssetDuplicateScriptKey,
    #[error("invalid amount {amount} for asset type")]
    InvalidAssetAmount { amount: u64 },
    #[error("asset commitment tap key mismatch")]
    TapKeyMismatch,
    #[error("invalid tap commitment version {0}")]
    InvalidTapCommitmentVersion(u8),
    #[error("unknown asset version {0}")]
    UnknownAssetVersion(u8),
    #[error("commitment version mismatch: {a}, {b}")]
    VersionMismatch {
        a: TapCommitmentVersion,
        b: TapCommitmentVersion,
    },
    #[error("missing asset proof")]
    MissingAssetProof,
    #[error("asset proof present in an asset commitment exclusion proof")]
    UnexpectedAssetProof,
    #[error("no split inputs provided")]
    NoSplitInputs,
    #[error("split inputs commit to different assets")]
    SplitInputMismatch,
    #[error("invalid number of split locators")]
    InvalidSplitLocatorCount,
    #[error("at least one locator should be specified")]
    InvalidSplitLocator,
    #[error("duplicate split locator")]
    DuplicateSplitLocator,
    #[error("invalid script key")]
    InvalidScriptKey,
    #[error("un-spendable root locator with non-zero amount")]
    NonZeroSplitAmount,
    #[error("zero split amount")]
    ZeroSplitAmount,
    #[error("invalid split amount")]
    InvalidSplitAmount,
    #[error("asset has no split commitment")]
    MissingSplitCommitment,
    #[error("empty tapscript preimage")]
    EmptyTapscriptPreimage,
    #[error("invalid tap leaf version {0:#04x}")]
    InvalidTapLeafVersion(u8),
    #[error("invalid tap leaf script length {0}")]
    InvalidTapLeafScriptLength(usize),
    #[error("tapscript preimage is a taproot asset commitment")]
    TapscriptPreimageIsTapCommitment,
    #[error(transparent)]
    Mssmt(#[from] mssmt::Error),
}

/// Parses a raw commitment version, naming the unknown value on failure.
pub fn tap_commitment_version(raw: u8) -> Result<TapCommitmentVersion, Error> {
    known_tap_commitment_version(TapCommitmentVersion::from_u8(raw))
}

/// Passes `version` through if it can be committed to.
pub fn known_tap_commitment_version(
    version: TapCommitmentVersion,
) -> Result<TapCommitmentVersion, Error> {
    if version.is_known() {
        Ok(version)
    } else {
        Err(Error::InvalidTapCommitmentVersion(version.as_u8()))
    }
}

/// Passes `version` through if assets of it can be committed to.
pub fn known_asset_version(version: AssetVersion) -> Result<AssetVersion, Error> {
    if version.is_known() {
        Ok(version)
    } else {
        Err(Error::UnknownAssetVersion(version.as_u8()))
    }
}

/// Returns true if the two versions produce the same kind of tap leaf.
pub fn is_similar_tap_commitment_version(
    left: TapCommitmentVersion,
    right: TapCommitmentVersion,
) -> bool {
    (left == TapCommitmentVersion::V2) == (right == TapCommitmentVersion::V2)
}
