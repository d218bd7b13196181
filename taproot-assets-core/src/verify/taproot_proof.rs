//! Taproot proof verification helpers.
//!
//! A [`TaprootProof`] reveals just enough of an output's tapscript tree to
//! recompute its output key: either a Taproot Asset commitment proof plus an
//! optional sibling, or a tapscript proof for outputs that carry no
//! commitment at all.

use alloc::collections::BTreeMap;

use bitcoin::Transaction;
use bitcoin::hashes::Hash as _;
use bitcoin::taproot::TapNodeHash;
use taproot_assets_types::asset::{Asset, SerializedKey};
use taproot_assets_types::commitment::TapscriptPreimage;
use taproot_assets_types::proof::{CommitmentProof, TaprootProof, TapscriptProof};

use crate::commitment::{self, TapCommitmentRoot, tapscript_preimage_hash};
use crate::verify::tx;
use crate::{OpsError, TaprootOps};

/// Output keys a proof can stand for, each with the commitment root that
/// produced it.
pub type ProofCommitmentKeys = BTreeMap<SerializedKey, TapCommitmentRoot>;

/// Errors returned by taproot proof verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The anchor output could not be read as a taproot output.
    Anchor(tx::Error),
    /// Taproot proof does not include a supported method.
    MissingTaprootProofMethod,
    /// Taproot proof carries both a commitment and a tapscript proof.
    AmbiguousTaprootProof,
    /// Taproot proof is missing a commitment proof.
    MissingCommitmentProof,
    /// The asset proof was made for a different asset commitment.
    TapKeyMismatch,
    /// Taproot proof is invalid for tapscript verification.
    InvalidTapscriptProof,
    /// Taproot proof derived key does not match the anchor output.
    InvalidTaprootProof,
    /// Commitment root derivation failed.
    Commitment(commitment::Error),
    /// Taproot operation failed.
    Ops(OpsError),
}

impl From<tx::Error> for Error {
    fn from(err: tx::Error) -> Self {
        Self::Anchor(err)
    }
}

impl From<commitment::Error> for Error {
    fn from(err: commitment::Error) -> Self {
        Self::Commitment(err)
    }
}

impl From<OpsError> for Error {
    fn from(err: OpsError) -> Self {
        Self::Ops(err)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Anchor(err) => core::fmt::Display::fmt(err, f),
            Error::MissingTaprootProofMethod => write!(f, "taproot proof has no proof method"),
            Error::AmbiguousTaprootProof => {
                write!(f, "taproot proof has both commitment and tapscript proofs")
            }
            Error::MissingCommitmentProof => write!(f, "missing commitment proof"),
            Error::TapKeyMismatch => write!(f, "asset proof tap key mismatch"),
            Error::InvalidTapscriptProof => write!(f, "invalid tapscript proof"),
            Error::InvalidTaprootProof => write!(f, "invalid taproot proof"),
            Error::Commitment(err) => core::fmt::Display::fmt(err, f),
            Error::Ops(err) => core::fmt::Display::fmt(err, f),
        }
    }
}

/// Checks `proof` against the output it names in `anchor_tx`.
///
/// Inclusion proofs must show `asset` inside the output's commitment;
/// exclusion proofs must show it absent, or the output to carry no
/// commitment. Returns the matched commitment root, if any.
pub fn verify_taproot_proof<O: TaprootOps>(
    ops: &O,
    anchor_tx: &Transaction,
    proof: &TaprootProof,
    asset: &Asset,
    inclusion: bool,
) -> Result<Option<TapCommitmentRoot>, Error> {
    let expected = tx::extract_taproot_key(anchor_tx, proof.output_index)?.serialize();

    let derived = match (&proof.commitment_proof, &proof.tapscript_proof) {
        (Some(_), Some(_)) => return Err(Error::AmbiguousTaprootProof),
        (None, None) => return Err(Error::MissingTaprootProofMethod),
        (None, Some(tapscript_proof)) if !inclusion => {
            let key = derive_by_tapscript_proof(ops, &proof.internal_key, tapscript_proof)?;
            return if key.x_only() == expected {
                Ok(None)
            } else {
                Err(Error::InvalidTaprootProof)
            };
        }
        (None, Some(_)) => return Err(Error::MissingCommitmentProof),
        (Some(commitment_proof), None) if inclusion => {
            derive_by_asset_inclusion(ops, &proof.internal_key, commitment_proof, asset)?
        }
        (Some(commitment_proof), None) => {
            derive_by_asset_exclusion(ops, &proof.internal_key, commitment_proof, asset)?
        }
    };

    derived
        .into_iter()
        .find(|(key, _)| key.x_only() == expected)
        .map(|(_, root)| Some(root))
        .ok_or(Error::InvalidTaprootProof)
}

/// Output keys implied by `asset` being committed to as `proof` claims.
pub fn derive_by_asset_inclusion<O: TaprootOps>(
    ops: &O,
    internal_key: &SerializedKey,
    proof: &CommitmentProof,
    asset: &Asset,
) -> Result<ProofCommitmentKeys, Error> {
    check_tap_key(proof, asset)?;

    // Split outputs are committed to without their split witness.
    let asset = asset.without_split_commitment();
    let root = commitment::derive_by_asset_inclusion(&proof.proof, &asset)?;
    derive_commitment_keys(ops, &root, internal_key, proof.tap_sibling_preimage.as_ref())
}

/// Output keys implied by `asset` being absent from the output.
pub fn derive_by_asset_exclusion<O: TaprootOps>(
    ops: &O,
    internal_key: &SerializedKey,
    proof: &CommitmentProof,
    asset: &Asset,
) -> Result<ProofCommitmentKeys, Error> {
    let root = match &proof.proof.asset_proof {
        Some(_) => {
            check_tap_key(proof, asset)?;
            commitment::derive_by_asset_exclusion(&proof.proof, &asset.asset_commitment_key())?
        }
        None => commitment::derive_by_asset_commitment_exclusion(
            &proof.proof,
            &asset.tap_commitment_key(),
        )?,
    };
    derive_commitment_keys(ops, &root, internal_key, proof.tap_sibling_preimage.as_ref())
}

fn check_tap_key(proof: &CommitmentProof, asset: &Asset) -> Result<(), Error> {
    let asset_proof = proof
        .proof
        .asset_proof
        .as_ref()
        .ok_or(Error::Commitment(commitment::Error::MissingAssetProof))?;
    if asset_proof.tap_key != asset.tap_commitment_key() {
        return Err(Error::TapKeyMismatch);
    }
    Ok(())
}

/// Output keys for `root` and, where one exists, its downgraded form.
fn derive_commitment_keys<O: TaprootOps>(
    ops: &O,
    root: &TapCommitmentRoot,
    internal_key: &SerializedKey,
    sibling: Option<&TapscriptPreimage>,
) -> Result<ProofCommitmentKeys, Error> {
    let mut keys = ProofCommitmentKeys::new();
    for candidate in core::iter::once(*root).chain(root.downgrade()) {
        let key = derive_taproot_key_from_commitment(ops, &candidate, internal_key, sibling)?;
        keys.insert(key, candidate);
    }
    Ok(keys)
}

fn derive_taproot_key_from_commitment<O: TaprootOps>(
    ops: &O,
    root: &TapCommitmentRoot,
    internal_key: &SerializedKey,
    sibling: Option<&TapscriptPreimage>,
) -> Result<SerializedKey, Error> {
    let internal_pubkey = ops.parse_internal_key(internal_key)?;
    let tapscript_root = root.tapscript_root(sibling)?;
    Ok(ops.taproot_output_key(&internal_pubkey, Some(tapscript_root.to_byte_array()))?)
}

/// Output key of a taproot output proven to hold no Taproot Asset
/// commitment.
pub fn derive_by_tapscript_proof<O: TaprootOps>(
    ops: &O,
    internal_key: &SerializedKey,
    proof: &TapscriptProof,
) -> Result<SerializedKey, Error> {
    use TapscriptPreimage::{Branch, Leaf};

    let tapscript_root = match (&proof.tap_preimage1, &proof.tap_preimage2, proof.bip86) {
        (Some(left @ Leaf { .. }), Some(right @ Leaf { .. }), false)
        | (Some(left @ Branch { .. }), Some(right @ Branch { .. }), false)
        | (Some(left @ Leaf { .. }), Some(right @ Branch { .. }), false) => {
            let left = tapscript_preimage_hash(left)?;
            let right = tapscript_preimage_hash(right)?;
            Some(TapNodeHash::from_node_hashes(left, right).to_byte_array())
        }
        (Some(leaf @ Leaf { .. }), None, false) => {
            Some(tapscript_preimage_hash(leaf)?.to_byte_array())
        }
        (None, None, true) => None,
        _ => return Err(Error::InvalidTapscriptProof),
    };

    let internal_pubkey = ops.parse_internal_key(internal_key)?;
    Ok(ops.taproot_output_key(&internal_pubkey, tapscript_root)?)
}
