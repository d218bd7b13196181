//! Rebuilding tap commitment roots from commitment proofs alone.

use taproot_assets_types::asset::Asset;
use taproot_assets_types::commitment::{AssetProof, Proof};
use taproot_assets_types::mssmt::LeafNode;

use super::{
    asset_commitment_leaf, asset_commitment_root, known_asset_version,
    known_tap_commitment_version, Error, TapCommitmentRoot,
};
use crate::mssmt::root_from_proof;

/// Walks the asset layer of `proof` from `leaf` at `asset_key`, then the tap
/// layer from the resulting asset commitment.
fn derive_through_asset_commitment(
    proof: &Proof,
    asset_proof: &AssetProof,
    asset_key: &[u8; 32],
    leaf: &LeafNode,
) -> Result<TapCommitmentRoot, Error> {
    let tap_version = known_tap_commitment_version(proof.taproot_asset_proof.version)?;
    let asset_version = known_asset_version(asset_proof.version)?;
    let tree_root = root_from_proof(asset_key, leaf, &asset_proof.proof)?;
    let commitment_root = asset_commitment_root(
        &asset_proof.tap_key,
        &tree_root.left,
        &tree_root.right,
        tree_root.node.sum,
    );
    let commitment_leaf = asset_commitment_leaf(asset_version, &commitment_root);

    let tap_proof = &proof.taproot_asset_proof;
    let tap_root = root_from_proof(&asset_proof.tap_key, &commitment_leaf, &tap_proof.proof)?;
    Ok(TapCommitmentRoot {
        version: tap_version,
        root: tap_root.node,
    })
}

/// The tap commitment root implied by `asset` being included as proven.
pub fn derive_by_asset_inclusion(
    proof: &Proof,
    asset: &Asset,
) -> Result<TapCommitmentRoot, Error> {
    let asset_proof = proof.asset_proof.as_ref().ok_or(Error::MissingAssetProof)?;
    known_asset_version(asset.version)?;
    derive_through_asset_commitment(
        proof,
        asset_proof,
        &asset.asset_commitment_key(),
        &asset.leaf(),
    )
}

/// The tap commitment root implied by no asset existing at `asset_key`
/// inside an asset commitment that is itself present.
pub fn derive_by_asset_exclusion(
    proof: &Proof,
    asset_key: &[u8; 32],
) -> Result<TapCommitmentRoot, Error> {
    let asset_proof = proof.asset_proof.as_ref().ok_or(Error::MissingAssetProof)?;
    derive_through_asset_commitment(proof, asset_proof, asset_key, &LeafNode::empty())
}

/// The tap commitment root implied by no asset commitment existing at
/// `tap_key`.
pub fn derive_by_asset_commitment_exclusion(
    proof: &Proof,
    tap_key: &[u8; 32],
) -> Result<TapCommitmentRoot, Error> {
    if proof.asset_proof.is_some() {
        return Err(Error::UnexpectedAssetProof);
    }
    let tap_proof = &proof.taproot_asset_proof;
    let version = known_tap_commitment_version(tap_proof.version)?;
    let tap_root = root_from_proof(tap_key, &LeafNode::empty(), &tap_proof.proof)?;
    Ok(TapCommitmentRoot {
        version,
        root: tap_root.node,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::asset_commitment::tests::{asset, genesis};
    use crate::commitment::TapCommitment;
    use taproot_assets_types::asset::AssetType;

    #[test]
    fn derivations_require_the_matching_proof_shape() {
        let g1 = genesis("g1", AssetType::Normal);
        let g2 = genesis("g2", AssetType::Normal);
        let minted = asset(&g1, 10, 1);
        let foreign = asset(&g2, 10, 1);
        let tap = TapCommitment::from_assets(None, &[minted.clone()]).unwrap();

        let (_, inclusion) = tap.proof(&minted.tap_commitment_key(), &minted.asset_commitment_key());
        assert_eq!(
            derive_by_asset_commitment_exclusion(&inclusion, &minted.tap_commitment_key()),
            Err(Error::UnexpectedAssetProof)
        );

        let (_, exclusion) =
            tap.proof(&foreign.tap_commitment_key(), &foreign.asset_commitment_key());
        assert_eq!(
            derive_by_asset_inclusion(&exclusion, &foreign),
            Err(Error::MissingAssetProof)
        );
        assert_eq!(
            derive_by_asset_exclusion(&exclusion, &foreign.asset_commitment_key()),
            Err(Error::MissingAssetProof)
        );
    }

    #[test]
    fn claiming_a_different_asset_changes_the_root() {
        let g1 = genesis("g1", AssetType::Normal);
        let minted = asset(&g1, 10, 1);
        let tap = TapCommitment::from_assets(None, &[minted.clone()]).unwrap();
        let (_, proof) = tap.proof(&minted.tap_commitment_key(), &minted.asset_commitment_key());

        let mut inflated = minted.clone();
        inflated.amount = 11;
        let derived = derive_by_asset_inclusion(&proof, &inflated).unwrap();
        assert_ne!(derived.root, tap.root());

        let excluded = derive_by_asset_exclusion(&proof, &minted.asset_commitment_key()).unwrap();
        assert_ne!(excluded.root, tap.root());
    }
}
