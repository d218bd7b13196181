use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;
use core::iter;

use bitcoin::hashes::{sha256::Hash as Sha256Hash, Hash, HashEngine};
use bitcoin::{OutPoint, Witness};
use taproot_assets_types::asset::{
    Asset, AssetID, AssetType, PrevId, PrevWitness, SerializedKey,
    SplitCommitment as WitnessSplitCommitment, NUMS_KEY,
};

use super::Error;
use crate::mssmt::{verify_merkle_proof, CompactedTree, Tree};

/// Where one slice of a split ends up: the output, the asset, the new owner
/// and the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SplitLocator {
    pub output_index: u32,
    pub asset_id: AssetID,
    pub script_key: SerializedKey,
    pub amount: u64,
}

impl SplitLocator {
    /// Key of this locator in the split tree.
    pub fn hash(&self) -> [u8; 32] {
        let mut engine = Sha256Hash::engine();
        engine.input(&self.output_index.to_be_bytes());
        engine.input(self.asset_id.as_byte_array());
        engine.input(&self.script_key.x_only());
        Sha256Hash::from_engine(engine).to_byte_array()
    }

    /// The locator an existing split output asset was created for.
    pub fn for_asset(output_index: u32, asset: &Asset) -> Self {
        SplitLocator {
            output_index,
            asset_id: asset.id(),
            script_key: asset.script_key,
            amount: asset.amount,
        }
    }
}

/// An asset being spent into a split, with the outpoint anchoring it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitCommitmentInput {
    pub asset: Asset,
    pub out_point: OutPoint,
}

/// One output asset of a split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAsset {
    pub asset: Asset,
    pub output_index: u32,
}

/// The result of splitting one or more inputs of the same asset across
/// several outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitCommitment {
    /// The spent inputs keyed by their previous asset ID.
    pub prev_assets: BTreeMap<PrevId, Asset>,
    /// The asset carrying the split tree root and the real input witnesses.
    pub root_asset: Asset,
    /// Every output asset, the root locator's included.
    pub split_assets: BTreeMap<SplitLocator, SplitAsset>,
}

impl SplitCommitment {
    /// Splits `inputs` into the asset at `root` and one asset per
    /// `external` locator.
    pub fn new(
        inputs: &[SplitCommitmentInput],
        root: &SplitLocator,
        external: &[SplitLocator],
    ) -> Result<Self, Error> {
        let template = &inputs.first().ok_or(Error::NoSplitInputs)?.asset;
        let mut prev_assets = BTreeMap::new();
        let mut total: u64 = 0;
        for input in inputs {
            if input.asset.tap_commitment_key() != template.tap_commitment_key()
                || input.asset.asset_type() != template.asset_type()
            {
                return Err(Error::SplitInputMismatch);
            }
            let prev_id = PrevId::for_asset(input.out_point, &input.asset);
            if prev_assets.insert(prev_id, input.asset.clone()).is_some() {
                return Err(Error::SplitInputMismatch);
            }
            total = total
                .checked_add(input.asset.amount)
                .ok_or(Error::InvalidSplitAmount)?;
        }

        validate_locators(template.asset_type(), total, root, external)?;

        let mut tree = CompactedTree::new();
        let mut split_assets = BTreeMap::new();
        for locator in iter::once(root).chain(external) {
            let key = locator.hash();
            if !tree.get(&key).is_empty() {
                return Err(Error::DuplicateSplitLocator);
            }
            let mut asset = template.clone();
            asset.amount = locator.amount;
            asset.script_key = locator.script_key;
            asset.prev_witnesses = vec![PrevWitness::genesis()];
            asset.split_commitment_root = None;

            tree.insert(key, asset.leaf())?;
            split_assets.insert(
                *locator,
                SplitAsset {
                    asset,
                    output_index: locator.output_index,
                },
            );
        }

        let mut root_asset = template.clone();
        root_asset.amount = root.amount;
        root_asset.script_key = root.script_key;
        root_asset.prev_witnesses = inputs
            .iter()
            .map(|input| PrevWitness {
                prev_id: Some(PrevId::for_asset(input.out_point, &input.asset)),
                tx_witness: Witness::new(),
                split_commitment: None,
            })
            .collect::<Vec<_>>();
        root_asset.split_commitment_root = Some(tree.root());

        for (locator, split) in split_assets.iter_mut() {
            split.asset.prev_witnesses[0].split_commitment = Some(WitnessSplitCommitment {
                proof: tree.merkle_proof(&locator.hash()),
                root_asset: Box::new(root_asset.clone()),
            });
        }

        Ok(SplitCommitment {
            prev_assets,
            root_asset,
            split_assets,
        })
    }
}

fn validate_locators(
    asset_type: AssetType,
    total: u64,
    root: &SplitLocator,
    external: &[SplitLocator],
) -> Result<(), Error> {
    if asset_type == AssetType::Collectible && external.len() > 1 {
        return Err(Error::InvalidSplitLocatorCount);
    }
    if external.is_empty() && root.amount != total {
        return Err(Error::InvalidSplitLocator);
    }
    if root.amount == 0 && root.script_key != NUMS_KEY {
        return Err(Error::InvalidScriptKey);
    }
    if root.amount > 0 && root.script_key == NUMS_KEY {
        return Err(Error::NonZeroSplitAmount);
    }
    if external.iter().any(|locator| locator.amount == 0) {
        return Err(Error::ZeroSplitAmount);
    }

    let remainder = iter::once(root)
        .chain(external)
        .try_fold(total, |left, locator| left.checked_sub(locator.amount))
        .ok_or(Error::InvalidSplitAmount)?;
    if remainder != 0 {
        return Err(Error::InvalidSplitAmount);
    }
    Ok(())
}

/// Checks that a split output asset stored at `output_index` is committed to
/// by the split root of its embedded root asset.
pub fn verify_split_asset(asset: &Asset, output_index: u32) -> Result<(), Error> {
    let split = asset
        .prev_witnesses
        .first()
        .and_then(|witness| witness.split_commitment.as_ref())
        .ok_or(Error::MissingSplitCommitment)?;
    let root = split
        .root_asset
        .split_commitment_root
        .ok_or(Error::MissingSplitCommitment)?;

    let locator = SplitLocator::for_asset(output_index, asset);
    verify_merkle_proof(
        &locator.hash(),
        &asset.without_split_commitment().leaf(),
        &split.proof,
        &root,
    )?;
    Ok(())
}
