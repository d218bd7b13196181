use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use bitcoin::taproot::TapNodeHash;
use taproot_assets_types::asset::{Asset, AssetVersion};
use taproot_assets_types::commitment::{
    AssetProof, Proof as CommitmentProof, TapCommitmentVersion, TaprootAssetProof,
    TapscriptPreimage,
};
use taproot_assets_types::mssmt::MssmtNode;

use super::{AssetCommitment, Error, TapCommitmentRoot, known_tap_commitment_version};
use crate::mssmt::{CompactedTree, Tree};

/// The outer MS-SMT of an output, mapping tap commitment keys to asset
/// commitments. Its root is what the anchoring tapscript leaf commits to.
///
/// A V2 version requested at construction is kept for the lifetime of the
/// commitment. Otherwise the version follows the contents: V1 as soon as any
/// asset commitment holds a V1 asset, V0 when none does.
#[derive(Debug, Clone)]
pub struct TapCommitment {
    version: TapCommitmentVersion,
    pinned: bool,
    tree: CompactedTree,
    commitments: BTreeMap<[u8; 32], AssetCommitment>,
}

impl TapCommitment {
    /// Builds a tap commitment over `commitments`. Commitments sharing a tap
    /// key are merged.
    pub fn new(
        version: Option<TapCommitmentVersion>,
        commitments: &[AssetCommitment],
    ) -> Result<Self, Error> {
        if let Some(version) = version {
            known_tap_commitment_version(version)?;
        }
        let mut merged: BTreeMap<[u8; 32], AssetCommitment> = BTreeMap::new();
        for commitment in commitments {
            match merged.get_mut(&commitment.tap_key()) {
                Some(existing) => existing.merge(commitment)?,
                None => {
                    merged.insert(commitment.tap_key(), commitment.clone());
                }
            }
        }

        let pinned = version == Some(TapCommitmentVersion::V2);
        let mut tap_commitment = TapCommitment {
            version: TapCommitmentVersion::V0,
            pinned,
            tree: CompactedTree::new(),
            commitments: BTreeMap::new(),
        };
        for commitment in merged.values() {
            tap_commitment.upsert(commitment)?;
        }
        tap_commitment.refresh_version();
        Ok(tap_commitment)
    }

    /// Groups `assets` into asset commitments and commits to all of them.
    pub fn from_assets(
        version: Option<TapCommitmentVersion>,
        assets: &[Asset],
    ) -> Result<Self, Error> {
        let mut grouped: BTreeMap<[u8; 32], Vec<Asset>> = BTreeMap::new();
        for asset in assets {
            grouped
                .entry(asset.tap_commitment_key())
                .or_default()
                .push(asset.clone());
        }
        let commitments = grouped
            .values()
            .map(|assets| AssetCommitment::new(assets))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(version, &commitments)
    }

    fn refresh_version(&mut self) {
        self.version = if self.pinned {
            TapCommitmentVersion::V2
        } else if self
            .commitments
            .values()
            .any(|commitment| commitment.version() == AssetVersion::V1)
        {
            TapCommitmentVersion::V1
        } else {
            TapCommitmentVersion::V0
        };
    }

    /// Inserts or replaces the asset commitment under its tap key. An empty
    /// asset commitment removes the tap key instead.
    pub fn upsert(&mut self, commitment: &AssetCommitment) -> Result<(), Error> {
        let key = commitment.tap_key();
        if commitment.is_empty() {
            self.tree.delete(&key)?;
            self.commitments.remove(&key);
        } else {
            self.tree.insert(key, commitment.leaf())?;
            self.commitments.insert(key, commitment.clone());
        }
        self.refresh_version();
        Ok(())
    }

    pub fn delete(&mut self, commitment: &AssetCommitment) -> Result<(), Error> {
        let key = commitment.tap_key();
        self.tree.delete(&key)?;
        self.commitments.remove(&key);
        self.refresh_version();
        Ok(())
    }

    /// Merges every asset commitment of `other` into this one. Both sides
    /// must carry the same version. Nothing changes if the merge fails.
    pub fn merge(&mut self, other: &TapCommitment) -> Result<(), Error> {
        if self.version != other.version {
            return Err(Error::VersionMismatch {
                a: self.version,
                b: other.version,
            });
        }

        let mut merged = self.clone();
        for (key, commitment) in &other.commitments {
            let combined = match merged.commitments.get(key) {
                Some(existing) => {
                    let mut existing = existing.clone();
                    existing.merge(commitment)?;
                    existing
                }
                None => commitment.clone(),
            };
            merged.upsert(&combined)?;
        }
        *self = merged;
        Ok(())
    }

    /// Looks up the asset at `asset_key` inside the asset commitment at
    /// `tap_key`, returning it with the two layer proof of its inclusion or
    /// exclusion. The asset proof layer is absent when `tap_key` itself is
    /// not committed to.
    pub fn proof(&self, tap_key: &[u8; 32], asset_key: &[u8; 32]) -> (Option<Asset>, CommitmentProof) {
        let taproot_asset_proof = TaprootAssetProof {
            proof: self.tree.merkle_proof(tap_key),
            version: self.version,
            unknown_odd_types: BTreeMap::new(),
        };

        let Some(commitment) = self.commitments.get(tap_key) else {
            return (
                None,
                CommitmentProof {
                    asset_proof: None,
                    taproot_asset_proof,
                },
            );
        };

        let (asset, proof) = commitment.asset_proof(asset_key);
        let asset_proof = AssetProof {
            proof,
            version: commitment.version(),
            tap_key: *tap_key,
            unknown_odd_types: BTreeMap::new(),
        };
        (
            asset,
            CommitmentProof {
                asset_proof: Some(asset_proof),
                taproot_asset_proof,
            },
        )
    }

    /// The asset commitment `asset` would belong to, if present.
    pub fn commitment(&self, asset: &Asset) -> Option<&AssetCommitment> {
        self.commitments.get(&asset.tap_commitment_key())
    }

    pub fn commitments(&self) -> &BTreeMap<[u8; 32], AssetCommitment> {
        &self.commitments
    }

    /// Every asset across all asset commitments.
    pub fn committed_assets(&self) -> Vec<Asset> {
        self.commitments
            .values()
            .flat_map(|commitment| commitment.assets().values().cloned())
            .collect()
    }

    pub fn version(&self) -> TapCommitmentVersion {
        self.version
    }

    pub fn root(&self) -> MssmtNode {
        self.tree.root()
    }

    pub fn commitment_root(&self) -> TapCommitmentRoot {
        TapCommitmentRoot {
            version: self.version,
            root: self.tree.root(),
        }
    }

    pub fn tap_leaf_script(&self) -> Vec<u8> {
        self.commitment_root().tap_leaf_script()
    }

    pub fn tap_leaf(&self) -> TapNodeHash {
        self.commitment_root().tap_leaf()
    }

    pub fn tapscript_root(&self, sibling: Option<&TapscriptPreimage>) -> Result<TapNodeHash, Error> {
        self.commitment_root().tapscript_root(sibling)
    }

    /// The V0 root of a V1 commitment.
    pub fn downgrade(&self) -> Option<TapCommitmentRoot> {
        self.commitment_root().downgrade()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

impl PartialEq for TapCommitment {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.tree.root() == other.tree.root()
            && self.commitments == other.commitments
    }
}

impl Eq for TapCommitment {}
