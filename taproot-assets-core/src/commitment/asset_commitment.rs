use alloc::collections::{BTreeMap, BTreeSet};

use bitcoin::hashes::{sha256::Hash as Sha256Hash, Hash, HashEngine};
use taproot_assets_types::asset::{Asset, AssetType, AssetVersion, NUMS_KEY};
use taproot_assets_types::mssmt::{LeafNode, MssmtNode, MssmtProof};

use super::{Error, known_asset_version};
use crate::mssmt::{CompactedTree, Tree};

/// Root of an asset commitment given the children and sum of its tree root.
pub fn asset_commitment_root(
    tap_key: &[u8; 32],
    left: &MssmtNode,
    right: &MssmtNode,
    sum: u64,
) -> MssmtNode {
    let mut engine = Sha256Hash::engine();
    engine.input(tap_key);
    engine.input(left.hash.as_byte_array());
    engine.input(right.hash.as_byte_array());
    engine.input(&sum.to_be_bytes());
    MssmtNode {
        hash: Sha256Hash::from_engine(engine),
        sum,
    }
}

/// The leaf an asset commitment occupies in its tap commitment.
pub fn asset_commitment_leaf(version: AssetVersion, root: &MssmtNode) -> LeafNode {
    let mut value = alloc::vec::Vec::with_capacity(1 + 32 + 8);
    value.push(version.as_u8());
    value.extend_from_slice(root.hash.as_byte_array());
    value.extend_from_slice(&root.sum.to_be_bytes());
    LeafNode::new(value, root.sum)
}

/// An MS-SMT committing to every asset of one asset ID, or one asset group,
/// held by an output.
///
/// Cloning produces a fully independent commitment.
#[derive(Debug, Clone)]
pub struct AssetCommitment {
    version: AssetVersion,
    tap_key: [u8; 32],
    asset_type: AssetType,
    tree: CompactedTree,
    assets: BTreeMap<[u8; 32], Asset>,
}

fn check_amount(asset: &Asset) -> Result<(), Error> {
    known_asset_version(asset.version)?;
    if asset.script_key == NUMS_KEY {
        return Ok(());
    }
    let valid = match asset.asset_type() {
        AssetType::Normal => asset.amount > 0,
        AssetType::Collectible => asset.amount == 1,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidAssetAmount {
            amount: asset.amount,
        })
    }
}

impl AssetCommitment {
    /// Commits to `assets`, which must share a genesis (or a group key) and
    /// an asset type, and must have distinct script keys.
    pub fn new(assets: &[Asset]) -> Result<Self, Error> {
        let first = assets.first().ok_or(Error::NoAssets)?;
        let first_group = first.group_key.map(|key| key.group_pub_key);
        let first_id = first.id();

        let mut keys = BTreeSet::new();
        let mut sum: u64 = 0;
        for asset in assets {
            let group = asset.group_key.map(|key| key.group_pub_key);
            if group != first_group {
                return Err(Error::AssetGroupKeyMismatch);
            }
            if group.is_none() && asset.id() != first_id {
                return Err(Error::AssetGenesisMismatch);
            }
            if asset.asset_type() != first.asset_type() {
                return Err(Error::AssetTypeMismatch);
            }
            check_amount(asset)?;
            if !keys.insert(asset.asset_commitment_key()) {
                return Err(Error::AssetDuplicateScriptKey);
            }
            sum = sum
                .checked_add(asset.amount)
                .ok_or(crate::mssmt::Error::SumOverflow)?;
        }

        let mut commitment = AssetCommitment {
            version: AssetVersion::V0,
            tap_key: first.tap_commitment_key(),
            asset_type: first.asset_type(),
            tree: CompactedTree::new(),
            assets: BTreeMap::new(),
        };
        for asset in assets {
            commitment.insert(asset)?;
        }
        Ok(commitment)
    }

    fn insert(&mut self, asset: &Asset) -> Result<(), Error> {
        let key = asset.asset_commitment_key();
        self.tree.insert(key, asset.leaf())?;
        self.assets.insert(key, asset.clone());
        self.refresh_version();
        Ok(())
    }

    fn refresh_version(&mut self) {
        if let Some(version) = self.assets.values().map(|asset| asset.version).max() {
            self.version = version;
        }
    }

    /// Inserts `asset`, replacing any asset already stored under the same
    /// script key.
    pub fn upsert(&mut self, asset: &Asset) -> Result<(), Error> {
        if asset.asset_type() != self.asset_type {
            return Err(Error::AssetTypeMismatch);
        }
        if asset.tap_commitment_key() != self.tap_key {
            return Err(if asset.group_key.is_some() {
                Error::AssetGroupKeyMismatch
            } else {
                Error::AssetGenesisMismatch
            });
        }
        check_amount(asset)?;
        self.insert(asset)
    }

    /// Removes `asset`. Deleting the last asset leaves an empty tree that the
    /// owning tap commitment prunes on upsert.
    pub fn delete(&mut self, asset: &Asset) -> Result<(), Error> {
        let key = asset.asset_commitment_key();
        self.tree.delete(&key)?;
        self.assets.remove(&key);
        self.refresh_version();
        Ok(())
    }

    /// Adds every asset of `other`, which must share this commitment's tap
    /// key. Nothing changes if any asset fails to merge.
    pub fn merge(&mut self, other: &AssetCommitment) -> Result<(), Error> {
        if other.tap_key != self.tap_key {
            return Err(Error::TapKeyMismatch);
        }
        let mut merged = self.clone();
        for asset in other.assets.values() {
            merged.upsert(asset)?;
        }
        *self = merged;
        Ok(())
    }

    /// The asset stored under `key`, if any, and a merkle proof of its
    /// inclusion or exclusion.
    pub fn asset_proof(&self, key: &[u8; 32]) -> (Option<Asset>, MssmtProof) {
        (self.assets.get(key).cloned(), self.tree.merkle_proof(key))
    }

    pub fn asset(&self, key: &[u8; 32]) -> Option<&Asset> {
        self.assets.get(key)
    }

    /// Committed assets keyed by asset commitment key.
    pub fn assets(&self) -> &BTreeMap<[u8; 32], Asset> {
        &self.assets
    }

    pub fn version(&self) -> AssetVersion {
        self.version
    }

    pub fn tap_key(&self) -> [u8; 32] {
        self.tap_key
    }

    pub fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    /// Root of the inner MS-SMT.
    pub fn tree_root(&self) -> MssmtNode {
        self.tree.root()
    }

    /// The commitment root, binding the tree root to the tap key.
    pub fn root(&self) -> MssmtNode {
        let (left, right) = self.tree.root_children();
        asset_commitment_root(&self.tap_key, &left, &right, self.tree.root().sum)
    }

    /// Leaf of this commitment inside a tap commitment.
    pub fn leaf(&self) -> LeafNode {
        asset_commitment_leaf(self.version, &self.root())
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

impl PartialEq for AssetCommitment {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.tap_key == other.tap_key
            && self.asset_type == other.asset_type
            && self.tree.root() == other.tree.root()
            && self.assets == other.assets
    }
}

impl Eq for AssetCommitment {}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mssmt::verify_merkle_proof;
    use alloc::vec;
    use alloc::vec::Vec;
    use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
    use bitcoin::{OutPoint, Txid};
    use taproot_assets_types::asset::{
        GenesisInfo, GroupKey, PrevWitness, SerializedKey, SCRIPT_V0,
    };

    pub(crate) fn key(seed: u8) -> SerializedKey {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[seed; 32]).unwrap();
        PublicKey::from_secret_key(&secp, &secret).into()
    }

    pub(crate) fn genesis(tag: &str, asset_type: AssetType) -> GenesisInfo {
        GenesisInfo {
            genesis_point: OutPoint {
                txid: Txid::from_byte_array(Sha256Hash::hash(tag.as_bytes()).to_byte_array()),
                vout: 0,
            },
            name: tag.into(),
            meta_hash: [0u8; 32],
            output_index: 0,
            asset_type,
        }
    }

    pub(crate) fn asset(genesis: &GenesisInfo, amount: u64, script_seed: u8) -> Asset {
        Asset {
            version: AssetVersion::V0,
            genesis: genesis.clone(),
            amount,
            lock_time: 0,
            relative_lock_time: 0,
            prev_witnesses: vec![PrevWitness::genesis()],
            split_commitment_root: None,
            script_version: SCRIPT_V0,
            script_key: key(script_seed),
            group_key: None,
            unknown_odd_types: BTreeMap::new(),
        }
    }

    pub(crate) fn grouped(mut asset: Asset, group_seed: u8) -> Asset {
        asset.group_key = Some(GroupKey {
            group_pub_key: key(group_seed),
        });
        asset
    }

    #[test]
    fn new_rejects_incompatible_assets() {
        let g1 = genesis("g1", AssetType::Normal);
        let g2 = genesis("g2", AssetType::Normal);

        let cases: Vec<(Vec<Asset>, Error)> = vec![
            (vec![], Error::NoAssets),
            (
                vec![grouped(asset(&g1, 5, 1), 50), grouped(asset(&g1, 5, 2), 51)],
                Error::AssetGroupKeyMismatch,
            ),
            (
                vec![grouped(asset(&g1, 5, 1), 50), asset(&g1, 5, 2)],
                Error::AssetGroupKeyMismatch,
            ),
            (
                vec![asset(&g1, 5, 1), asset(&g2, 5, 2)],
                Error::AssetGenesisMismatch,
            ),
            (
                vec![grouped(asset(&g1, 5, 1), 50), grouped(asset(&g1, 7, 1), 50)],
                Error::AssetDuplicateScriptKey,
            ),
            (
                vec![asset(&g1, 0, 1)],
                Error::InvalidAssetAmount { amount: 0 },
            ),
        ];
        for (assets, expected) in cases {
            assert_eq!(AssetCommitment::new(&assets).unwrap_err(), expected);
        }

        let collectible = genesis("nft", AssetType::Collectible);
        assert_eq!(
            AssetCommitment::new(&[asset(&collectible, 2, 1)]).unwrap_err(),
            Error::InvalidAssetAmount { amount: 2 }
        );
    }

    #[test]
    fn group_reissuance_shares_a_commitment() {
        let g1 = genesis("g1", AssetType::Normal);
        let g2 = genesis("g2", AssetType::Normal);
        let anchor = grouped(asset(&g1, 10, 1), 50);
        let reissued = grouped(asset(&g2, 20, 2), 50);

        let commitment = AssetCommitment::new(&[anchor.clone(), reissued.clone()]).unwrap();
        assert_ne!(commitment.tap_key(), [0u8; 32]);
        assert_eq!(commitment.tree_root().sum, 30);

        for committed in [&anchor, &reissued] {
            let key = committed.asset_commitment_key();
            let (found, proof) = commitment.asset_proof(&key);
            assert_eq!(found.as_ref(), Some(committed));
            verify_merkle_proof(&key, &committed.leaf(), &proof, &commitment.tree_root())
                .unwrap();
        }
    }

    #[test]
    fn upsert_checks_type_before_membership() {
        let g1 = genesis("g1", AssetType::Normal);
        let mut commitment = AssetCommitment::new(&[grouped(asset(&g1, 10, 1), 50)]).unwrap();
        let before = commitment.root();

        let mut collectible = genesis("g1", AssetType::Collectible);
        collectible.name = "other".into();
        assert_eq!(
            commitment.upsert(&asset(&collectible, 1, 2)),
            Err(Error::AssetTypeMismatch)
        );
        assert_eq!(
            commitment.upsert(&grouped(asset(&g1, 3, 2), 51)),
            Err(Error::AssetGroupKeyMismatch)
        );
        assert_eq!(
            commitment.upsert(&asset(&g1, 3, 2)),
            Err(Error::AssetGenesisMismatch)
        );
        assert_eq!(commitment.root(), before);
    }

    #[test]
    fn upsert_replaces_same_script_key() {
        let g1 = genesis("g1", AssetType::Normal);
        let mut commitment = AssetCommitment::new(&[asset(&g1, 10, 1)]).unwrap();
        commitment.upsert(&asset(&g1, 25, 1)).unwrap();
        assert_eq!(commitment.assets().len(), 1);
        assert_eq!(commitment.tree_root().sum, 25);
    }

    #[test]
    fn version_tracks_the_newest_asset() {
        let g1 = genesis("g1", AssetType::Normal);
        let v0 = asset(&g1, 10, 1);
        let mut v1 = asset(&g1, 10, 2);
        v1.version = AssetVersion::V1;

        let mut commitment = AssetCommitment::new(&[v0.clone()]).unwrap();
        assert_eq!(commitment.version(), AssetVersion::V0);
        commitment.upsert(&v1).unwrap();
        assert_eq!(commitment.version(), AssetVersion::V1);
        commitment.delete(&v1).unwrap();
        assert_eq!(commitment.version(), AssetVersion::V0);

        commitment.delete(&v0).unwrap();
        assert!(commitment.is_empty());
        assert!(commitment.assets().is_empty());

        let mut future = asset(&g1, 10, 3);
        future.version = AssetVersion::Unknown(2);
        assert_eq!(
            AssetCommitment::new(&[future.clone()]).unwrap_err(),
            Error::UnknownAssetVersion(2)
        );
        assert_eq!(commitment.upsert(&future), Err(Error::UnknownAssetVersion(2)));
        assert!(commitment.is_empty());
    }

    #[test]
    fn clones_are_independent() {
        let g1 = genesis("g1", AssetType::Normal);
        let original = AssetCommitment::new(&[asset(&g1, 10, 1), asset(&g1, 4, 2)]).unwrap();
        let mut copy = original.clone();
        assert_eq!(copy, original);

        copy.delete(&asset(&g1, 4, 2)).unwrap();
        assert_eq!(original.tree_root().sum, 14);
        assert_eq!(copy.tree_root().sum, 10);
        assert_ne!(copy.root(), original.root());
    }

    #[test]
    fn merge_requires_matching_tap_key() {
        let g1 = genesis("g1", AssetType::Normal);
        let g2 = genesis("g2", AssetType::Normal);
        let mut left = AssetCommitment::new(&[asset(&g1, 10, 1)]).unwrap();
        let right = AssetCommitment::new(&[asset(&g1, 5, 2)]).unwrap();
        let other = AssetCommitment::new(&[asset(&g2, 5, 2)]).unwrap();

        assert_eq!(left.merge(&other), Err(Error::TapKeyMismatch));
        left.merge(&right).unwrap();
        assert_eq!(left.assets().len(), 2);
        assert_eq!(left.tree_root().sum, 15);
    }

    #[test]
    fn root_commits_to_tap_key() {
        let g1 = genesis("g1", AssetType::Normal);
        let commitment = AssetCommitment::new(&[asset(&g1, 10, 1)]).unwrap();
        let (left, right) = commitment.tree.root_children();
        let other_key = [9u8; 32];
        assert_ne!(
            asset_commitment_root(&other_key, &left, &right, 10),
            commitment.root()
        );
        let leaf = commitment.leaf();
        assert_eq!(leaf.sum, 10);
        assert_eq!(leaf.value[0], AssetVersion::V0.as_u8());
        assert_eq!(&leaf.value[1..33], commitment.root().hash.as_byte_array());
    }
}
