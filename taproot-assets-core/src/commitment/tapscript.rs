use alloc::vec::Vec;

use bitcoin::hashes::{sha256::Hash as Sha256Hash, Hash};
use bitcoin::taproot::{LeafVersion, TapNodeHash};
use bitcoin::ScriptBuf;
use serde::{Deserialize, Serialize};
use taproot_assets_types::commitment::{TapCommitmentVersion, TapscriptPreimage};
use taproot_assets_types::mssmt::MssmtNode;

use super::Error;

/// Marker tag for V0 and V1 Taproot Asset commitment leaves.
pub const TAPROOT_ASSETS_MARKER_TAG: &str = "taproot-assets";
/// Marker tag for V2 Taproot Asset commitment leaves.
pub const TAPROOT_ASSETS_V2_TAG: &str = "taproot-assets:194243";
/// Largest tapscript accepted inside a sibling leaf preimage.
pub const MAX_TAPLEAF_SCRIPT_SIZE: usize = 4_000_000;

/// Length in bytes of a Taproot Asset commitment leaf script.
const COMMITMENT_SCRIPT_SIZE: usize = 1 + 32 + 32 + 8;

fn marker() -> [u8; 32] {
    Sha256Hash::hash(TAPROOT_ASSETS_MARKER_TAG.as_bytes()).to_byte_array()
}

fn v2_tag() -> [u8; 32] {
    Sha256Hash::hash(TAPROOT_ASSETS_V2_TAG.as_bytes()).to_byte_array()
}

/// The root of a Taproot Asset commitment, which is all a verifier needs to
/// rebuild the anchoring tap leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TapCommitmentRoot {
    pub version: TapCommitmentVersion,
    pub root: MssmtNode,
}

impl TapCommitmentRoot {
    /// The tapscript leaf script committing to this root.
    pub fn tap_leaf_script(&self) -> Vec<u8> {
        let mut script = Vec::with_capacity(COMMITMENT_SCRIPT_SIZE);
        match self.version {
            TapCommitmentVersion::V2 => {
                script.extend_from_slice(&v2_tag());
                script.push(self.version.as_u8());
            }
            _ => {
                script.push(self.version.as_u8());
                script.extend_from_slice(&marker());
            }
        }
        script.extend_from_slice(self.root.hash.as_byte_array());
        script.extend_from_slice(&self.root.sum.to_be_bytes());
        script
    }

    /// Hash of the commitment tap leaf.
    pub fn tap_leaf(&self) -> TapNodeHash {
        let script = ScriptBuf::from_bytes(self.tap_leaf_script());
        TapNodeHash::from_script(script.as_script(), LeafVersion::TapScript)
    }

    /// Root of the tapscript tree made of the commitment leaf and an optional
    /// sibling.
    pub fn tapscript_root(
        &self,
        sibling: Option<&TapscriptPreimage>,
    ) -> Result<TapNodeHash, Error> {
        let leaf = self.tap_leaf();
        match sibling {
            Some(preimage) => Ok(TapNodeHash::from_node_hashes(
                leaf,
                tapscript_preimage_hash(preimage)?,
            )),
            None => Ok(leaf),
        }
    }

    /// The V0 form of a V1 root. Older wallets anchored V1 commitments with a
    /// V0 leaf, so verifiers accept either.
    pub fn downgrade(&self) -> Option<TapCommitmentRoot> {
        match self.version {
            TapCommitmentVersion::V1 => Some(TapCommitmentRoot {
                version: TapCommitmentVersion::V0,
                root: self.root,
            }),
            _ => None,
        }
    }
}

/// Hashes a tapscript sibling preimage, enforcing the consensus rules on
/// leaf version and script size.
pub fn tapscript_preimage_hash(preimage: &TapscriptPreimage) -> Result<TapNodeHash, Error> {
    match preimage {
        TapscriptPreimage::Leaf {
            leaf_version,
            script,
        } => {
            if script.is_empty() {
                return Err(Error::EmptyTapscriptPreimage);
            }
            if *leaf_version != LeafVersion::TapScript.to_consensus() {
                return Err(Error::InvalidTapLeafVersion(*leaf_version));
            }
            if script.len() >= MAX_TAPLEAF_SCRIPT_SIZE {
                return Err(Error::InvalidTapLeafScriptLength(script.len()));
            }
            if is_taproot_asset_commitment_script(script) {
                return Err(Error::TapscriptPreimageIsTapCommitment);
            }
            let script = ScriptBuf::from_bytes(script.clone());
            Ok(TapNodeHash::from_script(
                script.as_script(),
                LeafVersion::TapScript,
            ))
        }
        TapscriptPreimage::Branch { left, right } => Ok(TapNodeHash::from_node_hashes(
            TapNodeHash::from_byte_array(*left),
            TapNodeHash::from_byte_array(*right),
        )),
    }
}

/// Reports whether `script` has the shape of a Taproot Asset commitment
/// leaf of any version.
pub fn is_taproot_asset_commitment_script(script: &[u8]) -> bool {
    if script.len() != COMMITMENT_SCRIPT_SIZE {
        return false;
    }
    match script[0] {
        v if v == TapCommitmentVersion::V0.as_u8() || v == TapCommitmentVersion::V1.as_u8() => {
            script[1..33] == marker()
        }
        _ => script[..32] == v2_tag() && script[32] == TapCommitmentVersion::V2.as_u8(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn root(version: TapCommitmentVersion) -> TapCommitmentRoot {
        TapCommitmentRoot {
            version,
            root: MssmtNode {
                hash: Sha256Hash::hash(b"root"),
                sum: 1_000,
            },
        }
    }

    #[test]
    fn leaf_scripts_are_recognised_for_every_version() {
        for version in [
            TapCommitmentVersion::V0,
            TapCommitmentVersion::V1,
            TapCommitmentVersion::V2,
        ] {
            let script = root(version).tap_leaf_script();
            assert_eq!(script.len(), COMMITMENT_SCRIPT_SIZE);
            assert!(is_taproot_asset_commitment_script(&script));
            assert_eq!(&script[script.len() - 8..], &1_000u64.to_be_bytes());
        }
        assert!(!is_taproot_asset_commitment_script(&marker()));
        assert_eq!(root(TapCommitmentVersion::V2).tap_leaf_script()[32], 2);
    }

    #[test]
    fn versions_yield_distinct_leaves() {
        let v0 = root(TapCommitmentVersion::V0).tap_leaf();
        let v1 = root(TapCommitmentVersion::V1).tap_leaf();
        let v2 = root(TapCommitmentVersion::V2).tap_leaf();
        assert_ne!(v0, v1);
        assert_ne!(v1, v2);
        assert_eq!(root(TapCommitmentVersion::V1).downgrade().map(|r| r.tap_leaf()), Some(v0));
        assert!(root(TapCommitmentVersion::V2).downgrade().is_none());
    }

    #[test]
    fn sibling_preimages_are_checked() {
        let commitment = root(TapCommitmentVersion::V1);
        let leaf = TapscriptPreimage::Leaf {
            leaf_version: 0xc0,
            script: vec![0x51],
        };
        let with_sibling = commitment.tapscript_root(Some(&leaf)).unwrap();
        assert_ne!(with_sibling, commitment.tapscript_root(None).unwrap());

        let bad_version = TapscriptPreimage::Leaf {
            leaf_version: 0xc2,
            script: vec![0x51],
        };
        assert_eq!(
            tapscript_preimage_hash(&bad_version),
            Err(Error::InvalidTapLeafVersion(0xc2))
        );

        let empty = TapscriptPreimage::Leaf {
            leaf_version: 0xc0,
            script: vec![],
        };
        assert_eq!(tapscript_preimage_hash(&empty), Err(Error::EmptyTapscriptPreimage));

        let nested = TapscriptPreimage::Leaf {
            leaf_version: 0xc0,
            script: root(TapCommitmentVersion::V0).tap_leaf_script(),
        };
        assert_eq!(
            commitment.tapscript_root(Some(&nested)),
            Err(Error::TapscriptPreimageIsTapCommitment)
        );
    }

    #[test]
    fn branch_preimage_is_order_independent() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let ab = tapscript_preimage_hash(&TapscriptPreimage::Branch { left: a, right: b });
        let ba = tapscript_preimage_hash(&TapscriptPreimage::Branch { left: b, right: a });
        assert_eq!(ab, ba);
    }
}
