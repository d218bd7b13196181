//! Capabilities the verifier borrows from its host.
//!
//! None of these are implemented here: block headers, group key registries,
//! chain state and script execution all live outside the core. Every
//! failure a collaborator reports is carried back to the caller unchanged
//! as a [`CollaboratorError`].

use alloc::collections::BTreeMap;
use alloc::string::String;
use core::sync::atomic::{AtomicBool, Ordering};

use bitcoin::Txid;
use bitcoin::block::Header;
use taproot_assets_types::asset::{Asset, PrevId, SerializedKey};
use thiserror::Error;

/// Failure reported by an injected collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CollaboratorError {
    pub message: String,
}

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        CollaboratorError {
            message: message.into(),
        }
    }
}

/// Checks that a header is part of the chain at `height`.
pub trait HeaderVerifier {
    fn verify_header(&self, header: &Header, height: u32) -> Result<(), CollaboratorError>;
}

impl<F> HeaderVerifier for F
where
    F: Fn(&Header, u32) -> Result<(), CollaboratorError>,
{
    fn verify_header(&self, header: &Header, height: u32) -> Result<(), CollaboratorError> {
        self(header, height)
    }
}

/// Confirms that a group key seen without a reveal is already known.
pub trait GroupVerifier {
    fn verify_group_key(&self, group_key: &SerializedKey) -> Result<(), CollaboratorError>;
}

impl<F> GroupVerifier for F
where
    F: Fn(&SerializedKey) -> Result<(), CollaboratorError>,
{
    fn verify_group_key(&self, group_key: &SerializedKey) -> Result<(), CollaboratorError> {
        self(group_key)
    }
}

/// Read access to chain state needed by script validation.
pub trait ChainLookup {
    /// Height of the current best block.
    fn current_height(&self) -> Result<u32, CollaboratorError>;

    /// Height of the block that confirmed `txid`.
    fn tx_block_height(&self, txid: &Txid) -> Result<u32, CollaboratorError>;
}

/// Validates the witnesses of a virtual asset transaction.
pub trait TxValidator {
    /// `new_asset` spends `prev_assets`. When the transfer split the input,
    /// `split_assets` holds the split outputs being proven alongside it.
    fn execute(
        &self,
        new_asset: &Asset,
        split_assets: &[Asset],
        prev_assets: &BTreeMap<PrevId, Asset>,
        chain: &dyn ChainLookup,
    ) -> Result<(), CollaboratorError>;
}

/// Lets a caller abort a long running verification.
pub trait CancelToken {
    fn is_cancelled(&self) -> bool;
}

impl CancelToken for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use bitcoin::hashes::Hash;

    #[test]
    fn closures_act_as_verifiers() {
        let header_ok = |_: &Header, height: u32| {
            if height > 100 {
                Err(CollaboratorError::new("unknown block"))
            } else {
                Ok(())
            }
        };
        let header = Header {
            version: bitcoin::block::Version::TWO,
            prev_blockhash: bitcoin::BlockHash::all_zeros(),
            merkle_root: bitcoin::TxMerkleNode::all_zeros(),
            time: 0,
            bits: bitcoin::CompactTarget::from_consensus(0x207fffff),
            nonce: 0,
        };
        let verifier: &dyn HeaderVerifier = &header_ok;
        assert!(verifier.verify_header(&header, 1).is_ok());
        assert_eq!(
            verifier.verify_header(&header, 101).unwrap_err().to_string(),
            "unknown block"
        );

        let known = taproot_assets_types::asset::NUMS_KEY;
        let groups = move |key: &SerializedKey| {
            if *key == known {
                Ok(())
            } else {
                Err(CollaboratorError::new("unknown group"))
            }
        };
        let groups: &dyn GroupVerifier = &groups;
        assert!(groups.verify_group_key(&known).is_ok());
        assert!(groups.verify_group_key(&SerializedKey { bytes: [2u8; 33] }).is_err());
    }

    #[test]
    fn atomic_flag_cancels() {
        let flag = AtomicBool::new(false);
        assert!(!flag.is_cancelled());
        flag.store(true, Ordering::Relaxed);
        assert!(flag.is_cancelled());
    }
}
