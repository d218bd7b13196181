#![no_std]

extern crate alloc;

use taproot_assets_types::asset::SerializedKey;
use thiserror::Error;

/// Asset and Taproot Asset commitments, split commitments and tapscript
/// helpers.
pub mod commitment;
/// Injected logging capability.
pub mod logger;
/// Merkle sum sparse Merkle trees.
pub mod mssmt;
/// Verification of anchored state transition proofs and proof files.
pub mod verify;

/// Errors returned by TaprootOps implementations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpsError {
    /// Raw group key bytes are invalid.
    #[error("invalid raw group key")]
    InvalidRawGroupKey,
    /// Internal key bytes are invalid.
    #[error("invalid internal key")]
    InvalidInternalKey,
    /// Asset ID tweak is out of range.
    #[error("asset id tweak out of range")]
    AssetIdTweakOutOfRange,
    /// Failed to apply the group key tweak.
    #[error("invalid group key tweak")]
    InvalidGroupKeyTweak,
    /// Taproot output key derivation failed.
    #[error("invalid taproot output key")]
    InvalidTaprootOutputKey,
}

/// Curve operations the verifier needs but does not implement itself.
///
/// The host crate provides a secp256k1 backed implementation; keeping the
/// operations behind a trait lets the core stay `no_std` and backend
/// agnostic.
pub trait TaprootOps {
    /// Backend-specific public key representation.
    type PubKey;

    /// Parses a raw group key into the backend representation.
    fn parse_group_key(&self, key: &SerializedKey) -> Result<Self::PubKey, OpsError>;

    /// Parses a taproot internal key into the backend representation.
    fn parse_internal_key(&self, key: &SerializedKey) -> Result<Self::PubKey, OpsError>;

    /// Returns `pubkey + tweak·G`.
    fn add_tweak(&self, pubkey: &Self::PubKey, tweak: [u8; 32]) -> Result<Self::PubKey, OpsError>;

    /// Computes the BIP-341 output key for an internal key and optional
    /// tapscript root.
    fn taproot_output_key(
        &self,
        internal_key: &Self::PubKey,
        tapscript_root: Option<[u8; 32]>,
    ) -> Result<SerializedKey, OpsError>;
}
