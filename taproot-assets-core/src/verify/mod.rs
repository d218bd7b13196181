//! Verification of anchored state transition proofs and proof files.

/// Capabilities injected by the host.
pub mod chain;
/// Folding a proof file into its final snapshot.
pub mod file;
/// Group key reveal verification helpers.
pub mod group_key_reveal;
/// Proof verification state machine.
pub mod proof;
/// Taproot proof verification helpers.
pub mod taproot_proof;
/// Anchor transaction verification helpers.
pub mod tx;

pub use chain::{
    CancelToken, ChainLookup, CollaboratorError, GroupVerifier, HeaderVerifier, TxValidator,
};
pub use proof::{AssetSnapshot, ProofVerifier, create_ownership_proof_asset};
pub use tx::{BitcoinMerkleVerifier, MerkleVerifier};

use taproot_assets_types::error::Error as DecodeError;

/// Result type for verification helpers.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors returned by verification helpers.
#[derive(Debug)]
pub enum Error {
    /// Anchor transaction verification failed.
    Tx(tx::Error),
    /// Proof verification failed.
    Proof(proof::Error),
    /// Group key reveal verification failed.
    GroupKeyReveal(group_key_reveal::Error),
    /// An injected collaborator rejected the proof.
    Collaborator(CollaboratorError),
    /// A proof inside a file could not be decoded.
    Decode(DecodeError),
    /// The proof or file carries a version this verifier does not know.
    UnknownVersion(u32),
    /// Additional input files nest deeper than allowed.
    NestingDepthExceeded {
        /// Configured nesting limit.
        max: usize,
    },
    /// The file holds no proofs.
    EmptyFile,
    /// Verification was cancelled by the caller.
    Cancelled,
}

impl From<tx::Error> for Error {
    fn from(err: tx::Error) -> Self {
        Self::Tx(err)
    }
}

impl From<proof::Error> for Error {
    fn from(err: proof::Error) -> Self {
        Self::Proof(err)
    }
}

impl From<group_key_reveal::Error> for Error {
    fn from(err: group_key_reveal::Error) -> Self {
        Self::GroupKeyReveal(err)
    }
}

impl From<CollaboratorError> for Error {
    fn from(err: CollaboratorError) -> Self {
        Self::Collaborator(err)
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnknownVersion(version) => Self::UnknownVersion(version),
            other => Self::Decode(other),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Tx(err) => core::fmt::Display::fmt(err, f),
            Error::Proof(err) => core::fmt::Display::fmt(err, f),
            Error::GroupKeyReveal(err) => core::fmt::Display::fmt(err, f),
            Error::Collaborator(err) => core::fmt::Display::fmt(err, f),
            Error::Decode(err) => core::fmt::Display::fmt(err, f),
            Error::UnknownVersion(version) => write!(f, "unknown version: {}", version),
            Error::NestingDepthExceeded { max } => {
                write!(f, "additional inputs nest deeper than {}", max)
            }
            Error::EmptyFile => write!(f, "proof file is empty"),
            Error::Cancelled => write!(f, "verification cancelled"),
        }
    }
}

impl core::error::Error for Error {}
