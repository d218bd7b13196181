use crate::alloc::string::String; // For no_std compatibility
use bitcoin::io::Error as BitcoinIoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(BitcoinIoError),

    #[error("TLV stream error: {0}")]
    TlvStream(String),

    #[error("Missing TLV field: {0}")]
    MissingTlvField(String),

    #[error("Bitcoin serialization error: {0}")]
    BitcoinSerialization(String),

    #[error("Unknown TLV type: {0}")]
    UnknownTlvType(u64),

    #[error("Invalid TLV value for type {0}: {1}")]
    InvalidTlvValue(u64, String),

    #[error("TLV types must be strictly increasing: got {current} after {previous}")]
    NonIncreasingTlvType { previous: u64, current: u64 },

    #[error("TLV record too large: {size} bytes for type {tlv_type}, limit {limit}")]
    RecordTooLarge { tlv_type: u64, size: u64, limit: u64 },

    #[error("invalid magic bytes, expected {expected}")]
    InvalidMagic { expected: &'static str },

    #[error("unknown version: {0}")]
    UnknownVersion(u32),

    #[error("proof index {index} out of range, file has {len} proofs")]
    ProofIndexOutOfRange { index: usize, len: usize },

    #[error("no proof available")]
    NoProofAvailable,

    #[error("no matching proof found")]
    ProofNotFound,

    #[error("checksum mismatch for proof {index}")]
    ChecksumMismatch { index: usize },

    #[error("proof prev out does not spend the previous proof's anchor output")]
    PrevOutMismatch,

    #[error("nesting depth exceeds maximum of {max}")]
    NestingDepthExceeded { max: usize },

    #[error("MS-SMT sum overflow")]
    SumOverflow,

    #[error("invalid MS-SMT proof length: expected {expected}, got {actual}")]
    InvalidProofLength { expected: usize, actual: usize },
}

impl From<BitcoinIoError> for Error {
    fn from(err: BitcoinIoError) -> Self {
        Error::Io(err)
    }
}
