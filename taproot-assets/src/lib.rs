//! High-level convenience API for Taproot Assets.
//!
//! Re-exports the wire types and the verification core, and provides a
//! secp256k1 backed [`verify::BitcoinTaprootOps`] together with verification
//! entry points that log through the `log` facade.

#![cfg_attr(not(feature = "std"), no_std)]

/// Re-export of taproot-assets-core for backend implementations.
pub use taproot_assets_core as core;

/// Re-export of taproot-assets-types for wire encoding and data types.
pub use taproot_assets_types as types;

/// Host-side verification helpers backed by bitcoin/secp256k1.
pub mod verify;
