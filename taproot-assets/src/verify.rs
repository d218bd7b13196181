//! Host-side verification utilities backed by bitcoin/secp256k1.

use bitcoin::TapNodeHash;
use bitcoin::hashes::Hash;
use bitcoin::key::TapTweak;
use bitcoin::secp256k1::{self, PublicKey as SecpPublicKey, Scalar, Secp256k1};
use taproot_assets_core::logger::LogCrateLogger;
use taproot_assets_core::verify::{
    self, AssetSnapshot, ChainLookup, GroupVerifier, HeaderVerifier, ProofVerifier,
    group_key_reveal,
};
use taproot_assets_core::{OpsError, TaprootOps};
use taproot_assets_types::asset::{Asset, AssetID, SerializedKey};
use taproot_assets_types::proof::{File, GroupKeyReveal, Proof};

static LOGGER: LogCrateLogger = LogCrateLogger::new(LogCrateLogger::DEFAULT_TARGET);

/// Taproot operations implemented with bitcoin/secp256k1 types.
#[derive(Debug)]
pub struct BitcoinTaprootOps {
    /// Secp256k1 context used for verification-only operations.
    secp: Secp256k1<secp256k1::VerifyOnly>,
}

impl BitcoinTaprootOps {
    /// Creates a new Taproot operations backend.
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl Default for BitcoinTaprootOps {
    fn default() -> Self {
        Self::new()
    }
}

impl TaprootOps for BitcoinTaprootOps {
    type PubKey = SecpPublicKey;

    fn parse_group_key(&self, key: &SerializedKey) -> Result<Self::PubKey, OpsError> {
        SecpPublicKey::from_slice(&key.bytes).map_err(|_| OpsError::InvalidRawGroupKey)
    }

    fn parse_internal_key(&self, key: &SerializedKey) -> Result<Self::PubKey, OpsError> {
        SecpPublicKey::from_slice(&key.bytes).map_err(|_| OpsError::InvalidInternalKey)
    }

    fn add_tweak(&self, pubkey: &Self::PubKey, tweak: [u8; 32]) -> Result<Self::PubKey, OpsError> {
        let tweak = Scalar::from_be_bytes(tweak).map_err(|_| OpsError::AssetIdTweakOutOfRange)?;
        pubkey
            .add_exp_tweak(&self.secp, &tweak)
            .map_err(|_| OpsError::InvalidGroupKeyTweak)
    }

    /// BIP-341 tweak of the x-only internal key. The returned key keeps the
    /// parity of the tweaked point.
    fn taproot_output_key(
        &self,
        internal_key: &Self::PubKey,
        tapscript_root: Option<[u8; 32]>,
    ) -> Result<SerializedKey, OpsError> {
        let merkle_root = tapscript_root.map(TapNodeHash::from_byte_array);
        let (xonly_key, _) = internal_key.x_only_public_key();
        let (tweaked, parity) = xonly_key.tap_tweak(&self.secp, merkle_root);
        let output_key =
            SecpPublicKey::from_x_only_public_key(tweaked.to_x_only_public_key(), parity);

        Ok(SerializedKey {
            bytes: output_key.serialize(),
        })
    }
}

/// Derives the tweaked group key committed to by `reveal` for `asset_id`.
pub fn group_pubkey_from_reveal(
    reveal: &GroupKeyReveal,
    asset_id: &AssetID,
) -> Result<SerializedKey, verify::Error> {
    let ops = BitcoinTaprootOps::new();
    group_key_reveal::group_pubkey_from_reveal(&ops, reveal, asset_id).map_err(verify::Error::from)
}

/// Verifies that `reveal` derives the group key of `asset`.
pub fn verify_group_key_reveal(
    asset: &Asset,
    reveal: &GroupKeyReveal,
) -> Result<SerializedKey, verify::Error> {
    let ops = BitcoinTaprootOps::new();
    group_key_reveal::verify_group_key_reveal(&ops, asset, reveal).map_err(verify::Error::from)
}

/// Verifies a single proof with the secp256k1 backend, logging through the
/// `log` facade. `prev` is the snapshot of the proof being spent and may
/// only be omitted for a genesis proof.
pub fn verify_proof(
    proof: &Proof,
    prev: Option<&AssetSnapshot>,
    header_verifier: &dyn HeaderVerifier,
    group_verifier: &dyn GroupVerifier,
    chain: &dyn ChainLookup,
) -> Result<AssetSnapshot, verify::Error> {
    let ops = BitcoinTaprootOps::new();
    ProofVerifier::new(&ops, header_verifier, group_verifier, chain)
        .with_logger(&LOGGER)
        .verify_proof(proof, prev)
}

/// Verifies a whole proof file with the secp256k1 backend, logging through
/// the `log` facade.
pub fn verify_file(
    file: &File,
    header_verifier: &dyn HeaderVerifier,
    group_verifier: &dyn GroupVerifier,
    chain: &dyn ChainLookup,
) -> Result<AssetSnapshot, verify::Error> {
    let ops = BitcoinTaprootOps::new();
    ProofVerifier::new(&ops, header_verifier, group_verifier, chain)
        .with_logger(&LOGGER)
        .verify_file(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::ScriptBuf;
    use bitcoin::secp256k1::SecretKey;

    fn keypair(seed: u8) -> SecpPublicKey {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[seed; 32]).unwrap();
        SecpPublicKey::from_secret_key(&secp, &secret)
    }

    #[test]
    fn output_key_matches_p2tr_script() {
        let secp = Secp256k1::new();
        let ops = BitcoinTaprootOps::default();
        let internal = keypair(3);
        let root = TapNodeHash::from_byte_array([7u8; 32]);

        for merkle_root in [None, Some(root)] {
            let script = ScriptBuf::new_p2tr(&secp, internal.x_only_public_key().0, merkle_root);
            let key = ops
                .taproot_output_key(&internal, merkle_root.map(|root| root.to_byte_array()))
                .unwrap();
            assert_eq!(&script.as_bytes()[2..], &key.x_only());
        }
    }

    #[test]
    fn tweak_adds_scalar_multiple_of_generator() {
        let secp = Secp256k1::new();
        let ops = BitcoinTaprootOps::new();
        let base = keypair(5);

        let mut tweak = [0u8; 32];
        tweak[31] = 1;
        let one = SecretKey::from_slice(&tweak).unwrap();
        let expected = base.combine(&SecpPublicKey::from_secret_key(&secp, &one)).unwrap();
        assert_eq!(ops.add_tweak(&base, tweak).unwrap(), expected);

        assert_eq!(
            ops.add_tweak(&base, [0xff; 32]),
            Err(OpsError::AssetIdTweakOutOfRange)
        );
        assert_eq!(
            ops.parse_internal_key(&SerializedKey { bytes: [0u8; 33] }),
            Err(OpsError::InvalidInternalKey)
        );
    }

    #[test]
    fn group_key_reveal_roundtrips_through_backend() {
        let asset_id = AssetID::hash(b"grouped asset");
        let reveal = GroupKeyReveal {
            raw_group_key: keypair(9).into(),
            tapscript_root: None,
        };
        let tweaked = group_pubkey_from_reveal(&reveal, &asset_id).unwrap();
        assert_ne!(tweaked, reveal.raw_group_key);

        let with_root = GroupKeyReveal {
            tapscript_root: Some([1u8; 32]),
            ..reveal
        };
        assert_ne!(group_pubkey_from_reveal(&with_root, &asset_id).unwrap(), tweaked);
    }
}
