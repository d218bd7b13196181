use taproot_assets_types::proof::File;

use crate::TaprootOps;
use crate::verify::proof::{AssetSnapshot, ProofVerifier};
use crate::verify::Error;

impl<O: TaprootOps> ProofVerifier<'_, O> {
    /// Verifies every proof of `file` in order, each against the snapshot
    /// of its predecessor, and returns the snapshot of the last one.
    ///
    /// The first failure aborts the walk; nothing is returned for the
    /// proofs that passed before it.
    pub fn verify_file(&self, file: &File) -> Result<AssetSnapshot, Error> {
        self.verify_file_at_depth(file, 0)
    }

    pub(crate) fn verify_file_at_depth(
        &self,
        file: &File,
        depth: usize,
    ) -> Result<AssetSnapshot, Error> {
        if !file.version.is_known() {
            return Err(Error::UnknownVersion(file.version.0));
        }
        if file.is_empty() {
            return Err(Error::EmptyFile);
        }

        let mut prev: Option<AssetSnapshot> = None;
        for index in 0..file.num_proofs() {
            self.check_cancelled()?;
            let proof = file.proof_at(index)?;
            let snapshot = self
                .verify_proof_at_depth(&proof, prev.as_ref(), depth)
                .inspect_err(|err| {
                    self.logger.warn(format_args!(
                        "proof {} of {} failed at depth {}: {}",
                        index,
                        file.num_proofs(),
                        depth,
                        err
                    ))
                })?;
            prev = Some(snapshot);
        }

        self.logger.debug(format_args!(
            "verified proof file with {} proofs at depth {}",
            file.num_proofs(),
            depth
        ));
        prev.ok_or(Error::EmptyFile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OpsError;
    use crate::verify::chain::{ChainLookup, CollaboratorError};
    use alloc::vec;
    use bitcoin::Txid;
    use bitcoin::block::Header;
    use core::sync::atomic::AtomicBool;
    use taproot_assets_types::asset::SerializedKey;
    use taproot_assets_types::proof::FileVersion;

    struct NoOps;

    impl TaprootOps for NoOps {
        type PubKey = ();

        fn parse_group_key(&self, _: &SerializedKey) -> Result<(), OpsError> {
            Err(OpsError::InvalidRawGroupKey)
        }

        fn parse_internal_key(&self, _: &SerializedKey) -> Result<(), OpsError> {
            Err(OpsError::InvalidInternalKey)
        }

        fn add_tweak(&self, _: &(), _: [u8; 32]) -> Result<(), OpsError> {
            Err(OpsError::InvalidGroupKeyTweak)
        }

        fn taproot_output_key(
            &self,
            _: &(),
            _: Option<[u8; 32]>,
        ) -> Result<SerializedKey, OpsError> {
            Err(OpsError::InvalidTaprootOutputKey)
        }
    }

    struct NoChain;

    impl ChainLookup for NoChain {
        fn current_height(&self) -> Result<u32, CollaboratorError> {
            Err(CollaboratorError::new("no chain"))
        }

        fn tx_block_height(&self, _: &Txid) -> Result<u32, CollaboratorError> {
            Err(CollaboratorError::new("no chain"))
        }
    }

    fn accept_header(_: &Header, _: u32) -> Result<(), CollaboratorError> {
        Ok(())
    }

    fn accept_group(_: &SerializedKey) -> Result<(), CollaboratorError> {
        Ok(())
    }

    #[test]
    fn empty_and_unknown_files_are_rejected() {
        let verifier = ProofVerifier::new(&NoOps, &accept_header, &accept_group, &NoChain);

        let empty = File::new(FileVersion::V0, &[]);
        assert!(matches!(verifier.verify_file(&empty), Err(Error::EmptyFile)));

        let future = File::from_raw_proofs(FileVersion(7), vec![vec![0u8; 4]]);
        assert!(matches!(
            verifier.verify_file(&future),
            Err(Error::UnknownVersion(7))
        ));
    }

    #[test]
    fn undecodable_proofs_fail_the_file() {
        let verifier = ProofVerifier::new(&NoOps, &accept_header, &accept_group, &NoChain);
        let file = File::from_raw_proofs(FileVersion::V0, vec![b"TAPP\x00garbage".to_vec()]);
        assert!(matches!(verifier.verify_file(&file), Err(Error::Decode(_))));
    }

    #[test]
    fn cancelled_before_the_first_proof() {
        let cancelled = AtomicBool::new(true);
        let verifier = ProofVerifier::new(&NoOps, &accept_header, &accept_group, &NoChain)
            .with_cancel_token(&cancelled);
        let file = File::from_raw_proofs(FileVersion::V0, vec![b"TAPP".to_vec()]);
        assert!(matches!(verifier.verify_file(&file), Err(Error::Cancelled)));
    }
}
