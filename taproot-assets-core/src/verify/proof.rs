//! Proof-level verification.
//!
//! [`ProofVerifier::verify_proof`] walks one state transition through the
//! anchor, genesis, inclusion, exclusion, split and transition checks and
//! returns the [`AssetSnapshot`] the proof establishes. Proof files are
//! folded over it in [`super::file`].

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec;
use alloc::vec::Vec;

use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, OutPoint, Transaction, Txid, Witness};
use serde::{Deserialize, Serialize};
use taproot_assets_types::asset::{Asset, NUMS_KEY, PrevId, PrevWitness, SerializedKey};
use taproot_assets_types::commitment::TapscriptPreimage;
use taproot_assets_types::proof::{MAX_ADDITIONAL_INPUTS_DEPTH, MetaReveal, Proof};

use crate::TaprootOps;
use crate::commitment::{TapCommitmentRoot, is_similar_tap_commitment_version, verify_split_asset};
use crate::logger::{Logger, NoopLogger};
use crate::verify::chain::{
    CancelToken, ChainLookup, GroupVerifier, HeaderVerifier, TxValidator,
};
use crate::verify::tx::{self, BitcoinMerkleVerifier, MerkleVerifier};
use crate::verify::{Error as VerifyError, group_key_reveal, taproot_proof};

/// Proof verification stage used for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofStage {
    /// Inclusion proof verification stage.
    Inclusion,
    /// Exclusion proof verification stage.
    Exclusion,
    /// Split root proof verification stage.
    SplitRoot,
}

impl core::fmt::Display for ProofStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProofStage::Inclusion => write!(f, "inclusion"),
            ProofStage::Exclusion => write!(f, "exclusion"),
            ProofStage::SplitRoot => write!(f, "split_root"),
        }
    }
}

/// Errors returned by proof verification helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Taproot proof verification failed at a specific stage.
    TaprootProof {
        /// Stage where verification failed.
        stage: ProofStage,
        /// Underlying taproot proof error.
        source: taproot_proof::Error,
    },
    /// The proof does not spend the previous proof's anchor output.
    PrevOutMismatch,
    /// Genesis reveal is present for a non-genesis asset.
    NonGenesisAssetWithGenesisReveal,
    /// Meta reveal is present for a non-genesis asset.
    NonGenesisAssetWithMetaReveal,
    /// Genesis reveal is required for a genesis asset.
    GenesisRevealRequired,
    /// Genesis reveal prev out does not match the proof prev out.
    GenesisRevealPrevOutMismatch,
    /// Genesis reveal output index does not match the inclusion proof.
    GenesisRevealOutputIndexMismatch,
    /// Genesis reveal asset ID does not match the asset genesis.
    GenesisRevealAssetIdMismatch,
    /// The genesis commits to metadata but no meta reveal was given.
    MetaRevealRequired,
    /// The meta reveal does not hash to the genesis meta hash.
    MetaRevealMismatch,
    /// An exclusion proof names the inclusion output or a non-taproot
    /// output, or repeats an output.
    UnexpectedExclusionProof {
        /// Output the proof was made for.
        output_index: u32,
    },
    /// A taproot output of the anchor transaction has no exclusion proof.
    MissingExclusionProof {
        /// Output lacking a proof.
        output_index: u32,
    },
    /// Mixed TapCommitment versions found across proofs.
    MixedCommitmentVersions,
    /// Split root proof is missing for a split commitment asset.
    MissingSplitRootProof,
    /// The split asset is not committed to by its root asset's split tree.
    InvalidSplitCommitmentProof,
    /// A non-genesis asset was verified without the previous snapshot.
    MissingPrevSnapshot,
    /// A witness is missing its PrevID.
    MissingPrevId,
    /// A witness spends an asset that none of the inputs provide.
    MissingPrevAsset,
    /// Two witnesses spend the same input.
    DuplicatePrevId,
    /// No witness spends the asset of the previous snapshot.
    PrevSnapshotNotSpent,
    /// A spent input belongs to a different asset.
    PrevAssetMismatch,
    /// The transition creates or destroys value.
    AmountNotConserved {
        /// Total value of the spent inputs.
        expected: u64,
        /// Value committed to by the new asset.
        actual: u64,
    },
    /// A witness needs validating but no validator was configured.
    MissingTxValidator,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::TaprootProof { stage, source } => {
                write!(f, "taproot proof {} error: {}", stage, source)
            }
            Error::PrevOutMismatch => write!(f, "prev out mismatch"),
            Error::NonGenesisAssetWithGenesisReveal => {
                write!(f, "non-genesis asset with genesis reveal")
            }
            Error::NonGenesisAssetWithMetaReveal => write!(f, "non-genesis asset with meta reveal"),
            Error::GenesisRevealRequired => write!(f, "genesis reveal required"),
            Error::GenesisRevealPrevOutMismatch => write!(f, "genesis reveal prev out mismatch"),
            Error::GenesisRevealOutputIndexMismatch => {
                write!(f, "genesis reveal output index mismatch")
            }
            Error::GenesisRevealAssetIdMismatch => write!(f, "genesis reveal asset id mismatch"),
            Error::MetaRevealRequired => write!(f, "meta reveal required"),
            Error::MetaRevealMismatch => write!(f, "meta reveal hash mismatch"),
            Error::UnexpectedExclusionProof { output_index } => {
                write!(f, "unexpected exclusion proof for output {}", output_index)
            }
            Error::MissingExclusionProof { output_index } => {
                write!(f, "missing exclusion proof for output {}", output_index)
            }
            Error::MixedCommitmentVersions => write!(f, "mixed commitment versions"),
            Error::MissingSplitRootProof => write!(f, "missing split root proof"),
            Error::InvalidSplitCommitmentProof => write!(f, "invalid split commitment proof"),
            Error::MissingPrevSnapshot => write!(f, "missing previous asset snapshot"),
            Error::MissingPrevId => write!(f, "witness missing PrevID"),
            Error::MissingPrevAsset => write!(f, "witness spends unknown input"),
            Error::DuplicatePrevId => write!(f, "input spent by more than one witness"),
            Error::PrevSnapshotNotSpent => write!(f, "previous asset not spent"),
            Error::PrevAssetMismatch => write!(f, "input belongs to a different asset"),
            Error::AmountNotConserved { expected, actual } => write!(
                f,
                "amount not conserved: inputs {}, outputs {}",
                expected, actual
            ),
            Error::MissingTxValidator => write!(f, "no tx validator configured"),
        }
    }
}

/// Everything a verified proof establishes about the asset it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    /// The asset as committed to by the anchor output.
    pub asset: Asset,
    /// The anchor output holding the asset.
    pub out_point: OutPoint,
    pub anchor_block_hash: BlockHash,
    pub anchor_block_height: u32,
    pub anchor_tx: Transaction,
    pub output_index: u32,
    pub internal_key: SerializedKey,
    /// The commitment root the anchor output key was matched against.
    pub script_root: TapCommitmentRoot,
    pub tapscript_sibling: Option<TapscriptPreimage>,
    /// Whether the asset is a split output rather than a transfer root.
    pub split_asset: bool,
    pub meta_reveal: Option<MetaReveal>,
}

/// Verifies proofs against the chain and group views supplied by the host.
pub struct ProofVerifier<'a, O: TaprootOps> {
    pub(crate) ops: &'a O,
    pub(crate) header_verifier: &'a dyn HeaderVerifier,
    pub(crate) group_verifier: &'a dyn GroupVerifier,
    pub(crate) chain: &'a dyn ChainLookup,
    pub(crate) merkle_verifier: &'a dyn MerkleVerifier,
    pub(crate) tx_validator: Option<&'a dyn TxValidator>,
    pub(crate) logger: &'a dyn Logger,
    pub(crate) cancel: Option<&'a dyn CancelToken>,
    pub(crate) max_nesting_depth: usize,
}

impl<'a, O: TaprootOps> ProofVerifier<'a, O> {
    pub fn new(
        ops: &'a O,
        header_verifier: &'a dyn HeaderVerifier,
        group_verifier: &'a dyn GroupVerifier,
        chain: &'a dyn ChainLookup,
    ) -> Self {
        ProofVerifier {
            ops,
            header_verifier,
            group_verifier,
            chain,
            merkle_verifier: &BitcoinMerkleVerifier,
            tx_validator: None,
            logger: &NoopLogger,
            cancel: None,
            max_nesting_depth: MAX_ADDITIONAL_INPUTS_DEPTH,
        }
    }

    pub fn with_merkle_verifier(mut self, merkle_verifier: &'a dyn MerkleVerifier) -> Self {
        self.merkle_verifier = merkle_verifier;
        self
    }

    /// Validates transfer, group genesis and challenge witnesses. Without
    /// one, transfer witnesses go unchecked and challenge witnesses fail.
    pub fn with_tx_validator(mut self, tx_validator: &'a dyn TxValidator) -> Self {
        self.tx_validator = Some(tx_validator);
        self
    }

    pub fn with_logger(mut self, logger: &'a dyn Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_cancel_token(mut self, cancel: &'a dyn CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_max_nesting_depth(mut self, max_nesting_depth: usize) -> Self {
        self.max_nesting_depth = max_nesting_depth;
        self
    }

    /// Verifies `proof` as the successor of `prev`, which must be given for
    /// every proof except a genesis proof.
    pub fn verify_proof(
        &self,
        proof: &Proof,
        prev: Option<&AssetSnapshot>,
    ) -> Result<AssetSnapshot, VerifyError> {
        self.verify_proof_at_depth(proof, prev, 0)
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), VerifyError> {
        match self.cancel {
            Some(cancel) if cancel.is_cancelled() => Err(VerifyError::Cancelled),
            _ => Ok(()),
        }
    }

    pub(crate) fn verify_proof_at_depth(
        &self,
        proof: &Proof,
        prev: Option<&AssetSnapshot>,
        depth: usize,
    ) -> Result<AssetSnapshot, VerifyError> {
        self.check_cancelled()?;
        if !proof.version.is_known() {
            return Err(VerifyError::UnknownVersion(proof.version.0));
        }
        if prev.is_some_and(|prev| prev.out_point != proof.prev_out) {
            return Err(Error::PrevOutMismatch.into());
        }

        tx::verify_anchor_tx(proof, self.merkle_verifier)?;
        self.header_verifier
            .verify_header(&proof.block_header, proof.block_height)?;

        verify_genesis_reveal(proof)?;
        self.verify_group_key(proof)?;

        let script_root = self.verify_inclusion(proof)?;
        self.verify_exclusions(proof, &script_root)?;
        self.verify_split_root(proof)?;

        if proof.asset.is_genesis_asset() {
            self.verify_genesis_group_witness(proof)?;
        } else {
            self.verify_transition(proof, prev, depth)?;
        }

        self.verify_challenge_witness(proof)?;

        self.logger.debug(format_args!(
            "verified proof for asset {} at {}",
            proof.asset.id(),
            proof.out_point()
        ));

        Ok(AssetSnapshot {
            asset: proof.asset.clone(),
            out_point: proof.out_point(),
            anchor_block_hash: proof.block_header.block_hash(),
            anchor_block_height: proof.block_height,
            anchor_tx: proof.anchor_tx.clone(),
            output_index: proof.inclusion_proof.output_index,
            internal_key: proof.inclusion_proof.internal_key,
            script_root,
            tapscript_sibling: proof
                .inclusion_proof
                .commitment_proof
                .as_ref()
                .and_then(|commitment| commitment.tap_sibling_preimage.clone()),
            split_asset: proof.asset.has_split_commitment_witness(),
            meta_reveal: proof.meta_reveal.clone(),
        })
    }

    fn verify_group_key(&self, proof: &Proof) -> Result<(), VerifyError> {
        match (&proof.group_key_reveal, &proof.asset.group_key) {
            (Some(reveal), _) => {
                group_key_reveal::verify_group_key_reveal(self.ops, &proof.asset, reveal)?;
            }
            (None, Some(group_key)) => {
                self.group_verifier
                    .verify_group_key(&group_key.group_pub_key)?;
            }
            (None, None) => {}
        }
        Ok(())
    }

    fn verify_inclusion(&self, proof: &Proof) -> Result<TapCommitmentRoot, VerifyError> {
        let stage = ProofStage::Inclusion;
        taproot_proof::verify_taproot_proof(
            self.ops,
            &proof.anchor_tx,
            &proof.inclusion_proof,
            &proof.asset,
            true,
        )
        .map_err(|source| Error::TaprootProof { stage, source })?
        .ok_or(
            Error::TaprootProof {
                stage,
                source: taproot_proof::Error::MissingCommitmentProof,
            }
            .into(),
        )
    }

    /// Every other taproot output of the anchor transaction must prove the
    /// asset absent.
    fn verify_exclusions(
        &self,
        proof: &Proof,
        inclusion_root: &TapCommitmentRoot,
    ) -> Result<(), VerifyError> {
        let mut outstanding: BTreeSet<u32> = tx::p2tr_output_indexes(&proof.anchor_tx)
            .into_iter()
            .filter(|index| *index != proof.inclusion_proof.output_index)
            .collect();

        for exclusion in &proof.exclusion_proofs {
            let output_index = exclusion.output_index;
            if !outstanding.remove(&output_index) {
                return Err(Error::UnexpectedExclusionProof { output_index }.into());
            }

            let root = taproot_proof::verify_taproot_proof(
                self.ops,
                &proof.anchor_tx,
                exclusion,
                &proof.asset,
                false,
            )
            .map_err(|source| Error::TaprootProof {
                stage: ProofStage::Exclusion,
                source,
            })?;
            if let Some(root) = root {
                if !is_similar_tap_commitment_version(inclusion_root.version, root.version) {
                    return Err(Error::MixedCommitmentVersions.into());
                }
            }
        }

        match outstanding.first() {
            Some(&output_index) => Err(Error::MissingExclusionProof { output_index }.into()),
            None => Ok(()),
        }
    }

    /// A split output must come with a proof that its root asset is
    /// anchored, and must be a leaf of that root's split tree.
    fn verify_split_root(&self, proof: &Proof) -> Result<(), VerifyError> {
        let Some(root_asset) = split_root_asset(&proof.asset) else {
            return Ok(());
        };
        let split_root_proof = proof
            .split_root_proof
            .as_ref()
            .ok_or(Error::MissingSplitRootProof)?;

        taproot_proof::verify_taproot_proof(
            self.ops,
            &proof.anchor_tx,
            split_root_proof,
            root_asset,
            true,
        )
        .map_err(|source| Error::TaprootProof {
            stage: ProofStage::SplitRoot,
            source,
        })?;

        verify_split_asset(&proof.asset, proof.inclusion_proof.output_index)
            .map_err(|_| Error::InvalidSplitCommitmentProof)?;
        Ok(())
    }

    fn verify_genesis_group_witness(&self, proof: &Proof) -> Result<(), VerifyError> {
        if !proof.asset.has_genesis_witness_for_group() {
            return Ok(());
        }
        match self.tx_validator {
            Some(validator) => {
                validator.execute(&proof.asset, &[], &BTreeMap::new(), self.chain)?;
            }
            None => self.logger.debug(format_args!(
                "no tx validator, skipping group witness of {}",
                proof.asset.id()
            )),
        }
        Ok(())
    }

    /// Matches the witnesses of the transfer against the previous snapshot
    /// and any additional inputs, then checks value conservation.
    fn verify_transition(
        &self,
        proof: &Proof,
        prev: Option<&AssetSnapshot>,
        depth: usize,
    ) -> Result<(), VerifyError> {
        let prev = prev.ok_or(Error::MissingPrevSnapshot)?;

        let mut prev_assets = BTreeMap::new();
        prev_assets.insert(
            PrevId::for_asset(prev.out_point, &prev.asset),
            prev.asset.clone(),
        );

        if !proof.additional_inputs.is_empty() {
            let next_depth = depth + 1;
            if next_depth > self.max_nesting_depth {
                return Err(VerifyError::NestingDepthExceeded {
                    max: self.max_nesting_depth,
                });
            }
            for file in &proof.additional_inputs {
                self.check_cancelled()?;
                let snapshot = self.verify_file_at_depth(file, next_depth)?;
                prev_assets.insert(
                    PrevId::for_asset(snapshot.out_point, &snapshot.asset),
                    snapshot.asset,
                );
            }
        }

        // Split outputs carry no real witnesses; the root asset does.
        let (new_asset, split_assets) = match split_root_asset(&proof.asset) {
            Some(root_asset) => (root_asset, vec![proof.asset.clone()]),
            None => (&proof.asset, Vec::new()),
        };

        let mut spent = BTreeSet::new();
        let mut expected: u64 = 0;
        for witness in &new_asset.prev_witnesses {
            let prev_id = witness.prev_id.as_ref().ok_or(Error::MissingPrevId)?;
            if !spent.insert(*prev_id) {
                return Err(Error::DuplicatePrevId.into());
            }
            let input = prev_assets.get(prev_id).ok_or(Error::MissingPrevAsset)?;
            if input.tap_commitment_key() != new_asset.tap_commitment_key() {
                return Err(Error::PrevAssetMismatch.into());
            }
            expected = expected.checked_add(input.amount).ok_or(Error::AmountNotConserved {
                expected: u64::MAX,
                actual: new_asset.amount,
            })?;
        }

        if !spent.contains(&PrevId::for_asset(prev.out_point, &prev.asset)) {
            return Err(Error::PrevSnapshotNotSpent.into());
        }

        let actual = new_asset
            .split_commitment_root
            .map_or(new_asset.amount, |root| root.sum);
        if expected != actual {
            return Err(Error::AmountNotConserved { expected, actual }.into());
        }

        match self.tx_validator {
            Some(validator) => {
                validator.execute(new_asset, &split_assets, &prev_assets, self.chain)?
            }
            None => self.logger.debug(format_args!(
                "no tx validator, skipping transfer witnesses of {}",
                new_asset.id()
            )),
        }
        Ok(())
    }

    /// An ownership proof's challenge witness must validly spend the asset
    /// to the NUMS key.
    fn verify_challenge_witness(&self, proof: &Proof) -> Result<(), VerifyError> {
        let Some(witness) = &proof.challenge_witness else {
            return Ok(());
        };
        let validator = self.tx_validator.ok_or(Error::MissingTxValidator)?;

        let (prev_id, mut ownership_asset) = create_ownership_proof_asset(&proof.asset);
        ownership_asset.prev_witnesses = vec![PrevWitness {
            prev_id: Some(prev_id),
            tx_witness: witness.clone(),
            split_commitment: None,
        }];

        let mut prev_assets = BTreeMap::new();
        prev_assets.insert(prev_id, proof.asset.clone());
        validator.execute(&ownership_asset, &[], &prev_assets, self.chain)?;
        Ok(())
    }
}

/// The root asset embedded in a split output's witness.
fn split_root_asset(asset: &Asset) -> Option<&Asset> {
    if !asset.has_split_commitment_witness() {
        return None;
    }
    asset
        .prev_witnesses
        .first()
        .and_then(|witness| witness.split_commitment.as_ref())
        .map(|split| split.root_asset.as_ref())
}

/// Builds the virtual asset that an ownership proof spends: `owned` moved to
/// the NUMS key with a single, unsigned witness spending it.
pub fn create_ownership_proof_asset(owned: &Asset) -> (PrevId, Asset) {
    let prev_id = PrevId {
        out_point: OutPoint {
            txid: Txid::all_zeros(),
            vout: 0,
        },
        asset_id: owned.id(),
        script_key: owned.script_key,
    };

    let mut output = owned.clone();
    output.script_key = NUMS_KEY;
    output.prev_witnesses = vec![PrevWitness {
        prev_id: Some(prev_id),
        tx_witness: Witness::new(),
        split_commitment: None,
    }];
    (prev_id, output)
}

/// Verifies genesis and meta reveal constraints for a proof.
pub fn verify_genesis_reveal(proof: &Proof) -> Result<(), Error> {
    if !proof.asset.is_genesis_asset() {
        if proof.genesis_reveal.is_some() {
            return Err(Error::NonGenesisAssetWithGenesisReveal);
        }
        if proof.meta_reveal.is_some() {
            return Err(Error::NonGenesisAssetWithMetaReveal);
        }
        return Ok(());
    }

    let reveal = proof
        .genesis_reveal
        .as_ref()
        .ok_or(Error::GenesisRevealRequired)?;
    if reveal.genesis_point != proof.prev_out {
        return Err(Error::GenesisRevealPrevOutMismatch);
    }
    if reveal.output_index != proof.inclusion_proof.output_index {
        return Err(Error::GenesisRevealOutputIndexMismatch);
    }
    if reveal.id() != proof.asset.id() {
        return Err(Error::GenesisRevealAssetIdMismatch);
    }

    match &proof.meta_reveal {
        Some(meta) if meta.meta_hash() != reveal.meta_hash => Err(Error::MetaRevealMismatch),
        None if reveal.meta_hash != [0u8; 32] => Err(Error::MetaRevealRequired),
        _ => Ok(()),
    }
}
