use alloc::vec::Vec;
use bitcoin::hashes::{sha256::Hash as Sha256Hash, Hash, HashEngine};
use core::fmt;
use serde::{Deserialize, Serialize};

use super::{Proof, MAX_PROOF_SIZE};
use crate::error::Error;
use crate::tlv::{encode_bigsize, encode_var_bytes, read_array, read_bigsize, read_u32_be, read_var_bytes};

/// Magic prefix of an encoded proof file.
pub(crate) const FILE_MAGIC: [u8; 4] = *b"TAPF";

/// Upper bound on the number of proofs in a single file.
pub const MAX_FILE_PROOFS: u64 = 420_000;

/// The version of a proof file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileVersion(pub u32);

impl FileVersion {
    pub const V0: FileVersion = FileVersion(0);

    pub fn is_known(self) -> bool {
        self == Self::V0
    }
}

impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An encoded proof together with its position in the file's hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashedProof {
    pub proof_bytes: Vec<u8>,
    /// sha256(previous hash || proof_bytes)
    pub hash: [u8; 32],
}

impl HashedProof {
    fn chained(prev_hash: &[u8; 32], proof_bytes: Vec<u8>) -> Self {
        let mut engine = Sha256Hash::engine();
        engine.input(prev_hash);
        engine.input(&proof_bytes);
        HashedProof {
            hash: Sha256Hash::from_engine(engine).to_byte_array(),
            proof_bytes,
        }
    }
}

/// The full provenance of an asset: every state transition from genesis to
/// its current location, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub version: FileVersion,
    proofs: Vec<HashedProof>,
}

impl File {
    pub fn new(version: FileVersion, proofs: &[Proof]) -> Self {
        Self::from_raw_proofs(version, proofs.iter().map(Proof::encode).collect())
    }

    /// Builds a file from already encoded proofs.
    pub fn from_raw_proofs(version: FileVersion, raw_proofs: Vec<Vec<u8>>) -> Self {
        let mut file = File {
            version,
            proofs: Vec::with_capacity(raw_proofs.len()),
        };
        for proof_bytes in raw_proofs {
            file.push_raw(proof_bytes);
        }
        file
    }

    fn push_raw(&mut self, proof_bytes: Vec<u8>) {
        let prev_hash = self.proofs.last().map(|p| p.hash).unwrap_or([0u8; 32]);
        self.proofs.push(HashedProof::chained(&prev_hash, proof_bytes));
    }

    fn ensure_known_version(&self) -> Result<(), Error> {
        if self.version.is_known() {
            Ok(())
        } else {
            Err(Error::UnknownVersion(self.version.0))
        }
    }

    pub fn is_unknown_version(&self) -> bool {
        !self.version.is_known()
    }

    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }

    pub fn num_proofs(&self) -> usize {
        self.proofs.len()
    }

    pub fn proofs(&self) -> &[HashedProof] {
        &self.proofs
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = FILE_MAGIC.to_vec();
        out.extend_from_slice(&self.version.0.to_be_bytes());
        encode_bigsize(self.proofs.len() as u64, &mut out);
        for proof in &self.proofs {
            encode_var_bytes(&proof.proof_bytes, &mut out);
            out.extend_from_slice(&proof.hash);
        }
        out
    }

    /// Decodes a file and checks its hash chain. Individual proofs are left
    /// encoded until they are requested.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let body = bytes
            .strip_prefix(&FILE_MAGIC)
            .ok_or(Error::InvalidMagic { expected: "TAPF" })?;
        let mut r = body;

        let version = FileVersion(read_u32_be(&mut r)?);
        let num_proofs = read_bigsize(&mut r)?;
        if num_proofs > MAX_FILE_PROOFS {
            return Err(Error::TlvStream(alloc::format!(
                "proof file claims {} proofs, maximum is {}",
                num_proofs,
                MAX_FILE_PROOFS
            )));
        }

        let mut proofs: Vec<HashedProof> = Vec::new();
        for index in 0..num_proofs as usize {
            let proof_bytes = read_var_bytes(&mut r, MAX_PROOF_SIZE)?;
            let hash: [u8; 32] = read_array(&mut r)?;
            let prev_hash = proofs.last().map(|p| p.hash).unwrap_or([0u8; 32]);
            let expected = HashedProof::chained(&prev_hash, proof_bytes);
            if expected.hash != hash {
                return Err(Error::ChecksumMismatch { index });
            }
            proofs.push(expected);
        }

        if !r.is_empty() {
            return Err(Error::TlvStream(alloc::format!(
                "{} trailing bytes after proof file",
                r.len()
            )));
        }

        Ok(File { version, proofs })
    }

    /// Decodes a file nested as an additional input, eagerly validating
    /// every proof in it.
    pub(crate) fn decode_nested(bytes: &[u8], depth: usize) -> Result<Self, Error> {
        let file = Self::decode(bytes)?;
        for hashed in &file.proofs {
            Proof::decode_at_depth(&hashed.proof_bytes, depth)?;
        }
        Ok(file)
    }

    pub fn raw_proof_at(&self, index: usize) -> Result<&[u8], Error> {
        self.ensure_known_version()?;
        self.proofs
            .get(index)
            .map(|p| p.proof_bytes.as_slice())
            .ok_or(Error::ProofIndexOutOfRange {
                index,
                len: self.proofs.len(),
            })
    }

    pub fn proof_at(&self, index: usize) -> Result<Proof, Error> {
        Proof::decode(self.raw_proof_at(index)?)
    }

    pub fn raw_last_proof(&self) -> Result<&[u8], Error> {
        self.ensure_known_version()?;
        self.proofs
            .last()
            .map(|p| p.proof_bytes.as_slice())
            .ok_or(Error::NoProofAvailable)
    }

    pub fn last_proof(&self) -> Result<Proof, Error> {
        Proof::decode(self.raw_last_proof()?)
    }

    /// Returns the index and proof of the first proof matching `predicate`.
    pub fn locate_proof<F>(&self, mut predicate: F) -> Result<(usize, Proof), Error>
    where
        F: FnMut(&Proof) -> bool,
    {
        self.ensure_known_version()?;
        for (index, hashed) in self.proofs.iter().enumerate() {
            let proof = Proof::decode(&hashed.proof_bytes)?;
            if predicate(&proof) {
                return Ok((index, proof));
            }
        }
        Err(Error::ProofNotFound)
    }

    /// Appends `proof`, which must spend the anchor output of the current
    /// last proof.
    pub fn append_proof(&mut self, proof: &Proof) -> Result<(), Error> {
        self.ensure_known_version()?;
        if !proof.version.is_known() {
            return Err(Error::UnknownVersion(proof.version.0));
        }
        if !self.proofs.is_empty() {
            let last = self.last_proof()?;
            if proof.prev_out != last.out_point() {
                return Err(Error::PrevOutMismatch);
            }
        }
        self.push_raw(proof.encode());
        Ok(())
    }

    /// Decodes `proof_bytes` and appends it with [`File::append_proof`].
    pub fn append_proof_raw(&mut self, proof_bytes: &[u8]) -> Result<(), Error> {
        let proof = Proof::decode(proof_bytes)?;
        self.append_proof(&proof)
    }

    /// Overwrites the proof at `index` and re-chains the hashes after it.
    pub fn replace_proof_at(&mut self, index: usize, proof: &Proof) -> Result<(), Error> {
        self.ensure_known_version()?;
        if !proof.version.is_known() {
            return Err(Error::UnknownVersion(proof.version.0));
        }
        if index >= self.proofs.len() {
            return Err(Error::ProofIndexOutOfRange {
                index,
                len: self.proofs.len(),
            });
        }

        let mut raw: Vec<Vec<u8>> = self
            .proofs
            .drain(index..)
            .map(|p| p.proof_bytes)
            .collect();
        raw[0] = proof.encode();
        for proof_bytes in raw {
            self.push_raw(proof_bytes);
        }
        Ok(())
    }

    pub fn replace_last_proof(&mut self, proof: &Proof) -> Result<(), Error> {
        self.ensure_known_version()?;
        match self.proofs.len() {
            0 => Err(Error::NoProofAvailable),
            len => self.replace_proof_at(len - 1, proof),
        }
    }
}
