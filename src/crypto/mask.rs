//! Mask generation.
//!
//! A mask is `len` words of a BLAKE3 XOF stream keyed by a domain-separated
//! derivation of the input secret, read as little-endian u64. Regenerating from
//! the same secret reproduces the mask bit for bit, which is what lets the server
//! cancel masks at unmask time without ever receiving them.

use alloc::vec::Vec;
use core::fmt;
use zeroize::Zeroizing;
use crate::entropy::EntropySource;
use super::{CryptoError, KEY_LEN, SharedSecret};

const PAIRWISE_CONTEXT: &str = "secagg-engine 2024 pairwise mask";
const SELF_CONTEXT: &str = "secagg-engine 2024 self mask";

/// A client's per-run seed for its self-mask.
#[derive(Clone)]
pub struct Seed(Zeroizing<[u8; KEY_LEN]>);

impl Seed {
    /// Draws a fresh seed.
    pub fn generate<R: EntropySource + ?Sized>(rng: &mut R) -> Result<Self, CryptoError> {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        rng.fill(&mut *bytes).map_err(|_| CryptoError::RngFailure)?;
        Ok(Seed(bytes))
    }

    /// Rebuilds a seed from reconstructed bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::MalformedPayload);
        }
        let mut seed = Zeroizing::new([0u8; KEY_LEN]);
        seed.copy_from_slice(bytes);
        Ok(Seed(seed))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(***SENSITIVE***)")
    }
}

/// Expands a pairwise DH secret into a mask of `len` words.
pub fn expand_from_key(secret: &SharedSecret, len: usize) -> Vec<u64> {
    expand(PAIRWISE_CONTEXT, secret.as_bytes(), len)
}

/// Expands a seed into a self-mask of `len` words.
pub fn expand_from_seed(seed: &Seed, len: usize) -> Vec<u64> {
    expand(SELF_CONTEXT, seed.as_bytes(), len)
}

fn expand(context: &str, material: &[u8; KEY_LEN], len: usize) -> Vec<u64> {
    let key = Zeroizing::new(blake3::derive_key(context, material));
    let mut reader = blake3::Hasher::new_keyed(&key).finalize_xof();

    let mut word = [0u8; 8];
    (0..len)
        .map(|_| {
            reader.fill(&mut word);
            u64::from_le_bytes(word)
        })
        .collect()
}
