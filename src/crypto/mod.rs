//! Cryptographic building blocks of a round.
//!
//! # Components
//! - `key_agreement`: X25519 key pairs and the commutative `agree`.
//! - `mask`: BLAKE3 XOF expansion of pairwise secrets and seeds into mask vectors.
//! - `share_encrypt`: sealing a peer's share bundle under the encryption-pair DH key.
//!
//! # Security
//! - Private keys, seeds and shared secrets are zeroized on drop.
//! - `Debug` never prints secret material; public keys print as short hex fingerprints.

pub mod key_agreement;
pub mod mask;
pub mod share_encrypt;

use core::fmt;

pub use key_agreement::{agree, generate_key_pair, public_of, KeyPair, PublicKey, SharedSecret};
pub use mask::{expand_from_key, expand_from_seed, Seed};
pub use share_encrypt::{SealedBundle, ShareBundle};

/// Length of every key, seed and shared secret in bytes.
pub const KEY_LEN: usize = 32;

/// Errors raised by key agreement, masking and sealing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// Randomness could not be drawn.
    RngFailure,
    /// AEAD encryption failed.
    EncryptionError,
    /// AEAD authentication failed; no plaintext is released.
    DecryptionFailure,
    /// A decrypted bundle or key has the wrong shape.
    MalformedPayload,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::RngFailure => write!(f, "Randomness failure"),
            CryptoError::EncryptionError => write!(f, "Encryption failed"),
            CryptoError::DecryptionFailure => write!(f, "Decryption failed"),
            CryptoError::MalformedPayload => write!(f, "Malformed payload"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CryptoError {}
