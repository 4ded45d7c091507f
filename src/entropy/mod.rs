//! Randomness sources.
//!
//! Every random value the protocol consumes (key pairs, seeds, Shamir
//! coefficients, AEAD nonces) is drawn through [`EntropySource`], so a run can be
//! driven either by the operating system or, in tests and simulations, by a
//! reproducible stream.
//!
//! - `os`: `OsEntropy`, backed by the platform CSPRNG (`std` only).
//! - `deterministic`: `DeterministicSource`, a BLAKE3 XOF stream from a fixed seed.

#[cfg(feature = "std")]
pub mod os;
pub mod deterministic;

use core::fmt;

#[cfg(feature = "std")]
pub use os::OsEntropy;
pub use deterministic::DeterministicSource;

/// Error types for entropy collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyError {
    /// The underlying generator failed to produce bytes.
    CollectionFailed,
}

impl fmt::Display for EntropyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntropyError::CollectionFailed => write!(f, "Entropy collection failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EntropyError {}

/// A trait for entropy sources.
pub trait EntropySource {
    /// Returns a unique identifier for the source.
    fn name(&self) -> &'static str;

    /// Fills `dest` with random bytes from the source.
    fn fill(&mut self, dest: &mut [u8]) -> Result<(), EntropyError>;
}
