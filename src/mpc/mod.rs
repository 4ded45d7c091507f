//! Threshold secret sharing.
//!
//! Shamir's scheme over GF(256), applied byte-wise: each secret byte is the
//! constant term of an independent random polynomial of degree `t - 1`, and a
//! share is that polynomial family evaluated at one non-zero x-coordinate.
//!
//! # Components
//! - `share`: `Share`, plus the class tag (`SecretShare`) separating agreement-key
//!   shares from seed shares.
//! - `quorum`: splitting a secret towards a fixed set of x-coordinates.
//! - `reconstruct`: Lagrange interpolation at zero.
//!
//! # Security
//! - Any `t - 1` shares are uniformly distributed and independent of the secret.
//! - Shares and polynomial coefficients are zeroized on drop.

pub mod share;
pub mod quorum;
pub mod reconstruct;
pub(crate) mod polynomial;

use core::fmt;

pub use share::{SecretClass, SecretShare, Share};

/// Errors for secret sharing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpcError {
    /// Invalid share index (must be 1..=255).
    InvalidShareIndex,
    /// Secret or share value is empty.
    EmptyShare,
    /// Threshold configuration error (k > n or k < 2).
    InvalidThreshold,
    /// Not enough shares to reconstruct.
    InsufficientShares,
    /// Duplicate share indices provided.
    DuplicateShareIndex,
    /// Mismatch in share lengths.
    ShareLengthMismatch,
    /// Random number generator failure.
    RngFailure,
}

impl fmt::Display for MpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MpcError::InvalidShareIndex => write!(f, "Invalid share index"),
            MpcError::EmptyShare => write!(f, "Empty secret or share"),
            MpcError::InvalidThreshold => write!(f, "Invalid threshold"),
            MpcError::InsufficientShares => write!(f, "Insufficient shares to reconstruct"),
            MpcError::DuplicateShareIndex => write!(f, "Duplicate share index"),
            MpcError::ShareLengthMismatch => write!(f, "Share length mismatch"),
            MpcError::RngFailure => write!(f, "Randomness failure while splitting"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MpcError {}
