//! Secret share definition.
//!
//! A share is a point $(x, y)$ on the polynomials hiding a secret:
//! - $x$ (identifier): the recipient's non-zero x-coordinate.
//! - $y$ (value): one evaluation per secret byte.
//!
//! Each client splits two unrelated secrets per run, and the server must never
//! interpolate shares of one with shares of the other. [`SecretShare`] carries
//! the class in the type so the two can only be combined after an explicit
//! match.
//!
//! # Security
//! - `Share` is `ZeroizeOnDrop`.
//! - `Debug` redacts the value.

use alloc::vec::Vec;
use core::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};
use super::MpcError;

/// A share of a secret.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Share {
    /// The x-coordinate (1..=255). Public.
    #[zeroize(skip)]
    pub identifier: u8,

    /// The y-coordinates, one per byte of the secret.
    pub value: Vec<u8>,
}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("identifier", &self.identifier)
            .field("length", &self.value.len())
            .field("value", &"***SENSITIVE***")
            .finish()
    }
}

impl Share {
    /// Creates a new share, rejecting the zero x-coordinate and empty values.
    pub fn new(identifier: u8, value: Vec<u8>) -> Result<Self, MpcError> {
        if identifier == 0 {
            return Err(MpcError::InvalidShareIndex);
        }
        if value.is_empty() {
            return Err(MpcError::EmptyShare);
        }
        Ok(Self { identifier, value })
    }

    /// Returns a reference to the value bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// The two kinds of per-client secret that get split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SecretClass {
    /// The private half of the client's agreement key pair.
    AgreementKey,
    /// The seed the client's self-mask is expanded from.
    Seed,
}

impl fmt::Display for SecretClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretClass::AgreementKey => write!(f, "agreement-key"),
            SecretClass::Seed => write!(f, "seed"),
        }
    }
}

/// A share tagged with the class of secret it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SecretShare {
    AgreementKey(Share),
    Seed(Share),
}

impl SecretShare {
    pub fn class(&self) -> SecretClass {
        match self {
            SecretShare::AgreementKey(_) => SecretClass::AgreementKey,
            SecretShare::Seed(_) => SecretClass::Seed,
        }
    }

    pub fn share(&self) -> &Share {
        match self {
            SecretShare::AgreementKey(s) | SecretShare::Seed(s) => s,
        }
    }

    /// Returns the inner share if it belongs to `class`.
    pub fn as_class(&self, class: SecretClass) -> Option<&Share> {
        (self.class() == class).then(|| self.share())
    }
}
