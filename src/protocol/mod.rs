//! Protocol Layer.
//!
//! The four-round secure aggregation protocol:
//! - `client`: the per-client round engine.
//! - `server`: relay, live-set tracking, reconstruction and the final sum.
//! - `rendezvous`: the write-once per-round collection barrier the server uses.
//! - `messaging`: wire messages and positional broadcasts.
//! - `state_machine`: round ids and client/server states.
//! - `identity`: participant identities and their total order.
//! - `session`: an in-process driver running every party through a full run.

pub mod client;
pub mod identity;
pub mod messaging;
pub mod rendezvous;
pub mod server;
pub mod session;
pub mod state_machine;

use core::fmt;
use crate::config::ConfigError;
use crate::crypto::CryptoError;
use crate::mpc::MpcError;

pub use client::ClientRoundEngine;
pub use identity::ClientId;
pub use server::ServerCoordinator;

/// Errors related to protocol execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Operation cannot be performed in the current state.
    InvalidState,
    /// Fewer than `t` shares reached a required reconstruction. No sum is released.
    InsufficientShares,
    /// A live set fell below the threshold at a round boundary.
    InsufficientParticipants,
    /// A share bundle failed authenticated decryption.
    DecryptionFailure,
    /// A message names an identity outside the current round's live set.
    UnexpectedParticipant,
    /// A second submission for a round already answered by this client.
    DuplicateSubmission,
    /// Submission for a round whose collection window is closed.
    RoundClosed,
    /// Message has the wrong shape for its round (length, addressing, slots).
    MalformedMessage,
    /// A disclosed share is of the class the live set does not call for.
    WrongSecretClass,
    /// A reconstructed key does not match the key its owner advertised.
    IntegrityFailure,
    /// `t` is above the participant count (or below 2).
    ThresholdViolation,
    /// Other configuration problem.
    Config(ConfigError),
    /// Other cryptographic failure.
    Crypto(CryptoError),
    /// Other secret-sharing failure.
    Mpc(MpcError),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidState => write!(f, "Invalid state for this operation"),
            ProtocolError::InsufficientShares => write!(f, "Insufficient shares to reconstruct"),
            ProtocolError::InsufficientParticipants => write!(f, "Live set below threshold"),
            ProtocolError::DecryptionFailure => write!(f, "Share bundle decryption failed"),
            ProtocolError::UnexpectedParticipant => write!(f, "Unexpected participant"),
            ProtocolError::DuplicateSubmission => write!(f, "Duplicate submission"),
            ProtocolError::RoundClosed => write!(f, "Round already closed"),
            ProtocolError::MalformedMessage => write!(f, "Malformed message"),
            ProtocolError::WrongSecretClass => write!(f, "Share of the wrong secret class"),
            ProtocolError::IntegrityFailure => write!(f, "Reconstructed key does not match roster"),
            ProtocolError::ThresholdViolation => write!(f, "Threshold exceeds participant count"),
            ProtocolError::Config(e) => write!(f, "Configuration error: {}", e),
            ProtocolError::Crypto(e) => write!(f, "Cryptographic error: {}", e),
            ProtocolError::Mpc(e) => write!(f, "Secret sharing error: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ProtocolError {}

impl From<ConfigError> for ProtocolError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::ThresholdViolation => ProtocolError::ThresholdViolation,
            other => ProtocolError::Config(other),
        }
    }
}

impl From<CryptoError> for ProtocolError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::DecryptionFailure => ProtocolError::DecryptionFailure,
            other => ProtocolError::Crypto(other),
        }
    }
}

impl From<MpcError> for ProtocolError {
    fn from(e: MpcError) -> Self {
        match e {
            MpcError::InsufficientShares => ProtocolError::InsufficientShares,
            other => ProtocolError::Mpc(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert_eq!(ProtocolError::from(ConfigError::ThresholdViolation), ProtocolError::ThresholdViolation);
        assert_eq!(ProtocolError::from(ConfigError::EmptyVector), ProtocolError::Config(ConfigError::EmptyVector));
        assert_eq!(ProtocolError::from(CryptoError::DecryptionFailure), ProtocolError::DecryptionFailure);
        assert_eq!(ProtocolError::from(MpcError::InsufficientShares), ProtocolError::InsufficientShares);
        assert_eq!(ProtocolError::from(MpcError::DuplicateShareIndex), ProtocolError::Mpc(MpcError::DuplicateShareIndex));
    }
}
