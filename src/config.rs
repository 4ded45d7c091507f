//! Run configuration.
//!
//! Fixes the participant set, the threshold and the vector dimension for one
//! aggregation run. Every client and the server must be built from the same
//! configuration; slot numbers and Shamir x-coordinates are derived from it.

use alloc::vec::Vec;
use core::fmt;
use core::time::Duration;
use crate::protocol::identity::ClientId;

/// Default collection window per round.
pub const DEFAULT_ROUND_TIMEOUT_SECS: u64 = 30;

/// GF(256) offers 255 non-zero x-coordinates.
pub const MAX_PARTICIPANTS: usize = 255;

/// Errors detected while validating a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Threshold is above the participant count or below 2.
    ///
    /// `t >= 2` is a confidentiality floor: with `t = 1` every share equals the
    /// secret, so any single holder learns a peer's seed or agreement key.
    ThresholdViolation,
    /// Fewer than two participants.
    TooFewParticipants,
    /// More participants than available share indices.
    TooManyParticipants,
    /// The same identity appears twice.
    DuplicateParticipant,
    /// Vector dimension is zero.
    EmptyVector,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ThresholdViolation => write!(f, "Threshold must satisfy 2 <= t <= n"),
            ConfigError::TooFewParticipants => write!(f, "At least two participants are required"),
            ConfigError::TooManyParticipants => write!(f, "At most 255 participants are supported"),
            ConfigError::DuplicateParticipant => write!(f, "Duplicate participant identity"),
            ConfigError::EmptyVector => write!(f, "Vector dimension must be non-zero"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

/// Parameters of one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationConfig {
    /// Participants in `ClientId` order. A participant's position is its slot.
    participants: Vec<ClientId>,
    threshold: u8,
    vector_len: usize,
    round_timeout: Option<Duration>,
}

impl AggregationConfig {
    /// Validates and builds a configuration. Participants are sorted.
    ///
    /// # Errors
    /// `ThresholdViolation` if `threshold > n` or `threshold < 2`, plus the
    /// participant-set and dimension checks of [`ConfigError`].
    pub fn new<I>(participants: I, threshold: u8, vector_len: usize) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = ClientId>,
    {
        let mut participants: Vec<ClientId> = participants.into_iter().collect();
        participants.sort();

        if participants.windows(2).any(|w| w[0] == w[1]) {
            return Err(ConfigError::DuplicateParticipant);
        }
        if participants.len() < 2 {
            return Err(ConfigError::TooFewParticipants);
        }
        if participants.len() > MAX_PARTICIPANTS {
            return Err(ConfigError::TooManyParticipants);
        }
        if threshold < 2 || threshold as usize > participants.len() {
            log::error!(
                "Rejecting threshold {} for {} participants",
                threshold,
                participants.len()
            );
            return Err(ConfigError::ThresholdViolation);
        }
        if vector_len == 0 {
            return Err(ConfigError::EmptyVector);
        }

        Ok(Self {
            participants,
            threshold,
            vector_len,
            round_timeout: Some(Duration::from_secs(DEFAULT_ROUND_TIMEOUT_SECS)),
        })
    }

    /// Replaces the per-round collection window.
    pub fn with_round_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.round_timeout = timeout;
        self
    }

    pub fn participants(&self) -> &[ClientId] {
        &self.participants
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn vector_len(&self) -> usize {
        self.vector_len
    }

    /// How long the server keeps each round open. `None` leaves closing entirely
    /// to the caller.
    pub fn round_timeout(&self) -> Option<Duration> {
        self.round_timeout
    }

    /// Position of `id` in the participant list.
    pub fn slot_of(&self, id: &ClientId) -> Option<usize> {
        self.participants.binary_search(id).ok()
    }

    pub fn participant_at(&self, slot: usize) -> Option<&ClientId> {
        self.participants.get(slot)
    }

    /// Shamir x-coordinate of `id`: its slot plus one.
    pub fn share_index(&self, id: &ClientId) -> Option<u8> {
        self.slot_of(id).map(|slot| (slot + 1) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<ClientId> {
        names.iter().map(|n| ClientId::from(*n)).collect()
    }

    #[test]
    fn test_sorted_slots() {
        let cfg = AggregationConfig::new(ids(&["carol", "alice", "bob"]), 2, 4).unwrap();
        assert_eq!(cfg.participants(), &ids(&["alice", "bob", "carol"])[..]);
        assert_eq!(cfg.slot_of(&ClientId::from("bob")), Some(1));
        assert_eq!(cfg.share_index(&ClientId::from("carol")), Some(3));
        assert_eq!(cfg.share_index(&ClientId::from("mallory")), None);
        assert_eq!(cfg.participant_at(0), Some(&ClientId::from("alice")));
    }

    #[test]
    fn test_threshold_violation() {
        assert_eq!(
            AggregationConfig::new(ids(&["a", "b", "c"]), 4, 1),
            Err(ConfigError::ThresholdViolation)
        );
        // A single share would hand its holder the whole secret.
        assert_eq!(
            AggregationConfig::new(ids(&["a", "b", "c"]), 1, 1),
            Err(ConfigError::ThresholdViolation)
        );
        assert!(AggregationConfig::new(ids(&["a", "b", "c"]), 2, 1).is_ok());
    }

    #[test]
    fn test_participant_set_checks() {
        assert_eq!(
            AggregationConfig::new(ids(&["a", "b", "a"]), 2, 1),
            Err(ConfigError::DuplicateParticipant)
        );
        assert_eq!(
            AggregationConfig::new(ids(&["a"]), 2, 1),
            Err(ConfigError::TooFewParticipants)
        );
        let many: Vec<ClientId> = (0..256).map(|i| ClientId::new(alloc::format!("c{:03}", i))).collect();
        assert_eq!(AggregationConfig::new(many, 2, 1), Err(ConfigError::TooManyParticipants));
        assert_eq!(
            AggregationConfig::new(ids(&["a", "b"]), 2, 0),
            Err(ConfigError::EmptyVector)
        );
    }

    #[test]
    fn test_timeout_override() {
        let cfg = AggregationConfig::new(ids(&["a", "b"]), 2, 1).unwrap();
        assert_eq!(cfg.round_timeout(), Some(Duration::from_secs(DEFAULT_ROUND_TIMEOUT_SECS)));
        let cfg = cfg.with_round_timeout(Some(Duration::from_secs(5)));
        assert_eq!(cfg.round_timeout(), Some(Duration::from_secs(5)));
        let cfg = cfg.with_round_timeout(None);
        assert_eq!(cfg.round_timeout(), None);
    }
}
