//! Round and state bookkeeping.
//!
//! Strictly ordered: a client may only run round `k` from the state that round
//! `k - 1` left it in, and a failing round moves it to `Aborted`, from which
//! nothing is reachable.
//!
//! # Client states
//! - **Init**: nothing generated yet.
//! - **KeysAdvertised**: both key pairs exist, public halves sent.
//! - **SharesSent**: seed generated, shares sealed and sent.
//! - **InputMasked**: masked input sent.
//! - **Unmasked**: disclosures sent, secrets destroyed. Terminal.
//! - **Aborted**: the run failed locally. Terminal.
//!
//! A client that simply stops talking is "dropped" from the server's point of
//! view; no client-side state models that.

use core::fmt;
use super::ProtocolError;

/// The four rounds, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RoundId {
    /// 0. Public keys are collected and broadcast as the roster.
    AdvertiseKeys,
    /// 1. Sealed share bundles are relayed between peers.
    ShareKeys,
    /// 2. Masked inputs are collected; the live set is announced.
    MaskedInputCollection,
    /// 3. Shares are disclosed and the sum is recovered.
    Unmasking,
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundId::AdvertiseKeys => write!(f, "round 0 (advertise-keys)"),
            RoundId::ShareKeys => write!(f, "round 1 (share-keys)"),
            RoundId::MaskedInputCollection => write!(f, "round 2 (masked-input)"),
            RoundId::Unmasking => write!(f, "round 3 (unmasking)"),
        }
    }
}

/// Client-side protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Init,
    KeysAdvertised,
    SharesSent,
    InputMasked,
    Unmasked,
    Aborted,
}

impl ClientState {
    /// The round a client in this state runs next.
    pub fn pending_round(&self) -> Option<RoundId> {
        match self {
            ClientState::Init => Some(RoundId::AdvertiseKeys),
            ClientState::KeysAdvertised => Some(RoundId::ShareKeys),
            ClientState::SharesSent => Some(RoundId::MaskedInputCollection),
            ClientState::InputMasked => Some(RoundId::Unmasking),
            ClientState::Unmasked | ClientState::Aborted => None,
        }
    }

    /// State reached once `round` completes.
    pub fn after(round: RoundId) -> Self {
        match round {
            RoundId::AdvertiseKeys => ClientState::KeysAdvertised,
            RoundId::ShareKeys => ClientState::SharesSent,
            RoundId::MaskedInputCollection => ClientState::InputMasked,
            RoundId::Unmasking => ClientState::Unmasked,
        }
    }
}

/// Tracks one client's state and enforces round order.
#[derive(Debug)]
pub struct ClientStateMachine {
    current: ClientState,
}

impl Default for ClientStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientStateMachine {
    pub fn new() -> Self {
        Self { current: ClientState::Init }
    }

    pub fn state(&self) -> ClientState {
        self.current
    }

    /// Checks that `round` is the one to run now.
    pub fn expect_round(&self, round: RoundId) -> Result<(), ProtocolError> {
        if self.current.pending_round() == Some(round) {
            Ok(())
        } else {
            log::warn!("Cannot run {} from state {:?}", round, self.current);
            Err(ProtocolError::InvalidState)
        }
    }

    /// Records that `round` completed.
    pub fn complete(&mut self, round: RoundId) {
        let next = ClientState::after(round);
        log::info!("State transition: {:?} -> {:?}", self.current, next);
        self.current = next;
    }

    /// Moves to `Aborted`.
    pub fn abort(&mut self, cause: ProtocolError) {
        log::warn!("Aborting from {:?}: {}", self.current, cause);
        self.current = ClientState::Aborted;
    }
}

/// Server-side phase: which round's collection window is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    Collecting(RoundId),
    Finished,
    Aborted,
}

impl ServerPhase {
    pub fn open_round(&self) -> Option<RoundId> {
        match self {
            ServerPhase::Collecting(round) => Some(*round),
            ServerPhase::Finished | ServerPhase::Aborted => None,
        }
    }
}
