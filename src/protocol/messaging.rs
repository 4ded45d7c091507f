//! Protocol messages.
//!
//! One client message shape per round, one server broadcast shape per round
//! boundary. Broadcasts are positional over the configured participant list:
//! slot `k` always refers to `config.participants()[k]`, and a dropped or absent
//! participant leaves `None` in its slot, so every client sees the same message
//! shape whatever the dropout pattern.

use alloc::vec::Vec;
use crate::config::AggregationConfig;
use crate::crypto::{PublicKey, SealedBundle};
use crate::mpc::SecretShare;
use super::identity::ClientId;
use super::state_machine::RoundId;

/// Round 0: a client's two public keys.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdvertiseKeys {
    pub sender: ClientId,
    pub encryption_key: PublicKey,
    pub agreement_key: PublicKey,
}

/// One advertised participant in the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RosterEntry {
    pub id: ClientId,
    pub encryption_key: PublicKey,
    pub agreement_key: PublicKey,
}

impl From<AdvertiseKeys> for RosterEntry {
    fn from(msg: AdvertiseKeys) -> Self {
        RosterEntry {
            id: msg.sender,
            encryption_key: msg.encryption_key,
            agreement_key: msg.agreement_key,
        }
    }
}

/// Broadcast closing round 0: public keys of every client that advertised.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Roster {
    pub slots: Vec<Option<RosterEntry>>,
}

impl Roster {
    /// Entries present in the roster, in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &RosterEntry> {
        self.slots.iter().flatten()
    }

    pub fn entry(&self, id: &ClientId) -> Option<&RosterEntry> {
        self.entries().find(|e| &e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live set formed by the roster's members.
    pub fn live_set(&self) -> LiveSet {
        LiveSet {
            slots: self.slots.iter().map(|s| s.as_ref().map(|e| e.id.clone())).collect(),
        }
    }

    /// BLAKE3 digest over the canonical roster encoding.
    ///
    /// The core does not authenticate the roster; an external signature layer
    /// can sign this digest and have clients compare it before round 1.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key("secagg-engine 2024 roster digest");
        for slot in &self.slots {
            match slot {
                None => {
                    hasher.update(&[0]);
                }
                Some(entry) => {
                    hasher.update(&[1]);
                    hasher.update(&(entry.id.as_str().len() as u32).to_le_bytes());
                    hasher.update(entry.id.as_str().as_bytes());
                    hasher.update(entry.encryption_key.as_bytes());
                    hasher.update(entry.agreement_key.as_bytes());
                }
            }
        }
        *hasher.finalize().as_bytes()
    }
}

/// A set of participants, positional over the configured participant list.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LiveSet {
    pub slots: Vec<Option<ClientId>>,
}

impl LiveSet {
    /// Builds the positional form of `members` under `config`. Members outside
    /// the participant list are ignored.
    pub fn from_members<'a, I>(config: &AggregationConfig, members: I) -> Self
    where
        I: IntoIterator<Item = &'a ClientId>,
    {
        let mut slots: Vec<Option<ClientId>> = alloc::vec![None; config.participant_count()];
        for id in members {
            if let Some(slot) = config.slot_of(id) {
                slots[slot] = Some(id.clone());
            }
        }
        LiveSet { slots }
    }

    pub fn members(&self) -> impl Iterator<Item = &ClientId> {
        self.slots.iter().flatten()
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.members().any(|m| m == id)
    }

    pub fn len(&self) -> usize {
        self.members().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when every member of `self` is also in `other`.
    pub fn is_subset_of(&self, other: &LiveSet) -> bool {
        self.members().all(|m| other.contains(m))
    }
}

/// A sealed bundle together with its addressee.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AddressedBundle {
    pub recipient: ClientId,
    pub sealed: SealedBundle,
}

/// Round 1: one sealed share bundle per other roster member.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShareKeys {
    pub sender: ClientId,
    pub bundles: Vec<AddressedBundle>,
}

/// Broadcast closing round 1, one per recipient.
///
/// `sharing_set` lists every client whose share bundles were accepted; the
/// recipient masks against all of them. `bundles[k]` holds the bundle sealed by
/// the participant in slot `k` for this recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShareInbox {
    pub recipient: ClientId,
    pub sharing_set: LiveSet,
    pub bundles: Vec<Option<SealedBundle>>,
}

/// Round 2: the masked input vector.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaskedInput {
    pub sender: ClientId,
    pub vector: Vec<u64>,
}

/// A share disclosed at unmask time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShareRecord {
    /// Whose secret the share belongs to.
    pub owner: ClientId,
    /// Who was entrusted with it.
    pub holder: ClientId,
    pub share: SecretShare,
}

/// Round 3: the shares the server asked for via the live-set announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnmaskingResponse {
    pub sender: ClientId,
    pub disclosures: Vec<ShareRecord>,
}

/// Any client-to-server message, tagged by round.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClientMessage {
    AdvertiseKeys(AdvertiseKeys),
    ShareKeys(ShareKeys),
    MaskedInput(MaskedInput),
    Unmasking(UnmaskingResponse),
}

impl ClientMessage {
    pub fn round(&self) -> RoundId {
        match self {
            ClientMessage::AdvertiseKeys(_) => RoundId::AdvertiseKeys,
            ClientMessage::ShareKeys(_) => RoundId::ShareKeys,
            ClientMessage::MaskedInput(_) => RoundId::MaskedInputCollection,
            ClientMessage::Unmasking(_) => RoundId::Unmasking,
        }
    }

    pub fn sender(&self) -> &ClientId {
        match self {
            ClientMessage::AdvertiseKeys(m) => &m.sender,
            ClientMessage::ShareKeys(m) => &m.sender,
            ClientMessage::MaskedInput(m) => &m.sender,
            ClientMessage::Unmasking(m) => &m.sender,
        }
    }
}

/// Result of a completed run, released to the operator only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationOutput {
    /// `Σ x_i` over `survivors`, in Z/2^64.
    pub sum: Vec<u64>,
    /// Clients whose inputs are included: those that submitted a masked input.
    pub survivors: Vec<ClientId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn config() -> AggregationConfig {
        AggregationConfig::new(["a", "b", "c", "d"].map(ClientId::from), 2, 3).unwrap()
    }

    fn entry(name: &str, byte: u8) -> RosterEntry {
        RosterEntry {
            id: ClientId::from(name),
            encryption_key: PublicKey([byte; 32]),
            agreement_key: PublicKey([byte.wrapping_add(1); 32]),
        }
    }

    #[test]
    fn test_live_set_positional() {
        let cfg = config();
        let members = [ClientId::from("d"), ClientId::from("b")];
        let set = LiveSet::from_members(&cfg, members.iter());
        assert_eq!(set.slots, vec![None, Some(ClientId::from("b")), None, Some(ClientId::from("d"))]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&ClientId::from("b")));
        assert!(!set.contains(&ClientId::from("a")));
    }

    #[test]
    fn test_subset() {
        let cfg = config();
        let all = LiveSet::from_members(&cfg, cfg.participants().iter());
        let some = LiveSet::from_members(&cfg, [ClientId::from("c")].iter());
        assert!(some.is_subset_of(&all));
        assert!(!all.is_subset_of(&some));
    }

    #[test]
    fn test_roster_digest_binds_keys() {
        let roster = Roster { slots: vec![Some(entry("a", 1)), None, Some(entry("c", 3)), None] };
        let mut tampered = roster.clone();
        tampered.slots[2] = Some(entry("c", 9));

        assert_eq!(roster.digest(), roster.clone().digest());
        assert_ne!(roster.digest(), tampered.digest());
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.live_set().len(), 2);
        assert!(roster.entry(&ClientId::from("c")).is_some());
    }

    #[test]
    fn test_message_tags() {
        let msg = ClientMessage::MaskedInput(MaskedInput { sender: ClientId::from("a"), vector: vec![1] });
        assert_eq!(msg.round(), RoundId::MaskedInputCollection);
        assert_eq!(msg.sender(), &ClientId::from("a"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_wire_encoding() {
        let msg = ClientMessage::AdvertiseKeys(AdvertiseKeys {
            sender: ClientId::from("a"),
            encryption_key: PublicKey([7; 32]),
            agreement_key: PublicKey([8; 32]),
        });
        let json = serde_json::to_string(&msg).unwrap();
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
