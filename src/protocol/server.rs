//! Server coordinator.
//!
//! Relays keys and sealed bundles, tracks who is still live at each round
//! boundary, collects the shares the live set calls for and recovers the sum.
//!
//! # Live sets
//! - `U0`: clients that advertised keys (the roster).
//! - `U1`: clients whose share bundles arrived (the sharing set).
//! - `U2`: clients whose masked input arrived (the survivors).
//! - `U3`: clients that answered the unmasking request.
//!
//! Each set is drawn from the previous one and must hold at least `t`
//! clients. A short `U0` or `U1` aborts with `InsufficientParticipants`; a short
//! `U2` or `U3` means `t` seed shares can no longer be gathered and aborts with
//! `InsufficientShares`.
//!
//! # Unmasking
//! `sum = Σ_{U2} y_i − Σ_{U2} SelfMask_i`, then for every dropped `j ∈ U1 \ U2`
//! and every survivor `i`, `PM(i, j)` is removed with the sign `i` applied it
//! with. The server reconstructs seeds of survivors and agreement keys of
//! dropped clients only, and rejects any disclosure of the other class.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use crate::config::AggregationConfig;
use crate::core::vector;
use crate::crypto::{expand_from_key, expand_from_seed, KeyPair, Seed, KEY_LEN};
use crate::mpc::reconstruct::reconstruct_secret;
use crate::mpc::{SecretClass, SecretShare, Share};
use super::identity::{pairwise_sign, ClientId};
use super::messaging::{
    AdvertiseKeys, AggregationOutput, ClientMessage, LiveSet, MaskedInput, Roster, RosterEntry,
    ShareInbox, ShareKeys, UnmaskingResponse,
};
use super::rendezvous::RoundCollector;
use super::state_machine::{RoundId, ServerPhase};
use super::ProtocolError;

/// Coordinates a single aggregation run.
#[derive(Debug)]
pub struct ServerCoordinator {
    config: AggregationConfig,
    phase: ServerPhase,
    advertise: Option<RoundCollector<AdvertiseKeys>>,
    share_keys: Option<RoundCollector<ShareKeys>>,
    masked: Option<RoundCollector<MaskedInput>>,
    unmasking: Option<RoundCollector<UnmaskingResponse>>,
    roster: Option<Roster>,
    sharing_set: Option<LiveSet>,
    survivors: Option<LiveSet>,
    masked_inputs: BTreeMap<ClientId, Vec<u64>>,
}

impl ServerCoordinator {
    /// Creates the coordinator with the advertise-keys window open for every
    /// configured participant.
    pub fn new(config: AggregationConfig) -> Self {
        let advertise = RoundCollector::open(
            RoundId::AdvertiseKeys,
            config.participants().iter().cloned(),
            config.round_timeout(),
        );
        Self {
            config,
            phase: ServerPhase::Collecting(RoundId::AdvertiseKeys),
            advertise: Some(advertise),
            share_keys: None,
            masked: None,
            unmasking: None,
            roster: None,
            sharing_set: None,
            survivors: None,
            masked_inputs: BTreeMap::new(),
        }
    }

    pub fn phase(&self) -> ServerPhase {
        self.phase
    }

    pub fn roster(&self) -> Option<&Roster> {
        self.roster.as_ref()
    }

    /// Masked inputs accepted in round 2, as the server sees them.
    pub fn masked_inputs(&self) -> &BTreeMap<ClientId, Vec<u64>> {
        &self.masked_inputs
    }

    /// True when the open round has heard from everyone or its window elapsed.
    pub fn should_close(&self) -> bool {
        match self.phase.open_round() {
            Some(RoundId::AdvertiseKeys) => self.advertise.as_ref().map_or(false, |c| c.should_close()),
            Some(RoundId::ShareKeys) => self.share_keys.as_ref().map_or(false, |c| c.should_close()),
            Some(RoundId::MaskedInputCollection) => self.masked.as_ref().map_or(false, |c| c.should_close()),
            Some(RoundId::Unmasking) => self.unmasking.as_ref().map_or(false, |c| c.should_close()),
            None => false,
        }
    }

    /// Routes any client message to its round.
    pub fn receive(&mut self, msg: ClientMessage) -> Result<(), ProtocolError> {
        match msg {
            ClientMessage::AdvertiseKeys(m) => self.receive_advertise_keys(m),
            ClientMessage::ShareKeys(m) => self.receive_share_keys(m),
            ClientMessage::MaskedInput(m) => self.receive_masked_input(m),
            ClientMessage::Unmasking(m) => self.receive_unmasking(m),
        }
    }

    pub fn receive_advertise_keys(&mut self, msg: AdvertiseKeys) -> Result<(), ProtocolError> {
        self.check_round(RoundId::AdvertiseKeys, &msg.sender)?;
        log::debug!(
            "{} advertised enc={} agree={}",
            msg.sender,
            msg.encryption_key.fingerprint(),
            msg.agreement_key.fingerprint()
        );
        let sender = msg.sender.clone();
        collector(&mut self.advertise)?.submit(&sender, msg)
    }

    /// Accepts a client's sealed bundles. Exactly one bundle must be addressed
    /// to every other roster member.
    pub fn receive_share_keys(&mut self, msg: ShareKeys) -> Result<(), ProtocolError> {
        self.check_round(RoundId::ShareKeys, &msg.sender)?;
        let roster = self.roster.as_ref().ok_or(ProtocolError::InvalidState)?;
        if roster.entry(&msg.sender).is_none() {
            log::warn!("Share bundles from {} who is not on the roster", msg.sender);
            return Err(ProtocolError::UnexpectedParticipant);
        }

        let expected: BTreeSet<&ClientId> =
            roster.entries().map(|e| &e.id).filter(|id| **id != msg.sender).collect();
        let addressed: BTreeSet<&ClientId> = msg.bundles.iter().map(|b| &b.recipient).collect();
        if addressed.len() != msg.bundles.len() || addressed != expected {
            log::warn!("Share bundles from {} are misaddressed", msg.sender);
            return Err(ProtocolError::MalformedMessage);
        }

        let sender = msg.sender.clone();
        collector(&mut self.share_keys)?.submit(&sender, msg)
    }

    pub fn receive_masked_input(&mut self, msg: MaskedInput) -> Result<(), ProtocolError> {
        self.check_round(RoundId::MaskedInputCollection, &msg.sender)?;
        let live = self.sharing_set.as_ref().map_or(false, |s| s.contains(&msg.sender));
        if !live {
            log::warn!("Masked input from {} outside the sharing set", msg.sender);
            return Err(ProtocolError::UnexpectedParticipant);
        }
        if msg.vector.len() != self.config.vector_len() {
            log::warn!(
                "Masked input from {} has length {}, expected {}",
                msg.sender,
                msg.vector.len(),
                self.config.vector_len()
            );
            return Err(ProtocolError::MalformedMessage);
        }
        let sender = msg.sender.clone();
        collector(&mut self.masked)?.submit(&sender, msg)
    }

    /// Accepts a client's disclosures.
    ///
    /// Every record must be held by the sender, concern a sharing-set member at
    /// most once, and be of the class the survivor set calls for: a seed share
    /// for a survivor, an agreement-key share for a dropped client.
    pub fn receive_unmasking(&mut self, msg: UnmaskingResponse) -> Result<(), ProtocolError> {
        self.check_round(RoundId::Unmasking, &msg.sender)?;
        let sharing_set = self.sharing_set.as_ref().ok_or(ProtocolError::InvalidState)?;
        let survivors = self.survivors.as_ref().ok_or(ProtocolError::InvalidState)?;
        if !survivors.contains(&msg.sender) {
            log::warn!("Unmasking response from non-survivor {}", msg.sender);
            return Err(ProtocolError::UnexpectedParticipant);
        }
        let holder_x = self.config.share_index(&msg.sender).ok_or(ProtocolError::UnexpectedParticipant)?;

        let mut owners = BTreeSet::new();
        for record in &msg.disclosures {
            let share = record.share.share();
            if record.holder != msg.sender
                || share.identifier != holder_x
                || share.value.len() != KEY_LEN
                || !owners.insert(&record.owner)
            {
                log::warn!("Malformed disclosure from {} about {}", msg.sender, record.owner);
                return Err(ProtocolError::MalformedMessage);
            }
            if !sharing_set.contains(&record.owner) {
                return Err(ProtocolError::UnexpectedParticipant);
            }
            let wanted = if survivors.contains(&record.owner) {
                SecretClass::Seed
            } else {
                SecretClass::AgreementKey
            };
            if record.share.as_class(wanted).is_none() {
                log::warn!(
                    "{} disclosed a {} share of {}; only {} shares are accepted for it",
                    msg.sender,
                    record.share.class(),
                    record.owner,
                    wanted
                );
                return Err(ProtocolError::WrongSecretClass);
            }
        }

        let sender = msg.sender.clone();
        collector(&mut self.unmasking)?.submit(&sender, msg)
    }

    /// Closes round 0 and publishes the roster.
    pub fn close_advertise_keys(&mut self) -> Result<Roster, ProtocolError> {
        self.expect_phase(RoundId::AdvertiseKeys)?;
        let mut received = collector(&mut self.advertise)?.close()?;
        let roster = Roster {
            slots: self
                .config
                .participants()
                .iter()
                .map(|id| received.remove(id).map(RosterEntry::from))
                .collect(),
        };
        self.require_live(roster.len(), RoundId::AdvertiseKeys, ProtocolError::InsufficientParticipants)?;

        self.share_keys = Some(RoundCollector::open(
            RoundId::ShareKeys,
            roster.entries().map(|e| e.id.clone()),
            self.config.round_timeout(),
        ));
        self.phase = ServerPhase::Collecting(RoundId::ShareKeys);
        self.roster = Some(roster.clone());
        Ok(roster)
    }

    /// Closes round 1 and routes the sealed bundles, unopened, to each member
    /// of the sharing set.
    pub fn close_share_keys(&mut self) -> Result<BTreeMap<ClientId, ShareInbox>, ProtocolError> {
        self.expect_phase(RoundId::ShareKeys)?;
        let received = collector(&mut self.share_keys)?.close()?;
        let sharing_set = LiveSet::from_members(&self.config, received.keys());
        self.require_live(sharing_set.len(), RoundId::ShareKeys, ProtocolError::InsufficientParticipants)?;

        let mut inboxes = BTreeMap::new();
        for recipient in sharing_set.members() {
            let bundles = sharing_set
                .slots
                .iter()
                .map(|slot| {
                    slot.as_ref()
                        .filter(|sender| *sender != recipient)
                        .and_then(|sender| received.get(sender))
                        .and_then(|msg| msg.bundles.iter().find(|b| &b.recipient == recipient))
                        .map(|b| b.sealed.clone())
                })
                .collect();
            inboxes.insert(
                recipient.clone(),
                ShareInbox {
                    recipient: recipient.clone(),
                    sharing_set: sharing_set.clone(),
                    bundles,
                },
            );
        }

        self.masked = Some(RoundCollector::open(
            RoundId::MaskedInputCollection,
            sharing_set.members().cloned(),
            self.config.round_timeout(),
        ));
        self.phase = ServerPhase::Collecting(RoundId::MaskedInputCollection);
        self.sharing_set = Some(sharing_set);
        Ok(inboxes)
    }

    /// Closes round 2 and announces the survivors.
    ///
    /// Fails with `InsufficientShares` when fewer than `t` masked inputs arrived.
    pub fn close_masked_inputs(&mut self) -> Result<LiveSet, ProtocolError> {
        self.expect_phase(RoundId::MaskedInputCollection)?;
        let received = collector(&mut self.masked)?.close()?;
        let survivors = LiveSet::from_members(&self.config, received.keys());
        // Fewer than `t` survivors can never yield `t` seed shares.
        self.require_live(survivors.len(), RoundId::MaskedInputCollection, ProtocolError::InsufficientShares)?;

        self.masked_inputs = received.into_iter().map(|(id, msg)| (id, msg.vector)).collect();
        self.unmasking = Some(RoundCollector::open(
            RoundId::Unmasking,
            survivors.members().cloned(),
            self.config.round_timeout(),
        ));
        self.phase = ServerPhase::Collecting(RoundId::Unmasking);
        self.survivors = Some(survivors.clone());
        Ok(survivors)
    }

    /// Closes round 3 and recovers the sum of the survivors' inputs.
    ///
    /// # Errors
    /// * `InsufficientShares` if fewer than `t` clients answered, or some secret
    ///   that must be reconstructed has fewer than `t` shares. No sum is released.
    /// * `IntegrityFailure` if a reconstructed agreement key does not match the
    ///   key its owner advertised.
    pub fn finalize(&mut self) -> Result<AggregationOutput, ProtocolError> {
        self.expect_phase(RoundId::Unmasking)?;
        let responses = collector(&mut self.unmasking)?.close()?;
        match self.unmask_sum(&responses) {
            Ok(output) => {
                log::info!("Aggregation finished over {} survivors", output.survivors.len());
                self.phase = ServerPhase::Finished;
                Ok(output)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn unmask_sum(
        &self,
        responses: &BTreeMap<ClientId, UnmaskingResponse>,
    ) -> Result<AggregationOutput, ProtocolError> {
        let t = self.config.threshold();
        if responses.len() < t as usize {
            log::error!("{} unmasking responses, threshold is {}", responses.len(), t);
            return Err(ProtocolError::InsufficientShares);
        }
        let roster = self.roster.as_ref().ok_or(ProtocolError::InvalidState)?;
        let sharing_set = self.sharing_set.as_ref().ok_or(ProtocolError::InvalidState)?;
        let survivors = self.survivors.as_ref().ok_or(ProtocolError::InvalidState)?;

        let mut seed_shares: BTreeMap<&ClientId, Vec<Share>> = BTreeMap::new();
        let mut key_shares: BTreeMap<&ClientId, Vec<Share>> = BTreeMap::new();
        for record in responses.values().flat_map(|r| r.disclosures.iter()) {
            let (bucket, share) = match &record.share {
                SecretShare::Seed(s) => (&mut seed_shares, s),
                SecretShare::AgreementKey(s) => (&mut key_shares, s),
            };
            bucket.entry(&record.owner).or_default().push(share.clone());
        }

        let len = self.config.vector_len();
        let mut sum = vector::zeros(len);
        for y in self.masked_inputs.values() {
            vector::add_assign(&mut sum, y);
        }

        for survivor in survivors.members() {
            let shares = seed_shares.get(survivor).map(Vec::as_slice).unwrap_or(&[]);
            let secret = reconstruct_secret(shares, t).map_err(|e| {
                log::error!("Cannot recover seed of {} from {} shares: {}", survivor, shares.len(), e);
                ProtocolError::from(e)
            })?;
            let seed = Seed::from_slice(&secret)?;
            vector::sub_assign(&mut sum, &expand_from_seed(&seed, len));
        }

        for dropped in sharing_set.members().filter(|id| !survivors.contains(id)) {
            let shares = key_shares.get(dropped).map(Vec::as_slice).unwrap_or(&[]);
            let secret = reconstruct_secret(shares, t).map_err(|e| {
                log::error!("Cannot recover agreement key of {} from {} shares: {}", dropped, shares.len(), e);
                ProtocolError::from(e)
            })?;
            let pair = KeyPair::from_secret_slice(&secret)?;
            let advertised = roster.entry(dropped).ok_or(ProtocolError::InvalidState)?;
            if pair.public() != advertised.agreement_key {
                log::error!("Recovered agreement key of {} does not match the roster", dropped);
                return Err(ProtocolError::IntegrityFailure);
            }
            log::debug!("Removing pairwise masks of dropped client {}", dropped);

            for survivor in survivors.members() {
                let entry = roster.entry(survivor).ok_or(ProtocolError::InvalidState)?;
                let mask = expand_from_key(&pair.agree(&entry.agreement_key), len);
                match pairwise_sign(survivor, dropped) {
                    Some(sign) if sign > 0 => vector::sub_assign(&mut sum, &mask),
                    Some(_) => vector::add_assign(&mut sum, &mask),
                    None => {}
                }
            }
        }

        Ok(AggregationOutput {
            sum,
            survivors: survivors.members().cloned().collect(),
        })
    }

    /// Rejects a message for any round other than the open one.
    fn check_round(&self, round: RoundId, sender: &ClientId) -> Result<(), ProtocolError> {
        match self.phase.open_round() {
            Some(open) if open == round => Ok(()),
            Some(open) if open < round => {
                log::warn!("{} sent a {} message while {} is open", sender, round, open);
                Err(ProtocolError::InvalidState)
            }
            _ => {
                log::warn!("{} sent a {} message after it closed", sender, round);
                Err(ProtocolError::RoundClosed)
            }
        }
    }

    fn expect_phase(&self, round: RoundId) -> Result<(), ProtocolError> {
        if self.phase.open_round() == Some(round) {
            Ok(())
        } else {
            log::warn!("Cannot close {} in phase {:?}", round, self.phase);
            Err(ProtocolError::InvalidState)
        }
    }

    fn require_live(
        &mut self,
        live: usize,
        round: RoundId,
        shortfall: ProtocolError,
    ) -> Result<(), ProtocolError> {
        if live < self.config.threshold() as usize {
            log::error!(
                "{} closed with {} live clients, threshold is {}",
                round,
                live,
                self.config.threshold()
            );
            return Err(self.fail(shortfall));
        }
        Ok(())
    }

    fn fail(&mut self, cause: ProtocolError) -> ProtocolError {
        log::error!("Aborting aggregation: {}", cause);
        self.phase = ServerPhase::Aborted;
        cause
    }
}

fn collector<M>(slot: &mut Option<RoundCollector<M>>) -> Result<&mut RoundCollector<M>, ProtocolError> {
    slot.as_mut().ok_or(ProtocolError::InvalidState)
}
