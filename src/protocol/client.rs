//! Client round engine.
//!
//! Drives one client through the four rounds. Each round method checks the
//! state machine first; a round that fails on its input aborts the client and
//! destroys every per-run secret, after which nothing further can be sent.
//!
//! # Secrets held between rounds
//! - the encryption and agreement key pairs (round 0 onwards),
//! - the seed and the share bundles entrusted to this client (round 1 onwards).
//!
//! All of them are dropped, and so zeroized, once the unmasking response is
//! built or the client aborts.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use crate::config::AggregationConfig;
use crate::core::vector;
use crate::crypto::share_encrypt::{self, ShareBundle};
use crate::crypto::{expand_from_key, expand_from_seed, KeyPair, Seed};
use crate::entropy::EntropySource;
use crate::mpc::quorum::split_secret;
use crate::mpc::SecretShare;
use super::identity::{pairwise_sign, ClientId};
use super::messaging::{
    AddressedBundle, AdvertiseKeys, LiveSet, MaskedInput, Roster, ShareInbox, ShareKeys,
    ShareRecord, UnmaskingResponse,
};
use super::state_machine::{ClientState, ClientStateMachine, RoundId};
use super::ProtocolError;

/// One client's view of a run.
#[derive(Debug)]
pub struct ClientRoundEngine {
    id: ClientId,
    config: AggregationConfig,
    machine: ClientStateMachine,
    encryption: Option<KeyPair>,
    agreement: Option<KeyPair>,
    seed: Option<Seed>,
    roster: Option<Roster>,
    sharing_set: Option<LiveSet>,
    /// Shares entrusted to us, by owner. Includes our own.
    held: BTreeMap<ClientId, ShareBundle>,
}

impl ClientRoundEngine {
    /// Creates the engine for `id`, which must be a configured participant.
    pub fn new(id: ClientId, config: AggregationConfig) -> Result<Self, ProtocolError> {
        if config.slot_of(&id).is_none() {
            log::error!("{} is not a configured participant", id);
            return Err(ProtocolError::UnexpectedParticipant);
        }
        Ok(Self {
            id,
            config,
            machine: ClientStateMachine::new(),
            encryption: None,
            agreement: None,
            seed: None,
            roster: None,
            sharing_set: None,
            held: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub fn state(&self) -> ClientState {
        self.machine.state()
    }

    /// Owners whose share bundles this client currently holds.
    pub fn held_owners(&self) -> impl Iterator<Item = &ClientId> {
        self.held.keys()
    }

    /// Round 0: generates both key pairs and advertises the public halves.
    pub fn advertise_keys<R: EntropySource + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<AdvertiseKeys, ProtocolError> {
        self.run_round(RoundId::AdvertiseKeys, |engine| {
            let encryption = KeyPair::generate(rng)?;
            let agreement = KeyPair::generate(rng)?;
            let msg = AdvertiseKeys {
                sender: engine.id.clone(),
                encryption_key: encryption.public(),
                agreement_key: agreement.public(),
            };
            log::debug!(
                "{} advertising enc={} agree={}",
                engine.id,
                msg.encryption_key.fingerprint(),
                msg.agreement_key.fingerprint()
            );
            engine.encryption = Some(encryption);
            engine.agreement = Some(agreement);
            Ok(msg)
        })
    }

    /// Round 1: splits the seed and the agreement key among the roster and seals
    /// each peer's pair of shares for it.
    ///
    /// # Errors
    /// * `MalformedMessage` if the roster does not line up with the participant
    ///   list or does not carry our own keys.
    /// * `InsufficientParticipants` if fewer than `t` clients advertised.
    pub fn share_keys<R: EntropySource + ?Sized>(
        &mut self,
        roster: &Roster,
        rng: &mut R,
    ) -> Result<ShareKeys, ProtocolError> {
        self.run_round(RoundId::ShareKeys, |engine| {
            engine.validate_roster(roster)?;
            let (encryption, agreement) = match (&engine.encryption, &engine.agreement) {
                (Some(e), Some(a)) => (e, a),
                _ => return Err(ProtocolError::InvalidState),
            };

            let members: Vec<&ClientId> = roster.entries().map(|e| &e.id).collect();
            let xs: Vec<u8> = members
                .iter()
                .map(|id| engine.config.share_index(id).ok_or(ProtocolError::MalformedMessage))
                .collect::<Result<_, _>>()?;

            let seed = Seed::generate(rng)?;
            let t = engine.config.threshold();
            let seed_shares = split_secret(seed.as_bytes(), t, &xs, rng)?;
            let key_shares = split_secret(&*agreement.secret_bytes(), t, &xs, rng)?;

            let mut bundles = Vec::with_capacity(members.len().saturating_sub(1));
            for (entry, (seed_share, key_share)) in roster
                .entries()
                .zip(seed_shares.into_iter().zip(key_shares.into_iter()))
            {
                let bundle = ShareBundle { seed: seed_share, agreement_key: key_share };
                if entry.id == engine.id {
                    engine.held.insert(entry.id.clone(), bundle);
                    continue;
                }
                let shared = encryption.agree(&entry.encryption_key);
                let sealed = share_encrypt::seal(
                    &shared,
                    engine.id.as_str(),
                    entry.id.as_str(),
                    &bundle,
                    rng,
                )?;
                bundles.push(AddressedBundle { recipient: entry.id.clone(), sealed });
            }

            log::info!("{} sealed share bundles for {} peers", engine.id, bundles.len());
            engine.seed = Some(seed);
            engine.roster = Some(roster.clone());
            Ok(ShareKeys { sender: engine.id.clone(), bundles })
        })
    }

    /// Round 2: opens the bundles addressed to us and masks `input`.
    ///
    /// A bundle that fails to open is logged and treated as never received; the
    /// pairwise mask with its sender is still applied, since the sender is in
    /// the sharing set the server announced to everybody.
    pub fn mask_input(
        &mut self,
        inbox: &ShareInbox,
        input: &[u64],
    ) -> Result<MaskedInput, ProtocolError> {
        self.run_round(RoundId::MaskedInputCollection, |engine| {
            let n = engine.config.participant_count();
            if input.len() != engine.config.vector_len() {
                log::error!(
                    "{} input has length {}, expected {}",
                    engine.id,
                    input.len(),
                    engine.config.vector_len()
                );
                return Err(ProtocolError::MalformedMessage);
            }
            if inbox.recipient != engine.id || inbox.bundles.len() != n {
                return Err(ProtocolError::MalformedMessage);
            }
            let roster = engine.roster.as_ref().ok_or(ProtocolError::InvalidState)?;
            let sharing_set = &inbox.sharing_set;
            engine.validate_live_set(sharing_set)?;
            if !sharing_set.is_subset_of(&roster.live_set()) {
                return Err(ProtocolError::UnexpectedParticipant);
            }
            if !sharing_set.contains(&engine.id) {
                return Err(ProtocolError::MalformedMessage);
            }
            if sharing_set.len() < engine.config.threshold() as usize {
                return Err(ProtocolError::InsufficientParticipants);
            }

            let encryption = engine.encryption.as_ref().ok_or(ProtocolError::InvalidState)?;
            let own_x = engine.config.share_index(&engine.id).ok_or(ProtocolError::InvalidState)?;
            let mut opened = BTreeMap::new();
            for (slot, sealed) in inbox.bundles.iter().enumerate() {
                let sealed = match sealed {
                    Some(sealed) => sealed,
                    None => continue,
                };
                let sender = match &sharing_set.slots[slot] {
                    Some(sender) if *sender != engine.id => sender,
                    _ => return Err(ProtocolError::MalformedMessage),
                };
                let entry = roster.entry(sender).ok_or(ProtocolError::UnexpectedParticipant)?;
                let shared = encryption.agree(&entry.encryption_key);
                match share_encrypt::open(&shared, sender.as_str(), engine.id.as_str(), sealed) {
                    Ok(bundle) if bundle.seed.identifier == own_x => {
                        opened.insert(sender.clone(), bundle);
                    }
                    Ok(_) => {
                        log::warn!("{}: bundle from {} carries a foreign x-coordinate", engine.id, sender);
                    }
                    Err(e) => {
                        log::warn!("{}: dropping bundle from {}: {}", engine.id, sender, e);
                    }
                }
            }
            // Only sharing-set members can be asked about at unmask time.
            engine.held.retain(|owner, _| sharing_set.contains(owner));
            engine.held.extend(opened);

            let len = engine.config.vector_len();
            let seed = engine.seed.as_ref().ok_or(ProtocolError::InvalidState)?;
            let agreement = engine.agreement.as_ref().ok_or(ProtocolError::InvalidState)?;
            let mut y = input.to_vec();
            vector::add_assign(&mut y, &expand_from_seed(seed, len));
            for peer in sharing_set.members() {
                let sign = match pairwise_sign(&engine.id, peer) {
                    Some(sign) => sign,
                    None => continue,
                };
                let entry = roster.entry(peer).ok_or(ProtocolError::UnexpectedParticipant)?;
                let mask = expand_from_key(&agreement.agree(&entry.agreement_key), len);
                if sign > 0 {
                    vector::add_assign(&mut y, &mask);
                } else {
                    vector::sub_assign(&mut y, &mask);
                }
            }

            log::info!(
                "{} masked input against {} peers, holding {} bundles",
                engine.id,
                sharing_set.len() - 1,
                engine.held.len()
            );
            engine.sharing_set = Some(sharing_set.clone());
            Ok(MaskedInput { sender: engine.id.clone(), vector: y })
        })
    }

    /// Round 3: discloses, per owner, the one share the announced live set calls
    /// for, then destroys every per-run secret.
    ///
    /// Owners in `survivors` get their seed share disclosed; owners that dropped
    /// get their agreement-key share disclosed. Never both for the same owner.
    ///
    /// # Errors
    /// `InsufficientShares` if fewer than `t` survivors are announced, since the
    /// server could not rebuild their seeds.
    pub fn unmask(&mut self, survivors: &LiveSet) -> Result<UnmaskingResponse, ProtocolError> {
        self.run_round(RoundId::Unmasking, |engine| {
            engine.validate_live_set(survivors)?;
            let sharing_set = engine.sharing_set.as_ref().ok_or(ProtocolError::InvalidState)?;
            if !survivors.is_subset_of(sharing_set) {
                log::error!("{}: announced survivors are not a subset of the sharing set", engine.id);
                return Err(ProtocolError::UnexpectedParticipant);
            }
            if !survivors.contains(&engine.id) {
                return Err(ProtocolError::MalformedMessage);
            }
            if survivors.len() < engine.config.threshold() as usize {
                log::warn!("{}: only {} survivors announced", engine.id, survivors.len());
                return Err(ProtocolError::InsufficientShares);
            }

            let disclosures: Vec<ShareRecord> = engine
                .held
                .iter()
                .map(|(owner, bundle)| {
                    let share = if survivors.contains(owner) {
                        SecretShare::Seed(bundle.seed.clone())
                    } else {
                        SecretShare::AgreementKey(bundle.agreement_key.clone())
                    };
                    ShareRecord { owner: owner.clone(), holder: engine.id.clone(), share }
                })
                .collect();

            log::info!("{} disclosing {} shares", engine.id, disclosures.len());
            engine.destroy_secrets();
            Ok(UnmaskingResponse { sender: engine.id.clone(), disclosures })
        })
    }

    fn run_round<T, F>(&mut self, round: RoundId, f: F) -> Result<T, ProtocolError>
    where
        F: FnOnce(&mut Self) -> Result<T, ProtocolError>,
    {
        self.machine.expect_round(round)?;
        match f(self) {
            Ok(out) => {
                self.machine.complete(round);
                Ok(out)
            }
            Err(e) => {
                self.machine.abort(e);
                self.destroy_secrets();
                Err(e)
            }
        }
    }

    fn validate_roster(&self, roster: &Roster) -> Result<(), ProtocolError> {
        if roster.slots.len() != self.config.participant_count() {
            return Err(ProtocolError::MalformedMessage);
        }
        for (slot, entry) in roster.slots.iter().enumerate() {
            if let Some(entry) = entry {
                if self.config.participant_at(slot) != Some(&entry.id) {
                    log::error!("Roster slot {} names {}", slot, entry.id);
                    return Err(ProtocolError::MalformedMessage);
                }
            }
        }
        let own = roster.entry(&self.id).ok_or(ProtocolError::MalformedMessage)?;
        let keys_match = matches!(
            (&self.encryption, &self.agreement),
            (Some(e), Some(a)) if e.public() == own.encryption_key && a.public() == own.agreement_key
        );
        if !keys_match {
            log::error!("Roster carries keys for {} that it did not advertise", self.id);
            return Err(ProtocolError::MalformedMessage);
        }
        if roster.len() < self.config.threshold() as usize {
            log::warn!("Roster has {} members, threshold is {}", roster.len(), self.config.threshold());
            return Err(ProtocolError::InsufficientParticipants);
        }
        Ok(())
    }

    fn validate_live_set(&self, set: &LiveSet) -> Result<(), ProtocolError> {
        if set.slots.len() != self.config.participant_count() {
            return Err(ProtocolError::MalformedMessage);
        }
        let aligned = set
            .slots
            .iter()
            .enumerate()
            .all(|(slot, id)| id.as_ref().map_or(true, |id| self.config.participant_at(slot) == Some(id)));
        if aligned {
            Ok(())
        } else {
            Err(ProtocolError::MalformedMessage)
        }
    }

    fn destroy_secrets(&mut self) {
        self.encryption = None;
        self.agreement = None;
        self.seed = None;
        self.held.clear();
        self.roster = None;
        self.sharing_set = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use crate::entropy::DeterministicSource;
    use crate::mpc::SecretClass;

    const NAMES: [&str; 3] = ["alice", "bob", "carol"];

    fn config() -> AggregationConfig {
        AggregationConfig::new(NAMES.map(ClientId::from), 2, 4).unwrap()
    }

    fn engines() -> Vec<ClientRoundEngine> {
        NAMES
            .iter()
            .map(|n| ClientRoundEngine::new(ClientId::from(*n), config()).unwrap())
            .collect()
    }

    fn roster_of(adverts: &[AdvertiseKeys]) -> Roster {
        let cfg = config();
        let slots = cfg
            .participants()
            .iter()
            .map(|id| adverts.iter().find(|a| &a.sender == id).cloned().map(Into::into))
            .collect();
        Roster { slots }
    }

    fn inbox_for(recipient: &ClientId, all: &[ShareKeys]) -> ShareInbox {
        let cfg = config();
        let senders = all.iter().map(|s| &s.sender);
        let bundles = cfg
            .participants()
            .iter()
            .map(|id| {
                all.iter()
                    .find(|s| &s.sender == id)
                    .and_then(|s| s.bundles.iter().find(|b| &b.recipient == recipient))
                    .map(|b| b.sealed.clone())
            })
            .collect();
        ShareInbox {
            recipient: recipient.clone(),
            sharing_set: LiveSet::from_members(&cfg, senders),
            bundles,
        }
    }

    fn through_round_one(rng: &mut DeterministicSource) -> (Vec<ClientRoundEngine>, Vec<ShareKeys>) {
        let mut clients = engines();
        let adverts: Vec<_> = clients.iter_mut().map(|c| c.advertise_keys(rng).unwrap()).collect();
        let roster = roster_of(&adverts);
        let shares: Vec<_> = clients.iter_mut().map(|c| c.share_keys(&roster, rng).unwrap()).collect();
        (clients, shares)
    }

    #[test]
    fn test_unknown_client_rejected() {
        assert_eq!(
            ClientRoundEngine::new(ClientId::from("mallory"), config()).unwrap_err(),
            ProtocolError::UnexpectedParticipant
        );
    }

    #[test]
    fn test_rounds_in_order_only() {
        let mut rng = DeterministicSource::from_u64(1);
        let mut client = ClientRoundEngine::new(ClientId::from("alice"), config()).unwrap();
        let live = LiveSet::from_members(&config(), config().participants().iter());
        assert_eq!(client.unmask(&live).unwrap_err(), ProtocolError::InvalidState);
        // Out-of-order calls are refused without aborting.
        assert_eq!(client.state(), ClientState::Init);

        client.advertise_keys(&mut rng).unwrap();
        assert_eq!(client.advertise_keys(&mut rng).unwrap_err(), ProtocolError::InvalidState);
        assert_eq!(client.state(), ClientState::KeysAdvertised);
    }

    #[test]
    fn test_share_keys_addresses_every_peer() {
        let mut rng = DeterministicSource::from_u64(2);
        let (clients, shares) = through_round_one(&mut rng);
        for (client, msg) in clients.iter().zip(shares.iter()) {
            assert_eq!(client.state(), ClientState::SharesSent);
            assert_eq!(msg.bundles.len(), 2);
            assert!(msg.bundles.iter().all(|b| &b.recipient != client.id()));
            assert_eq!(client.held_owners().collect::<Vec<_>>(), vec![client.id()]);
        }
    }

    #[test]
    fn test_roster_below_threshold_aborts() {
        let mut rng = DeterministicSource::from_u64(3);
        let mut clients = engines();
        let adverts: Vec<_> = clients.iter_mut().map(|c| c.advertise_keys(&mut rng).unwrap()).collect();
        let roster = roster_of(&adverts[..1]);

        assert_eq!(
            clients[0].share_keys(&roster, &mut rng).unwrap_err(),
            ProtocolError::InsufficientParticipants
        );
        assert_eq!(clients[0].state(), ClientState::Aborted);
        assert_eq!(clients[0].held_owners().count(), 0);
    }

    #[test]
    fn test_roster_with_substituted_keys_rejected() {
        let mut rng = DeterministicSource::from_u64(4);
        let mut clients = engines();
        let mut adverts: Vec<_> = clients.iter_mut().map(|c| c.advertise_keys(&mut rng).unwrap()).collect();
        adverts[0].agreement_key = adverts[1].agreement_key;
        let roster = roster_of(&adverts);

        assert_eq!(
            clients[0].share_keys(&roster, &mut rng).unwrap_err(),
            ProtocolError::MalformedMessage
        );
        // Other clients only check their own entry.
        assert!(clients[1].share_keys(&roster, &mut rng).is_ok());
    }

    #[test]
    fn test_wrong_input_length_aborts() {
        let mut rng = DeterministicSource::from_u64(5);
        let (mut clients, shares) = through_round_one(&mut rng);
        let inbox = inbox_for(clients[0].id(), &shares);
        assert_eq!(
            clients[0].mask_input(&inbox, &[1, 2, 3]).unwrap_err(),
            ProtocolError::MalformedMessage
        );
        assert_eq!(clients[0].state(), ClientState::Aborted);
    }

    #[test]
    fn test_masked_input_hides_value() {
        let mut rng = DeterministicSource::from_u64(6);
        let (mut clients, shares) = through_round_one(&mut rng);
        let input = [5u64, 6, 7, 8];
        let inbox = inbox_for(clients[1].id(), &shares);
        let masked = clients[1].mask_input(&inbox, &input).unwrap();
        assert_eq!(masked.vector.len(), 4);
        assert_ne!(masked.vector, input.to_vec());
        assert_eq!(clients[1].held_owners().count(), 3);
    }

    #[test]
    fn test_tampered_bundle_is_dropped_not_fatal() {
        let mut rng = DeterministicSource::from_u64(7);
        let (mut clients, shares) = through_round_one(&mut rng);
        let mut inbox = inbox_for(clients[2].id(), &shares);
        if let Some(sealed) = inbox.bundles[0].as_mut() {
            sealed.ciphertext[0] ^= 0xFF;
        }

        clients[2].mask_input(&inbox, &[0; 4]).unwrap();
        let owners: Vec<_> = clients[2].held_owners().cloned().collect();
        assert_eq!(owners, vec![ClientId::from("bob"), ClientId::from("carol")]);

        let live = LiveSet::from_members(&config(), config().participants().iter());
        let response = clients[2].unmask(&live).unwrap();
        assert_eq!(response.disclosures.len(), 2);
    }

    #[test]
    fn test_disclosure_class_follows_live_set() {
        let mut rng = DeterministicSource::from_u64(8);
        let (mut clients, shares) = through_round_one(&mut rng);
        let inbox = inbox_for(clients[0].id(), &shares);
        clients[0].mask_input(&inbox, &[1; 4]).unwrap();

        let cfg = config();
        let survivors = LiveSet::from_members(&cfg, [ClientId::from("alice"), ClientId::from("carol")].iter());
        let response = clients[0].unmask(&survivors).unwrap();

        assert_eq!(response.disclosures.len(), 3);
        for record in &response.disclosures {
            assert_eq!(record.holder, ClientId::from("alice"));
            let expected = if record.owner.as_str() == "bob" {
                SecretClass::AgreementKey
            } else {
                SecretClass::Seed
            };
            assert_eq!(record.share.class(), expected, "owner {}", record.owner);
        }
        assert_eq!(clients[0].state(), ClientState::Unmasked);
        assert_eq!(clients[0].held_owners().count(), 0);
    }

    #[test]
    fn test_unmask_validates_announcement() {
        let mut rng = DeterministicSource::from_u64(9);
        let (mut clients, shares) = through_round_one(&mut rng);
        for client in clients.iter_mut() {
            let inbox = inbox_for(client.id(), &shares);
            client.mask_input(&inbox, &[0; 4]).unwrap();
        }
        let cfg = config();

        let without_self = LiveSet::from_members(&cfg, [ClientId::from("bob"), ClientId::from("carol")].iter());
        assert_eq!(clients[0].unmask(&without_self).unwrap_err(), ProtocolError::MalformedMessage);

        let too_few = LiveSet::from_members(&cfg, [ClientId::from("bob")].iter());
        assert_eq!(clients[1].unmask(&too_few).unwrap_err(), ProtocolError::InsufficientShares);
        assert_eq!(clients[1].state(), ClientState::Aborted);
    }

    #[test]
    fn test_survivor_outside_sharing_set_rejected() {
        let mut rng = DeterministicSource::from_u64(10);
        let (mut clients, shares) = through_round_one(&mut rng);
        // Carol's bundles never reached the server.
        let inbox = inbox_for(clients[0].id(), &shares[..2]);
        clients[0].mask_input(&inbox, &[0; 4]).unwrap();

        let cfg = config();
        let everyone = LiveSet::from_members(&cfg, cfg.participants().iter());
        assert_eq!(clients[0].unmask(&everyone).unwrap_err(), ProtocolError::UnexpectedParticipant);
    }
}
