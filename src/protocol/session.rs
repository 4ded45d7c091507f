//! In-process session driver.
//!
//! Runs every configured client plus the server through all four rounds on
//! one thread, delivering messages directly. A dropout schedule says which
//! round each client goes silent at, and individual relayed bundles can be
//! corrupted in transit, so dropout and tampering scenarios can be replayed
//! deterministically.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use crate::config::AggregationConfig;
use crate::entropy::EntropySource;
use super::client::ClientRoundEngine;
use super::identity::ClientId;
use super::messaging::{AggregationOutput, ClientMessage, ShareInbox};
use super::server::ServerCoordinator;
use super::state_machine::RoundId;
use super::ProtocolError;

/// A scripted aggregation run.
#[derive(Debug, Clone)]
pub struct LocalSession {
    config: AggregationConfig,
    inputs: BTreeMap<ClientId, Vec<u64>>,
    /// Client → first round it does not take part in.
    dropouts: BTreeMap<ClientId, RoundId>,
    /// (sender, recipient) pairs whose bundle is corrupted in transit.
    corrupted: BTreeSet<(ClientId, ClientId)>,
}

impl LocalSession {
    pub fn new(config: AggregationConfig) -> Self {
        Self {
            config,
            inputs: BTreeMap::new(),
            dropouts: BTreeMap::new(),
            corrupted: BTreeSet::new(),
        }
    }

    /// Sets the private input of `id`.
    pub fn input(mut self, id: impl Into<ClientId>, vector: Vec<u64>) -> Self {
        self.inputs.insert(id.into(), vector);
        self
    }

    /// Makes `id` go silent from `round` on.
    pub fn drop_before(mut self, id: impl Into<ClientId>, round: RoundId) -> Self {
        self.dropouts.insert(id.into(), round);
        self
    }

    /// Flips a ciphertext bit of the bundle `sender` seals for `recipient`.
    pub fn corrupt_bundle(mut self, sender: impl Into<ClientId>, recipient: impl Into<ClientId>) -> Self {
        self.corrupted.insert((sender.into(), recipient.into()));
        self
    }

    fn speaks(&self, id: &ClientId, round: RoundId) -> bool {
        self.dropouts.get(id).map_or(true, |silent_from| round < *silent_from)
    }

    /// Runs the session to completion.
    ///
    /// # Errors
    /// `MalformedMessage` if a client that reaches round 2 has no input; any
    /// error raised by a client or the server otherwise.
    pub fn run<R: EntropySource + ?Sized>(&self, rng: &mut R) -> Result<AggregationOutput, ProtocolError> {
        let mut server = ServerCoordinator::new(self.config.clone());
        let mut clients = self
            .config
            .participants()
            .iter()
            .map(|id| ClientRoundEngine::new(id.clone(), self.config.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        for client in clients.iter_mut().filter(|c| self.speaks(c.id(), RoundId::AdvertiseKeys)) {
            let msg = client.advertise_keys(rng)?;
            server.receive(ClientMessage::AdvertiseKeys(msg))?;
        }
        let roster = server.close_advertise_keys()?;

        for client in clients.iter_mut() {
            if !self.speaks(client.id(), RoundId::ShareKeys) || roster.entry(client.id()).is_none() {
                continue;
            }
            let msg = client.share_keys(&roster, rng)?;
            server.receive(ClientMessage::ShareKeys(msg))?;
        }
        let mut inboxes = server.close_share_keys()?;
        self.tamper(&mut inboxes);

        for client in clients.iter_mut() {
            if !self.speaks(client.id(), RoundId::MaskedInputCollection) {
                continue;
            }
            let inbox = match inboxes.get(client.id()) {
                Some(inbox) => inbox,
                None => continue,
            };
            let input = self.inputs.get(client.id()).ok_or(ProtocolError::MalformedMessage)?;
            let msg = client.mask_input(inbox, input)?;
            server.receive(ClientMessage::MaskedInput(msg))?;
        }
        let survivors = server.close_masked_inputs()?;

        for client in clients.iter_mut() {
            if !self.speaks(client.id(), RoundId::Unmasking) || !survivors.contains(client.id()) {
                continue;
            }
            let msg = client.unmask(&survivors)?;
            server.receive(ClientMessage::Unmasking(msg))?;
        }
        server.finalize()
    }

    fn tamper(&self, inboxes: &mut BTreeMap<ClientId, ShareInbox>) {
        for (sender, recipient) in &self.corrupted {
            let slot = match self.config.slot_of(sender) {
                Some(slot) => slot,
                None => continue,
            };
            let sealed = inboxes
                .get_mut(recipient)
                .and_then(|inbox| inbox.bundles.get_mut(slot))
                .and_then(Option::as_mut);
            if let Some(byte) = sealed.and_then(|s| s.ciphertext.first_mut()) {
                log::debug!("Corrupting bundle {} -> {}", sender, recipient);
                *byte ^= 0x01;
            }
        }
    }
}
