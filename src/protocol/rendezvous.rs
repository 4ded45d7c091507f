//! Per-round collection barrier.
//!
//! The server opens one `RoundCollector` per round with the set of clients it
//! still considers live. Each of them may submit exactly once; anything else is
//! rejected and logged. Closing the collector freezes the round: the submitters
//! become the next live set, everybody else is dropped, and late messages are
//! refused with `RoundClosed`.
//!
//! The collector never closes itself. `should_close` reports when every expected
//! client has answered or the window has elapsed; the transport decides when to
//! act on it.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use core::mem;
use core::time::Duration;
use super::identity::ClientId;
use super::state_machine::RoundId;
use super::ProtocolError;

#[cfg(feature = "std")]
use std::time::Instant;

/// Write-once collection of one message per live client.
#[derive(Debug)]
pub struct RoundCollector<M> {
    round: RoundId,
    expected: BTreeSet<ClientId>,
    received: BTreeMap<ClientId, M>,
    closed: bool,
    timeout: Option<Duration>,
    /// Monotonic, so wall-clock changes cannot stretch or cut a window.
    #[cfg(feature = "std")]
    opened_at: Instant,
}

impl<M> RoundCollector<M> {
    /// Opens a window for `round` accepting one submission from each of `expected`.
    pub fn open<I>(round: RoundId, expected: I, timeout: Option<Duration>) -> Self
    where
        I: IntoIterator<Item = ClientId>,
    {
        let expected: BTreeSet<ClientId> = expected.into_iter().collect();
        log::info!("Opening {} for {} clients", round, expected.len());
        Self {
            round,
            expected,
            received: BTreeMap::new(),
            closed: false,
            timeout,
            #[cfg(feature = "std")]
            opened_at: Instant::now(),
        }
    }

    /// Accepts `msg` from `sender`.
    ///
    /// # Errors
    /// * `RoundClosed` after `close`.
    /// * `UnexpectedParticipant` if `sender` is not live for this round.
    /// * `DuplicateSubmission` if `sender` already submitted; the first message stands.
    pub fn submit(&mut self, sender: &ClientId, msg: M) -> Result<(), ProtocolError> {
        if self.closed {
            log::warn!("Late submission from {} for closed {}", sender, self.round);
            return Err(ProtocolError::RoundClosed);
        }
        if !self.expected.contains(sender) {
            log::warn!("Rejecting {} submission from non-live {}", self.round, sender);
            return Err(ProtocolError::UnexpectedParticipant);
        }
        if self.received.contains_key(sender) {
            log::warn!("Ignoring duplicate {} submission from {}", self.round, sender);
            return Err(ProtocolError::DuplicateSubmission);
        }
        log::debug!("Accepted {} submission from {}", self.round, sender);
        self.received.insert(sender.clone(), msg);
        Ok(())
    }

    /// Every expected client has submitted.
    pub fn is_complete(&self) -> bool {
        self.received.len() == self.expected.len()
    }

    /// Expected clients that have not submitted yet.
    pub fn missing(&self) -> Vec<ClientId> {
        self.expected
            .iter()
            .filter(|id| !self.received.contains_key(*id))
            .cloned()
            .collect()
    }

    /// True once the collection window has elapsed.
    ///
    /// Without `std` there is no clock; the caller tracks time and this always
    /// returns `false`.
    pub fn deadline_passed(&self) -> bool {
        #[cfg(feature = "std")]
        {
            if let Some(timeout) = self.timeout {
                return self.opened_at.elapsed() >= timeout;
            }
        }
        false
    }

    pub fn should_close(&self) -> bool {
        self.is_complete() || self.deadline_passed()
    }

    /// Freezes the round and hands over the accepted submissions.
    pub fn close(&mut self) -> Result<BTreeMap<ClientId, M>, ProtocolError> {
        if self.closed {
            return Err(ProtocolError::RoundClosed);
        }
        self.closed = true;
        let missing = self.missing();
        if !missing.is_empty() {
            log::warn!("Closing {} without {} client(s): {:?}", self.round, missing.len(), missing);
        }
        log::info!("Closed {} with {} submissions", self.round, self.received.len());
        Ok(mem::take(&mut self.received))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<ClientId> {
        names.iter().map(|n| ClientId::from(*n)).collect()
    }

    #[test]
    fn test_collects_once_per_client() {
        let mut rc = RoundCollector::open(RoundId::ShareKeys, ids(&["a", "b"]), None);
        let a = ClientId::from("a");
        rc.submit(&a, 1u32).unwrap();
        assert_eq!(rc.submit(&a, 2u32), Err(ProtocolError::DuplicateSubmission));
        assert!(!rc.is_complete());
        assert_eq!(rc.missing(), ids(&["b"]));

        rc.submit(&ClientId::from("b"), 3u32).unwrap();
        assert!(rc.is_complete());
        assert!(rc.should_close());

        let got = rc.close().unwrap();
        assert_eq!(got.get(&a), Some(&1));
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn test_rejects_strangers_and_late_messages() {
        let mut rc = RoundCollector::open(RoundId::Unmasking, ids(&["a"]), None);
        assert_eq!(
            rc.submit(&ClientId::from("z"), ()),
            Err(ProtocolError::UnexpectedParticipant)
        );
        rc.close().unwrap();
        assert_eq!(rc.submit(&ClientId::from("a"), ()), Err(ProtocolError::RoundClosed));
        assert_eq!(rc.close().unwrap_err(), ProtocolError::RoundClosed);
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_deadline() {
        let rc: RoundCollector<()> =
            RoundCollector::open(RoundId::AdvertiseKeys, ids(&["a"]), Some(Duration::ZERO));
        assert!(rc.deadline_passed());
        assert!(rc.should_close());

        let open: RoundCollector<()> =
            RoundCollector::open(RoundId::AdvertiseKeys, ids(&["a"]), Some(Duration::from_secs(3600)));
        assert!(!open.deadline_passed());

        let unbounded: RoundCollector<()> = RoundCollector::open(RoundId::AdvertiseKeys, ids(&["a"]), None);
        assert!(!unbounded.deadline_passed());
    }
}
