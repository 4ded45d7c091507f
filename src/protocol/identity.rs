//! Participant identities.
//!
//! `ClientId` is an opaque name. Its derived `Ord` (lexicographic on the name)
//! is the total order that fixes pairwise-mask signs: every client uses the same
//! comparison, so `PM(i, j)` enters the lower-ordered client's input with `+`
//! and the higher-ordered one's with `-`.

use alloc::string::String;
use core::cmp::Ordering;
use core::fmt;

/// Opaque handle naming one participant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientId(String);

impl ClientId {
    pub fn new(name: impl Into<String>) -> Self {
        ClientId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(name: &str) -> Self {
        ClientId::new(name)
    }
}

/// Sign with which `PM(own, peer)` enters `own`'s masked input: `+1` if `own`
/// orders first, `-1` otherwise. `None` for `own == peer`.
pub fn pairwise_sign(own: &ClientId, peer: &ClientId) -> Option<i8> {
    match own.cmp(peer) {
        Ordering::Less => Some(1),
        Ordering::Greater => Some(-1),
        Ordering::Equal => None,
    }
}
