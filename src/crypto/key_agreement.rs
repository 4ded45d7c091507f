//! X25519 key agreement.
//!
//! Every client holds two independent pairs per run: one to seal share bundles,
//! one whose DH outputs seed the pairwise masks. Both use this module.
//!
//! `agree(sk_i, pk_j) == agree(sk_j, pk_i)` for all pairs; pairwise mask
//! cancellation rests on that.

use core::fmt;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroizing;
use crate::entropy::EntropySource;
use super::{CryptoError, KEY_LEN};

/// A public key as it travels on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PublicKey(pub [u8; KEY_LEN]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// First four bytes as hex, for log lines.
    pub fn fingerprint(&self) -> alloc::string::String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}..)", self.fingerprint())
    }
}

impl From<&X25519Public> for PublicKey {
    fn from(pk: &X25519Public) -> Self {
        PublicKey(*pk.as_bytes())
    }
}

/// The raw DH output of two key pairs.
pub struct SharedSecret(Zeroizing<[u8; KEY_LEN]>);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(***SENSITIVE***)")
    }
}

/// A private key with its public half.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("secret", &"***SENSITIVE***")
            .finish()
    }
}

impl KeyPair {
    /// Draws a fresh private key from `rng`.
    pub fn generate<R: EntropySource + ?Sized>(rng: &mut R) -> Result<Self, CryptoError> {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        rng.fill(&mut *bytes).map_err(|_| CryptoError::RngFailure)?;
        Ok(Self::from_secret_bytes(&bytes))
    }

    /// Rebuilds a pair from private key bytes, e.g. after threshold reconstruction.
    pub fn from_secret_bytes(bytes: &[u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = PublicKey::from(&X25519Public::from(&secret));
        Self { secret, public }
    }

    /// Rebuilds a pair from a reconstructed secret of unchecked length.
    pub fn from_secret_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::MalformedPayload)?;
        let arr = Zeroizing::new(arr);
        Ok(Self::from_secret_bytes(&arr))
    }

    pub fn public(&self) -> PublicKey {
        self.public
    }

    /// The private key bytes, for splitting into shares.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; KEY_LEN]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// DH with a peer's public key.
    pub fn agree(&self, peer: &PublicKey) -> SharedSecret {
        agree(self, peer)
    }
}

/// Generates a key pair from `rng`.
pub fn generate_key_pair<R: EntropySource + ?Sized>(rng: &mut R) -> Result<KeyPair, CryptoError> {
    KeyPair::generate(rng)
}

/// The public half of `pair`.
pub fn public_of(pair: &KeyPair) -> PublicKey {
    pair.public
}

/// `own` private key combined with `peer`'s public key.
pub fn agree(own: &KeyPair, peer: &PublicKey) -> SharedSecret {
    let shared = own.secret.diffie_hellman(&X25519Public::from(peer.0));
    SharedSecret(Zeroizing::new(*shared.as_bytes()))
}
