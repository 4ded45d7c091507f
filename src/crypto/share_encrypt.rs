//! Sealing share bundles between peers.
//!
//! During share-keys each client hands every peer one seed share and one
//! agreement-key share, relayed by the server. The bundle is protected with
//! ChaCha20-Poly1305.
//!
//! # Scheme
//! 1. **DH**: `agree(own encryption key, peer encryption public key)`.
//! 2. **Derivation**: `Key = BLAKE3_KDF(DH, context="secagg-engine 2024 share bundle")`.
//! 3. **Nonce**: 96 random bits per bundle. Both directions of a pair share one
//!    key, so the nonce is never derived from a counter.
//! 4. **AAD**: `len(sender) || sender || len(recipient) || recipient`, so a bundle
//!    re-addressed by the relay fails authentication.
//! 5. **Plaintext**: `[x (1)] [seed share (32)] [agreement-key share (32)]`.

use alloc::vec::Vec;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use zeroize::Zeroizing;
use crate::entropy::EntropySource;
use crate::mpc::Share;
use super::{CryptoError, KEY_LEN, SharedSecret};

const BUNDLE_CONTEXT: &str = "secagg-engine 2024 share bundle";

pub const NONCE_LEN: usize = 12;

/// Plaintext length of an encoded [`ShareBundle`].
pub const BUNDLE_LEN: usize = 1 + 2 * KEY_LEN;

/// Ciphertext of one bundle, as relayed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SealedBundle {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

/// The two shares a client entrusts to one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareBundle {
    pub seed: Share,
    pub agreement_key: Share,
}

impl ShareBundle {
    fn encode(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if self.seed.identifier != self.agreement_key.identifier
            || self.seed.value.len() != KEY_LEN
            || self.agreement_key.value.len() != KEY_LEN
        {
            return Err(CryptoError::MalformedPayload);
        }
        let mut out = Zeroizing::new(Vec::with_capacity(BUNDLE_LEN));
        out.push(self.seed.identifier);
        out.extend_from_slice(&self.seed.value);
        out.extend_from_slice(&self.agreement_key.value);
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != BUNDLE_LEN {
            return Err(CryptoError::MalformedPayload);
        }
        let x = bytes[0];
        let seed = Share::new(x, bytes[1..1 + KEY_LEN].to_vec())
            .map_err(|_| CryptoError::MalformedPayload)?;
        let agreement_key = Share::new(x, bytes[1 + KEY_LEN..].to_vec())
            .map_err(|_| CryptoError::MalformedPayload)?;
        Ok(Self { seed, agreement_key })
    }
}

/// Seals `bundle` from `sender` to `recipient`.
pub fn seal<R: EntropySource + ?Sized>(
    shared: &SharedSecret,
    sender: &str,
    recipient: &str,
    bundle: &ShareBundle,
    rng: &mut R,
) -> Result<SealedBundle, CryptoError> {
    let plaintext = bundle.encode()?;

    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut nonce).map_err(|_| CryptoError::RngFailure)?;

    let aad = associated_data(sender, recipient);
    let ciphertext = cipher(shared)
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: &plaintext, aad: &aad })
        .map_err(|_| CryptoError::EncryptionError)?;

    Ok(SealedBundle { nonce, ciphertext })
}

/// Opens a bundle addressed from `sender` to `recipient`.
///
/// Fails closed with `DecryptionFailure` on any tampering, including a swapped
/// sender or recipient.
pub fn open(
    shared: &SharedSecret,
    sender: &str,
    recipient: &str,
    sealed: &SealedBundle,
) -> Result<ShareBundle, CryptoError> {
    let aad = associated_data(sender, recipient);
    let plaintext = cipher(shared)
        .decrypt(
            Nonce::from_slice(&sealed.nonce),
            Payload { msg: &sealed.ciphertext, aad: &aad },
        )
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::DecryptionFailure)?;

    ShareBundle::decode(&plaintext)
}

fn cipher(shared: &SharedSecret) -> ChaCha20Poly1305 {
    let key = Zeroizing::new(blake3::derive_key(BUNDLE_CONTEXT, shared.as_bytes()));
    ChaCha20Poly1305::new(Key::from_slice(&*key))
}

fn associated_data(sender: &str, recipient: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(8 + sender.len() + recipient.len());
    aad.extend_from_slice(&(sender.len() as u32).to_le_bytes());
    aad.extend_from_slice(sender.as_bytes());
    aad.extend_from_slice(&(recipient.len() as u32).to_le_bytes());
    aad.extend_from_slice(recipient.as_bytes());
    aad
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use crate::crypto::key_agreement::generate_key_pair;
    use crate::entropy::DeterministicSource;

    fn bundle(x: u8) -> ShareBundle {
        ShareBundle {
            seed: Share::new(x, vec![0x11; KEY_LEN]).unwrap(),
            agreement_key: Share::new(x, vec![0x22; KEY_LEN]).unwrap(),
        }
    }

    #[test]
    fn test_seal_open() {
        let mut rng = DeterministicSource::from_u64(31);
        let alice = generate_key_pair(&mut rng).unwrap();
        let bob = generate_key_pair(&mut rng).unwrap();

        let sealed = seal(&alice.agree(&bob.public()), "alice", "bob", &bundle(2), &mut rng).unwrap();
        assert_ne!(&sealed.ciphertext[1..1 + KEY_LEN], &[0x11; KEY_LEN][..]);

        let opened = open(&bob.agree(&alice.public()), "alice", "bob", &sealed).unwrap();
        assert_eq!(opened, bundle(2));
    }

    #[test]
    fn test_tamper_fails_closed() {
        let mut rng = DeterministicSource::from_u64(32);
        let alice = generate_key_pair(&mut rng).unwrap();
        let bob = generate_key_pair(&mut rng).unwrap();
        let key = alice.agree(&bob.public());

        let mut sealed = seal(&key, "alice", "bob", &bundle(2), &mut rng).unwrap();
        let last = sealed.ciphertext.len() - 1;
        sealed.ciphertext[last] ^= 0x01;

        assert_eq!(open(&key, "alice", "bob", &sealed), Err(CryptoError::DecryptionFailure));
    }

    #[test]
    fn test_readdressed_bundle_rejected() {
        let mut rng = DeterministicSource::from_u64(33);
        let alice = generate_key_pair(&mut rng).unwrap();
        let bob = generate_key_pair(&mut rng).unwrap();
        let key = alice.agree(&bob.public());

        let sealed = seal(&key, "alice", "bob", &bundle(2), &mut rng).unwrap();
        // Same pair key, reversed direction.
        assert_eq!(open(&key, "bob", "alice", &sealed), Err(CryptoError::DecryptionFailure));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let mut rng = DeterministicSource::from_u64(34);
        let alice = generate_key_pair(&mut rng).unwrap();
        let bob = generate_key_pair(&mut rng).unwrap();
        let eve = generate_key_pair(&mut rng).unwrap();

        let sealed = seal(&alice.agree(&bob.public()), "alice", "bob", &bundle(2), &mut rng).unwrap();
        assert_eq!(
            open(&eve.agree(&alice.public()), "alice", "bob", &sealed),
            Err(CryptoError::DecryptionFailure)
        );
    }

    #[test]
    fn test_mismatched_shares_not_sealed() {
        let mut rng = DeterministicSource::from_u64(35);
        let alice = generate_key_pair(&mut rng).unwrap();
        let odd = ShareBundle {
            seed: Share::new(1, vec![0; KEY_LEN]).unwrap(),
            agreement_key: Share::new(2, vec![0; KEY_LEN]).unwrap(),
        };
        assert_eq!(
            seal(&alice.agree(&alice.public()), "a", "b", &odd, &mut rng).unwrap_err(),
            CryptoError::MalformedPayload
        );
    }
}
