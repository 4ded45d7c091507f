//! Splitting a secret towards a fixed set of recipients.
//!
//! Recipients are addressed by their x-coordinate rather than by `1..=n`, so a
//! share's identifier doubles as the holder's slot in the participant list and
//! stays meaningful after any subset of holders disappears.

use alloc::vec::Vec;
use alloc::vec;
use zeroize::Zeroizing;
use crate::core::gf256::GF256;
use crate::entropy::EntropySource;
use crate::mpc::{MpcError, polynomial::evaluate_polynomial, share::Share};

/// Splits `secret` into one share per x-coordinate in `recipients`, any `k` of
/// which reconstruct it.
///
/// # Errors
/// * `EmptyShare` for an empty secret.
/// * `InvalidThreshold` unless `2 <= k <= recipients.len()`.
/// * `InvalidShareIndex` / `DuplicateShareIndex` for a zero or repeated x-coordinate.
/// * `RngFailure` if the entropy source fails.
pub fn split_secret<R: EntropySource + ?Sized>(
    secret: &[u8],
    k: u8,
    recipients: &[u8],
    rng: &mut R,
) -> Result<Vec<Share>, MpcError> {
    if secret.is_empty() {
        return Err(MpcError::EmptyShare);
    }
    // With k = 1 the polynomial is constant and every share is the secret.
    if k < 2 || k as usize > recipients.len() {
        return Err(MpcError::InvalidThreshold);
    }
    for (i, &x) in recipients.iter().enumerate() {
        if x == 0 {
            return Err(MpcError::InvalidShareIndex);
        }
        if recipients[..i].contains(&x) {
            return Err(MpcError::DuplicateShareIndex);
        }
    }

    let mut values: Vec<Vec<u8>> = recipients
        .iter()
        .map(|_| Vec::with_capacity(secret.len()))
        .collect();

    let mut random_buf = Zeroizing::new(vec![0u8; (k - 1) as usize]);
    let mut coeffs: Zeroizing<Vec<GF256>> = Zeroizing::new(Vec::with_capacity(k as usize));

    for &byte in secret {
        rng.fill(&mut random_buf).map_err(|_| MpcError::RngFailure)?;

        coeffs.clear();
        coeffs.push(GF256(byte));
        coeffs.extend(random_buf.iter().map(|&r| GF256(r)));

        for (value, &x) in values.iter_mut().zip(recipients.iter()) {
            value.push(evaluate_polynomial(&coeffs, GF256(x)).0);
        }
    }

    recipients
        .iter()
        .zip(values)
        .map(|(&x, value)| Share::new(x, value))
        .collect()
}
