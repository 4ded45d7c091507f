//! Secret reconstruction from shares.
//!
//! Lagrange interpolation at x = 0 over GF(256). All supplied shares take part in
//! the interpolation; consistent shares from one split give the same answer for
//! every subset of size `>= k`.

use alloc::vec::Vec;
use zeroize::Zeroizing;
use crate::core::gf256::GF256;
use crate::mpc::{MpcError, share::Share};

/// Reconstructs the secret from `shares`, requiring at least `k` of them.
///
/// # Errors
/// * `InsufficientShares` when fewer than `k` shares (or none) are supplied.
/// * `ShareLengthMismatch` when shares disagree on length.
/// * `DuplicateShareIndex` when two shares sit on the same x-coordinate.
pub fn reconstruct_secret(shares: &[Share], k: u8) -> Result<Zeroizing<Vec<u8>>, MpcError> {
    if shares.is_empty() || shares.len() < k as usize {
        return Err(MpcError::InsufficientShares);
    }

    let share_len = shares[0].value.len();
    if shares.iter().any(|s| s.value.len() != share_len) {
        return Err(MpcError::ShareLengthMismatch);
    }

    for (i, share) in shares.iter().enumerate() {
        if share.identifier == 0 {
            return Err(MpcError::InvalidShareIndex);
        }
        if shares[..i].iter().any(|s| s.identifier == share.identifier) {
            return Err(MpcError::DuplicateShareIndex);
        }
    }

    // lambda_j = prod_{m != j} x_m / (x_m - x_j); subtraction is XOR here.
    let lambdas: Vec<GF256> = shares
        .iter()
        .enumerate()
        .map(|(j, sj)| {
            let xj = GF256(sj.identifier);
            let (num, den) = shares
                .iter()
                .enumerate()
                .filter(|(m, _)| *m != j)
                .fold((GF256::ONE, GF256::ONE), |(num, den), (_, sm)| {
                    let xm = GF256(sm.identifier);
                    (num * xm, den * (xm - xj))
                });
            num * den.inv()
        })
        .collect();

    let mut secret = Zeroizing::new(Vec::with_capacity(share_len));
    for p in 0..share_len {
        let byte = shares
            .iter()
            .zip(lambdas.iter())
            .fold(GF256::ZERO, |acc, (share, &lambda)| acc + GF256(share.value[p]) * lambda);
        secret.push(byte.0);
    }

    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use crate::entropy::DeterministicSource;
    use crate::mpc::quorum::split_secret;
    use test_case::test_case;

    /// Every subset of `shares`, as a bitmask over their positions.
    fn subsets(shares: &[Share]) -> impl Iterator<Item = Vec<Share>> + '_ {
        (1u32..1 << shares.len()).map(move |mask| {
            shares
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, s)| s.clone())
                .collect()
        })
    }

    #[test_case(2, 3 ; "t2n3")]
    #[test_case(2, 4 ; "t2n4")]
    #[test_case(3, 5 ; "t3n5")]
    #[test_case(4, 6 ; "t4n6")]
    #[test_case(5, 5 ; "t5n5")]
    fn test_every_threshold_subset_reconstructs(k: u8, n: u8) {
        let mut rng = DeterministicSource::from_u64(k as u64 * 100 + n as u64);
        let secret: Vec<u8> = (0u8..32).map(|b| b.wrapping_mul(37)).collect();
        let recipients: Vec<u8> = (1..=n).collect();
        let shares = split_secret(&secret, k, &recipients, &mut rng).unwrap();

        let mut checked = 0;
        for subset in subsets(&shares).filter(|s| s.len() >= k as usize) {
            assert_eq!(*reconstruct_secret(&subset, k).unwrap(), secret);
            checked += 1;
        }
        assert!(checked > 0);
    }

    #[test_case(2, 3 ; "t2n3")]
    #[test_case(3, 5 ; "t3n5")]
    #[test_case(4, 4 ; "t4n4")]
    #[test_case(4, 6 ; "t4n6")]
    fn test_below_threshold_fails(k: u8, n: u8) {
        let mut rng = DeterministicSource::from_u64(9);
        let secret = vec![0xAB; 32];
        let recipients: Vec<u8> = (1..=n).collect();
        let shares = split_secret(&secret, k, &recipients, &mut rng).unwrap();

        for subset in subsets(&shares).filter(|s| s.len() < k as usize) {
            assert_eq!(reconstruct_secret(&subset, k), Err(MpcError::InsufficientShares));
        }
    }

    #[test]
    fn test_sparse_identifiers() {
        let mut rng = DeterministicSource::from_u64(3);
        let secret = vec![0x42, 0x99, 0xAB];
        let shares = split_secret(&secret, 2, &[4, 9, 250], &mut rng).unwrap();

        let pair = [shares[2].clone(), shares[0].clone()];
        assert_eq!(*reconstruct_secret(&pair, 2).unwrap(), secret);
    }

    #[test]
    fn test_reconstruct_errors() {
        let share1 = Share::new(1, vec![1, 2]).unwrap();
        let share2 = Share::new(2, vec![3]).unwrap();
        let share3 = Share::new(1, vec![1, 2]).unwrap();

        assert_eq!(
            reconstruct_secret(&[share1.clone(), share2], 2),
            Err(MpcError::ShareLengthMismatch)
        );
        assert_eq!(
            reconstruct_secret(&[share1, share3], 2),
            Err(MpcError::DuplicateShareIndex)
        );
        assert_eq!(reconstruct_secret(&[], 2), Err(MpcError::InsufficientShares));
    }
}
