#![forbid(unsafe_code)]
// Element-wise arithmetic over (Z/2^64)^len.
// - Every operation wraps, so masks added during masking cancel exactly when
//   subtracted during unmasking regardless of magnitude.
// - Length agreement is checked by callers; these helpers assume equal lengths.

use alloc::vec::Vec;
use alloc::vec;

/// Returns the all-zero vector of length `len`.
#[inline]
pub fn zeros(len: usize) -> Vec<u64> {
    vec![0u64; len]
}

/// `acc[i] += rhs[i]` (wrapping).
#[inline]
pub fn add_assign(acc: &mut [u64], rhs: &[u64]) {
    debug_assert_eq!(acc.len(), rhs.len());
    for (a, r) in acc.iter_mut().zip(rhs.iter()) {
        *a = a.wrapping_add(*r);
    }
}

/// `acc[i] -= rhs[i]` (wrapping).
#[inline]
pub fn sub_assign(acc: &mut [u64], rhs: &[u64]) {
    debug_assert_eq!(acc.len(), rhs.len());
    for (a, r) in acc.iter_mut().zip(rhs.iter()) {
        *a = a.wrapping_sub(*r);
    }
}
