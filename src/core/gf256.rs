//! GF(2^8) arithmetic for Shamir sharing.
//!
//! Elements are bytes; addition is XOR and multiplication reduces modulo the AES
//! polynomial x^8 + x^4 + x^3 + x + 1 (0x11B). Multiplication and inversion run a
//! fixed number of iterations with mask-based selection, so neither branches on
//! secret data.

#![forbid(unsafe_code)]

use core::ops::{Add, AddAssign, Mul, MulAssign, Sub};
use zeroize::DefaultIsZeroes;

/// Full reduction polynomial.
const POLY: u16 = 0x11B;

/// A field element.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct GF256(pub u8);

impl GF256 {
    pub const ZERO: GF256 = GF256(0);
    pub const ONE: GF256 = GF256(1);

    /// Multiplicative inverse via a^254. Zero maps to zero.
    #[inline]
    pub fn inv(self) -> Self {
        let mut result = GF256::ONE;
        let mut base = self;
        let mut exp: u8 = 0xFE;

        for _ in 0..8 {
            let mask = (exp & 1).wrapping_mul(0xFF);
            let factor = GF256((base.0 & mask) | (1 & !mask));
            result *= factor;
            base *= base;
            exp >>= 1;
        }

        result
    }
}

// Coefficient buffers hold secret bytes; let `Zeroizing` wipe them.
impl DefaultIsZeroes for GF256 {}

impl Add for GF256 {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        GF256(self.0 ^ rhs.0)
    }
}

impl AddAssign for GF256 {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

// Characteristic 2: subtraction and addition coincide.
impl Sub for GF256 {
    type Output = Self;

    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        GF256(self.0 ^ rhs.0)
    }
}

impl Mul for GF256 {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: Self) -> Self {
        let mut acc: u8 = 0;
        let mut a: u16 = self.0 as u16;
        let mut b: u8 = rhs.0;

        for _ in 0..8 {
            let take = ((b & 1) as u16).wrapping_mul(0xFFFF);
            acc ^= (a & take) as u8;

            let carry = ((a >> 7) & 1).wrapping_mul(0xFFFF);
            a = ((a << 1) & 0x1FF) ^ (POLY & carry);

            b >>= 1;
        }

        GF256(acc)
    }
}

impl MulAssign for GF256 {
    #[inline(always)]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}
