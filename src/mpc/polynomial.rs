//! Polynomial evaluation shared by splitting and its tests.

use crate::core::gf256::GF256;

/// Evaluates `c[0] + c[1]*x + ... + c[k-1]*x^(k-1)` with Horner's rule.
#[inline(always)]
pub(crate) fn evaluate_polynomial(coeffs: &[GF256], x: GF256) -> GF256 {
    coeffs
        .iter()
        .rev()
        .fold(GF256::ZERO, |acc, &c| acc * x + c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear() {
        // f(x) = 1 + 2x
        let coeffs = [GF256(1), GF256(2)];
        assert_eq!(evaluate_polynomial(&coeffs, GF256(0)), GF256(1));
        assert_eq!(evaluate_polynomial(&coeffs, GF256(1)), GF256(3));
        assert_eq!(evaluate_polynomial(&coeffs, GF256(2)), GF256(5));
        assert_eq!(evaluate_polynomial(&coeffs, GF256(3)), GF256(7));
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(evaluate_polynomial(&[], GF256(9)), GF256::ZERO);
    }
}
