//! Lagrange interpolation coefficients over party identifiers, evaluated at 0.

use curve25519_dalek::scalar::Scalar;

use crate::error::{Error, Result};
use crate::party::{party_id_to_scalar, PartyId};

/// `lambda_i = prod_{j in set, j != i} j / (j - i)`, the weight making
/// `sum_i lambda_i * f(i) = f(0)` for any polynomial `f` of degree `< |set|`.
///
/// The denominator `j - i` is always nonzero because signer identifiers are
/// distinct and nonzero; an internal invariant failure (duplicate id slipping
/// through validation) surfaces as [`Error::FailFatal`].
pub(crate) fn lagrange_coefficient(id: PartyId, set: &[PartyId]) -> Result<Scalar> {
    let i = party_id_to_scalar(id);
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;

    for &j in set {
        if j == id {
            continue;
        }
        let j_scalar = party_id_to_scalar(j);
        numerator *= j_scalar;
        denominator *= j_scalar - i;
    }

    if denominator == Scalar::ZERO {
        return Err(Error::FailFatal(
            "lagrange denominator is zero: signer set contains a duplicate identifier".into(),
        ));
    }

    Ok(numerator * denominator.invert())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconstructs_secret_from_shares() {
        // f(x) = 3 + 5x, degree 1, evaluated at the signer set {1, 2}.
        let a0 = Scalar::from(3u64);
        let a1 = Scalar::from(5u64);
        let eval = |x: u64| a0 + a1 * Scalar::from(x);

        let set = [1u32, 2u32];
        let l1 = lagrange_coefficient(1, &set).unwrap();
        let l2 = lagrange_coefficient(2, &set).unwrap();

        let reconstructed = l1 * eval(1) + l2 * eval(2);
        assert_eq!(reconstructed, a0);
    }

    #[test]
    fn matches_spec_example_s5() {
        // partyIDs {10, 12, 14, 16}, signer set {10, 14, 16}.
        let set = [10u32, 14, 16];
        let lambda_10 = lagrange_coefficient(10, &set).unwrap();
        let expected_num = Scalar::from(14u64) * Scalar::from(16u64);
        let expected_den = (Scalar::from(14u64) - Scalar::from(10u64)) * (Scalar::from(16u64) - Scalar::from(10u64));
        assert_eq!(lambda_10, expected_num * expected_den.invert());
    }
}
